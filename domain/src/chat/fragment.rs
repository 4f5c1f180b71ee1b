//! Streamed answer fragments and queue items.
//!
//! A dispatched prompt produces 1..N [`AnswerFragment`]s: zero or more
//! partial deltas followed by exactly one terminal marker (a single fragment
//! may be both). Fragments from all backends, plus model-discovery results,
//! travel through the correlation queue as [`RelayItem`]s and are drained by
//! a single relay worker.

use serde::{Deserialize, Serialize};

use super::keys::{ActionId, BackendKey, ChannelId, ModelKey};

/// Identifiers tying a dispatched prompt to its fragments and its turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationTag {
    /// Id of the recorded `AskChatAi` action (the correlation id).
    pub action_id: ActionId,
    /// Push-channel address of the originating client connection.
    pub channel: ChannelId,
    /// Question the student was composing when the prompt was sent.
    pub question_idx: usize,
    /// Id of the chat the prompt belongs to (one chat per catalog choice).
    pub conversation_id: String,
}

/// One incremental piece of a streamed answer, or its terminal marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerFragment {
    pub tag: CorrelationTag,
    pub backend: BackendKey,
    pub model: ModelKey,
    /// Partial answer text. `None` for pure terminal markers.
    pub delta: Option<String>,
    /// True exactly once per correlation, on the last fragment.
    pub ended: bool,
}

impl AnswerFragment {
    /// A partial-content fragment.
    pub fn delta(
        tag: CorrelationTag,
        backend: impl Into<BackendKey>,
        model: impl Into<ModelKey>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            tag,
            backend: backend.into(),
            model: model.into(),
            delta: Some(text.into()),
            ended: false,
        }
    }

    /// A content-free terminal marker closing the correlation.
    pub fn terminal(
        tag: CorrelationTag,
        backend: impl Into<BackendKey>,
        model: impl Into<ModelKey>,
    ) -> Self {
        Self {
            tag,
            backend: backend.into(),
            model: model.into(),
            delta: None,
            ended: true,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.ended
    }
}

/// An element of the correlation queue.
///
/// Multi-producer (every backend plus the discovery flow), single consumer
/// (the relay worker). FIFO per producer sequence; no ordering guarantee
/// across different correlations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayItem {
    /// A (backend, model) pair reported during model discovery.
    Discovery {
        backend: BackendKey,
        model: ModelKey,
    },
    /// A streamed prompt result.
    Answer(AnswerFragment),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag() -> CorrelationTag {
        CorrelationTag {
            action_id: ActionId::new("a1"),
            channel: ChannelId::new("sid-1"),
            question_idx: 0,
            conversation_id: "OPENAI.gpt-3.5-turbo".to_string(),
        }
    }

    #[test]
    fn delta_fragment_is_not_terminal() {
        let frag = AnswerFragment::delta(tag(), "OPENAI", "gpt-3.5-turbo", "Hi");
        assert_eq!(frag.delta.as_deref(), Some("Hi"));
        assert!(!frag.is_terminal());
    }

    #[test]
    fn terminal_fragment_carries_no_content() {
        let frag = AnswerFragment::terminal(tag(), "OPENAI", "gpt-3.5-turbo");
        assert!(frag.delta.is_none());
        assert!(frag.is_terminal());
    }
}
