//! Remote streaming backend.
//!
//! Talks to an OpenAI-style chat-completions API. Unlike the local model
//! there is no persistent connection: every prompt issues one streaming
//! POST on a bounded worker pool, authenticated with the caller-supplied
//! key; the adapter never holds a credential of its own. Prior turns of
//! the conversation are rebuilt from the action store so the remote model
//! keeps multi-turn context.
//!
//! One server-sent event per answer delta becomes one fragment on the
//! correlation queue; the literal `[DONE]` event ends the stream. Whatever
//! happens mid-stream, the job closes the correlation with a terminal
//! fragment so the turn never hangs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, warn};
use vigil_application::{ActionStore, ChatBackend, RelaySender};
use vigil_domain::{
    AnswerFragment, BackendDescriptor, ModelKey, PriorTurn, PromptRequest, RelayItem,
};

use super::pool::WorkerPool;

/// Backend key of the remote streaming adapter.
pub const REMOTE_SSE_KEY: &str = "OPENAI";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const TEMPERATURE: f32 = 0.6;
const DONE_MARKER: &str = "[DONE]";

/// Models the adapter reports during discovery.
const MODELS: &[(&str, &str)] = &[
    ("gpt-3.5-turbo", "Most capable GPT-3.5 model."),
    ("gpt-4", "GPT-4 large model."),
];

/// Connection settings, from the `[openai]` config section.
#[derive(Debug, Clone)]
pub struct RemoteSseConfig {
    pub base_url: String,
    pub pool_size: usize,
}

impl Default for RemoteSseConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            pool_size: 4,
        }
    }
}

pub struct RemoteSseBackend {
    descriptor: BackendDescriptor,
    relay: RelaySender,
    store: Arc<dyn ActionStore>,
    client: reqwest::Client,
    pool: WorkerPool,
    base_url: String,
    connected: AtomicBool,
}

impl RemoteSseBackend {
    pub fn new(relay: RelaySender, store: Arc<dyn ActionStore>, config: RemoteSseConfig) -> Self {
        Self {
            descriptor: BackendDescriptor {
                key: REMOTE_SSE_KEY.into(),
                display_name: "OpenAI remote AI service".to_string(),
                passthrough: false,
                private_key_required: true,
            },
            relay,
            store,
            client: reqwest::Client::new(),
            pool: WorkerPool::new(config.pool_size),
            base_url: config.base_url,
            connected: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ChatBackend for RemoteSseBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn model_title(&self, model: &ModelKey) -> Option<String> {
        Some(
            MODELS
                .iter()
                .find(|(key, _)| *key == model.as_str())
                .map_or_else(|| model.to_string(), |(_, title)| (*title).to_string()),
        )
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) {
        if self.is_connected() {
            warn!("remote chat: already connected");
            return;
        }
        self.connected.store(true, Ordering::SeqCst);
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn request_available_models(&self) {
        if !self.is_connected() {
            warn!("remote chat: cannot list models, not connected");
            return;
        }
        for (model, _) in MODELS {
            let _ = self.relay.send(RelayItem::Discovery {
                backend: REMOTE_SSE_KEY.into(),
                model: (*model).into(),
            });
        }
    }

    async fn send_prompt(&self, request: PromptRequest) {
        if !self.is_connected() {
            warn!("remote chat: cannot process prompt, not connected");
            return;
        }
        if request.private_key.as_deref().is_none_or(str::is_empty) {
            // Close the turn anyway so the caller is not left waiting.
            warn!("remote chat: no private key supplied, aborting prompt");
            send_terminal(&self.relay, &request);
            return;
        }
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let store = Arc::clone(&self.store);
        let relay = self.relay.clone();
        // Fire-and-forget: the pool slot is acquired inside the job and
        // held until its stream ends, keeping fragment runs contiguous.
        self.pool
            .spawn(stream_answer(client, base_url, store, relay, request));
    }
}

// -- Wire types ----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatCompletionBody {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    stream: bool,
    user: String,
}

/// The delta-bearing part of one streamed completion event.
#[derive(Debug, Default, PartialEq)]
struct DeltaEvent {
    finish_reason: Option<String>,
    role: Option<String>,
    content: Option<String>,
}

// -- Streaming job -------------------------------------------------------------

async fn stream_answer(
    client: reqwest::Client,
    base_url: String,
    store: Arc<dyn ActionStore>,
    relay: RelaySender,
    request: PromptRequest,
) {
    // The turn being answered was persisted before dispatch, so it arrives
    // from the store as the trailing user message.
    let turns = match store.prior_turns(&request.scope).await {
        Ok(turns) => turns,
        Err(e) => {
            warn!("remote chat: could not load prior turns: {e}");
            send_terminal(&relay, &request);
            return;
        }
    };
    let system = request
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    let body = ChatCompletionBody {
        model: request.model.to_string(),
        messages: build_messages(&turns, system),
        temperature: TEMPERATURE,
        stream: true,
        user: request.scope.student_username.clone(),
    };
    let key = request.private_key.clone().unwrap_or_default();

    let response = match client
        .post(format!("{base_url}/v1/chat/completions"))
        .bearer_auth(&key)
        .json(&body)
        .send()
        .await
    {
        Ok(resp) => match resp.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                warn!("remote chat: request rejected: {e}");
                send_terminal(&relay, &request);
                return;
            }
        },
        Err(e) => {
            warn!("remote chat: request failed: {e}");
            send_terminal(&relay, &request);
            return;
        }
    };

    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    'read: while let Some(chunk) = stream.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("remote chat: stream interrupted: {e}");
                break;
            }
        };
        buffer.push_str(&String::from_utf8_lossy(&bytes));

        while let Some(end) = buffer.find("\n\n") {
            let block = buffer[..end].to_string();
            buffer.drain(..end + 2);
            let Some(data) = sse_data(&block) else {
                continue;
            };
            if data == DONE_MARKER {
                break 'read;
            }
            let event = match parse_delta_event(data) {
                Ok(event) => event,
                Err(e) => {
                    warn!("remote chat: undecodable stream event: {e}");
                    break 'read;
                }
            };
            match event.finish_reason.as_deref() {
                Some("content_filter") => warn!(
                    "remote chat: content withheld by the provider filter (user {})",
                    request.scope.student_username
                ),
                Some("length") => warn!(
                    "remote chat: answer truncated by the token limit (user {})",
                    request.scope.student_username
                ),
                _ => {}
            }
            // The first event only announces the role; it carries no text.
            if let Some(role) = &event.role {
                if role != "assistant" {
                    warn!("remote chat: unexpected role in stream: {role}");
                }
                continue;
            }
            if let Some(content) = event.content {
                debug!("remote chat: delta of {} bytes", content.len());
                let fragment = AnswerFragment::delta(
                    request.tag.clone(),
                    REMOTE_SSE_KEY,
                    request.model.clone(),
                    content,
                );
                if relay.send(RelayItem::Answer(fragment)).is_err() {
                    break 'read;
                }
            }
        }
    }

    send_terminal(&relay, &request);
}

fn send_terminal(relay: &RelaySender, request: &PromptRequest) {
    let _ = relay.send(RelayItem::Answer(AnswerFragment::terminal(
        request.tag.clone(),
        REMOTE_SSE_KEY,
        request.model.clone(),
    )));
}

/// Rebuild the message history: the system prompt, then one user message
/// per turn, with an assistant reply for every achieved turn.
fn build_messages(turns: &[PriorTurn], system: &str) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage {
        role: "system",
        content: system.to_string(),
    }];
    for turn in turns {
        messages.push(ChatMessage {
            role: "user",
            content: turn.prompt.clone(),
        });
        if turn.achieved {
            messages.push(ChatMessage {
                role: "assistant",
                content: turn.answer.clone().unwrap_or_default(),
            });
        }
    }
    messages
}

/// Extract the data payload of one SSE block, skipping comments and
/// non-data fields.
fn sse_data(block: &str) -> Option<&str> {
    block
        .lines()
        .find_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
}

fn parse_delta_event(data: &str) -> Result<DeltaEvent, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(data)?;
    let choice = &value["choices"][0];
    Ok(DeltaEvent {
        finish_reason: choice["finish_reason"].as_str().map(str::to_string),
        role: choice["delta"]["role"].as_str().map(str::to_string),
        content: choice["delta"]["content"].as_str().map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_application::{StoreError, relay_channel};
    use vigil_domain::{
        ActionId, ActionRecord, ChannelId, CorrelationTag, DiscoveredModel, FragmentOutcome,
        TurnScope,
    };

    struct NullStore;

    #[async_trait]
    impl ActionStore for NullStore {
        async fn insert_action(&self, _action: ActionRecord) -> Result<ActionId, StoreError> {
            Ok(ActionId::generate())
        }

        async fn apply_answer_fragment(
            &self,
            _action_id: &ActionId,
            _delta: Option<&str>,
            _ended: bool,
        ) -> Result<FragmentOutcome, StoreError> {
            Ok(FragmentOutcome::Applied)
        }

        async fn prior_turns(&self, _scope: &TurnScope) -> Result<Vec<PriorTurn>, StoreError> {
            Ok(vec![])
        }

        async fn clear_discovered_models(&self) -> Result<(), StoreError> {
            Ok(())
        }

        async fn add_discovered_model(&self, _model: DiscoveredModel) -> Result<(), StoreError> {
            Ok(())
        }

        async fn discovered_models(&self) -> Result<Vec<DiscoveredModel>, StoreError> {
            Ok(vec![])
        }
    }

    fn request(private_key: Option<&str>) -> PromptRequest {
        PromptRequest {
            model: "gpt-3.5-turbo".into(),
            prompt: "hello".to_string(),
            tag: CorrelationTag {
                action_id: ActionId::new("a1"),
                channel: ChannelId::new("sid"),
                question_idx: 0,
                conversation_id: "OPENAI.gpt-3.5-turbo".to_string(),
            },
            private_key: private_key.map(str::to_string),
            system_prompt: None,
            scope: TurnScope {
                exam_id: "exam-1".to_string(),
                student_username: "alice".to_string(),
                question_idx: 0,
                conversation_id: "OPENAI.gpt-3.5-turbo".to_string(),
            },
        }
    }

    // -- SSE parsing -----------------------------------------------------------

    #[test]
    fn sse_data_strips_the_data_prefix() {
        assert_eq!(sse_data("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(sse_data("data: [DONE]"), Some("[DONE]"));
    }

    #[test]
    fn sse_data_skips_comments_and_other_fields() {
        assert_eq!(sse_data(": keep-alive"), None);
        assert_eq!(sse_data("event: ping"), None);
        assert_eq!(
            sse_data("event: message\ndata: {\"y\":2}"),
            Some("{\"y\":2}")
        );
    }

    #[test]
    fn delta_event_with_content() {
        let data = r#"{"choices":[{"finish_reason":null,"delta":{"content":"Hi"}}]}"#;
        let event = parse_delta_event(data).unwrap();
        assert_eq!(event.content.as_deref(), Some("Hi"));
        assert_eq!(event.role, None);
    }

    #[test]
    fn delta_event_with_role_only() {
        let data = r#"{"choices":[{"finish_reason":null,"delta":{"role":"assistant"}}]}"#;
        let event = parse_delta_event(data).unwrap();
        assert_eq!(event.role.as_deref(), Some("assistant"));
        assert_eq!(event.content, None);
    }

    #[test]
    fn delta_event_with_finish_reason() {
        let data = r#"{"choices":[{"finish_reason":"length","delta":{}}]}"#;
        let event = parse_delta_event(data).unwrap();
        assert_eq!(event.finish_reason.as_deref(), Some("length"));
    }

    #[test]
    fn malformed_event_is_an_error() {
        assert!(parse_delta_event("not json").is_err());
    }

    // -- Message reconstruction ------------------------------------------------

    #[test]
    fn achieved_turns_become_user_assistant_pairs() {
        let turns = vec![
            PriorTurn {
                prompt: "q1".to_string(),
                answer: Some("a1".to_string()),
                achieved: true,
            },
            PriorTurn {
                prompt: "q2".to_string(),
                answer: None,
                achieved: false,
            },
        ];
        let messages = build_messages(&turns, "sys");
        let roles: Vec<&str> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages[0].content, "sys");
        assert_eq!(messages[2].content, "a1");
        assert_eq!(messages[3].content, "q2");
    }

    #[test]
    fn achieved_turn_without_answer_yields_empty_assistant_text() {
        let turns = vec![PriorTurn {
            prompt: "q".to_string(),
            answer: None,
            achieved: true,
        }];
        let messages = build_messages(&turns, "sys");
        assert_eq!(messages[2].content, "");
    }

    // -- Dispatch validation ---------------------------------------------------

    #[tokio::test]
    async fn missing_private_key_still_closes_the_turn() {
        let (tx, mut rx) = relay_channel();
        let backend = RemoteSseBackend::new(tx, Arc::new(NullStore), RemoteSseConfig::default());
        backend.connect().await;

        backend.send_prompt(request(None)).await;

        match rx.try_recv().unwrap() {
            RelayItem::Answer(frag) => assert!(frag.is_terminal()),
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnected_backend_ignores_prompts() {
        let (tx, mut rx) = relay_channel();
        let backend = RemoteSseBackend::new(tx, Arc::new(NullStore), RemoteSseConfig::default());

        backend.send_prompt(request(Some("sk-test"))).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn discovery_reports_every_known_model() {
        let (tx, mut rx) = relay_channel();
        let backend = RemoteSseBackend::new(tx, Arc::new(NullStore), RemoteSseConfig::default());
        backend.connect().await;

        backend.request_available_models().await;

        let mut found = Vec::new();
        while let Ok(item) = rx.try_recv() {
            match item {
                RelayItem::Discovery { model, .. } => found.push(model.to_string()),
                other => panic!("unexpected item: {other:?}"),
            }
        }
        assert_eq!(found, vec!["gpt-3.5-turbo", "gpt-4"]);
    }

    #[test]
    fn model_title_falls_back_to_the_key() {
        let (tx, _rx) = relay_channel();
        let backend = RemoteSseBackend::new(tx, Arc::new(NullStore), RemoteSseConfig::default());
        assert_eq!(
            backend.model_title(&"gpt-3.5-turbo".into()).unwrap(),
            "Most capable GPT-3.5 model."
        );
        assert_eq!(
            backend.model_title(&"custom-model".into()).unwrap(),
            "custom-model"
        );
    }
}
