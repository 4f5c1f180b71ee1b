//! Prompt dispatch requests and conversation scope.

use serde::{Deserialize, Serialize};

use super::fragment::CorrelationTag;
use super::keys::ModelKey;

/// Locates all turns of one student's conversation with one chat.
///
/// Used by multi-turn backends to rebuild prior context from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnScope {
    pub exam_id: String,
    pub student_username: String,
    pub question_idx: usize,
    pub conversation_id: String,
}

/// One prior prompt/answer pair, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorTurn {
    pub prompt: String,
    pub answer: Option<String>,
    pub achieved: bool,
}

/// A canonical prompt request handed to a backend.
///
/// Built by the dispatch router, immutable afterwards. The backend owns it
/// for the lifetime of the streaming call.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub model: ModelKey,
    pub prompt: String,
    pub tag: CorrelationTag,
    /// Caller-supplied API credential, decrypted at use. Backends never use
    /// a credential of their own.
    pub private_key: Option<String>,
    /// Overrides the backend's default system prompt (Socratic mode).
    pub system_prompt: Option<String>,
    pub scope: TurnScope,
}
