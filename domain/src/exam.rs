//! Slices of the exam and questionnaire documents.
//!
//! Exam and questionnaire CRUD lives outside this subsystem; these types
//! carry only what the chat catalog transforms and the dispatch glue read.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-chat settings an exam author configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamChatSettings {
    /// Author-supplied API key, stored encrypted, decrypted at use.
    pub api_key: Option<String>,
}

/// The exam fields the chat subsystem consults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exam {
    pub id: String,
    /// Catalog choice id → settings for every chat the author pre-selected.
    pub selected_chats: HashMap<String, ExamChatSettings>,
}

/// One question of a Socratic questionnaire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocratQuestion {
    pub question: String,
    pub answer: String,
    /// Seeds the hidden first turn of the guided conversation.
    pub init_prompt: Option<String>,
}

/// The single chat a questionnaire pins for all of its questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocratChatSelection {
    /// Catalog choice id.
    pub id: String,
    /// Author-supplied API key, stored encrypted, decrypted at use.
    pub api_key: Option<String>,
}

/// The questionnaire fields the chat subsystem consults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocratQuestionnaire {
    pub id: String,
    pub selected_chat: Option<SocratChatSelection>,
    pub questions: Vec<SocratQuestion>,
}

impl SocratQuestionnaire {
    pub fn question(&self, idx: usize) -> Option<&SocratQuestion> {
        self.questions.get(idx)
    }
}
