//! Recorded student actions.
//!
//! Every interaction of a student with the composition view is persisted as
//! an [`ActionRecord`]: a timestamped envelope around one [`ActionDetail`]
//! variant. The variant set is closed: handlers dispatch by exhaustive
//! pattern matching, and the serialized form keeps the `action_type`
//! discriminator used by the stored trace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::keys::{ActionId, BackendKey, ModelKey};

/// Envelope shared by all recorded actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Assigned by the store on insert.
    pub id: Option<ActionId>,
    pub timestamp: DateTime<Utc>,
    pub exam_id: String,
    pub student_username: String,
    #[serde(flatten)]
    pub detail: ActionDetail,
}

impl ActionRecord {
    pub fn new(
        exam_id: impl Into<String>,
        student_username: impl Into<String>,
        detail: ActionDetail,
    ) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            exam_id: exam_id.into(),
            student_username: student_username.into(),
            detail,
        }
    }

    /// The chat payload, when this record is a chat prompt.
    pub fn as_chat(&self) -> Option<&AskChatAi> {
        match &self.detail {
            ActionDetail::AskChatAi(ask) => Some(ask),
            _ => None,
        }
    }
}

/// The closed set of action kinds, tagged the way traces store them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action_type")]
pub enum ActionDetail {
    StartExam,
    ChangedQuestion {
        question_idx: usize,
        next_question_idx: usize,
    },
    LostFocus {
        question_idx: Option<usize>,
        return_timestamp: DateTime<Utc>,
        duration_seconds: u64,
        page_hidden: bool,
    },
    WriteInitialAnswer {
        question_idx: usize,
        text: String,
    },
    AskChatAi(AskChatAi),
    AddExternalResource {
        question_idx: usize,
        title: String,
        description: String,
        rsc_type: Option<String>,
        removed: Option<DateTime<Utc>>,
    },
    WriteFinalAnswer {
        question_idx: usize,
        text: String,
    },
    SubmitExam,
}

/// Outcome of applying one answer fragment to a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// The fragment mutated the turn.
    Applied,
    /// Finality-only fragment on an already-final turn: idempotent no-op.
    AlreadyFinal,
    /// A delta arrived after the turn was finalized. The turn is never
    /// reopened; callers should log and drop the delta.
    RejectedAfterFinal,
}

/// A chat prompt and its accumulated answer, the durable conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskChatAi {
    pub question_idx: usize,
    /// Id of the chat this turn belongs to (a catalog choice id).
    pub chat_id: String,
    pub backend: BackendKey,
    pub model: ModelKey,
    /// Student-typed prompt. Absent for system-seeded turns.
    pub prompt: Option<String>,
    /// System-seeded prompt (Socratic questionnaire first turn).
    pub hidden_prompt: Option<String>,
    /// Ordered concatenation of all deltas received so far.
    pub answer: Option<String>,
    /// True once the terminal fragment has been processed. Monotonic.
    pub achieved: bool,
}

impl AskChatAi {
    pub fn new(
        question_idx: usize,
        chat_id: impl Into<String>,
        backend: impl Into<BackendKey>,
        model: impl Into<ModelKey>,
        prompt: Option<String>,
    ) -> Self {
        Self {
            question_idx,
            chat_id: chat_id.into(),
            backend: backend.into(),
            model: model.into(),
            prompt,
            hidden_prompt: None,
            answer: None,
            achieved: false,
        }
    }

    pub fn with_hidden_prompt(mut self, hidden_prompt: impl Into<String>) -> Self {
        self.hidden_prompt = Some(hidden_prompt.into());
        self
    }

    /// The text actually dispatched: the explicit prompt when present and
    /// non-empty, otherwise the hidden one.
    pub fn effective_prompt(&self) -> Option<&str> {
        self.prompt
            .as_deref()
            .filter(|p| !p.is_empty())
            .or(self.hidden_prompt.as_deref().filter(|p| !p.is_empty()))
    }

    /// Apply one answer fragment to this turn.
    ///
    /// Invariants:
    /// - the first delta replaces an absent answer, later deltas are
    ///   concatenated in arrival order;
    /// - `achieved` flips to true at most once and never resets;
    /// - deltas arriving after finality are rejected, not applied.
    pub fn apply_answer(&mut self, delta: Option<&str>, ended: bool) -> FragmentOutcome {
        if self.achieved {
            if delta.is_some() {
                return FragmentOutcome::RejectedAfterFinal;
            }
            return FragmentOutcome::AlreadyFinal;
        }
        match delta {
            Some(text) => {
                match &mut self.answer {
                    Some(answer) => answer.push_str(text),
                    None => self.answer = Some(text.to_string()),
                }
                self.achieved = ended;
            }
            None => {
                if ended {
                    self.achieved = true;
                }
            }
        }
        FragmentOutcome::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn() -> AskChatAi {
        AskChatAi::new(
            0,
            "OPENAI.gpt-3.5-turbo",
            "OPENAI",
            "gpt-3.5-turbo",
            Some("What is a monad?".to_string()),
        )
    }

    #[test]
    fn answer_is_ordered_concatenation_of_deltas() {
        let mut t = turn();
        assert_eq!(t.apply_answer(Some("Hi"), false), FragmentOutcome::Applied);
        assert_eq!(
            t.apply_answer(Some(" there"), false),
            FragmentOutcome::Applied
        );
        assert_eq!(t.apply_answer(None, true), FragmentOutcome::Applied);
        assert_eq!(t.answer.as_deref(), Some("Hi there"));
        assert!(t.achieved);
    }

    #[test]
    fn first_delta_replaces_absent_answer() {
        let mut t = turn();
        t.apply_answer(Some("A"), false);
        assert_eq!(t.answer.as_deref(), Some("A"));
    }

    #[test]
    fn single_fragment_may_be_first_and_final() {
        let mut t = turn();
        t.apply_answer(Some("done"), true);
        assert_eq!(t.answer.as_deref(), Some("done"));
        assert!(t.achieved);
    }

    #[test]
    fn finality_only_fragment_keeps_text() {
        let mut t = turn();
        t.apply_answer(Some("partial"), false);
        t.apply_answer(None, true);
        assert_eq!(t.answer.as_deref(), Some("partial"));
        assert!(t.achieved);
    }

    #[test]
    fn finality_is_idempotent() {
        let mut t = turn();
        t.apply_answer(Some("x"), true);
        assert_eq!(t.apply_answer(None, true), FragmentOutcome::AlreadyFinal);
        assert_eq!(t.answer.as_deref(), Some("x"));
        assert!(t.achieved);
    }

    #[test]
    fn delta_after_finality_is_rejected() {
        let mut t = turn();
        t.apply_answer(Some("x"), true);
        assert_eq!(
            t.apply_answer(Some("late"), false),
            FragmentOutcome::RejectedAfterFinal
        );
        // The turn never reopens and the text stays untouched.
        assert_eq!(t.answer.as_deref(), Some("x"));
        assert!(t.achieved);
    }

    #[test]
    fn effective_prompt_prefers_explicit_text() {
        let mut t = turn();
        t.hidden_prompt = Some("seed".to_string());
        assert_eq!(t.effective_prompt(), Some("What is a monad?"));

        t.prompt = Some(String::new());
        assert_eq!(t.effective_prompt(), Some("seed"));

        t.hidden_prompt = None;
        assert_eq!(t.effective_prompt(), None);
    }

    #[test]
    fn action_serde_keeps_action_type_tag() {
        let record = ActionRecord::new("exam-1", "alice", ActionDetail::AskChatAi(turn()));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["action_type"], "AskChatAi");
        assert_eq!(json["exam_id"], "exam-1");

        let back: ActionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn start_and_submit_round_trip() {
        for detail in [ActionDetail::StartExam, ActionDetail::SubmitExam] {
            let record = ActionRecord::new("exam-1", "bob", detail);
            let json = serde_json::to_string(&record).unwrap();
            let back: ActionRecord = serde_json::from_str(&json).unwrap();
            assert_eq!(back, record);
        }
    }
}
