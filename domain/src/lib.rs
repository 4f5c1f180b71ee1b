//! Domain layer for vigil
//!
//! This crate contains the core business entities and value objects of the
//! exam-proctoring chat subsystem. It has no dependencies on infrastructure
//! or transport concerns.
//!
//! # Core Concepts
//!
//! ## Student actions
//!
//! Everything a student does during a composition session is recorded as an
//! [`ActionRecord`]: starting the exam, switching questions, asking a chat
//! AI, pasting an external resource, submitting. The chat-related variant,
//! [`AskChatAi`], is also the durable conversation turn: the prompt plus the
//! answer text accumulated from streamed fragments.
//!
//! ## Fragments and correlation
//!
//! A dispatched prompt produces a stream of [`AnswerFragment`]s, each tied
//! back to its turn by a [`CorrelationTag`]. Fragments and model-discovery
//! results travel through one queue as [`RelayItem`]s.

pub mod action;
pub mod chat;
pub mod exam;

// Re-export commonly used types
pub use action::{ActionDetail, ActionRecord, AskChatAi, FragmentOutcome};
pub use chat::{
    descriptor::{BackendDescriptor, ChatChoice, DiscoveredModel, StudentChatChoice},
    fragment::{AnswerFragment, CorrelationTag, RelayItem},
    keys::{ActionId, BackendKey, ChannelId, ModelKey},
    request::{PriorTurn, PromptRequest, TurnScope},
};
pub use exam::{Exam, ExamChatSettings, SocratChatSelection, SocratQuestion, SocratQuestionnaire};
