//! Application layer for vigil
//!
//! This crate contains the chat routing service, the answer relay worker,
//! the correlation queue, and the port definitions infrastructure adapters
//! implement. It depends only on the domain layer.

pub mod ports;
pub mod queue;
pub mod relay;
pub mod service;
pub mod use_cases;

// Re-export commonly used types
pub use ports::{
    action_store::{ActionStore, StoreError},
    chat_backend::ChatBackend,
    push_channel::{NoPushChannel, PushChannel},
    secrets::{SecretCipher, SecretError},
};
pub use queue::{RelayReceiver, RelaySender, relay_channel};
pub use relay::RelayWorker;
pub use service::{ChatAiService, DispatchError, ServiceError};
pub use use_cases::ask_chat::{AskChatError, dispatch_exam_prompt, dispatch_socrat_prompt};
