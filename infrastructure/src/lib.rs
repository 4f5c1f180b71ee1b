//! Infrastructure layer for vigil
//!
//! This crate contains the concrete chat backend adapters and the
//! implementations of the ports defined in the application layer,
//! including configuration file loading.

pub mod backends;
pub mod config;
pub mod push;
pub mod secrets;
pub mod store;

// Re-export commonly used types
pub use backends::{
    copy_paste::CopyPasteBackend,
    local_model::LocalModelBackend,
    pool::WorkerPool,
    remote_sse::{RemoteSseBackend, RemoteSseConfig},
};
pub use config::{ConfigLoader, FileConfig};
pub use push::registry::{PushEvent, SessionPushRegistry};
pub use secrets::ApiKeyCipher;
pub use store::memory::InMemoryActionStore;
