//! Chat backend port
//!
//! Defines the uniform capability surface over one pluggable AI service.
//! Each variant (pass-through, local model, remote streaming) is a separate
//! type implementing this trait; the service stores them as trait objects
//! keyed by backend key.
//!
//! Backends never answer synchronously: results flow as [`RelayItem`]s
//! through the correlation queue handed to the adapter at construction.

use async_trait::async_trait;
use vigil_domain::{BackendDescriptor, ModelKey, PromptRequest};

/// One pluggable chat backend.
///
/// # Contract
///
/// - `connect` is idempotent and best-effort: it must not fail loudly.
///   A failed connection is observable only through `is_connected`
///   remaining false.
/// - `request_available_models` pushes one discovery item per known model.
///   When the backend is not connected it is a logged no-op.
/// - `send_prompt` is fire-and-forget: it must return without waiting on
///   backend I/O. Once work is accepted, the correlation is always closed
///   by a terminal fragment, even when the backend fails mid-stream;
///   callers never wait indefinitely.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Static capability description of this backend.
    fn descriptor(&self) -> &BackendDescriptor;

    /// Human-readable title for a model key, if this backend knows one.
    fn model_title(&self, model: &ModelKey) -> Option<String>;

    /// Current connection health.
    fn is_connected(&self) -> bool;

    /// Establish the backend connection (idempotent, best-effort).
    async fn connect(&self);

    /// Tear the connection down.
    async fn disconnect(&self);

    /// Push one discovery item per model this backend offers.
    async fn request_available_models(&self);

    /// Dispatch a prompt. Fragments arrive asynchronously on the queue.
    async fn send_prompt(&self, request: PromptRequest);
}
