//! Chat backend adapters.
//!
//! Each adapter implements the [`ChatBackend`] port over one AI service:
//!
//! - [`copy_paste`]: pass-through for manual copy/paste workflows
//! - [`local_model`]: persistent WebSocket stream to a local inference
//!   service
//! - [`remote_sse`]: per-call SSE streaming against a remote
//!   chat-completions API, on a bounded worker pool
//!
//! Adapters push every result into the correlation queue; none of them
//! answers a caller synchronously.
//!
//! [`ChatBackend`]: vigil_application::ChatBackend

pub mod copy_paste;
pub mod local_model;
pub mod pool;
pub mod remote_sse;
