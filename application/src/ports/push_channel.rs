//! Push channel port
//!
//! Fire-and-forget delivery of events to one live client connection,
//! addressed by channel id. There is no delivery acknowledgement and no
//! queuing across reconnects: a push to an unbound channel is dropped by
//! the implementation (logged), and the durable conversation turn remains
//! the source of truth for catch-up reads.
//!
//! The method is intentionally synchronous and non-fallible so that the
//! relay loop cannot be disrupted by a slow or missing client.

use serde_json::Value;
use vigil_domain::ChannelId;

/// Port for pushing events to client sessions.
pub trait PushChannel: Send + Sync {
    /// Emit `payload` under `event` to the connection bound to `target`.
    fn emit(&self, event: &str, payload: Value, target: &ChannelId);
}

/// No-op implementation for tests and headless runs.
pub struct NoPushChannel;

impl PushChannel for NoPushChannel {
    fn emit(&self, _event: &str, _payload: Value, _target: &ChannelId) {}
}
