//! Session-addressed push registry.
//!
//! Implements the [`PushChannel`] port over an in-process routing table:
//! the (out-of-scope) WebSocket layer binds each live client connection
//! under its channel id and forwards the received events to the socket.
//!
//! Delivery is fire-and-forget. An emit to a channel nobody bound (the
//! student navigated away, or never opened the socket) is dropped with a
//! log line; events are never queued for later delivery across reconnects.
//! The durable conversation turn is the catch-up source.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use vigil_application::PushChannel;
use vigil_domain::ChannelId;

/// One event delivered to a bound connection.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    pub event: String,
    pub payload: Value,
}

#[derive(Default)]
pub struct SessionPushRegistry {
    routes: RwLock<HashMap<ChannelId, mpsc::UnboundedSender<PushEvent>>>,
}

impl SessionPushRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection under `channel`, replacing any previous binding.
    ///
    /// The returned receiver yields every event emitted to the channel
    /// while the binding lives.
    pub fn bind(&self, channel: ChannelId) -> mpsc::UnboundedReceiver<PushEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        routes.insert(channel, tx);
        rx
    }

    /// Remove the binding for `channel`, if any.
    pub fn unbind(&self, channel: &ChannelId) {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        if routes.remove(channel).is_some() {
            debug!("push: unbound channel {channel}");
        }
    }
}

impl PushChannel for SessionPushRegistry {
    fn emit(&self, event: &str, payload: Value, target: &ChannelId) {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        match routes.get(target) {
            Some(tx) => {
                if tx
                    .send(PushEvent {
                        event: event.to_string(),
                        payload,
                    })
                    .is_err()
                {
                    debug!("push: channel {target} receiver gone, dropping '{event}'");
                }
            }
            None => {
                debug!("push: no live connection for channel {target}, dropping '{event}'");
            }
        }
    }
}
