//! The correlation queue.
//!
//! A multi-producer/single-consumer channel connecting every backend (and
//! the discovery flow) to the relay worker. Bounded only by memory; FIFO,
//! so fragments of one correlation keep the order their producer emitted
//! them in. Exactly one consumer exists system-wide.

use tokio::sync::mpsc;
use vigil_domain::RelayItem;

pub type RelaySender = mpsc::UnboundedSender<RelayItem>;
pub type RelayReceiver = mpsc::UnboundedReceiver<RelayItem>;

/// Build the queue. The sender side is cloned into every backend; the
/// receiver is owned by the single relay worker.
pub fn relay_channel() -> (RelaySender, RelayReceiver) {
    mpsc::unbounded_channel()
}
