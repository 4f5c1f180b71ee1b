//! Pass-through backend for manual copy/paste workflows.
//!
//! No AI call happens here: the student pastes the remote chat's answer
//! themselves. `send_prompt` only synthesizes the terminal fragment that
//! closes the turn, leaving the answer text to a later manual action.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, warn};
use vigil_application::{ChatBackend, RelaySender};
use vigil_domain::{AnswerFragment, BackendDescriptor, ModelKey, PromptRequest, RelayItem};

/// Backend key of the pass-through adapter.
pub const COPY_PASTE_KEY: &str = "COPYPASTE";

/// The single sentinel model the adapter reports.
pub const COPY_PASTE_MODEL: &str = "DFLT";

pub struct CopyPasteBackend {
    descriptor: BackendDescriptor,
    relay: RelaySender,
    connected: AtomicBool,
}

impl CopyPasteBackend {
    pub fn new(relay: RelaySender) -> Self {
        Self {
            descriptor: BackendDescriptor {
                key: COPY_PASTE_KEY.into(),
                display_name: "Simple prompt-answer copy/paste service".to_string(),
                passthrough: true,
                private_key_required: false,
            },
            relay,
            connected: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ChatBackend for CopyPasteBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn model_title(&self, _model: &ModelKey) -> Option<String> {
        None
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn request_available_models(&self) {
        if !self.is_connected() {
            warn!("copy/paste: cannot list models, not connected");
            return;
        }
        let _ = self.relay.send(RelayItem::Discovery {
            backend: COPY_PASTE_KEY.into(),
            model: COPY_PASTE_MODEL.into(),
        });
    }

    async fn send_prompt(&self, request: PromptRequest) {
        if !self.is_connected() {
            warn!("copy/paste: cannot process prompt, not connected");
            return;
        }
        if request.model.as_str() != COPY_PASTE_MODEL {
            debug!("copy/paste: unsupported model {}, ignoring", request.model);
            return;
        }
        // The answer text will be pasted manually; only close the turn.
        let _ = self.relay.send(RelayItem::Answer(AnswerFragment::terminal(
            request.tag,
            COPY_PASTE_KEY,
            COPY_PASTE_MODEL,
        )));
    }
}
