//! Backend metadata and the discovered-model catalog.

use serde::{Deserialize, Serialize};

use super::keys::{BackendKey, ModelKey};

/// Static capability description of one backend implementation.
///
/// Defined by the adapter, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    pub key: BackendKey,
    pub display_name: String,
    /// True for the manual copy/paste workflow: no real AI call happens and
    /// clients must not prompt for an API key.
    pub passthrough: bool,
    /// True when `send_prompt` requires a caller-supplied credential.
    pub private_key_required: bool,
}

/// A (backend, model) pair reported during model discovery.
///
/// The whole catalog is cleared and repopulated on every subsystem start;
/// there are no partial updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredModel {
    pub backend: BackendKey,
    pub model: ModelKey,
}

/// One row of the externally visible chat catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatChoice {
    /// Stable choice id: `<backend_key>.<model_key>`.
    pub id: String,
    pub backend: BackendKey,
    pub model: ModelKey,
    pub title: String,
    pub passthrough: bool,
    pub private_key_required: bool,
}

impl ChatChoice {
    /// The catalog id joining a backend and a model.
    pub fn choice_id(backend: &BackendKey, model: &ModelKey) -> String {
        format!("{backend}.{model}")
    }
}

/// A catalog row filtered down for the student-facing composition view.
///
/// Carries the passthrough decoration so clients can suppress key prompts,
/// but not the admin-only key-requirement detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentChatChoice {
    pub id: String,
    pub backend: BackendKey,
    pub model: ModelKey,
    pub title: String,
    pub passthrough: bool,
}
