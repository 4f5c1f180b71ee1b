//! Action store port
//!
//! Narrow persistence interface the chat core consumes. The real exam
//! database lives outside this subsystem; infrastructure ships an in-memory
//! reference adapter and deployments substitute their own.

use async_trait::async_trait;
use thiserror::Error;
use vigil_domain::{ActionId, ActionRecord, DiscoveredModel, FragmentOutcome, PriorTurn, TurnScope};

/// Errors surfaced by the action store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage failure: {0}")]
    Backend(String),
}

/// Persistence collaborator of the chat subsystem.
///
/// `apply_answer_fragment` is the single append-or-set entry point for
/// answer text and finality. Only the relay worker may call it once a turn
/// exists (single-writer invariant); readers tolerate eventually-consistent
/// partial answers.
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// Persist a new action and return its assigned id.
    async fn insert_action(&self, action: ActionRecord) -> Result<ActionId, StoreError>;

    /// Apply one answer fragment to the turn keyed by `action_id`.
    async fn apply_answer_fragment(
        &self,
        action_id: &ActionId,
        delta: Option<&str>,
        ended: bool,
    ) -> Result<FragmentOutcome, StoreError>;

    /// All turns of one conversation, oldest first.
    async fn prior_turns(&self, scope: &TurnScope) -> Result<Vec<PriorTurn>, StoreError>;

    /// Drop the whole discovered-model catalog.
    async fn clear_discovered_models(&self) -> Result<(), StoreError>;

    /// Upsert one discovered (backend, model) pair.
    async fn add_discovered_model(&self, model: DiscoveredModel) -> Result<(), StoreError>;

    /// The current catalog, in discovery order.
    async fn discovered_models(&self) -> Result<Vec<DiscoveredModel>, StoreError>;
}
