use crate::{DeltaError, FetchError};
use async_trait::async_trait;
use rcgate_core::RcuEvent;
use serde_json::Value;

/// A data manager with its state type erased, as held by the registry.
#[async_trait]
pub trait DataManager: Send + Sync {
    fn id(&self) -> &str;

    /// Fetch the initial snapshot and install it.
    async fn setup_internal_state(&self) -> Result<(), FetchError>;

    /// Apply `event` if its URI belongs to this manager. Returns whether it
    /// matched.
    fn on_event(&self, event: &RcuEvent) -> Result<bool, DeltaError>;

    /// Drop all state.
    fn reset(&self);

    /// The current external view as JSON.
    fn view_json(&self) -> Value;
}
