use crate::DataManager;
use async_trait::async_trait;
use futures_util::future::join_all;
use rcgate_client::RcuListener;
use rcgate_core::RcuEvent;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The set of data managers driven by one managed-client connection.
///
/// Managers are keyed by their stable id. Register the registry as a
/// listener on the client and it sets up every manager on connect, routes
/// update events to them and resets them on disconnect.
#[derive(Default)]
pub struct StateRegistry {
    managers: RwLock<BTreeMap<String, Arc<dyn DataManager>>>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<dyn DataManager>>> {
        self.managers.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<dyn DataManager>>> {
        self.managers.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn snapshot(&self) -> Vec<Arc<dyn DataManager>> {
        self.read().values().cloned().collect()
    }

    /// Add a manager. A second manager with the same id is ignored.
    pub fn register(&self, manager: Arc<dyn DataManager>) -> bool {
        let id = manager.id().to_string();
        let mut managers = self.write();
        if managers.contains_key(&id) {
            tracing::warn!(manager = %id, "manager already registered, ignoring");
            return false;
        }
        tracing::debug!(manager = %id, "registered manager");
        managers.insert(id, manager);
        true
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn DataManager>> {
        self.read().get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Current external view of one manager.
    pub fn view(&self, id: &str) -> Option<Value> {
        self.get(id).map(|manager| manager.view_json())
    }

    /// Fetch every manager's initial state concurrently. Returns how many
    /// succeeded; failures are logged.
    pub async fn setup_all(&self) -> usize {
        let managers = self.snapshot();
        let results = join_all(managers.iter().map(|manager| async move {
            let result = manager.setup_internal_state().await;
            if let Err(e) = &result {
                tracing::error!(manager = manager.id(), "initial state fetch failed: {e}");
            }
            result.is_ok()
        }))
        .await;
        let ready = results.into_iter().filter(|ok| *ok).count();
        tracing::info!(ready, total = managers.len(), "managers set up");
        ready
    }

    /// Hand `event` to every manager. Returns how many applied it.
    pub fn dispatch(&self, event: &RcuEvent) -> usize {
        let mut applied = 0;
        for manager in self.snapshot() {
            match manager.on_event(event) {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    manager = manager.id(),
                    uri = %event.uri,
                    "failed to apply event: {e}"
                ),
            }
        }
        if applied == 0 {
            tracing::trace!(uri = %event.uri, "event matched no manager");
        }
        applied
    }

    pub fn reset_all(&self) {
        for manager in self.snapshot() {
            manager.reset();
        }
    }

    /// Reset and forget every manager.
    pub fn shutdown(&self) {
        let managers = std::mem::take(&mut *self.write());
        for manager in managers.values() {
            manager.reset();
        }
        tracing::info!(count = managers.len(), "registry shut down");
    }
}

#[async_trait]
impl RcuListener for StateRegistry {
    async fn on_connect(&self) {
        self.setup_all().await;
    }

    async fn on_message(&self, event: Arc<RcuEvent>) {
        self.dispatch(&event);
    }

    async fn on_disconnect(&self) {
        self.reset_all();
    }
}
