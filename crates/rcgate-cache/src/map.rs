//! Manager for a mirrored keyed collection.

use crate::{ChangeSink, DataManager, Delta, DeltaError, FetchError, MapChange, MapSource};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rcgate_core::{ChangeEvent, RcuEvent};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Mirrors a key/value table with per-key atomic updates.
///
/// Built with [`MapDataManager::publishing`], a put or remove whose value
/// view changed emits a `KeyUpdated`, and a wholesale replacement whose map
/// view changed emits a `ViewUpdated`.
pub struct MapDataManager<S: MapSource> {
    source: S,
    entries: DashMap<S::Key, S::Value>,
    sink: Option<Arc<dyn ChangeSink>>,
}

impl<S: MapSource> MapDataManager<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            entries: DashMap::new(),
            sink: None,
        }
    }

    pub fn publishing(source: S, sink: Arc<dyn ChangeSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::new(source)
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn get(&self, key: &S::Key) -> Option<S::Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn state(&self) -> HashMap<S::Key, S::Value> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// JSON object of every value view, keyed by the key's display form.
    pub fn view(&self) -> Value {
        self.entries
            .iter()
            .map(|entry| {
                let view = self.source.compute_value_view(entry.key(), entry.value());
                (
                    entry.key().to_string(),
                    serde_json::to_value(view).unwrap_or(Value::Null),
                )
            })
            .collect::<Map<String, Value>>()
            .into()
    }

    /// Insert or replace one value. Returns whether it changed.
    pub fn put(&self, key: S::Key, value: S::Value) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(mut entry) => {
                if entry.get() == &value {
                    return false;
                }
                let old = entry.insert(value);
                self.key_updated(entry.key(), Some(&old), Some(entry.get()));
                true
            }
            Entry::Vacant(entry) => {
                let entry = entry.insert(value);
                self.key_updated(entry.key(), None, Some(entry.value()));
                true
            }
        }
    }

    /// Remove one value. Returns whether it was present.
    pub fn remove(&self, key: &S::Key) -> bool {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let (key, old) = entry.remove_entry();
                self.key_updated(&key, Some(&old), None);
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Replace the whole table. Equal contents are a no-op.
    ///
    /// New entries land before stale ones are dropped, so readers never see
    /// a key that both tables share go missing.
    pub fn set_state(&self, state: HashMap<S::Key, S::Value>) -> bool {
        if self.state() == state {
            return false;
        }
        let before = self.sink.as_ref().map(|_| self.view());
        for (key, value) in &state {
            self.entries.insert(key.clone(), value.clone());
        }
        self.entries.retain(|key, _| state.contains_key(key));

        if let (Some(sink), Some(before)) = (&self.sink, before) {
            let after = self.view();
            if after != before {
                sink.publish(ChangeEvent::ViewUpdated {
                    source: self.source.id().to_string(),
                    view: after,
                });
            }
        }
        true
    }

    pub fn clear(&self) -> bool {
        self.set_state(HashMap::new())
    }

    fn key_updated(&self, key: &S::Key, old: Option<&S::Value>, new: Option<&S::Value>) {
        let Some(sink) = &self.sink else {
            return;
        };
        let old_view = old.map(|v| self.source.compute_value_view(key, v));
        let new_view = new.map(|v| self.source.compute_value_view(key, v));
        if old_view == new_view {
            return;
        }
        let view = match new_view.map(serde_json::to_value).transpose() {
            Ok(view) => view,
            Err(e) => {
                tracing::warn!(manager = self.source.id(), %key, "unserializable view: {e}");
                return;
            }
        };
        sink.publish(ChangeEvent::KeyUpdated {
            source: self.source.id().to_string(),
            key: key.to_string(),
            view,
        });
    }
}

#[async_trait]
impl<S: MapSource> DataManager for MapDataManager<S> {
    fn id(&self) -> &str {
        self.source.id()
    }

    async fn setup_internal_state(&self) -> Result<(), FetchError> {
        let state = self.source.fetch_initial_state().await?;
        self.set_state(state);
        Ok(())
    }

    fn on_event(&self, event: &RcuEvent) -> Result<bool, DeltaError> {
        let Some(delta) = Delta::matching(self.source.pattern(), event) else {
            return Ok(false);
        };
        match self.source.apply_delta(&delta)? {
            MapChange::Put(key, value) => {
                self.put(key, value);
            }
            MapChange::Remove(key) => {
                self.remove(&key);
            }
            MapChange::Replace(state) => {
                self.set_state(state);
            }
            MapChange::Clear => {
                self.clear();
            }
            MapChange::Ignore => {}
        }
        Ok(true)
    }

    fn reset(&self) {
        self.clear();
    }

    fn view_json(&self) -> Value {
        self.view()
    }
}
