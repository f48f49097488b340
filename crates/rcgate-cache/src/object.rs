//! Manager for a single mirrored value.

use crate::{ChangeSink, DataManager, Delta, DeltaError, FetchError, ObjectChange, ObjectSource};
use async_trait::async_trait;
use rcgate_core::{ChangeEvent, RcuEvent};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

struct Cell<S: ObjectSource> {
    state: Option<S::State>,
    /// Last view handed to the sink.
    published: Option<S::View>,
}

/// Mirrors one optional value.
///
/// Built with [`ObjectDataManager::publishing`], every state change whose
/// view differs from the previously published view is sent to the sink.
pub struct ObjectDataManager<S: ObjectSource> {
    source: S,
    cell: Mutex<Cell<S>>,
    sink: Option<Arc<dyn ChangeSink>>,
}

impl<S: ObjectSource> ObjectDataManager<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cell: Mutex::new(Cell {
                state: None,
                published: None,
            }),
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

    fn lock(&self) -> MutexGuard<'_, Cell<S>> {
        self.cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> Option<S::State> {
        self.lock().state.clone()
    }

    pub fn view(&self) -> S::View {
        self.source.compute_view(self.lock().state.as_ref())
    }

    /// Replace the state. Equal values are a no-op; returns whether the
    /// state changed.
    pub fn set_state(&self, state: Option<S::State>) -> bool {
        let mut cell = self.lock();
        if cell.state == state {
            return false;
        }
        cell.state = state;
        self.publish_if_changed(&mut cell);
        true
    }

    fn publish_if_changed(&self, cell: &mut Cell<S>) {
        let Some(sink) = &self.sink else {
            return;
        };
        let view = self.source.compute_view(cell.state.as_ref());
        if cell.published.as_ref() == Some(&view) {
            return;
        }
        match serde_json::to_value(&view) {
            Ok(json) => sink.publish(ChangeEvent::ViewUpdated {
                source: self.source.id().to_string(),
                view: json,
            }),
            Err(e) => tracing::warn!(manager = self.source.id(), "unserializable view: {e}"),
        }
        cell.published = Some(view);
    }
}

#[async_trait]
impl<S: ObjectSource> DataManager for ObjectDataManager<S> {
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
        let change = {
            let cell = self.lock();
            self.source.apply_delta(cell.state.as_ref(), &delta)?
        };
        match change {
            ObjectChange::Set(state) => {
                self.set_state(Some(state));
            }
            ObjectChange::Clear => {
                self.set_state(None);
            }
            ObjectChange::Ignore => {}
        }
        Ok(true)
    }

    fn reset(&self) {
        self.set_state(None);
    }

    fn view_json(&self) -> Value {
        serde_json::to_value(self.view()).unwrap_or(Value::Null)
    }
}
