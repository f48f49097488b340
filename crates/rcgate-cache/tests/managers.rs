use async_trait::async_trait;
use rcgate_cache::{
    ChangePublisher, ChangeSink, DataManager, Delta, DeltaError, FetchError, MapChange,
    MapDataManager, MapSource, ObjectChange, ObjectDataManager, ObjectSource, Outbound,
    PublisherConfig, StateRegistry,
};
use rcgate_client::RcuListener;
use rcgate_core::{ChangeEvent, RcuEvent, RcuEventType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingSink {
    changes: Mutex<Vec<ChangeEvent>>,
}

impl RecordingSink {
    fn take(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut *self.changes.lock().unwrap())
    }
}

impl ChangeSink for RecordingSink {
    fn publish(&self, change: ChangeEvent) {
        self.changes.lock().unwrap().push(change);
    }
}

fn event(kind: RcuEventType, uri: &str, data: Value) -> RcuEvent {
    RcuEvent {
        event_type: kind,
        uri: uri.to_string(),
        data,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Account {
    name: String,
    /// Changes often; not part of the view.
    last_seen: u64,
}

struct AccountSource {
    pattern: Regex,
    initial: Result<Option<Account>, String>,
}

impl AccountSource {
    fn new(initial: Result<Option<Account>, String>) -> Self {
        Self {
            pattern: Regex::new(r"^/account/v1/me$").unwrap(),
            initial,
        }
    }
}

#[async_trait]
impl ObjectSource for AccountSource {
    type State = Account;
    type View = Option<String>;

    fn id(&self) -> &str {
        "account"
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    async fn fetch_initial_state(&self) -> Result<Option<Account>, FetchError> {
        self.initial.clone().map_err(FetchError::Other)
    }

    fn apply_delta(
        &self,
        _current: Option<&Account>,
        delta: &Delta<'_>,
    ) -> Result<ObjectChange<Account>, DeltaError> {
        Ok(match delta.kind {
            RcuEventType::Delete => ObjectChange::Clear,
            _ => ObjectChange::Set(delta.parse()?),
        })
    }

    fn compute_view(&self, state: Option<&Account>) -> Option<String> {
        state.map(|account| account.name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Session {
    phase: String,
    pid: u32,
}

struct SessionSource {
    pattern: Regex,
}

impl SessionSource {
    fn new() -> Self {
        Self {
            pattern: Regex::new(r"^/product-session/v1/sessions/([\w-]{0,50})$").unwrap(),
        }
    }
}

#[async_trait]
impl MapSource for SessionSource {
    type Key = String;
    type Value = Session;
    type ValueView = String;

    fn id(&self) -> &str {
        "sessions"
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    async fn fetch_initial_state(&self) -> Result<HashMap<String, Session>, FetchError> {
        Ok(HashMap::from([(
            "seed".to_string(),
            Session {
                phase: "Idle".into(),
                pid: 1,
            },
        )]))
    }

    fn apply_delta(&self, delta: &Delta<'_>) -> Result<MapChange<String, Session>, DeltaError> {
        let key = delta.capture(1)?.to_string();
        Ok(match delta.kind {
            RcuEventType::Delete => MapChange::Remove(key),
            _ => MapChange::Put(key, delta.parse()?),
        })
    }

    fn compute_value_view(&self, _key: &String, value: &Session) -> String {
        value.phase.clone()
    }
}

fn account(name: &str, last_seen: u64) -> Account {
    Account {
        name: name.into(),
        last_seen,
    }
}

#[test]
fn equal_state_publishes_once() {
    let sink = Arc::new(RecordingSink::default());
    let manager = ObjectDataManager::publishing(AccountSource::new(Ok(None)), sink.clone());

    assert!(manager.set_state(Some(account("ana", 1))));
    assert!(!manager.set_state(Some(account("ana", 1))));

    let changes = sink.take();
    assert_eq!(changes.len(), 1);
    assert_eq!(
        changes[0],
        ChangeEvent::ViewUpdated {
            source: "account".into(),
            view: json!("ana"),
        }
    );
}

#[test]
fn state_change_with_same_view_is_not_published() {
    let sink = Arc::new(RecordingSink::default());
    let manager = ObjectDataManager::publishing(AccountSource::new(Ok(None)), sink.clone());

    manager.set_state(Some(account("ana", 1)));
    sink.take();
    assert!(manager.set_state(Some(account("ana", 2))));
    assert_eq!(manager.state().map(|a| a.last_seen), Some(2));
    assert!(sink.take().is_empty());

    manager.set_state(None);
    assert_eq!(
        sink.take(),
        vec![ChangeEvent::ViewUpdated {
            source: "account".into(),
            view: Value::Null,
        }]
    );
}

#[test]
fn object_manager_applies_matching_events() {
    let manager = ObjectDataManager::new(AccountSource::new(Ok(None)));

    let unrelated = event(RcuEventType::Update, "/account/v1/other", json!({}));
    assert!(!manager.on_event(&unrelated).unwrap());

    let update = event(
        RcuEventType::Update,
        "/account/v1/me",
        json!({"name": "bo", "last_seen": 5}),
    );
    assert!(manager.on_event(&update).unwrap());
    assert_eq!(manager.state(), Some(account("bo", 5)));

    let malformed = event(RcuEventType::Update, "/account/v1/me", json!({"name": 3}));
    assert!(matches!(manager.on_event(&malformed), Err(DeltaError::Decode(_))));
    assert_eq!(manager.state(), Some(account("bo", 5)));

    let delete = event(RcuEventType::Delete, "/account/v1/me", Value::Null);
    assert!(manager.on_event(&delete).unwrap());
    assert_eq!(manager.state(), None);
}

#[test]
fn map_manager_publishes_per_key() {
    let sink = Arc::new(RecordingSink::default());
    let manager = MapDataManager::publishing(SessionSource::new(), sink.clone());

    let create = event(
        RcuEventType::Create,
        "/product-session/v1/sessions/abc123",
        json!({"phase": "Idle", "pid": 10}),
    );
    assert!(manager.on_event(&create).unwrap());
    // Same phase, different pid: state changes, view does not.
    let bump = event(
        RcuEventType::Update,
        "/product-session/v1/sessions/abc123",
        json!({"phase": "Idle", "pid": 11}),
    );
    assert!(manager.on_event(&bump).unwrap());
    assert_eq!(manager.get(&"abc123".to_string()).map(|s| s.pid), Some(11));

    let delete = event(
        RcuEventType::Delete,
        "/product-session/v1/sessions/abc123",
        Value::Null,
    );
    assert!(manager.on_event(&delete).unwrap());
    assert!(manager.is_empty());

    assert_eq!(
        sink.take(),
        vec![
            ChangeEvent::KeyUpdated {
                source: "sessions".into(),
                key: "abc123".into(),
                view: Some(json!("Idle")),
            },
            ChangeEvent::KeyUpdated {
                source: "sessions".into(),
                key: "abc123".into(),
                view: None,
            },
        ]
    );
}

#[test]
fn map_replacement_is_skipped_when_equal() {
    let sink = Arc::new(RecordingSink::default());
    let manager = MapDataManager::publishing(SessionSource::new(), sink.clone());
    let state = HashMap::from([(
        "a".to_string(),
        Session {
            phase: "Running".into(),
            pid: 3,
        },
    )]);

    assert!(manager.set_state(state.clone()));
    assert!(!manager.set_state(state));
    assert_eq!(
        sink.take(),
        vec![ChangeEvent::ViewUpdated {
            source: "sessions".into(),
            view: json!({"a": "Running"}),
        }]
    );
    assert_eq!(manager.view(), json!({"a": "Running"}));
}

fn session(phase: &str, pid: u32) -> Session {
    Session {
        phase: phase.into(),
        pid,
    }
}

#[test]
fn map_replacement_drops_stale_keys() {
    let sink = Arc::new(RecordingSink::default());
    let manager = MapDataManager::publishing(SessionSource::new(), sink.clone());
    manager.set_state(HashMap::from([
        ("a".to_string(), session("Idle", 1)),
        ("b".to_string(), session("Idle", 2)),
    ]));
    sink.take();

    assert!(manager.set_state(HashMap::from([
        ("b".to_string(), session("Running", 2)),
        ("c".to_string(), session("Idle", 3)),
    ])));
    assert_eq!(manager.view(), json!({"b": "Running", "c": "Idle"}));
    assert_eq!(
        sink.take(),
        vec![ChangeEvent::ViewUpdated {
            source: "sessions".into(),
            view: json!({"b": "Running", "c": "Idle"}),
        }]
    );
}

#[test]
fn shared_key_stays_visible_during_replacement() {
    let manager = Arc::new(MapDataManager::new(SessionSource::new()));
    let first = HashMap::from([
        ("shared".to_string(), session("Idle", 1)),
        ("a".to_string(), session("Idle", 1)),
    ]);
    let second = HashMap::from([
        ("shared".to_string(), session("Running", 2)),
        ("b".to_string(), session("Running", 2)),
    ]);
    manager.set_state(first.clone());

    let writer = {
        let manager = manager.clone();
        std::thread::spawn(move || {
            for round in 0..2000 {
                let next = if round % 2 == 0 { &second } else { &first };
                manager.set_state(next.clone());
            }
        })
    };
    let key = "shared".to_string();
    while !writer.is_finished() {
        assert!(manager.get(&key).is_some(), "shared key vanished mid-replace");
    }
    writer.join().unwrap();
}

#[tokio::test]
async fn events_route_only_to_matching_manager() {
    let registry = StateRegistry::new();
    let sessions = Arc::new(MapDataManager::new(SessionSource::new()));
    let accounts = Arc::new(ObjectDataManager::new(AccountSource::new(Ok(None))));
    assert!(registry.register(sessions.clone()));
    assert!(registry.register(accounts.clone()));

    let create = Arc::new(event(
        RcuEventType::Create,
        "/product-session/v1/sessions/abc123",
        json!({"phase": "Idle", "pid": 10}),
    ));
    registry.on_message(create).await;

    assert_eq!(sessions.len(), 1);
    assert_eq!(accounts.state(), None);
    assert_eq!(registry.view("sessions"), Some(json!({"abc123": "Idle"})));
}

#[tokio::test]
async fn failed_fetch_does_not_block_other_managers() {
    let registry = StateRegistry::new();
    let sessions = Arc::new(MapDataManager::new(SessionSource::new()));
    registry.register(Arc::new(ObjectDataManager::new(AccountSource::new(Err(
        "boom".into(),
    )))));
    registry.register(sessions.clone());

    registry.on_connect().await;
    assert_eq!(registry.setup_all().await, 1);
    assert_eq!(sessions.len(), 1);

    registry.on_disconnect().await;
    assert!(sessions.is_empty());
}

#[test]
fn duplicate_ids_are_ignored() {
    let registry = StateRegistry::new();
    assert!(registry.register(Arc::new(MapDataManager::new(SessionSource::new()))));
    assert!(!registry.register(Arc::new(MapDataManager::new(SessionSource::new()))));
    assert_eq!(registry.ids(), vec!["sessions".to_string()]);

    registry.shutdown();
    assert!(registry.is_empty());
    assert!(registry.get("sessions").is_none());
}

#[tokio::test]
async fn publishing_manager_reaches_attached_session() {
    let publisher = ChangePublisher::spawn(PublisherConfig::default());
    let mut session = publisher.attach();
    let manager = ObjectDataManager::publishing(AccountSource::new(Ok(None)), publisher.clone());

    manager.set_state(Some(account("ana", 1)));

    let frame = tokio::time::timeout(Duration::from_secs(2), session.recv())
        .await
        .unwrap()
        .unwrap();
    let Outbound::Text(text) = frame else {
        panic!("expected a text frame, got {frame:?}");
    };
    let message: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        message,
        json!({"source": "account", "dataType": "StateUpdate", "data": {"state": "ana"}})
    );
}
