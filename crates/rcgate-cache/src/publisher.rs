//! Single-session downstream publisher.
//!
//! Changes go through a bounded queue to one consumer task, which encodes
//! them and hands them to the attached session's own bounded buffer. With no
//! session attached, or with a session too slow to keep up, messages are
//! dropped. Attaching a new session closes the previous one and
//! discards whatever was queued before the switch.

use crate::PublishError;
use rcgate_core::ChangeEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Receives externally visible state changes.
pub trait ChangeSink: Send + Sync {
    /// Must not block.
    fn publish(&self, change: ChangeEvent);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishFormat {
    /// JSON text frames.
    #[default]
    Json,
    /// MessagePack binary frames.
    Msgpack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Bound of the publish queue and of each session's frame buffer.
    pub queue_capacity: usize,
    pub format: PublishFormat,
    /// Manager ids whose changes are never published.
    pub disabled_sources: BTreeSet<String>,
    pub shutdown_grace_ms: u64,
}

impl PublisherConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            format: PublishFormat::Json,
            disabled_sources: BTreeSet::new(),
            shutdown_grace_ms: 1000,
        }
    }
}

/// What the transport should write to the downstream socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Binary(Vec<u8>),
    /// Close with "going away" (1001).
    GoingAway,
}

struct Queued {
    generation: u64,
    change: ChangeEvent,
}

#[derive(Clone)]
struct Session {
    generation: u64,
    tx: mpsc::Sender<Outbound>,
}

struct Shared {
    format: PublishFormat,
    capacity: usize,
    disabled: BTreeSet<String>,
    generation: AtomicU64,
    session: Mutex<Option<Session>>,
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn detach(&self, generation: u64) {
        let mut session = self.session();
        if session.as_ref().is_some_and(|s| s.generation == generation) {
            *session = None;
            tracing::debug!(generation, "downstream session detached");
        }
    }
}

pub struct ChangePublisher {
    shared: Arc<Shared>,
    queue: Mutex<Option<mpsc::Sender<Queued>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    grace: Duration,
}

impl ChangePublisher {
    /// Start the consumer task. Must be called inside a Tokio runtime.
    pub fn spawn(config: PublisherConfig) -> Arc<Self> {
        if !config.disabled_sources.is_empty() {
            tracing::info!(
                sources = ?config.disabled_sources,
                "some sources will not be published"
            );
        }
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let shared = Arc::new(Shared {
            format: config.format,
            capacity,
            disabled: config.disabled_sources.clone(),
            generation: AtomicU64::new(0),
            session: Mutex::new(None),
        });
        let task = tokio::spawn(consume(rx, shared.clone()));
        Arc::new(Self {
            shared,
            queue: Mutex::new(Some(tx)),
            task: Mutex::new(Some(task)),
            grace: config.shutdown_grace(),
        })
    }

    /// Attach a downstream session, replacing and closing any previous one.
    pub fn attach(&self) -> SessionHandle {
        let (tx, rx) = mpsc::channel(self.shared.capacity);
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let previous = self.shared.session().replace(Session { generation, tx });
        if let Some(previous) = previous {
            tracing::info!(
                previous = previous.generation,
                generation,
                "replacing downstream session"
            );
            // A full buffer still closes: the receiver sees the end of the channel.
            let _ = previous.tx.try_send(Outbound::GoingAway);
        }
        SessionHandle {
            generation,
            rx,
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn has_session(&self) -> bool {
        self.shared.session().is_some()
    }

    /// Stop accepting changes, drain the queue for up to the configured grace
    /// and close the attached session.
    pub async fn shutdown(&self) {
        let started = tokio::time::Instant::now();
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(mut task) = task {
            if tokio::time::timeout(self.grace, &mut task).await.is_err() {
                tracing::warn!("publisher queue did not drain in {:?}, aborting", self.grace);
                task.abort();
            }
        }
        if let Some(session) = self.shared.session().take() {
            let _ = session.tx.try_send(Outbound::GoingAway);
        }
        tracing::info!("publisher shut down after {:?}", started.elapsed());
    }
}

impl ChangeSink for ChangePublisher {
    fn publish(&self, change: ChangeEvent) {
        if self.shared.disabled.contains(change.source()) {
            return;
        }
        let queued = Queued {
            generation: self.shared.generation.load(Ordering::Acquire),
            change,
        };
        let queue = self
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let Some(queue) = queue else {
            tracing::debug!("publisher stopped, dropping change");
            return;
        };
        match queue.try_send(queued) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!(source = dropped.change.source(), "publish queue full, dropping change");
            }
            Err(TrySendError::Closed(_)) => tracing::debug!("publish queue closed"),
        }
    }
}

/// The receiving end of an attached session.
///
/// Dropping it detaches the session unless it was already replaced.
pub struct SessionHandle {
    generation: u64,
    rx: mpsc::Receiver<Outbound>,
    shared: std::sync::Weak<Shared>,
}

impl SessionHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Next frame to write. `None` once the publisher dropped the session,
    /// which the transport treats like `GoingAway`.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.rx.recv().await
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.detach(self.generation);
        }
    }
}

fn encode(format: PublishFormat, change: ChangeEvent) -> Result<Outbound, PublishError> {
    let message = change.into_message();
    Ok(match format {
        PublishFormat::Json => Outbound::Text(serde_json::to_string(&message)?),
        PublishFormat::Msgpack => Outbound::Binary(rmp_serde::to_vec_named(&message)?),
    })
}

async fn consume(mut rx: mpsc::Receiver<Queued>, shared: Arc<Shared>) {
    while let Some(queued) = rx.recv().await {
        let Some(session) = shared.session().clone() else {
            tracing::trace!("no downstream session, dropping change");
            continue;
        };
        if queued.generation != session.generation {
            tracing::trace!("change queued for a previous session, dropping");
            continue;
        }
        let source = queued.change.source().to_string();
        let outbound = match encode(shared.format, queued.change) {
            Ok(outbound) => outbound,
            Err(e) => {
                tracing::error!(%source, "failed to encode change: {e}");
                continue;
            }
        };
        match session.tx.try_send(outbound) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    %source,
                    generation = session.generation,
                    "downstream session is not keeping up, dropping change"
                );
            }
            Err(TrySendError::Closed(_)) => shared.detach(session.generation),
        }
    }
    tracing::debug!("publisher consumer finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change(source: &str, n: u64) -> ChangeEvent {
        ChangeEvent::ViewUpdated {
            source: source.to_string(),
            view: json!(n),
        }
    }

    async fn next(handle: &mut SessionHandle) -> Outbound {
        tokio::time::timeout(Duration::from_secs(2), handle.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn delivers_json_envelope() {
        let publisher = ChangePublisher::spawn(PublisherConfig::default());
        let mut session = publisher.attach();
        publisher.publish(change("auth", 1));

        let Outbound::Text(text) = next(&mut session).await else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"source": "auth", "dataType": "StateUpdate", "data": {"state": 1}})
        );
    }

    #[tokio::test]
    async fn msgpack_format_sends_binary() {
        let publisher = ChangePublisher::spawn(PublisherConfig {
            format: PublishFormat::Msgpack,
            ..PublisherConfig::default()
        });
        let mut session = publisher.attach();
        publisher.publish(change("auth", 1));

        let Outbound::Binary(bytes) = next(&mut session).await else {
            panic!("expected binary frame");
        };
        let decoded: rcgate_core::PublishedMessage = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded.source, "auth");
    }

    #[tokio::test]
    async fn new_session_replaces_old() {
        let publisher = ChangePublisher::spawn(PublisherConfig::default());
        let mut first = publisher.attach();
        let mut second = publisher.attach();

        assert_eq!(next(&mut first).await, Outbound::GoingAway);
        publisher.publish(change("auth", 2));
        assert!(matches!(next(&mut second).await, Outbound::Text(_)));

        drop(first);
        assert!(publisher.has_session());
        drop(second);
        assert!(!publisher.has_session());
    }

    #[tokio::test]
    async fn changes_queued_for_old_session_are_discarded() {
        let publisher = ChangePublisher::spawn(PublisherConfig::default());
        let mut first = publisher.attach();
        // The consumer has not run yet, so these are still queued.
        for n in 1..=3 {
            publisher.publish(change("auth", n));
        }
        let mut second = publisher.attach();
        publisher.publish(change("auth", 9));

        let Outbound::Text(text) = next(&mut second).await else {
            panic!("expected text frame");
        };
        assert!(text.contains(r#""state":9"#), "got {text}");
        assert_eq!(next(&mut first).await, Outbound::GoingAway);
        assert!(first.recv().await.is_none());
    }

    #[tokio::test]
    async fn stalled_session_buffer_is_bounded() {
        let publisher = ChangePublisher::spawn(PublisherConfig {
            queue_capacity: 4,
            ..PublisherConfig::default()
        });
        let mut session = publisher.attach();
        for n in 0..200 {
            publisher.publish(change("auth", n));
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut buffered = 0;
        while let Ok(Some(_)) =
            tokio::time::timeout(Duration::from_millis(50), session.recv()).await
        {
            buffered += 1;
        }
        assert!((1..=4).contains(&buffered), "buffered {buffered} frames");
        assert!(publisher.has_session());
    }

    #[tokio::test]
    async fn drops_without_session_and_disabled_sources() {
        let publisher = ChangePublisher::spawn(PublisherConfig {
            disabled_sources: BTreeSet::from(["muted".to_string()]),
            ..PublisherConfig::default()
        });
        publisher.publish(change("auth", 1));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut session = publisher.attach();
        publisher.publish(change("muted", 2));
        publisher.publish(change("auth", 3));

        let Outbound::Text(text) = next(&mut session).await else {
            panic!("expected text frame");
        };
        assert!(text.contains(r#""state":3"#));
    }

    #[tokio::test]
    async fn shutdown_closes_session() {
        let publisher = ChangePublisher::spawn(PublisherConfig::default());
        let mut session = publisher.attach();
        publisher.shutdown().await;
        assert_eq!(next(&mut session).await, Outbound::GoingAway);
        assert!(session.recv().await.is_none());
    }
}
