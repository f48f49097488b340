//! Off-socket delivery of frames and lifecycle notifications to listeners.
//!
//! The socket read loop only enqueues. A single dispatch task drains the
//! queue in order, parses frames and fans each item out to every listener
//! with bounded concurrency.

use crate::RcuListener;
use futures_util::StreamExt;
use futures_util::stream;
use rcgate_core::{JSON_API_EVENT, parse_frame};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug)]
enum DispatchItem {
    Connected,
    Frame(String),
    Disconnected,
}

type Listeners = Arc<RwLock<Vec<Arc<dyn RcuListener>>>>;

pub struct Dispatcher {
    tx: std::sync::Mutex<Option<mpsc::UnboundedSender<DispatchItem>>>,
    listeners: Listeners,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Start the dispatch task. Must be called inside a Tokio runtime.
    pub fn spawn(concurrency: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let listeners: Listeners = Arc::new(RwLock::new(Vec::new()));
        let task = tokio::spawn(run(rx, listeners.clone(), concurrency.max(1)));
        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            listeners,
            task: std::sync::Mutex::new(Some(task)),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn RcuListener>) {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(listener),
            Err(poisoned) => poisoned.into_inner().push(listener),
        }
    }

    pub fn notify_connected(&self) {
        self.enqueue(DispatchItem::Connected);
    }

    pub fn notify_disconnected(&self) {
        self.enqueue(DispatchItem::Disconnected);
    }

    /// Queue one complete text message from the socket.
    pub fn frame(&self, text: String) {
        self.enqueue(DispatchItem::Frame(text));
    }

    fn enqueue(&self, item: DispatchItem) {
        let tx = self.tx.lock().ok().and_then(|tx| tx.clone());
        match tx {
            Some(tx) if tx.send(item).is_ok() => {}
            _ => tracing::debug!("dispatcher stopped, dropping item"),
        }
    }

    /// Stop accepting items and let the queue drain for up to `grace`.
    pub async fn shutdown(&self, grace: Duration) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
        let task = self.task.lock().ok().and_then(|mut task| task.take());
        let Some(mut task) = task else {
            return;
        };
        if tokio::time::timeout(grace, &mut task).await.is_err() {
            tracing::warn!("dispatch queue did not drain in {grace:?}, aborting");
            task.abort();
        }
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<DispatchItem>,
    listeners: Listeners,
    concurrency: usize,
) {
    while let Some(item) = rx.recv().await {
        let targets: Vec<Arc<dyn RcuListener>> = match listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        match item {
            DispatchItem::Connected => {
                stream::iter(targets)
                    .for_each_concurrent(concurrency, |l| async move { l.on_connect().await })
                    .await;
            }
            DispatchItem::Disconnected => {
                stream::iter(targets)
                    .for_each_concurrent(concurrency, |l| async move { l.on_disconnect().await })
                    .await;
            }
            DispatchItem::Frame(text) => {
                let event = match parse_frame(&text, JSON_API_EVENT) {
                    Ok(event) => Arc::new(event),
                    Err(e) => {
                        tracing::warn!("dropping frame: {e}");
                        continue;
                    }
                };
                tracing::debug!(uri = %event.uri, kind = %event.event_type, "dispatching event");
                stream::iter(targets)
                    .for_each_concurrent(concurrency, |l| {
                        let event = event.clone();
                        async move { l.on_message(event).await }
                    })
                    .await;
            }
        }
    }
    tracing::debug!("dispatch task finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rcgate_core::RcuEvent;

    #[derive(Default)]
    struct Recorder(std::sync::Mutex<Vec<String>>);

    #[async_trait]
    impl RcuListener for Recorder {
        async fn on_connect(&self) {
            self.0.lock().unwrap().push("connect".into());
        }

        async fn on_message(&self, event: Arc<RcuEvent>) {
            self.0.lock().unwrap().push(event.uri.clone());
        }

        async fn on_disconnect(&self) {
            self.0.lock().unwrap().push("disconnect".into());
        }
    }

    #[tokio::test]
    async fn delivers_in_order_and_drops_garbage() {
        let dispatcher = Dispatcher::spawn(4);
        let recorder = Arc::new(Recorder::default());
        dispatcher.add_listener(recorder.clone());

        dispatcher.notify_connected();
        dispatcher.frame(r#"[8,"OnJsonApiEvent",{"eventType":"Update","uri":"/a","data":1}]"#.into());
        dispatcher.frame("[8, \"OnJsonApiEvent\"]".into());
        dispatcher.frame(r#"[8,"OnJsonApiEvent",{"eventType":"Delete","uri":"/b"}]"#.into());
        dispatcher.notify_disconnected();
        dispatcher.shutdown(Duration::from_secs(1)).await;

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["connect", "/a", "/b", "disconnect"]
        );
    }
}
