use async_trait::async_trait;
use rcgate_core::RcuEvent;
use std::sync::Arc;

/// Receives connection lifecycle notifications and update events.
///
/// Calls arrive on the dispatch task, in the order the socket produced them.
#[async_trait]
pub trait RcuListener: Send + Sync {
    /// The connection reached `Connected`; REST calls are available.
    async fn on_connect(&self);

    async fn on_message(&self, event: Arc<RcuEvent>);

    /// The socket closed and the session was torn down.
    async fn on_disconnect(&self);
}
