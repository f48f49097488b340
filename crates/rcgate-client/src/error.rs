use crate::StrategyError;
use rcgate_core::{ConnectionState, ManagedClientError};

/// Why a `connect` or `disconnect` did not go through.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("connection is busy (state {0})")]
    Conflict(ConnectionState),
    #[error("connection strategy failed: {0}")]
    ConnectFailed(#[source] StrategyError),
    #[error("REST endpoint not ready after {attempts} attempts")]
    RestTimeout { attempts: u32 },
    #[error("websocket connection failed: {0}")]
    WebSocketTimeout(String),
    #[error("state machine expected {expected}, found {actual}")]
    InconsistentState {
        expected: ConnectionState,
        actual: ConnectionState,
    },
    #[error("connect task failed: {0}")]
    Internal(String),
}

/// Why a REST call produced no response.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("not connected to the managed client")]
    NotConnected,
    #[error(transparent)]
    Api(#[from] ManagedClientError),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}
