use rcgate_client::RequestError;

/// Initial snapshot could not be obtained.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("invalid snapshot: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

/// An update event could not be applied.
#[derive(Debug, thiserror::Error)]
pub enum DeltaError {
    #[error("invalid event data: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("pattern group {0} did not match")]
    MissingCapture(usize),
}

/// A change could not be encoded for the downstream session.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("msgpack encoding failed: {0}")]
    Msgpack(#[from] rmp_serde::encode::Error),
}
