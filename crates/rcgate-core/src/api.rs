//! Results of REST calls against the managed client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// A JSON body.
    Success(Value),
    /// `204` or an empty body.
    NoContent,
}

impl ApiResponse {
    /// The body, if any.
    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Success(value) => Some(value),
            Self::NoContent => None,
        }
    }
}

/// The structured error body the managed client returns with non-2xx
/// responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("managed client returned {http_status} {error_code}: {message}")]
pub struct ManagedClientError {
    #[serde(default)]
    pub error_code: String,
    #[serde(default)]
    pub http_status: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub implementation_details: Value,
}

impl ManagedClientError {
    /// Build an error for a response whose body could not be decoded.
    pub fn from_status(http_status: u16, body: &str) -> Self {
        Self {
            error_code: "UNKNOWN".to_string(),
            http_status,
            message: body.to_string(),
            implementation_details: Value::Null,
        }
    }
}
