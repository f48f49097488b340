//! Credentials for a single managed-client session.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed username the managed client expects in its Basic credential.
pub const AUTH_USERNAME: &str = "riot";

/// The secret and port a managed client was started with.
///
/// The `Authorization` header value is derived once at construction and is
/// never serialized.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawParameters", into = "RawParameters")]
pub struct ConnectionParameters {
    auth_secret: String,
    port: u16,
    auth_header: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParameters {
    auth_secret: String,
    port: u16,
}

impl ConnectionParameters {
    /// Build parameters, rejecting a blank secret or a zero port.
    pub fn new(auth_secret: impl Into<String>, port: u16) -> Result<Self, ParametersError> {
        let auth_secret = auth_secret.into();
        if auth_secret.trim().is_empty() {
            return Err(ParametersError::BlankSecret);
        }
        if port == 0 {
            return Err(ParametersError::MissingPort);
        }
        let credential = STANDARD.encode(format!("{AUTH_USERNAME}:{auth_secret}"));
        Ok(Self {
            auth_header: format!("Basic {credential}"),
            auth_secret,
            port,
        })
    }

    pub fn auth_secret(&self) -> &str {
        &self.auth_secret
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Value for the `Authorization` header on REST and WebSocket requests.
    pub fn auth_header(&self) -> &str {
        &self.auth_header
    }
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("auth_secret", &"<redacted>")
            .field("port", &self.port)
            .finish()
    }
}

impl TryFrom<RawParameters> for ConnectionParameters {
    type Error = ParametersError;

    fn try_from(raw: RawParameters) -> Result<Self, Self::Error> {
        Self::new(raw.auth_secret, raw.port)
    }
}

impl From<ConnectionParameters> for RawParameters {
    fn from(params: ConnectionParameters) -> Self {
        Self {
            auth_secret: params.auth_secret,
            port: params.port,
        }
    }
}

/// Error constructing connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParametersError {
    #[error("auth secret cannot be blank")]
    BlankSecret,
    #[error("port must be non-zero")]
    MissingPort,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_basic_header() {
        let params = ConnectionParameters::new("s3cret", 51234).unwrap();
        // base64("riot:s3cret")
        assert_eq!(params.auth_header(), "Basic cmlvdDpzM2NyZXQ=");
        assert_eq!(params.port(), 51234);
    }

    #[test]
    fn rejects_blank_secret_and_zero_port() {
        assert_eq!(
            ConnectionParameters::new("  ", 1).unwrap_err(),
            ParametersError::BlankSecret
        );
        assert_eq!(
            ConnectionParameters::new("x", 0).unwrap_err(),
            ParametersError::MissingPort
        );
    }

    #[test]
    fn header_is_not_serialized() {
        let params = ConnectionParameters::new("abc", 4000).unwrap();
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json, serde_json::json!({"authSecret": "abc", "port": 4000}));

        let back: ConnectionParameters = serde_json::from_value(json).unwrap();
        assert_eq!(back.auth_header(), params.auth_header());
    }

    #[test]
    fn debug_hides_secret() {
        let params = ConnectionParameters::new("hunter2", 4000).unwrap();
        assert!(!format!("{params:?}").contains("hunter2"));
    }
}
