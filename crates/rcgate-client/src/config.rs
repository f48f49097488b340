use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Timing and transport settings for the managed-client connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    /// `false` talks plain HTTP/WS, for local fakes.
    pub secure: bool,
    pub rest_connect_attempts: u32,
    pub rest_connect_delay_ms: u64,
    pub strategy_timeout_ms: u64,
    pub websocket_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// Listeners notified concurrently per event.
    pub dispatch_concurrency: usize,
}

impl ClientConfig {
    pub fn rest_connect_delay(&self) -> Duration {
        Duration::from_millis(self.rest_connect_delay_ms)
    }

    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.strategy_timeout_ms)
    }

    pub fn websocket_timeout(&self) -> Duration {
        Duration::from_millis(self.websocket_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub(crate) fn base_url(&self, port: u16) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}:{port}", self.host)
    }

    pub(crate) fn socket_url(&self, port: u16) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{port}", self.host)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            secure: true,
            rest_connect_attempts: 20,
            rest_connect_delay_ms: 500,
            strategy_timeout_ms: 30_000,
            websocket_timeout_ms: 3_000,
            request_timeout_ms: 5_000,
            dispatch_concurrency: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Kill running instances and launch a helper with fresh credentials.
    #[default]
    Takeover,
    /// Read credentials from the lockfile of a running instance.
    Lockfile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub kind: StrategyKind,
    pub lockfile_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_security_flag() {
        let mut config = ClientConfig::default();
        assert_eq!(config.base_url(5000), "https://127.0.0.1:5000");
        assert_eq!(config.socket_url(5000), "wss://127.0.0.1:5000");
        config.secure = false;
        assert_eq!(config.base_url(5000), "http://127.0.0.1:5000");
        assert_eq!(config.socket_url(5000), "ws://127.0.0.1:5000");
    }
}
