//! Daemon configuration file.

use rcgate_cache::PublisherConfig;
use rcgate_client::{ClientConfig, StrategyConfig};
use rcgate_process::ProcessConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub client: ClientConfig,
    pub process: ProcessConfig,
    pub strategy: StrategyConfig,
    pub publisher: PublishConfig,
    pub logging: LoggingConfig,
}

/// The downstream publish endpoint and its queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub listen: SocketAddr,
    #[serde(flatten)]
    pub queue: PublisherConfig,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8765)),
            queue: PublisherConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default directive, combined with `RUST_LOG`.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "rcgate=info".to_string(),
        }
    }
}

/// `<config_dir>/rcgate/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("rcgate").join("config.toml"))
}

impl GatewayConfig {
    /// Load `explicit`, or the default location. A missing file at the
    /// default location yields the defaults; a missing explicit file is an
    /// error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgate_cache::PublishFormat;
    use rcgate_client::StrategyKind;
    use std::io::Write;

    #[test]
    fn empty_file_is_all_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert!(config.client.secure);
        assert_eq!(config.client.rest_connect_attempts, 20);
        assert_eq!(config.process.exit_timeout_ms, 2000);
        assert_eq!(config.strategy.kind, StrategyKind::Takeover);
        assert_eq!(config.publisher.listen.port(), 8765);
        assert_eq!(config.publisher.queue.queue_capacity, 1024);
        assert_eq!(config.logging.filter, "rcgate=info");
    }

    #[test]
    fn sections_override_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [client]
            secure = false
            rest_connect_attempts = 3

            [strategy]
            kind = "lockfile"
            lockfile_path = "/tmp/lockfile"

            [publisher]
            listen = "0.0.0.0:9000"
            format = "msgpack"
            disabled_sources = ["sessions"]

            [logging]
            filter = "rcgate=debug"
            "#,
        )
        .unwrap();
        assert!(!config.client.secure);
        assert_eq!(config.client.rest_connect_attempts, 3);
        assert_eq!(config.client.websocket_timeout_ms, 3000);
        assert_eq!(config.strategy.kind, StrategyKind::Lockfile);
        assert_eq!(config.strategy.lockfile_path, Some(PathBuf::from("/tmp/lockfile")));
        assert_eq!(config.publisher.listen.port(), 9000);
        assert_eq!(config.publisher.queue.format, PublishFormat::Msgpack);
        assert!(config.publisher.queue.disabled_sources.contains("sessions"));
        assert_eq!(config.publisher.queue.shutdown_grace_ms, 1000);
        assert_eq!(config.logging.filter, "rcgate=debug");
    }

    #[test]
    fn loads_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[process]\nsearch_attempts = 5").unwrap();
        let config = GatewayConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.process.search_attempts, 5);
    }

    #[test]
    fn reports_missing_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            GatewayConfig::load(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));

        let invalid = dir.path().join("bad.toml");
        std::fs::write(&invalid, "[client]\nsecure = \"yes\"").unwrap();
        assert!(matches!(
            GatewayConfig::from_file(&invalid),
            Err(ConfigError::Parse { .. })
        ));
    }
}
