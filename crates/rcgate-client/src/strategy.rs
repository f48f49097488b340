//! Ways of obtaining connection parameters.

use crate::{StrategyConfig, StrategyKind};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand::rngs::OsRng;
use rcgate_core::{ConnectionParameters, ParametersError};
use rcgate_process::{ProcessError, ProcessOrchestrator};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SECRET_BYTES: usize = 18;
const LOCKFILE_NAME: &str = "Riot Client";

#[async_trait]
pub trait ConnectionStrategy: Send + Sync {
    /// Produce candidate parameters. They are verified against the REST
    /// endpoint before being used.
    async fn connect(&self) -> Result<ConnectionParameters, StrategyError>;

    /// Release whatever `connect` acquired.
    async fn disconnect(&self) -> Result<(), StrategyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("process operation failed: {0}")]
    Process(#[from] ProcessError),
    #[error("invalid parameters: {0}")]
    Parameters(#[from] ParametersError),
    #[error("lockfile {path}: {reason}")]
    Lockfile { path: PathBuf, reason: String },
    #[error("strategy timed out")]
    Timeout,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Fresh parameters: a random secret and a port the OS reports free.
pub fn generate_parameters() -> Result<ConnectionParameters, StrategyError> {
    let mut secret = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut secret);
    let port = std::net::TcpListener::bind(("127.0.0.1", 0))?
        .local_addr()?
        .port();
    Ok(ConnectionParameters::new(STANDARD.encode(secret), port)?)
}

/// Stops every running instance and launches a helper process with its own
/// credentials.
pub struct ProcessTakeoverStrategy {
    processes: Arc<ProcessOrchestrator>,
}

impl ProcessTakeoverStrategy {
    pub fn new(processes: Arc<ProcessOrchestrator>) -> Self {
        Self { processes }
    }
}

#[async_trait]
impl ConnectionStrategy for ProcessTakeoverStrategy {
    async fn connect(&self) -> Result<ConnectionParameters, StrategyError> {
        let params = generate_parameters()?;
        tracing::debug!(?params, "generated connection parameters");

        let kills = rcgate_process::Entity::ALL
            .into_iter()
            .map(|entity| async move {
                match self.processes.kill_entity_process(entity).await {
                    Err(ProcessError::UnsupportedOperation { .. }) => {
                        tracing::info!(%entity, "entity is not supported on this OS");
                        Ok(0)
                    }
                    other => other,
                }
            });
        futures_util::future::try_join_all(kills).await?;

        match self.processes.kill_client_ux().await {
            Ok(()) | Err(ProcessError::NoSuchProcess(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.processes.kill_helper_process().await?;
        self.processes.start_helper_process(&params).await?;
        tracing::info!(port = params.port(), "helper process started with own credentials");
        Ok(params)
    }

    async fn disconnect(&self) -> Result<(), StrategyError> {
        self.processes.shutdown().await;
        Ok(())
    }
}

/// Reads the credentials a running managed client wrote to its lockfile.
pub struct LockfileStrategy {
    path: PathBuf,
}

impl LockfileStrategy {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Lockfile location of a default installation, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| {
            dir.join("Riot Games")
                .join("Riot Client")
                .join("Config")
                .join("lockfile")
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConnectionStrategy for LockfileStrategy {
    async fn connect(&self) -> Result<ConnectionParameters, StrategyError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| StrategyError::Lockfile {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        parse_lockfile(&text).map_err(|reason| StrategyError::Lockfile {
            path: self.path.clone(),
            reason,
        })
    }

    async fn disconnect(&self) -> Result<(), StrategyError> {
        Ok(())
    }
}

/// Parse `name:pid:port:password:protocol`.
pub fn parse_lockfile(text: &str) -> Result<ConnectionParameters, String> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    let [name, _pid, port, password, _protocol] = parts.as_slice() else {
        return Err(format!("expected 5 fields, found {}", parts.len()));
    };
    if !name.eq_ignore_ascii_case(LOCKFILE_NAME) {
        return Err(format!("lockfile belongs to {name:?}"));
    }
    let port: u16 = port.parse().map_err(|_| format!("invalid port {port:?}"))?;
    ConnectionParameters::new(*password, port).map_err(|e| e.to_string())
}

/// The strategy selected by `config`.
pub fn build_strategy(
    config: &StrategyConfig,
    processes: Arc<ProcessOrchestrator>,
) -> Result<Arc<dyn ConnectionStrategy>, StrategyError> {
    match config.kind {
        StrategyKind::Takeover => Ok(Arc::new(ProcessTakeoverStrategy::new(processes))),
        StrategyKind::Lockfile => {
            let path = config
                .lockfile_path
                .clone()
                .or_else(LockfileStrategy::default_path)
                .ok_or_else(|| StrategyError::Lockfile {
                    path: PathBuf::new(),
                    reason: "no lockfile location for this platform".to_string(),
                })?;
            Ok(Arc::new(LockfileStrategy::new(path)))
        }
    }
}
