use crate::OperatingSystem;

/// Failure of a process operation.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("helper process is already running")]
    AlreadyRunning,
    #[error("no running process matches {0}")]
    NoSuchProcess(String),
    #[error("{what} is not supported on {os}")]
    UnsupportedOperation { what: String, os: OperatingSystem },
    #[error("process {pid} did not exit after forceful termination")]
    ExitTimeout { pid: u32 },
    #[error("{0} did not appear after launch")]
    StartTimeout(String),
    #[error("installation metadata: {0}")]
    InstallMetadata(String),
    #[error("process query failed: {0}")]
    Query(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
