//! OS process enumeration and signalling.

use crate::{ProcessError, SystemProcessTable};
use async_trait::async_trait;
use std::sync::Arc;

/// A live process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Image name as the OS reports it.
    pub name: String,
    /// Full executable path, when visible.
    pub executable: Option<String>,
}

impl ProcessInfo {
    /// Case-insensitive suffix match of the image name or executable path
    /// against an executable name.
    pub fn matches(&self, identity: &str) -> bool {
        let identity = identity.to_lowercase();
        std::iter::once(self.name.as_str())
            .chain(self.executable.as_deref())
            .any(|candidate| candidate.to_lowercase().ends_with(&identity))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Ask the process to exit.
    Graceful,
    /// Kill it.
    Forceful,
}

#[async_trait]
pub trait ProcessTable: Send + Sync {
    async fn list(&self) -> Result<Vec<ProcessInfo>, ProcessError>;

    async fn terminate(&self, pid: u32, mode: Termination) -> Result<(), ProcessError>;

    async fn is_alive(&self, pid: u32) -> Result<bool, ProcessError> {
        Ok(self.list().await?.iter().any(|p| p.pid == pid))
    }
}

/// The table used when none is injected.
pub fn default_table() -> Arc<dyn ProcessTable> {
    Arc::new(SystemProcessTable::new())
}
