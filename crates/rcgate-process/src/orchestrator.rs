//! Process orchestration: lookup, escalating kills and helper launch.

use crate::{
    Entity, Executables, OperatingSystem, ProcessConfig, ProcessError, ProcessInfo, ProcessTable,
    Termination, default_table,
};
use futures_util::future::try_join_all;
use rcgate_core::{ConnectionParameters, poll_until};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(25);
const INSTALL_KEYS: [&str; 2] = ["rc_live", "rc_default"];

/// Which of the matching processes to kill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    All,
    First,
    /// The parent of a process tree.
    LowestPid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillPolicy {
    pub selection: Selection,
    /// Fail with `NoSuchProcess` when nothing matches.
    pub require_match: bool,
}

impl KillPolicy {
    pub const ALL: Self = Self {
        selection: Selection::All,
        require_match: false,
    };
}

/// Launch arguments for the helper process.
pub fn helper_launch_args(params: &ConnectionParameters) -> Vec<String> {
    vec![
        "--headless".to_string(),
        format!("--remoting-auth-token={}", params.auth_secret()),
        format!("--app-port={}", params.port()),
    ]
}

pub struct ProcessOrchestrator {
    os: OperatingSystem,
    config: ProcessConfig,
    table: Arc<dyn ProcessTable>,
    helper: Mutex<Option<Child>>,
}

impl ProcessOrchestrator {
    /// Orchestrator for the configured (or detected) OS with its default table.
    pub fn new(config: ProcessConfig) -> Self {
        let os = config.os_override.unwrap_or_else(OperatingSystem::current);
        Self::with_table(os, config, default_table())
    }

    pub fn with_table(
        os: OperatingSystem,
        config: ProcessConfig,
        table: Arc<dyn ProcessTable>,
    ) -> Self {
        Self {
            os,
            config,
            table,
            helper: Mutex::new(None),
        }
    }

    pub fn os(&self) -> OperatingSystem {
        self.os
    }

    fn executables(&self) -> &Executables {
        self.config.executables(self.os)
    }

    fn unsupported(&self, what: impl Into<String>) -> ProcessError {
        ProcessError::UnsupportedOperation {
            what: what.into(),
            os: self.os,
        }
    }

    /// Entities with an executable mapping on this OS.
    pub fn supported_entities(&self) -> BTreeSet<Entity> {
        Entity::ALL
            .into_iter()
            .filter(|entity| self.executables().entity(*entity).is_some())
            .collect()
    }

    /// Location of the installation metadata file.
    pub fn install_metadata_path(&self) -> Result<PathBuf, ProcessError> {
        let root = match (&self.config.install_root, self.os) {
            (Some(root), _) => root.clone(),
            (None, OperatingSystem::Windows) => std::env::var_os("ALLUSERSPROFILE")
                .map(PathBuf::from)
                .ok_or_else(|| {
                    ProcessError::InstallMetadata("ALLUSERSPROFILE is not set".to_string())
                })?,
            (None, OperatingSystem::Macos) => PathBuf::from("/Users/Shared"),
            (None, OperatingSystem::Linux) => return Err(self.unsupported("install discovery")),
        };
        Ok(root
            .join(&self.config.games_folder)
            .join(&self.config.installs_file))
    }

    /// Resolve the helper executable from the installation metadata.
    pub async fn helper_executable_path(&self) -> Result<PathBuf, ProcessError> {
        let metadata_path = self.install_metadata_path()?;
        let text = tokio::fs::read_to_string(&metadata_path).await.map_err(|e| {
            ProcessError::InstallMetadata(format!("{}: {e}", metadata_path.display()))
        })?;
        let metadata: Value = serde_json::from_str(&text).map_err(|e| {
            ProcessError::InstallMetadata(format!("{}: {e}", metadata_path.display()))
        })?;

        let path = INSTALL_KEYS
            .iter()
            .find_map(|key| {
                let found = metadata.get(*key).and_then(Value::as_str);
                if found.is_none() {
                    tracing::debug!(key, "install metadata lookup missed");
                }
                found
            })
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                ProcessError::InstallMetadata(format!(
                    "no helper path under {} in {}",
                    INSTALL_KEYS.join(" or "),
                    metadata_path.display()
                ))
            })?;

        if !tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
            return Err(ProcessError::InstallMetadata(format!(
                "helper executable {} does not exist",
                path.display()
            )));
        }
        Ok(path)
    }

    /// Launch the helper process with `params` and wait until it is visible.
    pub async fn start_helper_process(
        &self,
        params: &ConnectionParameters,
    ) -> Result<(), ProcessError> {
        let identity = self
            .executables()
            .helper
            .clone()
            .ok_or_else(|| self.unsupported("helper process"))?;
        let path = self.helper_executable_path().await?;

        {
            let mut slot = self.helper.lock().await;
            if let Some(child) = slot.as_mut() {
                if child.try_wait()?.is_none() {
                    return Err(ProcessError::AlreadyRunning);
                }
            }

            let child = Command::new(&path)
                .args(helper_launch_args(params))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()?;
            tracing::info!(pid = ?child.id(), path = %path.display(), "started helper process");
            *slot = Some(child);
        }

        let found = poll_until(
            self.config.search_attempts,
            self.config.search_delay(),
            |attempt| {
                let identity = identity.as_str();
                async move {
                    match self.find(identity).await {
                        Ok(matches) => matches.first().map(|p| p.pid),
                        Err(e) => {
                            tracing::debug!(attempt, "process search failed: {e}");
                            None
                        }
                    }
                }
            },
        )
        .await;

        match found {
            Some(pid) => {
                tracing::debug!(pid, "helper process is up");
                Ok(())
            }
            None => Err(ProcessError::StartTimeout(identity)),
        }
    }

    async fn find(&self, identity: &str) -> Result<Vec<ProcessInfo>, ProcessError> {
        let mut matches: Vec<_> = self
            .table
            .list()
            .await?
            .into_iter()
            .filter(|p| p.matches(identity))
            .collect();
        matches.sort_by_key(|p| p.pid);
        Ok(matches)
    }

    /// Kill processes whose executable ends with `identity`.
    ///
    /// Returns how many processes were killed.
    pub async fn kill_by_identity(
        &self,
        identity: &str,
        policy: KillPolicy,
    ) -> Result<usize, ProcessError> {
        let mut targets = self.find(identity).await?;
        if targets.is_empty() {
            tracing::debug!(identity, "no process to kill");
            return if policy.require_match {
                Err(ProcessError::NoSuchProcess(identity.to_string()))
            } else {
                Ok(0)
            };
        }

        match policy.selection {
            Selection::All => {}
            // `find` sorts by pid, so both keep the head.
            Selection::First | Selection::LowestPid => targets.truncate(1),
        }

        try_join_all(targets.iter().map(|p| self.kill_process(p.pid))).await?;
        tracing::info!(identity, count = targets.len(), "killed processes");
        Ok(targets.len())
    }

    /// Terminate `pid`, escalating to a forceful kill when it does not exit
    /// within the graceful timeout.
    pub async fn kill_process(&self, pid: u32) -> Result<(), ProcessError> {
        if let Err(e) = self.table.terminate(pid, Termination::Graceful).await {
            tracing::debug!(pid, "graceful termination failed: {e}");
        }
        if self.wait_for_exit(pid, self.config.graceful_timeout()).await? {
            return Ok(());
        }

        tracing::debug!(pid, "process ignored graceful termination, forcing");
        self.table.terminate(pid, Termination::Forceful).await?;
        if self.wait_for_exit(pid, self.config.exit_timeout()).await? {
            Ok(())
        } else {
            Err(ProcessError::ExitTimeout { pid })
        }
    }

    async fn wait_for_exit(&self, pid: u32, within: Duration) -> Result<bool, ProcessError> {
        let wait = async {
            loop {
                if !self.table.is_alive(pid).await? {
                    return Ok::<_, ProcessError>(());
                }
                tokio::time::sleep(EXIT_POLL_INTERVAL).await;
            }
        };
        match tokio::time::timeout(within, wait).await {
            Ok(result) => result.map(|()| true),
            Err(_) => Ok(false),
        }
    }

    fn entity_identity(&self, entity: Entity) -> Result<String, ProcessError> {
        self.executables()
            .entity(entity)
            .map(str::to_string)
            .ok_or_else(|| self.unsupported(format!("entity {entity}")))
    }

    /// Kill every process of `entity`. Nothing running is success.
    pub async fn kill_entity_process(&self, entity: Entity) -> Result<usize, ProcessError> {
        let identity = self.entity_identity(entity)?;
        self.kill_by_identity(&identity, KillPolicy::ALL).await
    }

    /// Kill every process of `entity`, failing with `NoSuchProcess` when it
    /// is not running.
    pub async fn kill_running_entity_process(
        &self,
        entity: Entity,
    ) -> Result<usize, ProcessError> {
        let identity = self.entity_identity(entity)?;
        let policy = KillPolicy {
            selection: Selection::All,
            require_match: true,
        };
        self.kill_by_identity(&identity, policy).await
    }

    /// Kill the managed client's UX. Fails with `NoSuchProcess` when it is
    /// not running.
    pub async fn kill_client_ux(&self) -> Result<(), ProcessError> {
        let identity = self
            .executables()
            .client_ux
            .clone()
            .ok_or_else(|| self.unsupported("client UX"))?;
        let policy = KillPolicy {
            selection: Selection::LowestPid,
            require_match: true,
        };
        self.kill_by_identity(&identity, policy).await.map(|_| ())
    }

    /// Kill the running helper process, if any.
    pub async fn kill_helper_process(&self) -> Result<usize, ProcessError> {
        let identity = self
            .executables()
            .helper
            .clone()
            .ok_or_else(|| self.unsupported("helper process"))?;
        let policy = KillPolicy {
            selection: Selection::First,
            require_match: false,
        };
        self.kill_by_identity(&identity, policy).await
    }

    /// Kill the helper process this orchestrator spawned, if still running.
    pub async fn shutdown(&self) {
        let Some(mut child) = self.helper.lock().await.take() else {
            return;
        };
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        if let Err(e) = child.start_kill() {
            tracing::warn!("failed to kill helper process: {e}");
            return;
        }
        match tokio::time::timeout(self.config.exit_timeout(), child.wait()).await {
            Ok(Ok(status)) => tracing::info!(%status, "helper process stopped"),
            Ok(Err(e)) => tracing::warn!("failed to reap helper process: {e}"),
            Err(_) => tracing::warn!("helper process did not exit in time"),
        }
    }
}
