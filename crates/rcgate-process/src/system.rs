//! Process table backed by `sysinfo`.

use crate::{ProcessError, ProcessInfo, ProcessTable, Termination};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use sysinfo::{
    Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System, UpdateKind,
};

/// Live process table for every supported OS.
///
/// Snapshots are refreshed on demand on the blocking pool.
#[derive(Clone)]
pub struct SystemProcessTable {
    system: Arc<Mutex<System>>,
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProcessTable {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    async fn with_system<T, F>(&self, f: F) -> Result<T, ProcessError>
    where
        F: FnOnce(&mut System) -> T + Send + 'static,
        T: Send + 'static,
    {
        let system = self.system.clone();
        tokio::task::spawn_blocking(move || {
            let mut system = system.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut system)
        })
        .await
        .map_err(|e| ProcessError::Query(e.to_string()))
    }
}

fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::nothing().with_exe(UpdateKind::OnlyIfNotSet)
}

fn refresh_one(system: &mut System, pid: Pid) {
    system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), true, refresh_kind());
}

// Unreaped children linger as zombies after they exit.
fn is_running(process: &Process) -> bool {
    !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
}

#[async_trait]
impl ProcessTable for SystemProcessTable {
    async fn list(&self) -> Result<Vec<ProcessInfo>, ProcessError> {
        self.with_system(|system| {
            system.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind());
            system
                .processes()
                .iter()
                .filter(|(_, process)| is_running(process))
                .map(|(pid, process)| ProcessInfo {
                    pid: pid.as_u32(),
                    name: process.name().to_string_lossy().into_owned(),
                    executable: process.exe().map(|path| path.to_string_lossy().into_owned()),
                })
                .collect()
        })
        .await
    }

    async fn terminate(&self, pid: u32, mode: Termination) -> Result<(), ProcessError> {
        self.with_system(move |system| {
            let target = Pid::from_u32(pid);
            refresh_one(system, target);
            let process = system
                .process(target)
                .filter(|process| is_running(process))
                .ok_or_else(|| ProcessError::NoSuchProcess(pid.to_string()))?;

            let delivered = match mode {
                // No SIGTERM on Windows; fall back to a hard kill there.
                Termination::Graceful => process
                    .kill_with(Signal::Term)
                    .unwrap_or_else(|| process.kill()),
                Termination::Forceful => process.kill(),
            };
            if delivered {
                tracing::debug!(pid, ?mode, "termination signal sent");
                Ok(())
            } else {
                Err(ProcessError::Query(format!("could not signal process {pid}")))
            }
        })
        .await?
    }

    async fn is_alive(&self, pid: u32) -> Result<bool, ProcessError> {
        self.with_system(move |system| {
            let target = Pid::from_u32(pid);
            refresh_one(system, target);
            system.process(target).is_some_and(is_running)
        })
        .await
    }
}
