//! Executable layouts and timing for process operations.

use crate::{Entity, OperatingSystem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Executable names for one operating system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Executables {
    /// The managed client's UX process.
    pub client_ux: Option<String>,
    /// The managed client's helper (background services) process.
    pub helper: Option<String>,
    /// Entity id -> executable name.
    pub entities: BTreeMap<String, String>,
}

impl Executables {
    /// Executable for `entity`, ignoring blank mappings.
    pub fn entity(&self, entity: Entity) -> Option<&str> {
        self.entities
            .get(entity.id())
            .map(String::as_str)
            .filter(|name| !name.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub windows: Executables,
    pub macos: Executables,
    pub linux: Executables,
    /// Overrides the per-OS directory holding the games folder.
    pub install_root: Option<PathBuf>,
    pub games_folder: String,
    pub installs_file: String,
    pub graceful_timeout_ms: u64,
    pub exit_timeout_ms: u64,
    pub search_attempts: u32,
    pub search_delay_ms: u64,
    pub os_override: Option<OperatingSystem>,
}

impl ProcessConfig {
    pub fn executables(&self, os: OperatingSystem) -> &Executables {
        match os {
            OperatingSystem::Windows => &self.windows,
            OperatingSystem::Macos => &self.macos,
            OperatingSystem::Linux => &self.linux,
        }
    }

    pub fn graceful_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_timeout_ms)
    }

    pub fn exit_timeout(&self) -> Duration {
        Duration::from_millis(self.exit_timeout_ms)
    }

    pub fn search_delay(&self) -> Duration {
        Duration::from_millis(self.search_delay_ms)
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        let windows = Executables {
            client_ux: Some("RiotClientUx.exe".to_string()),
            helper: Some("RiotClientServices.exe".to_string()),
            entities: BTreeMap::from([
                (
                    Entity::Valorant.id().to_string(),
                    "VALORANT-Win64-Shipping.exe".to_string(),
                ),
                (Entity::LegendsOfRuneterra.id().to_string(), "LoR.exe".to_string()),
                (
                    Entity::LeagueOfLegends.id().to_string(),
                    "LeagueClient.exe".to_string(),
                ),
            ]),
        };
        let macos = Executables {
            client_ux: Some("Riot Client".to_string()),
            helper: Some("RiotClientServices".to_string()),
            entities: BTreeMap::from([(
                Entity::LeagueOfLegends.id().to_string(),
                "LeagueClient".to_string(),
            )]),
        };

        Self {
            windows,
            macos,
            linux: Executables::default(),
            install_root: None,
            games_folder: "Riot Games".to_string(),
            installs_file: "RiotClientInstalls.json".to_string(),
            graceful_timeout_ms: 500,
            exit_timeout_ms: 2000,
            search_attempts: 20,
            search_delay_ms: 250,
            os_override: None,
        }
    }
}
