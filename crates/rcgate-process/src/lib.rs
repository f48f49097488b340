//! Process supervision for the managed client.
//!
//! [`ProcessOrchestrator`] finds processes by executable identity, kills them
//! with a graceful-then-forceful escalation, and launches the managed client's
//! helper process. Process enumeration and signalling sit behind [`ProcessTable`].

mod config;
mod entity;
mod error;
mod orchestrator;
mod os;
mod system;
mod table;

pub use config::{Executables, ProcessConfig};
pub use entity::{Entity, EntityParseError};
pub use error::ProcessError;
pub use orchestrator::{KillPolicy, ProcessOrchestrator, Selection, helper_launch_args};
pub use os::OperatingSystem;
pub use system::SystemProcessTable;
pub use table::{ProcessInfo, ProcessTable, Termination, default_table};
