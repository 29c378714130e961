//! shelf tracker - game process launching and play session accounting
//!
//! This crate provides the session-tracking core:
//! - `launcher` - builds runner command lines and spawns game processes
//! - `pid_monitor` - waits for a single game process to exit
//! - `dir_monitor` - tracks a session by scanning an install directory
//! - `accounting` - commits elapsed play time and clears the session marker
//! - `registry` - the session registry actor and its handle
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  launch/kill   ┌─────────────────┐  write marker  ┌───────────┐
//! │ UI / front   │───────────────▶│  RegistryActor  │───────────────▶│ GameStore │
//! │ end (handle) │                │ (live sessions) │◀───────┐       └───────────┘
//! └──────▲───────┘                └───────┬─────────┘        │
//!        │ SessionEvent                   │ spawn            │ SessionExited
//!        │ (broadcast)                    ▼                  │
//!        │                        ┌─────────────────┐        │
//!        └────────────────────────│ monitor thread  │────────┘
//!                                 │ (pid or dir)    │
//!                                 └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod accounting;
pub mod config;
pub mod dir_monitor;
pub mod error;
pub mod launcher;
pub mod pid_monitor;
pub mod process;
pub mod registry;

pub use accounting::{commit_session, elapsed_seconds, AccountingOutcome};
pub use config::TrackerConfig;
pub use error::{LaunchError, TrackerError};
pub use launcher::{LaunchReport, LaunchRequest};
pub use registry::{
    spawn_tracker, MonitorKind, ReconcileReport, RunningSession, SessionEvent, TrackerHandle,
};

use chrono::{DateTime, Utc};
use shelf_core::GameId;

/// The end of a monitored session, handed from a monitor thread back to
/// the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEnd {
    pub game_id: GameId,
    /// Registry-assigned serial of the session, so a late report for an
    /// already-settled session is ignored
    pub session_no: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}
