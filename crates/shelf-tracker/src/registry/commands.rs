//! Tracker actor commands, events, and the views it hands out.
//!
//! - `TrackerCommand`: commands sent to the actor, by handles and by the
//!   tasks and threads the actor itself starts
//! - `SessionEvent`: session lifecycle published on the broadcast channel
//! - `RunningSession`, `ReconcileReport`: query results

use std::path::PathBuf;
use std::process::Child;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shelf_core::GameId;
use tokio::sync::oneshot;

use crate::error::{LaunchError, TrackerError};
use crate::launcher::{LaunchReport, LaunchRequest};
use crate::SessionEnd;

// ============================================================================
// Tracker Commands
// ============================================================================

/// Commands sent to the tracker actor.
///
/// Requests from a `TrackerHandle` carry a oneshot channel for the reply.
/// `LaunchSettled`, `SessionExited` and `EscalateKill` are posted back to the
/// actor by the work it started.
#[derive(Debug)]
pub enum TrackerCommand {
    /// Launch a game.
    ///
    /// # Errors
    /// - `TrackerError::AlreadyRunning` if the game has a marker or a launch
    ///   in flight
    /// - `TrackerError::Launch` if the process could not be started
    /// - `TrackerError::Store` if the game record cannot be loaded
    Launch {
        request: Box<LaunchRequest>,
        respond_to: oneshot::Sender<Result<LaunchReport, TrackerError>>,
    },

    /// A spawned process has outlived (or failed within) the grace window.
    LaunchSettled {
        settled: Box<SettledLaunch>,
        respond_to: oneshot::Sender<Result<LaunchReport, TrackerError>>,
    },

    /// A monitor observed the end of a session.
    SessionExited(SessionEnd),

    /// Whether the game has a session marker.
    IsRunning {
        game_id: GameId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Terminate a running game. Replies `false` if it was not running.
    Kill {
        game_id: GameId,
        respond_to: oneshot::Sender<Result<bool, TrackerError>>,
    },

    /// Force-kill a session that ignored the termination request.
    EscalateKill { game_id: GameId, session_no: u64 },

    /// Sessions owned by live monitors.
    RunningSessions {
        respond_to: oneshot::Sender<Vec<RunningSession>>,
    },

    /// Re-attach or clear persisted markers without a live monitor.
    Reconcile {
        respond_to: oneshot::Sender<Result<ReconcileReport, TrackerError>>,
    },
}

/// A launch that has waited out its grace window.
#[derive(Debug)]
pub struct SettledLaunch {
    pub request: LaunchRequest,
    pub child: Child,
    pub install_dir: Option<PathBuf>,
    pub outcome: Result<(), LaunchError>,
}

// ============================================================================
// Session Views
// ============================================================================

/// How a session is being monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorKind {
    /// Waiting on a single process
    Pid,
    /// Scanning the install directory
    Directory,
}

impl std::fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pid => write!(f, "pid"),
            Self::Directory => write!(f, "directory"),
        }
    }
}

/// A session owned by a live monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningSession {
    pub game_id: GameId,
    /// Tracked pid; `None` for directory sessions
    pub pid: Option<u32>,
    pub monitor: MonitorKind,
    pub started_at: DateTime<Utc>,
    /// Whether a kill has been requested
    pub terminating: bool,
}

/// Outcome of a stale marker sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Games whose process was still alive and now has a monitor again
    pub reattached: Vec<GameId>,
    /// Games whose marker was removed without adding play time
    pub cleared: Vec<GameId>,
    /// Games already owned by a live monitor
    pub skipped: Vec<GameId>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.reattached.is_empty() && self.cleared.is_empty() && self.skipped.is_empty()
    }
}

// ============================================================================
// Session Events
// ============================================================================

/// Session lifecycle events published to subscribers.
///
/// The UI bridge drains these on the UI side; nothing in the tracker
/// touches UI state directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A game was launched and is being monitored.
    Launched {
        game_id: GameId,
        pid: u32,
        monitor: MonitorKind,
    },

    /// A launch was attempted and failed. No state was changed.
    LaunchFailed { game_id: GameId, reason: String },

    /// A session ended and was accounted for.
    Ended {
        game_id: GameId,
        elapsed_secs: u64,
        /// Total play time after this session, if the write succeeded
        play_time: Option<u64>,
        /// False if the record write failed, or if another tracker process
        /// already settled the same marker
        committed: bool,
        /// The session ended because of an explicit kill
        killed: bool,
    },

    /// A termination signal was sent to a running game.
    KillRequested { game_id: GameId },

    /// A persisted session was picked up again after a restart.
    Reattached { game_id: GameId, monitor: MonitorKind },

    /// A marker without a live process was removed.
    StaleCleared { game_id: GameId, pid: i64 },
}

impl SessionEvent {
    pub fn game_id(&self) -> &GameId {
        match self {
            Self::Launched { game_id, .. }
            | Self::LaunchFailed { game_id, .. }
            | Self::Ended { game_id, .. }
            | Self::KillRequested { game_id }
            | Self::Reattached { game_id, .. }
            | Self::StaleCleared { game_id, .. } => game_id,
        }
    }
}
