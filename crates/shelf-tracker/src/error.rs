//! Error types for launching and tracking sessions.

use shelf_core::{GameId, StoreError};
use thiserror::Error;

/// Why a game process could not be started.
///
/// A launch error never leaves a marker behind or changes counters.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The runner command has no tokens.
    #[error("runner command is empty")]
    EmptyCommand,

    /// The program is missing or not executable.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exited with a failure status inside the grace window.
    #[error("{program} exited immediately ({status})")]
    ExitedImmediately { program: String, status: String },

    /// Directory monitoring was requested for a game without an install dir.
    #[error("directory monitoring requires an install directory")]
    MissingInstallDir,

    /// The monitor thread could not be started.
    #[error("failed to start monitor thread: {0}")]
    MonitorThread(#[source] std::io::Error),
}

/// Errors returned through the tracker handle.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The game already has a session marker or a launch in flight.
    #[error("game is already running: {0}")]
    AlreadyRunning(GameId),

    /// The process could not be launched.
    #[error("launch failed for {game_id}: {source}")]
    Launch {
        game_id: GameId,
        #[source]
        source: LaunchError,
    },

    /// The persistence layer failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The registry actor has shut down.
    #[error("tracker channel closed")]
    ChannelClosed,
}

impl TrackerError {
    pub fn launch(game_id: GameId, source: LaunchError) -> Self {
        Self::Launch { game_id, source }
    }

    /// True for launch rejections and failures (no state was mutated).
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, Self::AlreadyRunning(_) | Self::Launch { .. })
    }
}
