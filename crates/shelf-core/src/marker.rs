//! The session marker: durable proof that a game is running.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marker pid used for directory-monitored sessions, which have no single
/// process to follow.
pub const DIRECTORY_SENTINEL_PID: i64 = -1;

/// Records that a game has an active play session.
///
/// A game is running iff its marker exists. `created_at` is the moment the
/// marker was written and is the start of the measured session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMarker {
    pub pid: i64,
    pub created_at: DateTime<Utc>,
}

impl SessionMarker {
    /// Creates a marker for a process-tracked session.
    pub fn for_pid(pid: u32, created_at: DateTime<Utc>) -> Self {
        Self {
            pid: i64::from(pid),
            created_at,
        }
    }

    /// Creates a marker for a directory-monitored session.
    pub fn for_directory(created_at: DateTime<Utc>) -> Self {
        Self {
            pid: DIRECTORY_SENTINEL_PID,
            created_at,
        }
    }

    /// True if the session is tracked by install directory scanning.
    pub fn is_directory_monitored(&self) -> bool {
        self.pid == DIRECTORY_SENTINEL_PID
    }

    /// The tracked process id, if this is a process-tracked session.
    pub fn tracked_pid(&self) -> Option<u32> {
        u32::try_from(self.pid).ok().filter(|pid| *pid != 0)
    }
}
