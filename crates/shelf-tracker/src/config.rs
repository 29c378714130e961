//! Tracker timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default delay before a freshly spawned process is sampled for failure.
pub const DEFAULT_LAUNCH_GRACE_MS: u64 = 500;

/// Default liveness poll interval for re-attached pid sessions.
pub const DEFAULT_PID_POLL_INTERVAL_MS: u64 = 1_000;

/// Default process table poll interval for directory sessions.
pub const DEFAULT_DIR_POLL_INTERVAL_MS: u64 = 5_000;

/// Default wait before an empty directory scan is confirmed.
pub const DEFAULT_DIR_GRACE_MS: u64 = 5_000;

/// Default wait between SIGTERM and SIGKILL on an explicit kill.
pub const DEFAULT_KILL_TIMEOUT_MS: u64 = 5_000;

/// Timing knobs for launching and monitoring.
///
/// Every field has a default, so a partial `[tracker]` table in the
/// configuration file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub launch_grace_ms: u64,
    pub pid_poll_interval_ms: u64,
    pub dir_poll_interval_ms: u64,
    pub dir_grace_ms: u64,
    pub kill_timeout_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            launch_grace_ms: DEFAULT_LAUNCH_GRACE_MS,
            pid_poll_interval_ms: DEFAULT_PID_POLL_INTERVAL_MS,
            dir_poll_interval_ms: DEFAULT_DIR_POLL_INTERVAL_MS,
            dir_grace_ms: DEFAULT_DIR_GRACE_MS,
            kill_timeout_ms: DEFAULT_KILL_TIMEOUT_MS,
        }
    }
}

impl TrackerConfig {
    pub fn launch_grace(&self) -> Duration {
        Duration::from_millis(self.launch_grace_ms)
    }

    pub fn pid_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pid_poll_interval_ms)
    }

    pub fn dir_poll_interval(&self) -> Duration {
        Duration::from_millis(self.dir_poll_interval_ms)
    }

    pub fn dir_grace(&self) -> Duration {
        Duration::from_millis(self.dir_grace_ms)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }

    /// Short timings for tests and scripted sessions.
    pub fn fast() -> Self {
        Self {
            launch_grace_ms: 100,
            pid_poll_interval_ms: 50,
            dir_poll_interval_ms: 50,
            dir_grace_ms: 50,
            kill_timeout_ms: 500,
        }
    }
}
