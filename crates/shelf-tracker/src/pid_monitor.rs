//! Waits for a single game process to exit on a dedicated thread.
//!
//! A process that is already gone when the monitor starts is a normal,
//! immediate end of session, never an error.

use std::io;
use std::process::Child;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use shelf_core::GameId;
use tracing::{debug, info, warn};

use crate::process::{is_process_alive, process_start_time};
use crate::SessionEnd;

/// What the monitor waits on.
#[derive(Debug)]
pub enum WaitTarget {
    /// A child spawned by the launcher; waiting also reaps it.
    Child(Child),

    /// A pid from a persisted marker, polled for liveness.
    Pid {
        pid: u32,
        /// Kernel start time captured when monitoring began
        start_time: Option<u64>,
    },
}

impl WaitTarget {
    /// Targets an existing process by pid, capturing its start time now so
    /// a later pid reuse is not mistaken for the game.
    pub fn pid(pid: u32) -> Self {
        Self::Pid {
            pid,
            start_time: process_start_time(pid),
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            Self::Child(child) => child.id(),
            Self::Pid { pid, .. } => *pid,
        }
    }
}

/// Blocks until one process terminates.
#[derive(Debug)]
pub struct PidMonitor {
    game_id: GameId,
    session_no: u64,
    started_at: DateTime<Utc>,
    target: WaitTarget,
    poll_interval: Duration,
}

impl PidMonitor {
    pub fn new(
        game_id: GameId,
        session_no: u64,
        started_at: DateTime<Utc>,
        target: WaitTarget,
        poll_interval: Duration,
    ) -> Self {
        Self {
            game_id,
            session_no,
            started_at,
            target,
            poll_interval,
        }
    }

    /// Blocks until the process ends and returns the session end.
    pub fn wait(self) -> SessionEnd {
        let pid = self.target.id();
        debug!(game_id = %self.game_id, pid, "Monitoring game process");

        match self.target {
            WaitTarget::Child(mut child) => match child.wait() {
                Ok(status) => {
                    info!(game_id = %self.game_id, pid, %status, "Game process exited");
                }
                Err(e) => {
                    // Already reaped or gone; either way the session is over
                    warn!(game_id = %self.game_id, pid, error = %e, "Wait on game process failed");
                }
            },
            WaitTarget::Pid { pid, start_time } => {
                while is_process_alive(pid, start_time) {
                    thread::sleep(self.poll_interval);
                }
                info!(game_id = %self.game_id, pid, "Game process no longer running");
            }
        }

        SessionEnd {
            game_id: self.game_id,
            session_no: self.session_no,
            started_at: self.started_at,
            ended_at: Utc::now(),
        }
    }

    /// Runs `wait` on a named thread and hands the result to `on_end`.
    ///
    /// # Errors
    /// Returns the OS error if the thread cannot be created.
    pub fn spawn<F>(self, on_end: F) -> io::Result<JoinHandle<()>>
    where
        F: FnOnce(SessionEnd) + Send + 'static,
    {
        thread::Builder::new()
            .name(format!("shelf-monitor-{}", self.game_id))
            .spawn(move || on_end(self.wait()))
    }
}
