//! Tracks a session by the processes living in an install directory.
//!
//! Used for runners that are intermediaries (store clients, wrapper
//! scripts): the spawned process may exit long before the game does, so
//! liveness is judged by scanning the process table instead.
//!
//! A session ends only after two consecutive empty scans separated by the
//! grace delay. A single empty scan is common while a launcher hands over
//! to the game binary.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use shelf_core::GameId;
use tracing::{debug, info, warn};

use crate::process::ProcessTable;
use crate::SessionEnd;

/// Polls a `ProcessTable` until no process remains under the install
/// directory.
pub struct DirectoryMonitor<T: ProcessTable> {
    game_id: GameId,
    session_no: u64,
    started_at: DateTime<Utc>,
    root: PathBuf,
    table: T,
    wrapper: Option<Child>,
    poll_interval: Duration,
    grace: Duration,
}

impl<T: ProcessTable + 'static> DirectoryMonitor<T> {
    /// Creates a monitor for `install_dir`.
    ///
    /// The directory is canonicalized so symlinked installs match the paths
    /// the kernel reports; if that fails the path is used as given.
    pub fn new(
        game_id: GameId,
        session_no: u64,
        started_at: DateTime<Utc>,
        install_dir: &Path,
        table: T,
    ) -> Self {
        let root = install_dir.canonicalize().unwrap_or_else(|e| {
            warn!(
                game_id = %game_id,
                dir = %install_dir.display(),
                error = %e,
                "Cannot canonicalize install directory, using it as given"
            );
            install_dir.to_path_buf()
        });

        Self {
            game_id,
            session_no,
            started_at,
            root,
            table,
            wrapper: None,
            poll_interval: Duration::from_secs(5),
            grace: Duration::from_secs(5),
        }
    }

    /// Reaps the launcher's own child while monitoring. Its exit does not
    /// end the session.
    #[must_use]
    pub fn with_wrapper(mut self, child: Child) -> Self {
        self.wrapper = Some(child);
        self
    }

    #[must_use]
    pub fn with_timing(mut self, poll_interval: Duration, grace: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.grace = grace;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Blocks until the directory has been confirmed empty.
    pub fn wait(mut self) -> SessionEnd {
        info!(
            game_id = %self.game_id,
            dir = %self.root.display(),
            "Monitoring install directory"
        );

        // Let the launcher start the game before the first scan
        thread::sleep(self.poll_interval);

        let mut seen: HashSet<u32> = HashSet::new();
        loop {
            let current = self.scan(&seen);
            if current.is_empty() {
                debug!(game_id = %self.game_id, "No processes found, confirming after grace delay");
                thread::sleep(self.grace);

                let recheck = self.scan(&current);
                if recheck.is_empty() {
                    break;
                }
                seen = recheck;
            } else {
                seen = current;
            }
            thread::sleep(self.poll_interval);
        }

        info!(game_id = %self.game_id, "All game processes have exited");
        self.reap_wrapper();

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

    /// One scan of the process table, logging changes against `previous`.
    fn scan(&mut self, previous: &HashSet<u32>) -> HashSet<u32> {
        self.reap_wrapper();
        let current = self.table.processes_under(&self.root);

        for pid in current.difference(previous) {
            debug!(game_id = %self.game_id, pid, "Game process appeared");
        }
        for pid in previous.difference(&current) {
            debug!(game_id = %self.game_id, pid, "Game process disappeared");
        }

        current
    }

    fn reap_wrapper(&mut self) {
        let Some(child) = self.wrapper.as_mut() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(game_id = %self.game_id, pid = child.id(), %status, "Launcher process exited");
                self.wrapper = None;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(game_id = %self.game_id, error = %e, "Failed to poll launcher process");
                self.wrapper = None;
            }
        }
    }
}
