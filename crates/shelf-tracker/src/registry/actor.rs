//! Tracker actor - owns the table of live sessions and processes commands.
//!
//! The actor is the single owner of session state. It receives commands via
//! an mpsc channel, performs store writes for sessions one at a time, and
//! publishes lifecycle events via broadcast.
//!
//! # Blocking Work
//!
//! Store reads and writes and the process-table scans done for kill and
//! reconcile run inline on the actor task. Each is a handful of small file
//! operations or one `/proc` pass, so commands stay sequential instead of
//! being split across `spawn_blocking` round trips. Anything that waits
//! (grace windows, kill escalation, monitoring) runs outside the actor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use shelf_core::{GameId, GameStore, SessionMarker, DIRECTORY_SENTINEL_PID};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::commands::{
    MonitorKind, ReconcileReport, RunningSession, SessionEvent, SettledLaunch, TrackerCommand,
};
use crate::accounting::{commit_session, elapsed_seconds};
use crate::config::TrackerConfig;
use crate::dir_monitor::DirectoryMonitor;
use crate::error::{LaunchError, TrackerError};
use crate::launcher::{self, LaunchReport, LaunchRequest};
use crate::pid_monitor::{PidMonitor, WaitTarget};
use crate::process::{is_process_alive, send_signal, ProcessTable, Signal, SysinfoProcessTable};
use crate::SessionEnd;

// ============================================================================
// Session State
// ============================================================================

/// A session owned by a live monitor thread.
#[derive(Debug, Clone)]
struct ActiveSession {
    /// Serial that the monitor echoes back in `SessionEnd`
    session_no: u64,
    pid: Option<u32>,
    install_dir: Option<PathBuf>,
    started_at: DateTime<Utc>,
    kind: MonitorKind,
    kill_requested: bool,
}

/// What a new monitor should follow.
enum MonitorSource {
    Child(Child),
    Pid(u32),
    Directory { dir: PathBuf, wrapper: Option<Child> },
}

/// Result of looking at one persisted marker.
enum MarkerAction {
    Reattached,
    Cleared,
    Skipped,
}

// ============================================================================
// Tracker Actor
// ============================================================================

/// The tracker actor - owns all live session state.
///
/// # Ownership
///
/// - `sessions`: sessions with a running monitor, keyed by game
/// - `launching`: games whose process is inside its grace window
///
/// The persisted marker stays the source of truth for "is running"; the
/// actor's tables only record which markers it is responsible for.
///
/// # Thread Safety
///
/// The actor runs in a single task and processes commands sequentially.
/// Monitor threads never touch its state; they post `SessionExited`.
pub struct TrackerActor {
    receiver: mpsc::Receiver<TrackerCommand>,

    /// Non-owning sender handed (upgraded) to the tasks and threads the
    /// actor starts, so the actor stops once handles and monitors are gone
    self_sender: mpsc::WeakSender<TrackerCommand>,

    store: Arc<dyn GameStore>,
    config: TrackerConfig,

    sessions: HashMap<GameId, ActiveSession>,
    launching: HashSet<GameId>,
    next_session_no: u64,

    event_publisher: broadcast::Sender<SessionEvent>,
}

impl TrackerActor {
    pub fn new(
        receiver: mpsc::Receiver<TrackerCommand>,
        self_sender: mpsc::WeakSender<TrackerCommand>,
        store: Arc<dyn GameStore>,
        config: TrackerConfig,
        event_publisher: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            receiver,
            self_sender,
            store,
            config,
            sessions: HashMap::new(),
            launching: HashSet::new(),
            next_session_no: 1,
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until every sender (handles, pending launches and
    /// monitor threads) has been dropped.
    pub async fn run(mut self) {
        info!("Tracker actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(sessions = self.sessions.len(), "Tracker actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: TrackerCommand) {
        match cmd {
            TrackerCommand::Launch {
                request,
                respond_to,
            } => {
                // Replies later, from LaunchSettled, unless rejected now
                self.handle_launch(*request, respond_to);
            }
            TrackerCommand::LaunchSettled {
                settled,
                respond_to,
            } => {
                let result = self.handle_launch_settled(*settled);
                let _ = respond_to.send(result);
            }
            TrackerCommand::SessionExited(end) => {
                self.handle_session_exited(end);
            }
            TrackerCommand::IsRunning {
                game_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.store.has_active_session(&game_id));
            }
            TrackerCommand::Kill {
                game_id,
                respond_to,
            } => {
                let result = self.handle_kill(&game_id);
                let _ = respond_to.send(result);
            }
            TrackerCommand::EscalateKill {
                game_id,
                session_no,
            } => {
                self.handle_escalate_kill(&game_id, session_no);
            }
            TrackerCommand::RunningSessions { respond_to } => {
                let _ = respond_to.send(self.handle_running_sessions());
            }
            TrackerCommand::Reconcile { respond_to } => {
                let result = self.handle_reconcile();
                let _ = respond_to.send(result);
            }
        }
    }

    // ========================================================================
    // Launch
    // ========================================================================

    /// Checks, spawns, and hands the child to a grace-window task.
    ///
    /// On rejection the reply is sent immediately.
    fn handle_launch(
        &mut self,
        request: LaunchRequest,
        respond_to: oneshot::Sender<Result<LaunchReport, TrackerError>>,
    ) {
        let game_id = request.game_id.clone();

        match self.start_launch(request) {
            Ok((child, program, request, install_dir)) => {
                let Some(sender) = self.self_sender.upgrade() else {
                    // Nothing can receive the settled launch; do not leave
                    // an untracked game behind
                    let mut child = child;
                    let _ = child.kill();
                    let _ = child.wait();
                    self.launching.remove(&game_id);
                    warn!(game_id = %game_id, "Tracker channel closed, launch abandoned");
                    let _ = respond_to.send(Err(TrackerError::ChannelClosed));
                    return;
                };

                let grace = self.config.launch_grace();
                tokio::spawn(async move {
                    let (child, outcome) = launcher::settle(child, program, grace).await;
                    let settled = Box::new(SettledLaunch {
                        request,
                        child,
                        install_dir,
                        outcome,
                    });
                    if let Err(e) = sender
                        .send(TrackerCommand::LaunchSettled {
                            settled,
                            respond_to,
                        })
                        .await
                    {
                        warn!(error = %e, "Tracker stopped during launch grace window");
                    }
                });
            }
            Err(e) => {
                debug!(game_id = %game_id, error = %e, "Launch rejected");
                if let TrackerError::Launch { source, .. } = &e {
                    let _ = self.event_publisher.send(SessionEvent::LaunchFailed {
                        game_id,
                        reason: source.to_string(),
                    });
                }
                let _ = respond_to.send(Err(e));
            }
        }
    }

    /// Pre-checks and spawns. On success the game is in `launching`.
    fn start_launch(
        &mut self,
        request: LaunchRequest,
    ) -> Result<(Child, String, LaunchRequest, Option<PathBuf>), TrackerError> {
        let game_id = request.game_id.clone();

        if self.sessions.contains_key(&game_id)
            || self.launching.contains(&game_id)
            || self.store.has_active_session(&game_id)
        {
            warn!(game_id = %game_id, "Game is already running, rejecting launch");
            return Err(TrackerError::AlreadyRunning(game_id));
        }

        let game = self.store.load_game(&game_id)?;
        let install_dir = game.install_dir().map(Path::to_path_buf);

        if request.directory_monitoring && install_dir.is_none() {
            return Err(TrackerError::launch(game_id, LaunchError::MissingInstallDir));
        }

        let argv = launcher::build_command_line(
            &request.command,
            game.installation.as_ref(),
            request.file_path.as_deref(),
            request.launcher_id.as_deref(),
        )
        .map_err(|e| TrackerError::launch(game_id.clone(), e))?;

        let working_dir = install_dir
            .as_deref()
            .filter(|_| !request.directory_monitoring);
        let child = launcher::spawn(&game_id, &argv, working_dir)
            .map_err(|e| TrackerError::launch(game_id.clone(), e))?;

        self.launching.insert(game_id);
        Ok((child, launcher::program_name(&argv), request, install_dir))
    }

    /// Records a healthy launch, or reports a failed one.
    fn handle_launch_settled(
        &mut self,
        settled: SettledLaunch,
    ) -> Result<LaunchReport, TrackerError> {
        let SettledLaunch {
            request,
            mut child,
            install_dir,
            outcome,
        } = settled;
        let game_id = request.game_id;
        self.launching.remove(&game_id);

        if let Err(e) = outcome {
            let _ = self.event_publisher.send(SessionEvent::LaunchFailed {
                game_id: game_id.clone(),
                reason: e.to_string(),
            });
            return Err(TrackerError::launch(game_id, e));
        }

        let pid = child.id();
        let (marker_pid, source) = match install_dir.filter(|_| request.directory_monitoring) {
            Some(dir) => (
                DIRECTORY_SENTINEL_PID,
                MonitorSource::Directory {
                    dir,
                    wrapper: Some(child),
                },
            ),
            None => (i64::from(pid), MonitorSource::Child(child)),
        };

        let marker = match self.store.write_session_marker(&game_id, marker_pid) {
            Ok(marker) => marker,
            Err(e) => {
                error!(game_id = %game_id, error = %e, "Failed to write session marker, stopping game");
                stop_untracked(source);
                return Err(e.into());
            }
        };

        let play_count = match self.store.increment_play_count(&game_id) {
            Ok(game) => Some(game.play_count),
            Err(e) => {
                error!(game_id = %game_id, error = %e, "Failed to increment play count");
                None
            }
        };

        let monitor = self
            .start_monitor(&game_id, marker.created_at, source)
            .map_err(|e| {
                if let Err(clear_err) = self.store.clear_session_marker(&game_id) {
                    warn!(game_id = %game_id, error = %clear_err, "Failed to clear session marker");
                }
                TrackerError::launch(game_id.clone(), e)
            })?;

        info!(
            game_id = %game_id,
            pid,
            monitor = %monitor,
            "Game launched"
        );
        let _ = self.event_publisher.send(SessionEvent::Launched {
            game_id: game_id.clone(),
            pid,
            monitor,
        });

        Ok(LaunchReport {
            game_id,
            pid,
            monitor,
            play_count,
        })
    }

    // ========================================================================
    // Monitoring
    // ========================================================================

    /// Starts a monitor thread and takes ownership of the session.
    fn start_monitor(
        &mut self,
        game_id: &GameId,
        started_at: DateTime<Utc>,
        source: MonitorSource,
    ) -> Result<MonitorKind, LaunchError> {
        let sender = self.self_sender.upgrade().ok_or_else(|| {
            LaunchError::MonitorThread(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "tracker channel closed",
            ))
        })?;
        let on_end = move |end: SessionEnd| {
            let game_id = end.game_id.clone();
            if sender.blocking_send(TrackerCommand::SessionExited(end)).is_err() {
                warn!(game_id = %game_id, "Tracker stopped before session end was recorded");
            }
        };

        let session_no = self.next_session_no;
        let (kind, pid, install_dir) = match source {
            MonitorSource::Child(child) => {
                let pid = child.id();
                PidMonitor::new(
                    game_id.clone(),
                    session_no,
                    started_at,
                    WaitTarget::Child(child),
                    self.config.pid_poll_interval(),
                )
                .spawn(on_end)
                .map_err(LaunchError::MonitorThread)?;
                (MonitorKind::Pid, Some(pid), None)
            }
            MonitorSource::Pid(pid) => {
                PidMonitor::new(
                    game_id.clone(),
                    session_no,
                    started_at,
                    WaitTarget::pid(pid),
                    self.config.pid_poll_interval(),
                )
                .spawn(on_end)
                .map_err(LaunchError::MonitorThread)?;
                (MonitorKind::Pid, Some(pid), None)
            }
            MonitorSource::Directory { dir, wrapper } => {
                let mut monitor = DirectoryMonitor::new(
                    game_id.clone(),
                    session_no,
                    started_at,
                    &dir,
                    SysinfoProcessTable::new(),
                )
                .with_timing(self.config.dir_poll_interval(), self.config.dir_grace());
                if let Some(child) = wrapper {
                    monitor = monitor.with_wrapper(child);
                }
                let root = monitor.root().to_path_buf();
                monitor.spawn(on_end).map_err(LaunchError::MonitorThread)?;
                (MonitorKind::Directory, None, Some(root))
            }
        };

        self.next_session_no += 1;
        self.sessions.insert(
            game_id.clone(),
            ActiveSession {
                session_no,
                pid,
                install_dir,
                started_at,
                kind,
                kill_requested: false,
            },
        );
        Ok(kind)
    }

    /// Commits a finished session, exactly once.
    fn handle_session_exited(&mut self, end: SessionEnd) {
        let owned = self
            .sessions
            .get(&end.game_id)
            .is_some_and(|s| s.session_no == end.session_no);
        if !owned {
            debug!(
                game_id = %end.game_id,
                session_no = end.session_no,
                "Ignoring end of a session that was already settled"
            );
            return;
        }

        if let Some(session) = self.sessions.remove(&end.game_id) {
            self.finish_session(&end.game_id, &session, end.ended_at);
        }
    }

    fn finish_session(
        &mut self,
        game_id: &GameId,
        session: &ActiveSession,
        ended_at: DateTime<Utc>,
    ) {
        // Another tracker process may be watching the same marker
        let settled_elsewhere = match self.store.read_session_marker(game_id) {
            Ok(Some(marker)) => marker.created_at != session.started_at,
            Ok(None) => true,
            Err(e) => {
                warn!(game_id = %game_id, error = %e, "Cannot read session marker, committing anyway");
                false
            }
        };

        let (elapsed_secs, play_time, committed) = if settled_elsewhere {
            info!(game_id = %game_id, "Session was already settled by another tracker");
            (elapsed_seconds(session.started_at, ended_at), None, false)
        } else {
            let outcome =
                commit_session(self.store.as_ref(), game_id, session.started_at, ended_at);
            (
                outcome.elapsed_secs,
                outcome.game.as_ref().map(|g| g.play_time),
                outcome.committed,
            )
        };

        let _ = self.event_publisher.send(SessionEvent::Ended {
            game_id: game_id.clone(),
            elapsed_secs,
            play_time,
            committed,
            killed: session.kill_requested,
        });
    }

    // ========================================================================
    // Kill
    // ========================================================================

    fn handle_kill(&mut self, game_id: &GameId) -> Result<bool, TrackerError> {
        if !self.sessions.contains_key(game_id) {
            // Not ours: adopt a live marker or clear a stale one first
            let Some(marker) = self.store.read_session_marker(game_id)? else {
                debug!(game_id = %game_id, "Kill requested for a game that is not running");
                return Ok(false);
            };
            match self.reconcile_marker(game_id, marker) {
                MarkerAction::Reattached => {}
                MarkerAction::Cleared => return Ok(true),
                MarkerAction::Skipped => return Ok(false),
            }
        }

        let Some(session) = self.sessions.get(game_id).cloned() else {
            return Ok(false);
        };

        let targets = self.session_pids(&session);
        if targets.is_empty() {
            info!(game_id = %game_id, "Game process already gone, committing session");
            if let Some(session) = self.sessions.remove(game_id) {
                self.finish_session(game_id, &session, Utc::now());
            }
            return Ok(true);
        }

        for pid in &targets {
            match send_signal(*pid, Signal::Terminate) {
                Ok(()) => info!(game_id = %game_id, pid, "Sent SIGTERM to game process"),
                Err(e) => debug!(game_id = %game_id, pid, error = %e, "SIGTERM failed"),
            }
        }

        if let Some(active) = self.sessions.get_mut(game_id) {
            active.kill_requested = true;
        }
        let _ = self.event_publisher.send(SessionEvent::KillRequested {
            game_id: game_id.clone(),
        });
        self.schedule_escalation(game_id.clone(), session.session_no);

        Ok(true)
    }

    fn schedule_escalation(&self, game_id: GameId, session_no: u64) {
        let Some(sender) = self.self_sender.upgrade() else {
            return;
        };
        let timeout = self.config.kill_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = sender
                .send(TrackerCommand::EscalateKill {
                    game_id,
                    session_no,
                })
                .await;
        });
    }

    fn handle_escalate_kill(&mut self, game_id: &GameId, session_no: u64) {
        let Some(session) = self
            .sessions
            .get(game_id)
            .filter(|s| s.session_no == session_no)
            .cloned()
        else {
            return;
        };

        for pid in self.session_pids(&session) {
            warn!(game_id = %game_id, pid, "Game ignored SIGTERM, sending SIGKILL");
            if let Err(e) = send_signal(pid, Signal::Kill) {
                debug!(game_id = %game_id, pid, error = %e, "SIGKILL failed");
            }
        }
    }

    /// Live processes currently attributed to a session.
    ///
    /// Directory sessions scan the whole process table; this blocks the
    /// actor for one `/proc` pass.
    fn session_pids(&self, session: &ActiveSession) -> Vec<u32> {
        match (session.kind, session.pid, session.install_dir.as_deref()) {
            (MonitorKind::Pid, Some(pid), _) if is_process_alive(pid, None) => vec![pid],
            (MonitorKind::Directory, _, Some(dir)) => {
                let mut pids: Vec<u32> = SysinfoProcessTable::new()
                    .processes_under(dir)
                    .into_iter()
                    .collect();
                pids.sort_unstable();
                pids
            }
            _ => Vec::new(),
        }
    }

    // ========================================================================
    // Queries and Reconciliation
    // ========================================================================

    fn handle_running_sessions(&self) -> Vec<RunningSession> {
        let mut sessions: Vec<RunningSession> = self
            .sessions
            .iter()
            .map(|(game_id, s)| RunningSession {
                game_id: game_id.clone(),
                pid: s.pid,
                monitor: s.kind,
                started_at: s.started_at,
                terminating: s.kill_requested,
            })
            .collect();
        sessions.sort_by(|a, b| a.game_id.cmp(&b.game_id));
        sessions
    }

    fn handle_reconcile(&mut self) -> Result<ReconcileReport, TrackerError> {
        let mut report = ReconcileReport::default();

        for (game_id, marker) in self.store.list_session_markers()? {
            match self.reconcile_marker(&game_id, marker) {
                MarkerAction::Reattached => report.reattached.push(game_id),
                MarkerAction::Cleared => report.cleared.push(game_id),
                MarkerAction::Skipped => report.skipped.push(game_id),
            }
        }

        info!(
            reattached = report.reattached.len(),
            cleared = report.cleared.len(),
            skipped = report.skipped.len(),
            "Session markers reconciled"
        );
        Ok(report)
    }

    /// Re-attaches a monitor to a persisted session that is still alive, or
    /// clears its marker without adding play time.
    fn reconcile_marker(&mut self, game_id: &GameId, marker: SessionMarker) -> MarkerAction {
        if self.sessions.contains_key(game_id) || self.launching.contains(game_id) {
            return MarkerAction::Skipped;
        }

        let source = if marker.is_directory_monitored() {
            self.live_install_dir(game_id)
                .map(|dir| MonitorSource::Directory { dir, wrapper: None })
        } else {
            marker
                .tracked_pid()
                .filter(|pid| is_process_alive(*pid, None))
                .map(MonitorSource::Pid)
        };

        if let Some(source) = source {
            match self.start_monitor(game_id, marker.created_at, source) {
                Ok(monitor) => {
                    info!(game_id = %game_id, pid = marker.pid, monitor = %monitor, "Re-attached to running game");
                    let _ = self.event_publisher.send(SessionEvent::Reattached {
                        game_id: game_id.clone(),
                        monitor,
                    });
                    return MarkerAction::Reattached;
                }
                Err(e) => {
                    warn!(game_id = %game_id, error = %e, "Failed to re-attach monitor");
                }
            }
        }

        // The real end time is unknown, so no play time is added
        warn!(
            game_id = %game_id,
            pid = marker.pid,
            created_at = %marker.created_at,
            "Clearing stale session marker"
        );
        if let Err(e) = self.store.clear_session_marker(game_id) {
            warn!(game_id = %game_id, error = %e, "Failed to clear stale session marker");
        }
        let _ = self.event_publisher.send(SessionEvent::StaleCleared {
            game_id: game_id.clone(),
            pid: marker.pid,
        });
        MarkerAction::Cleared
    }

    /// The game's install directory, if processes are still running in it.
    fn live_install_dir(&self, game_id: &GameId) -> Option<PathBuf> {
        let game = match self.store.load_game(game_id) {
            Ok(game) => game,
            Err(e) => {
                warn!(game_id = %game_id, error = %e, "Cannot load game for directory marker");
                return None;
            }
        };
        let dir = game.install_dir()?;
        let root = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        if SysinfoProcessTable::new().processes_under(&root).is_empty() {
            None
        } else {
            Some(root)
        }
    }
}

/// Stops a process the tracker could not take ownership of.
fn stop_untracked(source: MonitorSource) {
    let child = match source {
        MonitorSource::Child(child) => Some(child),
        MonitorSource::Directory { wrapper, .. } => wrapper,
        MonitorSource::Pid(_) => None,
    };
    if let Some(mut child) = child {
        let _ = child.kill();
        let _ = child.wait();
    }
}
