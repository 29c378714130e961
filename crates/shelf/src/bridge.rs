//! UI notification bridge.
//!
//! Drains `SessionEvent`s on the UI side and turns them into UI effects.
//! Monitor threads and the tracker actor never call into the UI; this loop
//! is the only place UI state changes in response to a session.

use shelf_core::GameId;
use shelf_tracker::SessionEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The UI effects a session can trigger.
pub trait Notifier: Send {
    /// A game started; the library window may get out of the way.
    fn hide_window(&mut self, _game_id: &GameId) {}

    /// A game ended; bring the library window back.
    fn restore_window(&mut self, _game_id: &GameId) {}

    /// Shows a short message to the user.
    fn toast(&mut self, message: &str);
}

/// Prints toasts to stdout.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn toast(&mut self, message: &str) {
        println!("{message}");
    }
}

/// Formats seconds as `1h 02m 03s`, dropping leading zero units.
pub fn format_duration(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

/// Applies one event to the notifier.
pub fn apply_event<N: Notifier + ?Sized>(event: &SessionEvent, notifier: &mut N) {
    match event {
        SessionEvent::Launched { game_id, pid, monitor } => {
            notifier.hide_window(game_id);
            notifier.toast(&format!("Started {game_id} (pid {pid}, {monitor} monitor)"));
        }
        SessionEvent::LaunchFailed { game_id, reason } => {
            notifier.toast(&format!("Could not start {game_id}: {reason}"));
        }
        SessionEvent::Ended {
            game_id,
            elapsed_secs,
            play_time,
            committed,
            killed,
        } => {
            notifier.restore_window(game_id);
            let verb = if *killed { "Stopped" } else { "Finished" };
            let message = match (committed, play_time) {
                (true, Some(total)) => format!(
                    "{verb} {game_id} after {}, total {}",
                    format_duration(*elapsed_secs),
                    format_duration(*total)
                ),
                _ => format!(
                    "{verb} {game_id} after {} (play time not saved here)",
                    format_duration(*elapsed_secs)
                ),
            };
            notifier.toast(&message);
        }
        SessionEvent::KillRequested { game_id } => {
            notifier.toast(&format!("Stopping {game_id}..."));
        }
        SessionEvent::Reattached { game_id, .. } => {
            debug!(game_id = %game_id, "Tracking a game started before this session");
        }
        SessionEvent::StaleCleared { game_id, .. } => {
            debug!(game_id = %game_id, "Cleared a stale running flag");
        }
    }
}

/// Runs the bridge until cancelled or the event channel closes.
///
/// Returns the notifier so callers can inspect or reuse it.
pub async fn run_bridge<N: Notifier>(
    mut events: broadcast::Receiver<SessionEvent>,
    mut notifier: N,
    cancel: CancellationToken,
) -> N {
    loop {
        tokio::select! {
            // Queued events are applied before a pending cancellation
            biased;

            received = events.recv() => match received {
                Ok(event) => apply_event(&event, &mut notifier),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "UI bridge fell behind, events dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("Session event channel closed");
                    break;
                }
            },
            _ = cancel.cancelled() => {
                debug!("UI bridge cancelled");
                break;
            }
        }
    }
    notifier
}
