//! Session accounting: commits the elapsed play time of a finished session.
//!
//! `commit_session` is the only place play time is added. The registry calls
//! it exactly once per session, whether the session ended on its own or was
//! killed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shelf_core::{Game, GameId, GameStore};
use tracing::{error, info, warn};

/// Result of committing one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountingOutcome {
    /// Seconds added to the game's play time (at least 1)
    pub elapsed_secs: u64,

    /// The updated record, if the write succeeded
    pub game: Option<Game>,

    /// Whether the record write succeeded
    pub committed: bool,
}

/// Whole seconds between `started_at` and `ended_at`, never less than one.
///
/// Negative deltas from clock adjustments also floor to one second.
pub fn elapsed_seconds(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> u64 {
    let secs = (ended_at - started_at).num_seconds();
    u64::try_from(secs).unwrap_or(0).max(1)
}

/// Adds the session to the game's record and clears its session marker.
///
/// The marker is cleared even if the record write fails, so a broken record
/// can never leave a game stuck in the running state.
pub fn commit_session(
    store: &dyn GameStore,
    game_id: &GameId,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
) -> AccountingOutcome {
    let elapsed_secs = elapsed_seconds(started_at, ended_at);

    let game = match store.record_session(game_id, elapsed_secs, started_at, ended_at) {
        Ok(game) => {
            info!(
                game_id = %game_id,
                elapsed_secs,
                play_time = game.play_time,
                status = %game.completion_status,
                "Session committed"
            );
            Some(game)
        }
        Err(e) => {
            error!(
                game_id = %game_id,
                elapsed_secs,
                error = %e,
                "Failed to record session, play time lost"
            );
            None
        }
    };

    if let Err(e) = store.clear_session_marker(game_id) {
        warn!(game_id = %game_id, error = %e, "Failed to clear session marker");
    }

    AccountingOutcome {
        elapsed_secs,
        committed: game.is_some(),
        game,
    }
}
