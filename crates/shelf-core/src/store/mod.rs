//! Persistence interface consumed by the session tracker.
//!
//! `GameStore` is the narrow seam between process tracking and the data
//! layer. Backends implement record and marker storage; the counter
//! operations are provided on top of them so every backend applies the
//! completion-status rule the same way.
//!
//! # Backends
//!
//! - `FileStore` - one JSON file per record in a sharded directory tree
//! - `MemoryStore` - process-local maps, for tests and embedding

use chrono::{DateTime, Utc};

use crate::{Game, GameId, Runner, SessionMarker, StoreError, StoreResult};

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Durable storage for games, runners and session markers.
///
/// Implementations must be shareable across the registry task and monitor
/// threads.
pub trait GameStore: Send + Sync {
    // ------------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------------

    /// Loads a game record.
    ///
    /// # Errors
    /// - `StoreError::GameNotFound` if no record exists
    fn load_game(&self, id: &GameId) -> StoreResult<Game>;

    /// Durably writes a game record, replacing any previous version.
    fn save_game(&self, game: &Game) -> StoreResult<()>;

    /// Loads a runner by id.
    fn load_runner(&self, id: &str) -> StoreResult<Runner>;

    /// Durably writes a runner.
    fn save_runner(&self, runner: &Runner) -> StoreResult<()>;

    // ------------------------------------------------------------------------
    // Session markers
    // ------------------------------------------------------------------------

    /// Persists `marker` as the game's session marker.
    fn put_session_marker(&self, id: &GameId, marker: &SessionMarker) -> StoreResult<()>;

    /// Reads the game's session marker, if one exists.
    fn read_session_marker(&self, id: &GameId) -> StoreResult<Option<SessionMarker>>;

    /// Removes the game's session marker. Removing a missing marker is a no-op.
    fn clear_session_marker(&self, id: &GameId) -> StoreResult<()>;

    /// Lists every persisted marker.
    fn list_session_markers(&self) -> StoreResult<Vec<(GameId, SessionMarker)>>;

    /// Returns true if the game has a session marker.
    ///
    /// Unreadable markers count as present: a marker that exists but cannot
    /// be parsed still blocks a second launch.
    fn has_active_session(&self, id: &GameId) -> bool {
        !matches!(self.read_session_marker(id), Ok(None))
    }

    /// Writes a marker for `pid` stamped with the current time.
    ///
    /// `pid` may be `DIRECTORY_SENTINEL_PID` for directory-monitored sessions.
    fn write_session_marker(&self, id: &GameId, pid: i64) -> StoreResult<SessionMarker> {
        let marker = SessionMarker {
            pid,
            created_at: Utc::now(),
        };
        self.put_session_marker(id, &marker)?;
        Ok(marker)
    }

    /// Creation time of the game's marker.
    ///
    /// # Errors
    /// - `StoreError::MarkerNotFound` if the game is not running
    fn session_marker_created_at(&self, id: &GameId) -> StoreResult<DateTime<Utc>> {
        self.read_session_marker(id)?
            .map(|m| m.created_at)
            .ok_or_else(|| StoreError::MarkerNotFound(id.clone()))
    }

    // ------------------------------------------------------------------------
    // Accounting operations
    // ------------------------------------------------------------------------

    /// Loads the game, applies `change`, re-applies the completion-status
    /// rule, and saves the result in a single write.
    fn modify_game(&self, id: &GameId, change: &mut dyn FnMut(&mut Game)) -> StoreResult<Game> {
        let mut game = self.load_game(id)?;
        change(&mut game);
        game.reconcile_status();
        self.save_game(&game)?;
        Ok(game)
    }

    fn increment_play_count(&self, id: &GameId) -> StoreResult<Game> {
        self.modify_game(id, &mut |g: &mut Game| g.play_count = g.play_count.saturating_add(1))
    }

    fn set_play_count(&self, id: &GameId, count: u32) -> StoreResult<Game> {
        self.modify_game(id, &mut |g: &mut Game| g.play_count = count)
    }

    fn increment_play_time(&self, id: &GameId, seconds: u64) -> StoreResult<Game> {
        self.modify_game(id, &mut |g: &mut Game| g.play_time = g.play_time.saturating_add(seconds))
    }

    fn set_last_played(&self, id: &GameId, at: DateTime<Utc>) -> StoreResult<Game> {
        self.modify_game(id, &mut |g: &mut Game| g.last_played = Some(at))
    }

    fn set_first_played(&self, id: &GameId, at: DateTime<Utc>) -> StoreResult<Game> {
        self.modify_game(id, &mut |g: &mut Game| g.first_played = Some(at))
    }

    /// Applies a finished session in one write: adds `seconds` of play time,
    /// stamps `first_played` (if unset) and `last_played`.
    fn record_session(
        &self,
        id: &GameId,
        seconds: u64,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> StoreResult<Game> {
        self.modify_game(id, &mut |g: &mut Game| {
            g.play_time = g.play_time.saturating_add(seconds);
            if g.first_played.is_none() {
                g.first_played = Some(started_at);
            }
            g.last_played = Some(ended_at);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CompletionStatus;

    fn store_with_game(id: &str) -> MemoryStore {
        let store = MemoryStore::new();
        store.save_game(&Game::new(id, "Test Game")).unwrap();
        store
    }

    #[test]
    fn test_increment_play_count_promotes_status() {
        let store = store_with_game("1");
        let game = store.increment_play_count(&GameId::new("1")).unwrap();
        assert_eq!(game.play_count, 1);
        assert_eq!(game.completion_status, CompletionStatus::Played);
    }

    #[test]
    fn test_zeroing_play_count_demotes_status() {
        let store = store_with_game("1");
        let id = GameId::new("1");
        store.increment_play_count(&id).unwrap();

        let game = store.set_play_count(&id, 0).unwrap();
        assert_eq!(game.completion_status, CompletionStatus::NotPlayed);
    }

    #[test]
    fn test_zeroing_play_count_keeps_status_with_other_activity() {
        let store = store_with_game("1");
        let id = GameId::new("1");
        store.increment_play_count(&id).unwrap();
        store.increment_play_time(&id, 60).unwrap();

        let game = store.set_play_count(&id, 0).unwrap();
        assert_eq!(game.completion_status, CompletionStatus::Played);
    }

    #[test]
    fn test_timestamps_promote_status() {
        let store = store_with_game("1");
        let game = store.set_last_played(&GameId::new("1"), Utc::now()).unwrap();
        assert_eq!(game.completion_status, CompletionStatus::Played);
    }

    #[test]
    fn test_record_session_accumulates_and_keeps_first_played() {
        let store = store_with_game("1");
        let id = GameId::new("1");
        let first_start = Utc::now() - chrono::Duration::hours(2);
        let first_end = first_start + chrono::Duration::seconds(90);

        store.record_session(&id, 90, first_start, first_end).unwrap();

        let second_start = Utc::now();
        let game = store
            .record_session(&id, 30, second_start, second_start)
            .unwrap();

        assert_eq!(game.play_time, 120);
        assert_eq!(game.first_played, Some(first_start));
        assert_eq!(game.last_played, Some(second_start));
    }

    #[test]
    fn test_marker_lifecycle() {
        let store = store_with_game("1");
        let id = GameId::new("1");
        assert!(!store.has_active_session(&id));

        let marker = store.write_session_marker(&id, 1234).unwrap();
        assert!(store.has_active_session(&id));
        assert_eq!(store.session_marker_created_at(&id).unwrap(), marker.created_at);

        store.clear_session_marker(&id).unwrap();
        assert!(!store.has_active_session(&id));
        // Clearing twice is a no-op
        store.clear_session_marker(&id).unwrap();
    }

    #[test]
    fn test_created_at_without_marker_errors() {
        let store = store_with_game("1");
        let result = store.session_marker_created_at(&GameId::new("1"));
        assert!(matches!(result, Err(StoreError::MarkerNotFound(_))));
    }

    #[test]
    fn test_accounting_on_missing_game_errors() {
        let store = MemoryStore::new();
        let result = store.increment_play_count(&GameId::new("nope"));
        assert!(matches!(result, Err(StoreError::GameNotFound(_))));
    }
}
