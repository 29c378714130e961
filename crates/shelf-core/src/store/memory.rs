//! In-memory store backed by mutex-guarded maps.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::GameStore;
use crate::{Game, GameId, Runner, SessionMarker, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    games: HashMap<GameId, Game>,
    runners: HashMap<String, Runner>,
    markers: HashMap<GameId, SessionMarker>,
}

/// Process-local `GameStore`. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl GameStore for MemoryStore {
    fn load_game(&self, id: &GameId) -> StoreResult<Game> {
        self.lock()?
            .games
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::GameNotFound(id.clone()))
    }

    fn save_game(&self, game: &Game) -> StoreResult<()> {
        self.lock()?.games.insert(game.id.clone(), game.clone());
        Ok(())
    }

    fn load_runner(&self, id: &str) -> StoreResult<Runner> {
        self.lock()?
            .runners
            .get(&id.to_lowercase())
            .cloned()
            .ok_or_else(|| StoreError::RunnerNotFound(id.to_string()))
    }

    fn save_runner(&self, runner: &Runner) -> StoreResult<()> {
        self.lock()?
            .runners
            .insert(runner.id.to_lowercase(), runner.clone());
        Ok(())
    }

    fn put_session_marker(&self, id: &GameId, marker: &SessionMarker) -> StoreResult<()> {
        self.lock()?.markers.insert(id.clone(), *marker);
        Ok(())
    }

    fn read_session_marker(&self, id: &GameId) -> StoreResult<Option<SessionMarker>> {
        Ok(self.lock()?.markers.get(id).copied())
    }

    fn clear_session_marker(&self, id: &GameId) -> StoreResult<()> {
        self.lock()?.markers.remove(id);
        Ok(())
    }

    fn list_session_markers(&self) -> StoreResult<Vec<(GameId, SessionMarker)>> {
        Ok(self
            .lock()?
            .markers
            .iter()
            .map(|(id, marker)| (id.clone(), *marker))
            .collect())
    }
}
