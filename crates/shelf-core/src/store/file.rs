//! On-disk store: one JSON document per record.
//!
//! Layout under the data directory:
//!
//! ```text
//! games/000/000/023/game.json   game record for id "23"
//! games/000/000/023/pid.json    session marker (only while running)
//! runners/<id>.json             runner definitions
//! ```
//!
//! Writes go to a temporary sibling file that is then renamed over the
//! target, so readers never observe a half-written record.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::GameStore;
use crate::{Game, GameId, Runner, SessionMarker, StoreError, StoreResult};

const GAMES_DIR: &str = "games";
const RUNNERS_DIR: &str = "runners";
const GAME_FILE: &str = "game.json";
const MARKER_FILE: &str = "pid.json";

/// File-backed `GameStore`.
#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    /// Opens (creating if necessary) a store rooted at `data_dir`.
    pub fn open(data_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let data_dir = data_dir.into();
        for sub in [GAMES_DIR, RUNNERS_DIR] {
            let dir = data_dir.join(sub);
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }
        debug!(data_dir = %data_dir.display(), "File store opened");
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding all files of one game.
    ///
    /// # Errors
    /// `StoreError::InvalidId` if the id would escape the games directory.
    pub fn game_dir(&self, id: &GameId) -> StoreResult<PathBuf> {
        id.validate()?;
        let [a, b, c] = id.shard_components();
        Ok(self.data_dir.join(GAMES_DIR).join(a).join(b).join(c))
    }

    fn game_path(&self, id: &GameId) -> StoreResult<PathBuf> {
        Ok(self.game_dir(id)?.join(GAME_FILE))
    }

    fn marker_path(&self, id: &GameId) -> StoreResult<PathBuf> {
        Ok(self.game_dir(id)?.join(MARKER_FILE))
    }

    fn runner_path(&self, id: &str) -> StoreResult<PathBuf> {
        let id = id.to_lowercase();
        if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\', '\0']) {
            return Err(StoreError::RunnerNotFound(id));
        }
        Ok(self.data_dir.join(RUNNERS_DIR).join(format!("{id}.json")))
    }

    /// Collects every directory containing a marker file.
    fn marker_dirs(&self) -> StoreResult<Vec<PathBuf>> {
        let mut found = Vec::new();
        let mut pending = vec![self.data_dir.join(GAMES_DIR)];

        while let Some(dir) = pending.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::io(&dir, e)),
            };

            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if path.file_name().is_some_and(|n| n == MARKER_FILE) {
                    if let Some(parent) = path.parent() {
                        found.push(parent.to_path_buf());
                    }
                }
            }
        }

        Ok(found)
    }
}

// ============================================================================
// Blocking Filesystem Helpers
// ============================================================================

/// Reads and decodes a JSON document, mapping a missing file to `None`.
fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| StoreError::malformed(path, e))
}

/// Encodes and atomically replaces a JSON document.
fn write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let body = serde_json::to_string_pretty(value).map_err(|e| StoreError::malformed(path, e))?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}

impl GameStore for FileStore {
    fn load_game(&self, id: &GameId) -> StoreResult<Game> {
        read_json(&self.game_path(id)?)?.ok_or_else(|| StoreError::GameNotFound(id.clone()))
    }

    fn save_game(&self, game: &Game) -> StoreResult<()> {
        write_json(&self.game_path(&game.id)?, game)
    }

    fn load_runner(&self, id: &str) -> StoreResult<Runner> {
        read_json(&self.runner_path(id)?)?.ok_or_else(|| StoreError::RunnerNotFound(id.to_string()))
    }

    fn save_runner(&self, runner: &Runner) -> StoreResult<()> {
        write_json(&self.runner_path(&runner.id)?, runner)
    }

    fn put_session_marker(&self, id: &GameId, marker: &SessionMarker) -> StoreResult<()> {
        write_json(&self.marker_path(id)?, marker)
    }

    fn read_session_marker(&self, id: &GameId) -> StoreResult<Option<SessionMarker>> {
        read_json(&self.marker_path(id)?)
    }

    fn clear_session_marker(&self, id: &GameId) -> StoreResult<()> {
        let path = self.marker_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    fn list_session_markers(&self) -> StoreResult<Vec<(GameId, SessionMarker)>> {
        let mut markers = Vec::new();

        for dir in self.marker_dirs()? {
            // The marker does not carry the id; the game record next to it does
            let game: Option<Game> = match read_json(&dir.join(GAME_FILE)) {
                Ok(g) => g,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping marker with unreadable game record");
                    continue;
                }
            };
            let Some(game) = game else {
                warn!(dir = %dir.display(), "Skipping marker without a game record");
                continue;
            };

            match read_json::<SessionMarker>(&dir.join(MARKER_FILE)) {
                Ok(Some(marker)) => markers.push((game.id, marker)),
                Ok(None) => {}
                Err(e) => {
                    warn!(game_id = %game.id, error = %e, "Skipping unreadable session marker");
                }
            }
        }

        Ok(markers)
    }
}
