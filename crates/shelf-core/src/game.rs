//! Game records and identifiers.

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CompletionStatus, DomainError, DomainResult};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Stable identifier of a game in the library.
///
/// Identifiers are case-insensitive; they are lower-cased on construction so
/// `"Game-7"` and `"game-7"` address the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(transparent)]
pub struct GameId(String);

impl GameId {
    /// Creates a new GameId, normalizing to lower case.
    ///
    /// Does not validate; ids from user input or disk go through `parse`.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().to_lowercase())
    }

    /// Creates a GameId from untrusted input.
    ///
    /// # Errors
    /// `DomainError::InvalidGameId` if the id is empty, contains a path
    /// separator or NUL, or starts with a dot.
    pub fn parse(id: impl Into<String>) -> DomainResult<Self> {
        let id = Self::new(id);
        id.validate()?;
        Ok(id)
    }

    /// Checks that the id is usable as a single path component.
    pub fn validate(&self) -> DomainResult<()> {
        let id = self.0.as_str();
        let unsafe_char = id.chars().any(|c| matches!(c, '/' | '\\' | '\0'));
        if id.is_empty() || id.starts_with('.') || unsafe_char {
            return Err(DomainError::InvalidGameId(self.0.clone()));
        }
        Ok(())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the id into the three directory levels used by the file store.
    ///
    /// The id is left-padded with zeros to nine characters, so game `23`
    /// lives under `000/000/023`. Longer ids keep their full tail in the
    /// last group.
    pub fn shard_components(&self) -> [String; 3] {
        let padded = format!("{:0>9}", self.0);
        let first: String = padded.chars().take(3).collect();
        let second: String = padded.chars().skip(3).take(3).collect();
        let rest: String = padded.chars().skip(6).collect();
        [first, second, rest]
    }
}

impl<'de> Deserialize<'de> for GameId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw).map_err(serde::de::Error::custom)
    }
}

impl FromStr for GameId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for GameId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for GameId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for GameId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Installation Metadata
// ============================================================================

/// Where and how a game is installed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Installation {
    /// Install directory of the game
    pub directory: PathBuf,

    /// Launchable files, absolute or relative to `directory`
    #[serde(default)]
    pub files: Vec<PathBuf>,

    /// Store/launcher that owns the install (e.g. "Steam", "GOG")
    #[serde(default)]
    pub launcher_type: Option<String>,

    /// Opaque id understood by the launcher (e.g. a Steam app id)
    #[serde(default)]
    pub launcher_id: Option<String>,

    /// The runner receives the install directory instead of a file
    #[serde(default)]
    pub directory_launch: bool,
}

impl Installation {
    /// Creates installation metadata rooted at `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Resolves a launch file against the install directory.
    ///
    /// Absolute paths are returned unchanged.
    pub fn resolve<'a>(&self, file: &'a Path) -> Cow<'a, Path> {
        if file.is_absolute() {
            Cow::Borrowed(file)
        } else {
            Cow::Owned(self.directory.join(file))
        }
    }
}

// ============================================================================
// Game Record
// ============================================================================

/// A game in the library, with its lifecycle counters.
///
/// Counters are mutated only through `GameStore` accounting operations,
/// which re-apply the completion-status rule after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,

    pub title: String,

    /// Runner id used to launch this game
    #[serde(default)]
    pub runner: Option<String>,

    #[serde(default)]
    pub play_count: u32,

    /// Accumulated play time in seconds
    #[serde(default)]
    pub play_time: u64,

    #[serde(default)]
    pub first_played: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_played: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completion_status: CompletionStatus,

    #[serde(default)]
    pub hidden: bool,

    #[serde(default)]
    pub created: Option<DateTime<Utc>>,

    #[serde(default)]
    pub installation: Option<Installation>,
}

impl Game {
    /// Creates a new, never-played game.
    pub fn new(id: impl Into<GameId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            runner: None,
            play_count: 0,
            play_time: 0,
            first_played: None,
            last_played: None,
            completion_status: CompletionStatus::NotPlayed,
            hidden: false,
            created: Some(Utc::now()),
            installation: None,
        }
    }

    /// Builder-style setter for the runner id.
    #[must_use]
    pub fn with_runner(mut self, runner: impl Into<String>) -> Self {
        self.runner = Some(runner.into().to_lowercase());
        self
    }

    /// Builder-style setter for installation metadata.
    #[must_use]
    pub fn with_installation(mut self, installation: Installation) -> Self {
        self.installation = Some(installation);
        self
    }

    /// Returns true if any play activity has been recorded.
    pub fn has_activity(&self) -> bool {
        self.play_count > 0
            || self.play_time > 0
            || self.first_played.is_some()
            || self.last_played.is_some()
    }

    /// Re-applies the completion-status rule to the current counters.
    pub fn reconcile_status(&mut self) {
        self.completion_status = self
            .completion_status
            .reconcile_with_activity(self.has_activity());
    }

    /// Install directory, if the game has installation metadata.
    pub fn install_dir(&self) -> Option<&Path> {
        self.installation.as_ref().map(|i| i.directory.as_path())
    }

    /// Whether the runner is handed the install directory instead of a file.
    pub fn is_directory_launch(&self) -> bool {
        self.installation
            .as_ref()
            .is_some_and(|i| i.directory_launch)
    }
}
