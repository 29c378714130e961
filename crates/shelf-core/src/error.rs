//! Domain and persistence error types following panic-free policy.

use std::path::PathBuf;

use thiserror::Error;

use crate::GameId;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Completion status label did not match any known status
    #[error("Invalid completion status: {0}")]
    InvalidCompletionStatus(String),

    /// Game id that cannot name a record directory
    #[error("Invalid game id: {0:?}")]
    InvalidGameId(String),
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Errors raised by a `GameStore` backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record exists for the requested game
    #[error("game not found: {0}")]
    GameNotFound(GameId),

    /// No record exists for the requested runner
    #[error("runner not found: {0}")]
    RunnerNotFound(String),

    /// The game has no session marker
    #[error("no session marker for game: {0}")]
    MarkerNotFound(GameId),

    /// Filesystem failure while reading or writing a record
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record on disk could not be encoded or decoded
    #[error("malformed record at {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// In-memory backend lock was poisoned by a panicking writer
    #[error("store lock poisoned")]
    Poisoned,

    /// The id cannot be mapped to a storage location
    #[error(transparent)]
    InvalidId(#[from] DomainError),
}

impl StoreError {
    /// Wraps an I/O error with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a malformed-record error from any displayable cause.
    pub fn malformed<E: std::fmt::Display>(path: impl Into<PathBuf>, err: E) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

/// Result type for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;
