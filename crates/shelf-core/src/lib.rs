//! shelf core - domain types and persistence for game session tracking
//!
//! This crate provides the types shared between the tracker (process
//! launching and monitoring) and the front end:
//! - `game` - game records, identifiers and installation metadata
//! - `status` - completion status and the activity promotion rule
//! - `runner` - runner launch command templates
//! - `marker` - the durable "game is running" session marker
//! - `store` - the persistence interface and its file/memory backends
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod game;
pub mod marker;
pub mod runner;
pub mod status;
pub mod store;

// Re-exports for convenience
pub use error::{DomainError, DomainResult, StoreError, StoreResult};
pub use game::{Game, GameId, Installation};
pub use marker::{SessionMarker, DIRECTORY_SENTINEL_PID};
pub use runner::Runner;
pub use status::CompletionStatus;
pub use store::{FileStore, GameStore, MemoryStore};
