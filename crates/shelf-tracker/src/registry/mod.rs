//! Session registry using the actor pattern.
//!
//! The tracker actor is the central owner of live play sessions. The
//! application root spawns it once and passes the returned handle around;
//! there is no global session table.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │  TrackerHandle  │────▶│  TrackerActor   │────▶│ Broadcast Channel│
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                    ▲      │                    │
//!         │  TrackerCommand    │      │ SessionEvent       │
//!         │  (mpsc channel)    │      │                    ▼
//!         ▼                    │      ▼               UI bridge
//!   launch / kill /     SessionExited HashMap<GameId,
//!   reconcile           (monitors)    ActiveSession>
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use std::sync::Arc;

use shelf_core::GameStore;
use tokio::sync::{broadcast, mpsc};

use crate::config::TrackerConfig;

mod actor;
mod commands;
mod handle;

pub use actor::TrackerActor;
pub use commands::{
    MonitorKind, ReconcileReport, RunningSession, SessionEvent, SettledLaunch, TrackerCommand,
};
pub use handle::TrackerHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 100;

/// Spawn the tracker actor and return a handle for interaction.
///
/// Must be called from within a tokio runtime. The actor runs until every
/// handle has been dropped and every monitored session has ended.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use shelf_core::MemoryStore;
/// use shelf_tracker::{spawn_tracker, TrackerConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_tracker(Arc::new(MemoryStore::new()), TrackerConfig::default());
///     let sessions = handle.running_sessions().await;
///     assert!(sessions.is_empty());
/// }
/// ```
pub fn spawn_tracker(store: Arc<dyn GameStore>, config: TrackerConfig) -> TrackerHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = TrackerActor::new(cmd_rx, cmd_tx.downgrade(), store, config, event_tx.clone());
    tokio::spawn(actor.run());

    TrackerHandle::new(cmd_tx, event_tx)
}
