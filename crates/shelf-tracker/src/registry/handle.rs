//! Client interface for interacting with the TrackerActor.
//!
//! The `TrackerHandle` is a cheap-to-clone interface for sending commands to
//! the tracker actor and subscribing to session events.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `TrackerError::ChannelClosed`

use shelf_core::GameId;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{ReconcileReport, RunningSession, SessionEvent, TrackerCommand};
use crate::error::TrackerError;
use crate::launcher::{LaunchReport, LaunchRequest};

// ============================================================================
// Tracker Handle
// ============================================================================

/// Handle for launching games and observing their sessions.
///
/// # Usage
///
/// ```ignore
/// let mut events = handle.subscribe();
/// let report = handle.launch(LaunchRequest::for_game(&game, &runner)).await?;
///
/// while let Ok(event) = events.recv().await {
///     if let SessionEvent::Ended { .. } = event {
///         break;
///     }
/// }
/// ```
#[derive(Clone)]
pub struct TrackerHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<TrackerCommand>,

    /// Event broadcaster for subscribing to session lifecycle
    event_sender: broadcast::Sender<SessionEvent>,
}

impl TrackerHandle {
    pub fn new(
        sender: mpsc::Sender<TrackerCommand>,
        event_sender: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Launches a game.
    ///
    /// Resolves once the process has survived the grace window (or failed
    /// within it). The end of the session arrives later as
    /// `SessionEvent::Ended`.
    ///
    /// # Errors
    ///
    /// - `TrackerError::AlreadyRunning` if the game has a session marker or
    ///   a launch in flight
    /// - `TrackerError::Launch` if the process could not be started or
    ///   exited with a failure status immediately
    /// - `TrackerError::Store` if the game record cannot be read or the
    ///   marker cannot be written
    /// - `TrackerError::ChannelClosed` if the actor has shut down
    pub async fn launch(&self, request: LaunchRequest) -> Result<LaunchReport, TrackerError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TrackerCommand::Launch {
                request: Box::new(request),
                respond_to: tx,
            })
            .await
            .map_err(|_| TrackerError::ChannelClosed)?;

        rx.await.map_err(|_| TrackerError::ChannelClosed)?
    }

    /// Whether the game has a session marker.
    ///
    /// Returns `false` if the actor has shut down.
    pub async fn is_running(&self, game_id: impl Into<GameId>) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(TrackerCommand::IsRunning {
                game_id: game_id.into(),
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return false;
        }

        rx.await.unwrap_or(false)
    }

    /// Terminates a running game.
    ///
    /// Returns `Ok(false)` if the game was not running. The session is still
    /// accounted for; its `Ended` event carries `killed: true`.
    ///
    /// # Errors
    ///
    /// - `TrackerError::Store` if the marker cannot be read
    /// - `TrackerError::ChannelClosed` if the actor has shut down
    pub async fn kill(&self, game_id: impl Into<GameId>) -> Result<bool, TrackerError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TrackerCommand::Kill {
                game_id: game_id.into(),
                respond_to: tx,
            })
            .await
            .map_err(|_| TrackerError::ChannelClosed)?;

        rx.await.map_err(|_| TrackerError::ChannelClosed)?
    }

    /// Sessions owned by live monitors, sorted by game id.
    ///
    /// Returns an empty vector if the actor has shut down.
    pub async fn running_sessions(&self) -> Vec<RunningSession> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(TrackerCommand::RunningSessions { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Re-attaches monitors to persisted sessions whose process is still
    /// alive and clears the rest. Run once at startup.
    ///
    /// # Errors
    ///
    /// - `TrackerError::Store` if the markers cannot be listed
    /// - `TrackerError::ChannelClosed` if the actor has shut down
    pub async fn reconcile(&self) -> Result<ReconcileReport, TrackerError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TrackerCommand::Reconcile { respond_to: tx })
            .await
            .map_err(|_| TrackerError::ChannelClosed)?;

        rx.await.map_err(|_| TrackerError::ChannelClosed)?
    }

    /// Subscribe to session lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_sender.subscribe()
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
