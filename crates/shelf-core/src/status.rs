//! Completion status of a game and the activity promotion rule.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{DomainError, DomainResult};

/// How far the user has progressed through a game.
///
/// Serialized with its human-readable label ("Not Played", "Plan to Play", ...)
/// so records stay readable on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompletionStatus {
    #[default]
    #[serde(rename = "Not Played")]
    NotPlayed,
    #[serde(rename = "Plan to Play")]
    PlanToPlay,
    #[serde(rename = "Playing")]
    Playing,
    #[serde(rename = "On Hold")]
    OnHold,
    #[serde(rename = "Abandoned")]
    Abandoned,
    #[serde(rename = "Played")]
    Played,
    #[serde(rename = "Beaten")]
    Beaten,
    #[serde(rename = "Completed")]
    Completed,
}

impl CompletionStatus {
    /// All statuses in display order.
    pub const ALL: [CompletionStatus; 8] = [
        Self::NotPlayed,
        Self::PlanToPlay,
        Self::Playing,
        Self::OnHold,
        Self::Abandoned,
        Self::Played,
        Self::Beaten,
        Self::Completed,
    ];

    /// Returns the human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotPlayed => "Not Played",
            Self::PlanToPlay => "Plan to Play",
            Self::Playing => "Playing",
            Self::OnHold => "On Hold",
            Self::Abandoned => "Abandoned",
            Self::Played => "Played",
            Self::Beaten => "Beaten",
            Self::Completed => "Completed",
        }
    }

    /// Parses a label, accepting exact or case-insensitive matches.
    ///
    /// An empty label means the game was never played.
    pub fn from_label(label: &str) -> DomainResult<Self> {
        if label.is_empty() {
            return Ok(Self::NotPlayed);
        }

        if let Some(status) = Self::ALL.iter().find(|s| s.label() == label) {
            return Ok(*status);
        }

        Self::ALL
            .iter()
            .find(|s| s.label().eq_ignore_ascii_case(label))
            .copied()
            .ok_or_else(|| DomainError::InvalidCompletionStatus(label.to_string()))
    }

    /// Applies the activity rule after a counter or timestamp changed.
    ///
    /// Any activity promotes `NotPlayed` to `Played`. No activity at all
    /// resets the "has been played" statuses back to `NotPlayed`. Every other
    /// status is left alone.
    #[must_use]
    pub fn reconcile_with_activity(self, has_activity: bool) -> Self {
        match (self, has_activity) {
            (Self::NotPlayed, true) => Self::Played,
            (Self::Playing | Self::Played | Self::Beaten | Self::Completed, false) => {
                Self::NotPlayed
            }
            (status, _) => status,
        }
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for CompletionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s)
    }
}
