//! Runner launch command templates.

use serde::{Deserialize, Serialize};

/// A configured external command used to launch games.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runner {
    pub id: String,

    pub title: String,

    /// Command line, split on whitespace at launch time
    pub command: String,

    /// The command is only an intermediary (a store client, a wrapper
    /// script); the session is tracked by scanning the install directory
    /// for processes instead of following the launched pid.
    #[serde(default)]
    pub directory_monitoring: bool,

    /// Platforms this runner can launch
    #[serde(default)]
    pub platforms: Vec<String>,
}

impl Runner {
    pub fn new(id: impl Into<String>, title: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into().to_lowercase(),
            title: title.into(),
            command: command.into(),
            directory_monitoring: false,
            platforms: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_directory_monitoring(mut self, enabled: bool) -> Self {
        self.directory_monitoring = enabled;
        self
    }

    /// Returns true if the runner supports `platform` (case-insensitive).
    ///
    /// A runner with no platform list is treated as universal.
    pub fn supports_platform(&self, platform: &str) -> bool {
        self.platforms.is_empty()
            || self
                .platforms
                .iter()
                .any(|p| p.eq_ignore_ascii_case(platform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_id_lowercased() {
        let runner = Runner::new("Steam", "Steam", "steam steam://rungameid/");
        assert_eq!(runner.id, "steam");
        assert!(!runner.directory_monitoring);
    }

    #[test]
    fn test_supports_platform() {
        let mut runner = Runner::new("wine", "Wine", "wine");
        assert!(runner.supports_platform("Windows"));

        runner.platforms = vec!["Windows".to_string()];
        assert!(runner.supports_platform("windows"));
        assert!(!runner.supports_platform("Linux"));
    }
}
