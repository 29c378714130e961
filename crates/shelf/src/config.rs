//! Application configuration.
//!
//! Read from `<config_dir>/shelf/config.toml`. A missing file means
//! defaults. `SHELF_CONFIG` points at a different file and `SHELF_DATA_DIR`
//! overrides the data directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shelf_tracker::TrackerConfig;
use thiserror::Error;
use tracing::debug;

/// Environment variable overriding the config file path.
pub const CONFIG_ENV: &str = "SHELF_CONFIG";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "SHELF_DATA_DIR";

/// Errors loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level configuration.
///
/// ```toml
/// data_dir = "/home/me/.local/share/shelf"
///
/// [tracker]
/// launch_grace_ms = 500
/// dir_poll_interval_ms = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root of the game store
    pub data_dir: PathBuf,

    pub tracker: TrackerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads the configuration the way the binary does: config path from
    /// `SHELF_CONFIG` or the default location, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(default_config_path);

        let config = match path {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };

        Ok(config.with_data_dir_override(std::env::var_os(DATA_DIR_ENV).map(PathBuf::from)))
    }

    /// Loads `path`, falling back to defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    #[must_use]
    pub fn with_data_dir_override(mut self, data_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = data_dir.filter(|d| !d.as_os_str().is_empty()) {
            self.data_dir = dir;
        }
        self
    }
}

/// `<config_dir>/shelf/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("shelf").join("config.toml"))
}

/// `<data_dir>/shelf`, or `./shelf-data` when the platform has no data dir.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("shelf"))
        .unwrap_or_else(|| PathBuf::from("shelf-data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_partial_tracker_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "data_dir = \"/srv/games\"\n\n[tracker]\ndir_poll_interval_ms = 2000\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/games"));
        assert_eq!(config.tracker.dir_poll_interval_ms, 2000);
        assert_eq!(
            config.tracker.launch_grace_ms,
            TrackerConfig::default().launch_grace_ms
        );
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[tracker]\nlaunch_grace_ms = \"soon\"\n").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_data_dir_override() {
        let config = AppConfig::default().with_data_dir_override(Some("/tmp/shelf".into()));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/shelf"));

        let config = AppConfig::default().with_data_dir_override(Some(PathBuf::new()));
        assert_eq!(config.data_dir, default_data_dir());

        let config = AppConfig::default().with_data_dir_override(None);
        assert_eq!(config.data_dir, default_data_dir());
    }
}
