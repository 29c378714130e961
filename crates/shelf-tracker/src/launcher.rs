//! Process launcher: command line assembly and spawn with failure detection.
//!
//! The launcher never touches the store. The registry decides whether a
//! launch may proceed and records the marker once the launcher reports a
//! healthy process.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serde::Serialize;
use shelf_core::{Game, GameId, Installation, Runner};
use tracing::{debug, info, warn};

use crate::error::LaunchError;
use crate::registry::MonitorKind;

// ============================================================================
// Launch Request
// ============================================================================

/// Everything needed to launch one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub game_id: GameId,

    /// Runner command line, split on whitespace
    pub command: String,

    /// File to launch, absolute or relative to the install directory
    pub file_path: Option<PathBuf>,

    /// Opaque launcher id appended to the last command token
    pub launcher_id: Option<String>,

    /// Track the session by install directory instead of pid
    pub directory_monitoring: bool,
}

impl LaunchRequest {
    pub fn new(game_id: impl Into<GameId>, command: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            command: command.into(),
            file_path: None,
            launcher_id: None,
            directory_monitoring: false,
        }
    }

    /// Builds a request from a game and the runner it is associated with.
    ///
    /// Takes the runner's monitoring mode. A game whose installation carries
    /// a launcher id is launched through it when the runner monitors by
    /// directory (store clients such as Steam take the app id). An
    /// installation with exactly one launchable file launches that file;
    /// with several, the caller has to pick one with `with_file`.
    pub fn for_game(game: &Game, runner: &Runner) -> Self {
        let installation = game.installation.as_ref();
        let launcher_id = if runner.directory_monitoring {
            installation.and_then(|i| i.launcher_id.clone())
        } else {
            None
        };
        let file_path = match installation.map(|i| i.files.as_slice()) {
            Some([only]) => Some(only.clone()),
            _ => None,
        };

        Self {
            game_id: game.id.clone(),
            command: runner.command.clone(),
            file_path,
            launcher_id,
            directory_monitoring: runner.directory_monitoring,
        }
    }

    #[must_use]
    pub fn with_file(mut self, file_path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    #[must_use]
    pub fn with_launcher_id(mut self, launcher_id: impl Into<String>) -> Self {
        self.launcher_id = Some(launcher_id.into());
        self
    }

    #[must_use]
    pub fn with_directory_monitoring(mut self, enabled: bool) -> Self {
        self.directory_monitoring = enabled;
        self
    }
}

/// Result of a successful launch, returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchReport {
    pub game_id: GameId,
    pub pid: u32,
    pub monitor: MonitorKind,
    /// Play count after this launch, if the counter write succeeded
    pub play_count: Option<u32>,
}

// ============================================================================
// Command Line Assembly
// ============================================================================

/// Builds the final argument vector for a launch.
///
/// Precedence: a launcher id is glued onto the last command token; otherwise
/// a directory-launched game gets its install directory appended; otherwise
/// a file path is resolved against the install directory and appended.
///
/// # Errors
/// - `LaunchError::EmptyCommand` if the command has no tokens
pub fn build_command_line(
    command: &str,
    installation: Option<&Installation>,
    file_path: Option<&Path>,
    launcher_id: Option<&str>,
) -> Result<Vec<OsString>, LaunchError> {
    let mut argv: Vec<OsString> = command.split_whitespace().map(OsString::from).collect();

    if argv.is_empty() {
        return Err(LaunchError::EmptyCommand);
    }

    if let Some(launcher_id) = launcher_id {
        if let Some(last) = argv.last_mut() {
            last.push(launcher_id);
        }
    } else if let Some(install) = installation.filter(|i| i.directory_launch) {
        argv.push(install.directory.clone().into_os_string());
    } else if let Some(file) = file_path {
        let resolved = match installation {
            Some(install) => install.resolve(file).into_owned(),
            None => file.to_path_buf(),
        };
        argv.push(resolved.into_os_string());
    }

    Ok(argv)
}

// ============================================================================
// Spawning
// ============================================================================

/// Starts the process described by `argv`.
///
/// The process runs from `working_dir` when it is an existing directory, so
/// games that load assets relative to their cwd work. Directory-monitored
/// launches pass `None`: anything the runner forks would inherit the cwd and
/// be attributed to the game.
///
/// # Errors
/// - `LaunchError::EmptyCommand` if `argv` is empty
/// - `LaunchError::Spawn` if the program is missing or not executable
pub fn spawn(
    game_id: &GameId,
    argv: &[OsString],
    working_dir: Option<&Path>,
) -> Result<Child, LaunchError> {
    let (program, args) = argv.split_first().ok_or(LaunchError::EmptyCommand)?;

    info!(
        game_id = %game_id,
        command = ?argv,
        "Launching game"
    );

    let mut command = Command::new(program);
    command.args(args).stdin(Stdio::null());
    if let Some(dir) = working_dir.filter(|d| d.is_dir()) {
        command.current_dir(dir);
    }

    let child = command
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            program: program.to_string_lossy().into_owned(),
            source,
        })?;

    debug!(game_id = %game_id, pid = child.id(), "Game process spawned");
    Ok(child)
}

/// Samples a freshly spawned child once for immediate failure.
///
/// A child that already exited with a failure status is a failed launch.
/// A child that exited successfully is a (very short) valid session, and a
/// child still running is healthy.
pub fn check_immediate_failure(child: &mut Child, program: &str) -> Result<(), LaunchError> {
    match child.try_wait() {
        Ok(Some(status)) if !status.success() => {
            warn!(program, pid = child.id(), %status, "Game process failed immediately");
            Err(LaunchError::ExitedImmediately {
                program: program.to_string(),
                status: status.to_string(),
            })
        }
        Ok(Some(status)) => {
            debug!(program, pid = child.id(), %status, "Game process already finished");
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            // Cannot tell; let the monitor decide
            warn!(program, error = %e, "Failed to sample game process");
            Ok(())
        }
    }
}

/// Waits out the grace window, then samples the child for failure.
pub async fn settle(mut child: Child, program: String, grace: Duration) -> (Child, Result<(), LaunchError>) {
    tokio::time::sleep(grace).await;
    let outcome = check_immediate_failure(&mut child, &program);
    (child, outcome)
}

/// Display name of the program in `argv`, for logs and errors.
pub fn program_name(argv: &[OsString]) -> String {
    argv.first()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_plain_command() {
        let argv = build_command_line("retroarch -L core.so", None, None, None).unwrap();
        assert_eq!(argv, os(&["retroarch", "-L", "core.so"]));
    }

    #[test]
    fn test_empty_command_fails() {
        let result = build_command_line("   ", None, None, None);
        assert!(matches!(result, Err(LaunchError::EmptyCommand)));
    }

    #[test]
    fn test_launcher_id_glued_to_last_token() {
        let argv =
            build_command_line("steam steam://rungameid/", None, None, Some("620")).unwrap();
        assert_eq!(argv, os(&["steam", "steam://rungameid/620"]));
    }

    #[test]
    fn test_launcher_id_wins_over_file_and_directory() {
        let mut install = Installation::new("/games/portal");
        install.directory_launch = true;
        let argv = build_command_line(
            "steam steam://rungameid/",
            Some(&install),
            Some(Path::new("portal.sh")),
            Some("400"),
        )
        .unwrap();
        assert_eq!(argv, os(&["steam", "steam://rungameid/400"]));
    }

    #[test]
    fn test_directory_launch_appends_install_dir() {
        let mut install = Installation::new("/games/zelda");
        install.directory_launch = true;
        let argv = build_command_line(
            "cemu -g",
            Some(&install),
            Some(Path::new("ignored.rpx")),
            None,
        )
        .unwrap();
        assert_eq!(argv, os(&["cemu", "-g", "/games/zelda"]));
    }

    #[test]
    fn test_relative_file_resolved_against_install_dir() {
        let install = Installation::new("/games/doom");
        let argv = build_command_line(
            "gzdoom -iwad",
            Some(&install),
            Some(Path::new("DOOM2.WAD")),
            None,
        )
        .unwrap();
        assert_eq!(argv, os(&["gzdoom", "-iwad", "/games/doom/DOOM2.WAD"]));
    }

    #[test]
    fn test_absolute_file_kept() {
        let install = Installation::new("/games/doom");
        let argv = build_command_line(
            "gzdoom",
            Some(&install),
            Some(Path::new("/mods/brutal.pk3")),
            None,
        )
        .unwrap();
        assert_eq!(argv, os(&["gzdoom", "/mods/brutal.pk3"]));
    }

    #[test]
    fn test_for_game_uses_launcher_id_only_for_directory_runners() {
        let mut install = Installation::new("/games/hades");
        install.launcher_id = Some("1145360".into());
        let game = Game::new("hades", "Hades").with_installation(install);

        let steam = Runner::new("steam", "Steam", "steam steam://rungameid/")
            .with_directory_monitoring(true);
        let request = LaunchRequest::for_game(&game, &steam);
        assert_eq!(request.launcher_id.as_deref(), Some("1145360"));
        assert!(request.directory_monitoring);

        let wine = Runner::new("wine", "Wine", "wine");
        let request = LaunchRequest::for_game(&game, &wine);
        assert!(request.launcher_id.is_none());
        assert!(!request.directory_monitoring);
    }

    #[test]
    fn test_for_game_defaults_to_the_only_file() {
        let mut install = Installation::new("/games/doom");
        install.files = vec![PathBuf::from("DOOM2.WAD")];
        let game = Game::new("23", "Doom II").with_installation(install.clone());
        let gzdoom = Runner::new("gzdoom", "GZDoom", "gzdoom -iwad");

        let request = LaunchRequest::for_game(&game, &gzdoom);
        assert_eq!(request.file_path, Some(PathBuf::from("DOOM2.WAD")));

        install.files.push(PathBuf::from("PLUTONIA.WAD"));
        let game = Game::new("23", "Doom II").with_installation(install);
        let request = LaunchRequest::for_game(&game, &gzdoom);
        assert!(request.file_path.is_none());

        let request = request.with_file("PLUTONIA.WAD");
        assert_eq!(request.file_path, Some(PathBuf::from("PLUTONIA.WAD")));
    }

    #[test]
    fn test_spawn_missing_program_fails() {
        let argv = os(&["/nonexistent/shelf-test-binary"]);
        let result = spawn(&GameId::new("1"), &argv, None);
        assert!(matches!(result, Err(LaunchError::Spawn { .. })));
    }

    #[test]
    fn test_spawn_runs_in_existing_working_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let argv = os(&["sleep", "5"]);

        let mut child = spawn(&GameId::new("1"), &argv, Some(temp_dir.path())).unwrap();
        let cwd = std::fs::read_link(format!("/proc/{}/cwd", child.id())).unwrap();
        child.kill().unwrap();
        child.wait().unwrap();
        assert_eq!(cwd, temp_dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_spawn_ignores_missing_working_dir() {
        let argv = os(&["true"]);
        let mut child =
            spawn(&GameId::new("1"), &argv, Some(Path::new("/nonexistent/dir"))).unwrap();
        assert!(child.wait().unwrap().success());
    }

    #[tokio::test]
    async fn test_settle_detects_failure_exit() {
        let argv = os(&["false"]);
        let child = spawn(&GameId::new("1"), &argv, None).unwrap();
        let (mut child, outcome) = settle(child, "false".into(), Duration::from_millis(300)).await;
        assert!(matches!(outcome, Err(LaunchError::ExitedImmediately { .. })));
        child.wait().unwrap();
    }

    #[tokio::test]
    async fn test_settle_accepts_quick_success() {
        let argv = os(&["true"]);
        let child = spawn(&GameId::new("1"), &argv, None).unwrap();
        let (mut child, outcome) = settle(child, "true".into(), Duration::from_millis(300)).await;
        assert!(outcome.is_ok());
        child.wait().unwrap();
    }

    #[tokio::test]
    async fn test_settle_accepts_running_process() {
        let argv = os(&["sleep", "5"]);
        let child = spawn(&GameId::new("1"), &argv, None).unwrap();
        let (mut child, outcome) = settle(child, "sleep".into(), Duration::from_millis(50)).await;
        assert!(outcome.is_ok());
        child.kill().unwrap();
        child.wait().unwrap();
    }
}
