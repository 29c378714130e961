//! Command-line interface.
//!
//! `launch` stays in the foreground until the session ends, running the UI
//! bridge with a console notifier. Ctrl-C while a game runs asks the tracker
//! to stop it; the session is still accounted for.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use shelf_core::{FileStore, Game, GameId, GameStore, SessionMarker};
use shelf_tracker::{spawn_tracker, LaunchRequest, SessionEvent, TrackerHandle};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::{format_duration, run_bridge, ConsoleNotifier};
use crate::config::AppConfig;

// ============================================================================
// CLI Arguments
// ============================================================================

/// shelf - launch games and track play time
#[derive(Parser, Debug)]
#[command(name = "shelf", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Data directory (overrides config and SHELF_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Launch a game and wait for the session to end
    Launch {
        /// Game id
        game: String,

        /// File to launch, absolute or relative to the install directory
        #[arg(long)]
        file: Option<PathBuf>,

        /// Launcher id appended to the runner command
        #[arg(long)]
        launcher_id: Option<String>,

        /// Runner id, if the game has none or to use a different one
        #[arg(long)]
        runner: Option<String>,
    },

    /// Show running games, or the record of one game
    Status {
        /// Game id
        game: Option<String>,
    },

    /// Stop a running game
    Kill {
        /// Game id
        game: String,
    },

    /// Pick up games left running by an earlier session and clear stale flags
    Reconcile,
}

// ============================================================================
// Command Execution
// ============================================================================

/// Runs `command` against the store in `config.data_dir`.
pub async fn execute(command: Command, config: AppConfig) -> Result<()> {
    let store = Arc::new(
        FileStore::open(&config.data_dir)
            .with_context(|| format!("Failed to open data directory {}", config.data_dir.display()))?,
    );
    debug!(data_dir = %config.data_dir.display(), "Store opened");

    match command {
        Command::Launch {
            game,
            file,
            launcher_id,
            runner,
        } => {
            let request = build_request(store.as_ref(), &game, file, launcher_id, runner)?;
            let tracker = start_tracker(&store, &config).await;
            launch_and_wait(&tracker, request).await
        }
        Command::Status { game: Some(game) } => print_game(store.as_ref(), &game.parse::<GameId>()?),
        Command::Status { game: None } => print_running(store.as_ref()),
        Command::Kill { game } => {
            let tracker = start_tracker(&store, &config).await;
            kill_and_wait(&tracker, game.parse::<GameId>()?, &config).await
        }
        Command::Reconcile => {
            let tracker = spawn_tracker(store, config.tracker.clone());
            let report = tracker.reconcile().await.context("Reconcile failed")?;
            for id in &report.cleared {
                println!("{id}: cleared stale running flag");
            }
            for id in report.reattached.iter().chain(&report.skipped) {
                println!("{id}: still running");
            }
            if report.is_empty() {
                println!("Nothing to reconcile.");
            }
            Ok(())
        }
    }
}

/// Spawns the tracker and performs the startup reconciliation.
async fn start_tracker(store: &Arc<FileStore>, config: &AppConfig) -> TrackerHandle {
    let tracker = spawn_tracker(store.clone(), config.tracker.clone());
    match tracker.reconcile().await {
        Ok(report) if !report.cleared.is_empty() => {
            info!(cleared = ?report.cleared, "Cleared stale session markers");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Startup reconcile failed"),
    }
    tracker
}

/// Resolves the game and its runner into a launch request.
pub fn build_request(
    store: &dyn GameStore,
    game: &str,
    file: Option<PathBuf>,
    launcher_id: Option<String>,
    runner: Option<String>,
) -> Result<LaunchRequest> {
    let game_id: GameId = game.parse()?;
    let game = store
        .load_game(&game_id)
        .with_context(|| format!("Unknown game {game_id}"))?;

    let Some(runner_id) = runner.or_else(|| game.runner.clone()) else {
        bail!("Game {game_id} has no runner; pass --runner <id>");
    };
    let runner = store
        .load_runner(&runner_id)
        .with_context(|| format!("Unknown runner {runner_id}"))?;

    if !runner.supports_platform(std::env::consts::OS) {
        warn!(runner = %runner.id, platforms = ?runner.platforms, "Runner does not list this platform");
    }

    let mut request = LaunchRequest::for_game(&game, &runner);
    if let Some(file) = file {
        request = request.with_file(file);
    }
    if let Some(launcher_id) = launcher_id {
        request = request.with_launcher_id(launcher_id);
    }

    // A file only matters when neither a launcher id nor the directory is passed
    let needs_file = request.file_path.is_none()
        && request.launcher_id.is_none()
        && !game.is_directory_launch();
    let files = game
        .installation
        .as_ref()
        .map(|i| i.files.as_slice())
        .unwrap_or_default();
    if needs_file && files.len() > 1 {
        let choices: Vec<String> = files.iter().map(|f| f.display().to_string()).collect();
        bail!(
            "Game {game_id} has several launchable files; pass --file with one of: {}",
            choices.join(", ")
        );
    }
    Ok(request)
}

async fn launch_and_wait(tracker: &TrackerHandle, request: LaunchRequest) -> Result<()> {
    let game_id = request.game_id.clone();
    let cancel = CancellationToken::new();
    let bridge = tokio::spawn(run_bridge(
        tracker.subscribe(),
        ConsoleNotifier,
        cancel.clone(),
    ));
    let mut events = tracker.subscribe();

    let result = tracker.launch(request).await;
    if let Err(e) = result {
        cancel.cancel();
        let _ = bridge.await;
        return Err(e).with_context(|| format!("Failed to launch {game_id}"));
    }

    let mut stop_requested = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::Ended { game_id: ended, .. }) if ended == game_id => break,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    if !tracker.is_running(game_id.clone()).await {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c(), if !stop_requested => {
                if let Err(e) = signal {
                    warn!(error = %e, "Cannot listen for Ctrl-C");
                }
                stop_requested = true;
                tracker
                    .kill(game_id.clone())
                    .await
                    .context("Failed to stop game")?;
            }
        }
    }

    cancel.cancel();
    let _ = bridge.await;
    Ok(())
}

async fn kill_and_wait(tracker: &TrackerHandle, game_id: GameId, config: &AppConfig) -> Result<()> {
    if !tracker.kill(game_id.clone()).await.context("Failed to stop game")? {
        println!("{game_id} is not running.");
        return Ok(());
    }

    // Escalation plus one directory confirmation
    let deadline = config.tracker.kill_timeout()
        + config.tracker.dir_poll_interval()
        + config.tracker.dir_grace()
        + Duration::from_secs(2);
    let stopped = tokio::time::timeout(deadline, async {
        while tracker.is_running(game_id.clone()).await {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .is_ok();

    if stopped {
        println!("{game_id} stopped.");
        Ok(())
    } else {
        bail!("{game_id} did not stop within {}s", deadline.as_secs())
    }
}

// ============================================================================
// Status Output
// ============================================================================

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn describe_marker(marker: &SessionMarker) -> String {
    let target = match marker.tracked_pid() {
        Some(pid) => format!("pid {pid}"),
        None => "install directory".to_string(),
    };
    format!("running since {} ({target})", local_time(marker.created_at))
}

/// Renders the record of one game.
pub fn render_game(game: &Game, marker: Option<&SessionMarker>) -> String {
    let never = || "never".to_string();
    let mut lines = vec![
        format!("{} ({})", game.title, game.id),
        format!("  status:       {}", game.completion_status),
        format!("  play count:   {}", game.play_count),
        format!("  play time:    {}", format_duration(game.play_time)),
        format!(
            "  first played: {}",
            game.first_played.map(local_time).unwrap_or_else(never)
        ),
        format!(
            "  last played:  {}",
            game.last_played.map(local_time).unwrap_or_else(never)
        ),
    ];
    if let Some(runner) = &game.runner {
        lines.push(format!("  runner:       {runner}"));
    }
    if let Some(marker) = marker {
        lines.push(format!("  {}", describe_marker(marker)));
    }
    lines.join("\n")
}

fn print_game(store: &dyn GameStore, game_id: &GameId) -> Result<()> {
    let game = store
        .load_game(game_id)
        .with_context(|| format!("Unknown game {game_id}"))?;
    let marker = store
        .read_session_marker(game_id)
        .with_context(|| format!("Failed to read session marker of {game_id}"))?;
    println!("{}", render_game(&game, marker.as_ref()));
    Ok(())
}

fn print_running(store: &dyn GameStore) -> Result<()> {
    let markers = store
        .list_session_markers()
        .context("Failed to list running games")?;
    if markers.is_empty() {
        println!("No games running.");
        return Ok(());
    }

    for (game_id, marker) in markers {
        let title = store
            .load_game(&game_id)
            .map(|g| g.title)
            .unwrap_or_else(|_| game_id.to_string());
        println!("{title} ({game_id}): {}", describe_marker(&marker));
    }
    Ok(())
}
