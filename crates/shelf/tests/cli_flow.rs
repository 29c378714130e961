//! End-to-end tests of the command layer against an on-disk store.

use std::path::Path;
use std::time::Duration;

use shelf_app::cli::{execute, Command};
use shelf_app::AppConfig;
use shelf_core::{CompletionStatus, FileStore, Game, GameId, GameStore, Runner};
use shelf_tracker::TrackerConfig;
use tempfile::TempDir;
use tokio::time::timeout;

fn config_for(dir: &Path) -> AppConfig {
    AppConfig {
        data_dir: dir.to_path_buf(),
        tracker: TrackerConfig::fast(),
    }
}

fn seed(dir: &Path) -> FileStore {
    let store = FileStore::open(dir).expect("open store");
    store
        .save_runner(&Runner::new("shell", "Shell", "echo"))
        .expect("save runner");
    store
        .save_game(&Game::new("23", "Doom II").with_runner("shell"))
        .expect("save game");
    store
}

#[tokio::test]
async fn test_launch_runs_to_completion() {
    let dir = TempDir::new().unwrap();
    let store = seed(dir.path());

    timeout(
        Duration::from_secs(10),
        execute(
            Command::Launch {
                game: "23".into(),
                file: Some("DOOM2.WAD".into()),
                launcher_id: None,
                runner: None,
            },
            config_for(dir.path()),
        ),
    )
    .await
    .expect("launch should finish")
    .expect("launch should succeed");

    let game = store.load_game(&GameId::new("23")).unwrap();
    assert_eq!(game.play_count, 1);
    assert_eq!(game.play_time, 1);
    assert_eq!(game.completion_status, CompletionStatus::Played);
    assert!(!store.has_active_session(&GameId::new("23")));
}

#[tokio::test]
async fn test_launch_with_unknown_runner_fails() {
    let dir = TempDir::new().unwrap();
    let store = seed(dir.path());

    let err = execute(
        Command::Launch {
            game: "23".into(),
            file: None,
            launcher_id: None,
            runner: Some("missing".into()),
        },
        config_for(dir.path()),
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("Unknown runner missing"));
    assert_eq!(store.load_game(&GameId::new("23")).unwrap().play_count, 0);
}

#[tokio::test]
async fn test_reconcile_clears_stale_marker() {
    let dir = TempDir::new().unwrap();
    let store = seed(dir.path());
    store
        .write_session_marker(&GameId::new("23"), 4_194_305)
        .unwrap();

    execute(Command::Reconcile, config_for(dir.path()))
        .await
        .expect("reconcile should succeed");

    assert!(!store.has_active_session(&GameId::new("23")));
    assert_eq!(store.load_game(&GameId::new("23")).unwrap().play_time, 0);
}

#[tokio::test]
async fn test_kill_of_idle_game_succeeds() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());

    execute(
        Command::Kill {
            game: "23".into(),
        },
        config_for(dir.path()),
    )
    .await
    .expect("kill of an idle game is not an error");
}

#[tokio::test]
async fn test_status_of_unknown_game_fails() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());

    assert!(execute(Command::Status { game: None }, config_for(dir.path()))
        .await
        .is_ok());
    assert!(execute(
        Command::Status {
            game: Some("nope".into())
        },
        config_for(dir.path()),
    )
    .await
    .is_err());
}
