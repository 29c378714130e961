//! Integration tests for the tracker actor.
//!
//! These drive real processes (`echo`, `sleep`, `false`) through
//! `spawn_tracker()` and the `TrackerHandle` interface, against an on-disk
//! `FileStore` in a temporary directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use shelf_core::{CompletionStatus, FileStore, Game, GameId, GameStore, Installation};
use shelf_tracker::process::is_process_alive;
use shelf_tracker::{
    spawn_tracker, LaunchError, LaunchRequest, MonitorKind, SessionEvent, TrackerConfig,
    TrackerError, TrackerHandle,
};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::timeout;

// ============================================================================
// Test Helpers
// ============================================================================

struct Fixture {
    _dir: TempDir,
    store: Arc<FileStore>,
    handle: TrackerHandle,
}

fn fixture(game_ids: &[&str]) -> Fixture {
    let dir = TempDir::new().expect("temp dir");
    let store = Arc::new(FileStore::open(dir.path().join("data")).expect("open store"));
    for id in game_ids {
        store
            .save_game(&Game::new(*id, format!("Game {id}")))
            .expect("save game");
    }
    let handle = spawn_tracker(store.clone(), TrackerConfig::fast());
    Fixture {
        _dir: dir,
        store,
        handle,
    }
}

/// Waits for the `Ended` event of `game_id`, skipping everything else.
async fn wait_for_end(events: &mut broadcast::Receiver<SessionEvent>, game_id: &str) -> SessionEvent {
    let game_id = GameId::new(game_id);
    timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(event @ SessionEvent::Ended { .. }) if event.game_id() == &game_id => {
                    return event;
                }
                Ok(_) => continue,
                Err(e) => panic!("event channel failed: {e}"),
            }
        }
    })
    .await
    .expect("session should end")
}

/// Writes a shell script and returns the command that runs it.
///
/// Scripts run through `sh` so the test never executes a file it just wrote.
fn script(dir: &Path, name: &str, body: &str) -> String {
    let path: PathBuf = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    format!("sh {}", path.display())
}

// ============================================================================
// Launch Lifecycle
// ============================================================================

#[tokio::test]
async fn test_echo_session_counts_one_second() {
    let f = fixture(&["100"]);
    let mut events = f.handle.subscribe();

    let report = f
        .handle
        .launch(LaunchRequest::new("100", "echo hi"))
        .await
        .expect("launch should succeed");
    assert_eq!(report.monitor, MonitorKind::Pid);
    assert_eq!(report.play_count, Some(1));

    match wait_for_end(&mut events, "100").await {
        SessionEvent::Ended {
            elapsed_secs,
            play_time,
            committed,
            killed,
            ..
        } => {
            assert_eq!(elapsed_secs, 1);
            assert_eq!(play_time, Some(1));
            assert!(committed);
            assert!(!killed);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let game = f.store.load_game(&GameId::new("100")).unwrap();
    assert_eq!(game.play_time, 1);
    assert_eq!(game.play_count, 1);
    assert_eq!(game.completion_status, CompletionStatus::Played);
    assert!(game.first_played.is_some());
    assert!(game.last_played.is_some());
    assert!(!f.handle.is_running("100").await);
    assert!(f.handle.running_sessions().await.is_empty());
}

#[tokio::test]
async fn test_is_running_tracks_session() {
    let f = fixture(&["7"]);
    let mut events = f.handle.subscribe();

    assert!(!f.handle.is_running("7").await);
    f.handle
        .launch(LaunchRequest::new("7", "sleep 1"))
        .await
        .expect("launch should succeed");
    assert!(f.handle.is_running("7").await);

    let sessions = f.handle.running_sessions().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].game_id, GameId::new("7"));
    assert!(sessions[0].pid.is_some());

    wait_for_end(&mut events, "7").await;
    assert!(!f.handle.is_running("7").await);
}

#[tokio::test]
async fn test_missing_program_fails_without_side_effects() {
    let f = fixture(&["9"]);

    let err = f
        .handle
        .launch(LaunchRequest::new("9", "/nonexistent/shelf-game-binary --fullscreen"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TrackerError::Launch {
            source: LaunchError::Spawn { .. },
            ..
        }
    ));
    assert!(err.is_launch_failure());

    assert!(!f.handle.is_running("9").await);
    let game = f.store.load_game(&GameId::new("9")).unwrap();
    assert_eq!(game.play_count, 0);
    assert_eq!(game.completion_status, CompletionStatus::NotPlayed);
}

#[tokio::test]
async fn test_immediate_failure_exit_is_launch_failure() {
    let f = fixture(&["10"]);

    let err = f
        .handle
        .launch(LaunchRequest::new("10", "false"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TrackerError::Launch {
            source: LaunchError::ExitedImmediately { .. },
            ..
        }
    ));
    assert!(!f.handle.is_running("10").await);
    assert_eq!(f.store.load_game(&GameId::new("10")).unwrap().play_count, 0);
}

#[tokio::test]
async fn test_second_launch_is_rejected() {
    let f = fixture(&["11"]);
    let mut events = f.handle.subscribe();

    f.handle
        .launch(LaunchRequest::new("11", "sleep 1"))
        .await
        .expect("first launch should succeed");

    let err = f
        .handle
        .launch(LaunchRequest::new("11", "sleep 1"))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::AlreadyRunning(_)));

    wait_for_end(&mut events, "11").await;
    assert_eq!(f.store.load_game(&GameId::new("11")).unwrap().play_count, 1);
}

#[tokio::test]
async fn test_concurrent_launches_admit_one() {
    let f = fixture(&["12"]);
    let mut events = f.handle.subscribe();

    let (a, b) = tokio::join!(
        f.handle.launch(LaunchRequest::new("12", "sleep 1")),
        f.handle.launch(LaunchRequest::new("12", "sleep 1")),
    );
    assert_eq!(
        [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(),
        1,
        "exactly one launch should win"
    );
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser, Err(TrackerError::AlreadyRunning(_))));

    wait_for_end(&mut events, "12").await;
    assert_eq!(f.store.load_game(&GameId::new("12")).unwrap().play_count, 1);
}

#[tokio::test]
async fn test_sequential_sessions_accumulate_play_time() {
    let f = fixture(&["13"]);
    let mut events = f.handle.subscribe();

    for _ in 0..2 {
        f.handle
            .launch(LaunchRequest::new("13", "echo hi"))
            .await
            .expect("launch should succeed");
        wait_for_end(&mut events, "13").await;
    }

    let game = f.store.load_game(&GameId::new("13")).unwrap();
    assert_eq!(game.play_time, 2);
    assert_eq!(game.play_count, 2);
}

#[tokio::test]
async fn test_directory_session_ends_when_directory_is_empty() {
    let f = fixture(&[]);
    let install = TempDir::new().unwrap();
    f.store
        .save_game(&Game::new("14", "Dir Game").with_installation(Installation::new(install.path())))
        .unwrap();
    let mut events = f.handle.subscribe();

    let report = f
        .handle
        .launch(LaunchRequest::new("14", "sleep 1").with_directory_monitoring(true))
        .await
        .expect("launch should succeed");
    assert_eq!(report.monitor, MonitorKind::Directory);

    let marker = f
        .store
        .read_session_marker(&GameId::new("14"))
        .unwrap()
        .expect("marker written");
    assert_eq!(marker.pid, shelf_core::DIRECTORY_SENTINEL_PID);

    match wait_for_end(&mut events, "14").await {
        SessionEvent::Ended { elapsed_secs, .. } => assert!(elapsed_secs >= 1),
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(!f.handle.is_running("14").await);
}

#[tokio::test]
async fn test_directory_session_ignores_helpers_left_by_the_runner() {
    let f = fixture(&[]);
    let install = TempDir::new().unwrap();
    let tools = TempDir::new().unwrap();
    f.store
        .save_game(&Game::new("15", "Store Game").with_installation(Installation::new(install.path())))
        .unwrap();
    // A store client that leaves a background helper behind and exits
    let command = script(tools.path(), "store-client.sh", "sleep 3 &\nexit 0\n");
    let mut events = f.handle.subscribe();

    let started = Instant::now();
    f.handle
        .launch(LaunchRequest::new("15", command).with_directory_monitoring(true))
        .await
        .expect("launch should succeed");

    match wait_for_end(&mut events, "15").await {
        SessionEvent::Ended { elapsed_secs, .. } => assert_eq!(elapsed_secs, 1),
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "helper kept the session open for {:?}",
        started.elapsed()
    );
    assert_eq!(f.store.load_game(&GameId::new("15")).unwrap().play_time, 1);
}

// ============================================================================
// Kill
// ============================================================================

#[tokio::test]
async fn test_kill_ends_session_and_commits() {
    let f = fixture(&["20"]);
    let mut events = f.handle.subscribe();

    f.handle
        .launch(LaunchRequest::new("20", "sleep 30"))
        .await
        .expect("launch should succeed");

    assert!(f.handle.kill("20").await.expect("kill should succeed"));

    match wait_for_end(&mut events, "20").await {
        SessionEvent::Ended {
            committed, killed, ..
        } => {
            assert!(committed);
            assert!(killed);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    assert!(!f.handle.is_running("20").await);
    assert!(f.store.load_game(&GameId::new("20")).unwrap().play_time >= 1);
}

#[tokio::test]
async fn test_kill_escalates_when_sigterm_is_ignored() {
    let f = fixture(&["23"]);
    let bin = TempDir::new().unwrap();
    let command = script(bin.path(), "stubborn.sh", "trap '' TERM\nexec sleep 5\n");
    let mut events = f.handle.subscribe();

    let report = f
        .handle
        .launch(LaunchRequest::new("23", command))
        .await
        .expect("launch should succeed");
    tokio::time::sleep(Duration::from_millis(200)).await;

    let kill_sent = Instant::now();
    assert!(f.handle.kill("23").await.expect("kill should succeed"));

    // Still alive after SIGTERM, until the 500ms kill timeout
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(f.handle.is_running("23").await);
    assert!(f.handle.running_sessions().await[0].terminating);

    match wait_for_end(&mut events, "23").await {
        SessionEvent::Ended {
            committed, killed, ..
        } => {
            assert!(committed);
            assert!(killed);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    let waited = kill_sent.elapsed();
    assert!(waited >= Duration::from_millis(450), "ended after {waited:?}");
    assert!(waited < Duration::from_secs(4), "ended after {waited:?}");
    assert!(!is_process_alive(report.pid, None));
}

#[tokio::test]
async fn test_kill_terminates_every_process_in_install_dir() {
    let f = fixture(&[]);
    let install = TempDir::new().unwrap();
    f.store
        .save_game(&Game::new("24", "Dir Game").with_installation(Installation::new(install.path())))
        .unwrap();
    // Runs from its own directory, as a game binary started by a launcher would
    let command = script(
        install.path(),
        "game.sh",
        "cd \"$(dirname \"$0\")\"\nsleep 30 &\nexec sleep 30\n",
    );
    let mut events = f.handle.subscribe();

    let report = f
        .handle
        .launch(LaunchRequest::new("24", command).with_directory_monitoring(true))
        .await
        .expect("launch should succeed");
    assert_eq!(report.monitor, MonitorKind::Directory);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let root = install.path().canonicalize().unwrap();
    let mut table = shelf_tracker::process::SysinfoProcessTable::new();
    let game_pids = shelf_tracker::process::ProcessTable::processes_under(&mut table, &root);
    assert_eq!(game_pids.len(), 2, "both game processes attributed: {game_pids:?}");

    assert!(f.handle.kill("24").await.expect("kill should succeed"));

    match wait_for_end(&mut events, "24").await {
        SessionEvent::Ended {
            committed, killed, ..
        } => {
            assert!(committed);
            assert!(killed);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    for pid in game_pids {
        assert!(!is_process_alive(pid, None), "pid {pid} survived the kill");
    }
    assert!(!f.handle.is_running("24").await);
    let game = f.store.load_game(&GameId::new("24")).unwrap();
    assert!(game.play_time >= 1);
    assert_eq!(game.play_count, 1);
}

#[tokio::test]
async fn test_kill_of_idle_game_returns_false() {
    let f = fixture(&["21"]);
    assert!(!f.handle.kill("21").await.unwrap());
}

#[tokio::test]
async fn test_kill_of_orphan_dead_marker_clears_it() {
    let f = fixture(&["22"]);
    let id = GameId::new("22");
    f.store.write_session_marker(&id, 4_194_305).unwrap();

    assert!(f.handle.kill("22").await.unwrap());
    assert!(!f.handle.is_running("22").await);
    assert_eq!(f.store.load_game(&id).unwrap().play_time, 0);
}

// ============================================================================
// Reconciliation
// ============================================================================

#[tokio::test]
async fn test_reconcile_clears_dead_markers_without_time() {
    let f = fixture(&["30", "31"]);
    f.store
        .write_session_marker(&GameId::new("30"), 4_194_305)
        .unwrap();
    f.store
        .write_session_marker(&GameId::new("31"), shelf_core::DIRECTORY_SENTINEL_PID)
        .unwrap();

    let report = f.handle.reconcile().await.expect("reconcile");
    let mut cleared = report.cleared.clone();
    cleared.sort();
    assert_eq!(cleared, vec![GameId::new("30"), GameId::new("31")]);
    assert!(report.reattached.is_empty());

    for id in ["30", "31"] {
        assert!(!f.handle.is_running(id).await);
        assert_eq!(f.store.load_game(&GameId::new(id)).unwrap().play_time, 0);
    }
}

#[tokio::test]
async fn test_reconcile_reattaches_live_process() {
    let f = fixture(&["32"]);
    let id = GameId::new("32");
    let mut events = f.handle.subscribe();

    let mut child = std::process::Command::new("sleep")
        .arg("1")
        .spawn()
        .unwrap();
    f.store
        .write_session_marker(&id, i64::from(child.id()))
        .unwrap();

    let report = f.handle.reconcile().await.expect("reconcile");
    assert_eq!(report.reattached, vec![id.clone()]);
    assert!(f.handle.is_running("32").await);

    // Idempotent while the monitor owns the session
    let again = f.handle.reconcile().await.expect("reconcile");
    assert_eq!(again.skipped, vec![id.clone()]);

    wait_for_end(&mut events, "32").await;
    child.wait().unwrap();
    assert!(f.store.load_game(&id).unwrap().play_time >= 1);
}
