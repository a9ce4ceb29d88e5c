//! Storage controller tests
//!
//! Covers:
//! - durability of the `local` channel on a file-backed medium
//! - degrade of unusable media
//! - `out()` / hydration round-trips between controllers
//! - rejection of malformed snapshots

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use syme::host::{ManualClock, ManualScheduler};
use syme::storage::{
    Channel, ControllerOptions, FileMedium, HostEnvironment, KeyValueMedium, StorageController,
    StorageError, VolatileMedium,
};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

fn create_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

fn persistent_env(dir: &TempDir) -> HostEnvironment {
    let local: Arc<dyn KeyValueMedium> = Arc::new(FileMedium::new(dir.path().join("local")));
    let session: Arc<dyn KeyValueMedium> = Arc::new(VolatileMedium::default());
    HostEnvironment::persistent(Some(local), Some(session))
}

fn open(env: HostEnvironment, scheduler: &ManualScheduler) -> Arc<StorageController> {
    StorageController::init(
        ControllerOptions::new(env)
            .clock(Arc::new(scheduler.clock().clone()))
            .scheduler(Arc::new(scheduler.clone())),
    )
    .unwrap()
}

fn encoded_part(out: &str) -> &str {
    let start = out.find('"').unwrap() + 1;
    let end = out.rfind('"').unwrap();
    &out[start..end]
}

// =============================================================================
// Durability
// =============================================================================

#[test]
fn test_local_channel_survives_reopen() {
    let dir = create_temp_dir();
    let scheduler = ManualScheduler::new(ManualClock::new(1_000));

    {
        let controller = open(persistent_env(&dir), &scheduler);
        assert!(!controller.storage().is_degraded(Channel::Local));
        controller
            .populate("local", "users", 5_000, &json!([{"name": "rick"}]))
            .unwrap();
        controller.populate("session", "token", 5_000, &json!("abc")).unwrap();
    }

    let controller = open(persistent_env(&dir), &scheduler);
    assert_eq!(controller.get("local", "users").unwrap(), json!([{"name": "rick"}]));
    assert_eq!(controller.freshness("local", "users").unwrap(), 1_000);
    // a fresh session medium starts empty
    assert_eq!(controller.get("session", "token").unwrap(), json!({}));
}

#[test]
fn test_unwritable_local_degrades_to_session() {
    let dir = create_temp_dir();
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, "not a directory").unwrap();

    let local: Arc<dyn KeyValueMedium> = Arc::new(FileMedium::new(blocker.join("local")));
    let session: Arc<dyn KeyValueMedium> = Arc::new(VolatileMedium::default());
    let scheduler = ManualScheduler::new(ManualClock::default());
    let controller = open(HostEnvironment::persistent(Some(local), Some(session)), &scheduler);

    assert!(controller.storage().is_degraded(Channel::Local));
    assert!(!controller.storage().is_degraded(Channel::Session));

    controller.populate("local", "k", 10, &json!(1)).unwrap();
    assert_eq!(controller.get("local", "k").unwrap(), json!(1));
}

#[test]
fn test_headless_collapses_channels() {
    let scheduler = ManualScheduler::new(ManualClock::default());
    let controller = open(HostEnvironment::headless("ServerState"), &scheduler);

    controller.populate("local", "k", 10, &json!("x")).unwrap();
    assert_eq!(controller.get("memory", "k").unwrap(), json!("x"));
    assert_eq!(controller.get("session", "k").unwrap(), json!("x"));
}

// =============================================================================
// Watchers
// =============================================================================

#[test]
fn test_watchers_share_one_table_across_channels() {
    let dir = create_temp_dir();
    let scheduler = ManualScheduler::new(ManualClock::new(1_000));
    let controller = open(persistent_env(&dir), &scheduler);

    let heard = Arc::new(Mutex::new(Vec::new()));
    let sink = heard.clone();
    let handle = controller
        .register("local", "k", move |data| sink.lock().unwrap().push(data))
        .unwrap();
    assert_eq!(controller.watcher_count("session", "k").unwrap(), 1);

    controller.populate("memory", "k", 5_000, &json!(42)).unwrap();
    controller.remove("session", "k", true).unwrap();
    controller.populate("memory", "other", 5_000, &json!(0)).unwrap();

    assert_eq!(*heard.lock().unwrap(), vec![Some(json!(42)), None]);
    // the data itself stays on the channel it was written to
    assert_eq!(controller.get("local", "k").unwrap(), json!({}));

    handle.remove().unwrap();
    assert_eq!(controller.watcher_count("memory", "k").unwrap(), 0);
}

// =============================================================================
// Snapshots and hydration
// =============================================================================

#[test]
fn test_out_rehydrates_a_new_controller() {
    let dir = create_temp_dir();
    let scheduler = ManualScheduler::new(ManualClock::new(1_000));
    let source = open(persistent_env(&dir), &scheduler);
    source.populate("local", "users", 5_000, &json!([1, 2])).unwrap();
    source.populate("memory", "flags", 5_000, &json!({"beta": true})).unwrap();

    let out = source.out().unwrap();
    assert!(out.starts_with("window.StorageController = \""));
    assert!(out.ends_with("\";"));

    let target_dir = create_temp_dir();
    let target_scheduler = ManualScheduler::new(ManualClock::new(50_000));
    let target = StorageController::init(
        ControllerOptions::new(persistent_env(&target_dir))
            .clock(Arc::new(target_scheduler.clock().clone()))
            .scheduler(Arc::new(target_scheduler.clone()))
            .snapshot(encoded_part(&out)),
    )
    .unwrap();

    let heard = Arc::new(Mutex::new(Vec::new()));
    let sink = heard.clone();
    target
        .register("local", "users", move |data| sink.lock().unwrap().push(data))
        .unwrap();

    // hydration never runs inline
    assert!(!target.is_hydrated());
    assert_eq!(target.get("local", "users").unwrap(), json!({}));

    assert_eq!(target_scheduler.run_pending(), 1);
    assert!(target.is_hydrated());
    assert_eq!(target.get("local", "users").unwrap(), json!([1, 2]));
    assert_eq!(target.get("memory", "flags").unwrap(), json!({"beta": true}));
    // hydrated data does not look freshly fetched
    assert_eq!(target.freshness("local", "users").unwrap(), 0);
    assert_eq!(*heard.lock().unwrap(), vec![Some(json!([1, 2]))]);

    let round_trip: Value = serde_json::from_str(&target.snapshot_json().unwrap()).unwrap();
    assert_eq!(round_trip["local"]["users"], json!([1, 2]));
}

#[test]
fn test_plain_json_snapshot_is_accepted() {
    let scheduler = ManualScheduler::new(ManualClock::default());
    let controller = StorageController::init(
        ControllerOptions::new(HostEnvironment::headless("ServerState"))
            .clock(Arc::new(scheduler.clock().clone()))
            .scheduler(Arc::new(scheduler.clone()))
            .snapshot(r#"{"memory": {"k": [1]}, "local": null}"#),
    )
    .unwrap();

    scheduler.run_pending();
    assert_eq!(controller.get("memory", "k").unwrap(), json!([1]));
}

#[test]
fn test_malformed_snapshot_fails_init() {
    for raw in ["bm90IGpzb24=", "[1, 2]", r#"{"local": 5}"#] {
        let err = StorageController::init(
            ControllerOptions::new(HostEnvironment::headless("ServerState")).snapshot(raw),
        )
        .unwrap_err();

        assert!(matches!(err, StorageError::InvalidSnapshot { .. }));
        assert!(err
            .to_string()
            .starts_with("Invalid snapshot passed through window.StorageController"));
    }
}

#[test]
fn test_hydration_prunes_expired_entries_first() {
    let dir = create_temp_dir();
    let scheduler = ManualScheduler::new(ManualClock::new(1_000));
    {
        let controller = open(persistent_env(&dir), &scheduler);
        controller.populate("local", "stale", 100, &json!("old")).unwrap();
        controller.populate("local", "kept", 100_000, &json!("new")).unwrap();
    }

    scheduler.clock().advance(500);
    let controller = StorageController::init(
        ControllerOptions::new(persistent_env(&dir))
            .clock(Arc::new(scheduler.clock().clone()))
            .scheduler(Arc::new(scheduler.clone()))
            .snapshot(r#"{"memory": {}}"#),
    )
    .unwrap();
    scheduler.run_pending();

    assert_eq!(controller.get("local", "stale").unwrap(), json!({}));
    assert_eq!(controller.get("local", "kept").unwrap(), json!("new"));
}
