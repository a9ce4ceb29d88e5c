//! Cache lifecycle tests
//!
//! Covers:
//! - freshness window of `cached`
//! - `clear` notifying watchers once
//! - configuration errors naming the cache
//! - model coercion of watched data

use std::sync::{Arc, Mutex};

use serde_json::json;
use syme::cache::{Cache, CacheData, CacheDefinition, CacheError};
use syme::host::{ManualClock, ManualScheduler};
use syme::model::{Definition, ModelType};
use syme::storage::{ControllerOptions, HostEnvironment, StorageController};
use syme::SymeConfig;

// =============================================================================
// Test Utilities
// =============================================================================

fn controller() -> (ManualScheduler, Arc<StorageController>) {
    let scheduler = ManualScheduler::new(ManualClock::new(100_000));
    let controller = StorageController::init(
        ControllerOptions::new(HostEnvironment::headless("ServerState"))
            .clock(Arc::new(scheduler.clock().clone()))
            .scheduler(Arc::new(scheduler.clone())),
    )
    .unwrap();
    (scheduler, controller)
}

// =============================================================================
// Expiration
// =============================================================================

#[test]
fn test_cached_within_and_after_expiration() {
    let (scheduler, controller) = controller();
    let cache = Cache::new(
        CacheDefinition::new("Settings")
            .key("k")
            .channel("memory")
            .expiration(1000),
        controller.clone(),
    )
    .unwrap();

    cache.populate(json!({"a": 1})).unwrap();
    assert_eq!(cache.cached().unwrap().unwrap().to_plain(), json!({"a": 1}));

    scheduler.clock().advance(999);
    assert!(cache.cached().unwrap().is_some());

    scheduler.clock().advance(1);
    assert!(cache.cached().unwrap().is_none());
    // the stale entry is gone, not just hidden
    assert_eq!(controller.freshness("memory", "k").unwrap(), 0);
    assert!(cache.cached().unwrap().is_none());
}

#[test]
fn test_empty_cache_reads_none() {
    let (_, controller) = controller();
    let cache = Cache::new(CacheDefinition::new("Empty"), controller).unwrap();
    assert!(cache.cached().unwrap().is_none());
}

#[test]
fn test_config_defaults_apply() {
    let (_, controller) = controller();
    let config = SymeConfig::from_json(r#"{"default_expiration_ms": 2500}"#).unwrap();
    let cache = Cache::new(CacheDefinition::from_config("Tuned", &config), controller).unwrap();
    assert_eq!(cache.expiration(), 2500);
}

// =============================================================================
// Watchers
// =============================================================================

#[test]
fn test_clear_notifies_once_with_none() {
    let (_, controller) = controller();
    let cache = Cache::new(CacheDefinition::new("Session"), controller).unwrap();
    let heard = Arc::new(Mutex::new(Vec::new()));
    let sink = heard.clone();
    cache
        .watch(move |data: Option<CacheData>| {
            sink.lock().unwrap().push(data.map(|d| d.to_plain()))
        })
        .unwrap();

    cache.populate(json!("token")).unwrap();
    cache.clear().unwrap();

    assert_eq!(*heard.lock().unwrap(), vec![Some(json!("token")), None]);
}

#[test]
fn test_watch_handle_stops_delivery() {
    let (_, controller) = controller();
    let cache = Cache::new(CacheDefinition::new("Counter"), controller).unwrap();
    let hits = Arc::new(Mutex::new(0));
    let counter = hits.clone();
    let handle = cache.watch(move |_| *counter.lock().unwrap() += 1).unwrap();

    cache.populate(json!(1)).unwrap();
    handle.remove().unwrap();
    cache.populate(json!(2)).unwrap();

    assert_eq!(*hits.lock().unwrap(), 1);
}

#[test]
fn test_watch_coerces_into_model_list() {
    let (scheduler, controller) = controller();
    let user = ModelType::with_scheduler(
        "User",
        Definition::new().scalar("name", ""),
        Arc::new(scheduler.clone()),
    );
    let cache = Cache::new(CacheDefinition::new("Users").model_list(&user), controller).unwrap();

    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = names.clone();
    cache
        .watch(move |data| {
            if let Some(CacheData::Models(models)) = data {
                for model in models {
                    sink.lock()
                        .unwrap()
                        .push(model.get("name").unwrap().to_plain());
                }
            }
        })
        .unwrap();

    cache
        .populate(json!([{"name": "rick"}, {"name": "morty"}]))
        .unwrap();
    // not a list: logged and skipped
    cache.populate(json!({"name": "summer"})).unwrap();

    assert_eq!(*names.lock().unwrap(), vec![json!("rick"), json!("morty")]);
}

// =============================================================================
// Configuration errors
// =============================================================================

#[test]
fn test_invalid_channel_names_the_cache() {
    let (_, controller) = controller();
    let err = Cache::new(CacheDefinition::new("UserCache").channel("bogus"), controller).unwrap_err();

    assert!(matches!(err, CacheError::InvalidChannel { .. }));
    assert_eq!(err.to_string(), "Invalid storage mechanism sent to UserCache.channel");
    assert_eq!(err.kind(), syme::ErrorKind::Configuration);
}

#[test]
fn test_invalid_expiration_names_the_cache() {
    let (_, controller) = controller();
    let err = Cache::new(
        CacheDefinition::new("UserCache").expiration("never"),
        controller,
    )
    .unwrap_err();

    assert_eq!(err.to_string(), "Invalid expiration time set for UserCache.expiration");
}
