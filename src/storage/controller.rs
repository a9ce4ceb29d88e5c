//! # Storage Controller
//!
//! Channel-aware orchestration over [`Storage`]:
//!
//! - data and freshness bookkeeping per (channel, key)
//! - watcher fan-out on populate and removal, keyed by key across channels
//! - pruning of expired or malformed entries
//! - snapshot export, and hydration from a snapshot at startup
//!
//! # Lifecycle
//!
//! [`StorageController::init`] decodes the optional snapshot, opens the
//! channel stores, and schedules hydration on the scheduler with zero delay,
//! never inline. Hydration prunes first and then re-populates every snapshot
//! entry without touching freshness. [`StorageController::shutdown`] drops
//! every watcher; later calls fail with [`StorageError::ShutDown`].
//!
//! Watcher callbacks and freshness bookkeeping never run under the same
//! lock, so a callback may call back into the controller.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::config::SymeConfig;
use crate::host::{ident, Clock, Scheduler, SystemClock, TokioScheduler};
use crate::observability::{Event, Logger};

use super::channel::{Channel, IntoChannel};
use super::errors::{StorageError, StorageResult};
use super::freshness::{data_key, Freshness, FRESHNESS_KEY};
use super::snapshot::Snapshot;
use super::store::{ChannelStore, HostEnvironment, Storage};
use super::watch::{Unregister, WatchCallback, WatchHandle};

/// Default global the embeddable output assigns to
pub const DEFAULT_GLOBAL: &str = "window.StorageController";

/// Everything [`StorageController::init`] needs
#[derive(Clone)]
pub struct ControllerOptions {
    env: HostEnvironment,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    snapshot: Option<String>,
    global_name: String,
}

impl fmt::Debug for ControllerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerOptions")
            .field("env", &self.env)
            .field("clock", &self.clock)
            .field("snapshot", &self.snapshot.as_ref().map(String::len))
            .field("global_name", &self.global_name)
            .finish()
    }
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::new(HostEnvironment::default())
    }
}

impl ControllerOptions {
    pub fn new(env: HostEnvironment) -> Self {
        Self {
            env,
            clock: Arc::new(SystemClock),
            scheduler: Arc::new(TokioScheduler),
            snapshot: None,
            global_name: DEFAULT_GLOBAL.to_string(),
        }
    }

    /// Headless options named after `config`
    pub fn from_config(config: &SymeConfig) -> Self {
        Self::new(HostEnvironment::headless(config.namespace.clone()))
            .global_name(config.snapshot_global.clone())
    }

    pub fn env(mut self, env: HostEnvironment) -> Self {
        self.env = env;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Transport-encoded snapshot to hydrate from
    pub fn snapshot(mut self, raw: impl Into<String>) -> Self {
        self.snapshot = Some(raw.into());
        self
    }

    pub fn global_name(mut self, name: impl Into<String>) -> Self {
        self.global_name = name.into();
        self
    }
}

struct Watcher {
    id: String,
    callback: WatchCallback,
}

/// Orchestrates storage, freshness and watchers for every channel
pub struct StorageController {
    me: Weak<StorageController>,
    env: HostEnvironment,
    storage: Storage,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    global_name: String,
    /// one events table shared by every channel
    watchers: RwLock<HashMap<String, Vec<Watcher>>>,
    /// serializes read-modify-write of freshness tables
    mutation: Mutex<()>,
    hydrated: AtomicBool,
    shut_down: AtomicBool,
}

impl fmt::Debug for StorageController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageController")
            .field("env", &self.env)
            .field("global_name", &self.global_name)
            .field("hydrated", &self.is_hydrated())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl StorageController {
    /// Open storage and schedule hydration.
    ///
    /// Fails with [`StorageError::InvalidSnapshot`] when a snapshot is given
    /// and does not decode to an object.
    pub fn init(options: ControllerOptions) -> StorageResult<Arc<Self>> {
        let snapshot = match options.snapshot.as_deref() {
            Some(raw) => Some(Snapshot::decode(raw, &options.global_name)?),
            None => None,
        };

        let storage = Storage::open(&options.env);
        let controller = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            env: options.env,
            storage,
            clock: options.clock,
            scheduler: options.scheduler,
            global_name: options.global_name,
            watchers: RwLock::new(HashMap::new()),
            mutation: Mutex::new(()),
            hydrated: AtomicBool::new(snapshot.is_none()),
            shut_down: AtomicBool::new(false),
        });

        Logger::info(
            Event::ControllerInit,
            &[
                ("namespace", controller.env.namespace()),
                ("persistent", if controller.env.is_persistent() { "true" } else { "false" }),
            ],
        );

        if let Some(snapshot) = snapshot {
            let entries = snapshot.len().to_string();
            let weak = Arc::downgrade(&controller);
            controller.scheduler.schedule(
                Duration::ZERO,
                Box::new(move || {
                    if let Some(controller) = weak.upgrade() {
                        controller.hydrate(&snapshot);
                    }
                }),
            );
            Logger::info(Event::HydrationScheduled, &[("entries", &entries)]);
        }

        Ok(controller)
    }

    pub fn environment(&self) -> &HostEnvironment {
        &self.env
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn global_name(&self) -> &str {
        &self.global_name
    }

    /// Whether the hydration pass has run (always true without a snapshot)
    pub fn is_hydrated(&self) -> bool {
        self.hydrated.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Validate `channel` and map it to the channel actually used
    pub fn resolve(&self, channel: impl IntoChannel, caller: &'static str) -> StorageResult<Channel> {
        if self.is_shut_down() {
            return Err(StorageError::ShutDown);
        }
        Ok(self.env.resolve(channel.into_channel(caller)?))
    }

    /// Subscribe to populate and removal of `key` on any channel.
    ///
    /// `channel` is validated but does not narrow the subscription.
    pub fn register<F>(&self, channel: impl IntoChannel, key: &str, callback: F) -> StorageResult<WatchHandle>
    where
        F: Fn(Option<Value>) + Send + Sync + 'static,
    {
        let channel = self.resolve(channel, "register")?;
        let mut watchers = self.watchers.write().map_err(|_| StorageError::poisoned())?;
        let list = watchers.entry(key.to_string()).or_default();

        let id = ident::unique(ident::DEFAULT_SIZE, |candidate| {
            list.iter().any(|watcher| watcher.id == candidate)
        })?;
        list.push(Watcher {
            id: id.clone(),
            callback: Arc::new(callback),
        });

        let owner: Weak<dyn Unregister> = self.me.clone();
        Ok(WatchHandle::new(channel, key, id, owner))
    }

    /// Drop one watcher registration
    pub fn unregister(&self, channel: impl IntoChannel, key: &str, id: &str) -> StorageResult<()> {
        self.resolve(channel, "unregister")?;
        let mut watchers = self.watchers.write().map_err(|_| StorageError::poisoned())?;

        let list = watchers.get_mut(key).ok_or(StorageError::UnknownWatch)?;
        let index = list
            .iter()
            .position(|watcher| watcher.id == id)
            .ok_or(StorageError::UnknownWatch)?;
        list.remove(index);
        if list.is_empty() {
            watchers.remove(key);
        }
        Ok(())
    }

    /// Number of watchers on `key`
    pub fn watcher_count(&self, channel: impl IntoChannel, key: &str) -> StorageResult<usize> {
        self.resolve(channel, "register")?;
        let watchers = self.watchers.read().map_err(|_| StorageError::poisoned())?;
        Ok(watchers
            .get(key)
            .map(Vec::len)
            .unwrap_or(0))
    }

    /// Store `data` under `key`, fresh for `expiration` milliseconds, and
    /// notify watchers.
    ///
    /// An `expiration` of 0 keeps the window of an existing record.
    pub fn populate(
        &self,
        channel: impl IntoChannel,
        key: &str,
        expiration: u64,
        data: &Value,
    ) -> StorageResult<()> {
        self.populate_with(channel, key, expiration, data, false)
    }

    /// [`StorageController::populate`], optionally leaving freshness alone.
    ///
    /// With `ignore_fresh` an existing record is kept as is and a missing one
    /// is seeded empty, so hydrated data never looks freshly fetched.
    pub fn populate_with(
        &self,
        channel: impl IntoChannel,
        key: &str,
        expiration: u64,
        data: &Value,
        ignore_fresh: bool,
    ) -> StorageResult<()> {
        let channel = self.resolve(channel, "populate")?;
        let store = self.storage.store(channel);

        {
            let _guard = self.mutation.lock().map_err(|_| StorageError::poisoned())?;
            let mut table = Self::table(store)?;

            if !ignore_fresh {
                let inherited = match expiration {
                    0 => table
                        .get(key)
                        .and_then(Freshness::parse)
                        .and_then(|fresh| fresh.window()),
                    _ => None,
                };
                let record = Freshness::stamp(self.clock.now_millis(), inherited.unwrap_or(expiration));
                table.insert(key.to_string(), record.to_value());
            } else if !table.contains_key(key) {
                table.insert(key.to_string(), Freshness::default().to_value());
            }

            store.set(&data_key(key), data)?;
            store.set(FRESHNESS_KEY, &Value::Object(table))?;
        }

        self.notify(key, Some(data));
        Ok(())
    }

    /// Delete `key`. Watchers hear `None` when `fire_events` is set.
    pub fn remove(&self, channel: impl IntoChannel, key: &str, fire_events: bool) -> StorageResult<()> {
        let channel = self.resolve(channel, "remove")?;
        self.remove_resolved(channel, key, fire_events)
    }

    /// Stored data for `key`, or an empty object when there is none
    pub fn get(&self, channel: impl IntoChannel, key: &str) -> StorageResult<Value> {
        let channel = self.resolve(channel, "get")?;
        Ok(self
            .storage
            .store(channel)
            .get(&data_key(key))?
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    /// Last populate time of `key`, or 0 when it was never populated.
    ///
    /// A malformed record is removed and reported as 0.
    pub fn freshness(&self, channel: impl IntoChannel, key: &str) -> StorageResult<u64> {
        let channel = self.resolve(channel, "freshness")?;
        Ok(self
            .record(channel, key)?
            .and_then(|fresh| fresh.hit)
            .unwrap_or(0))
    }

    /// Full freshness record of `key`, with the same self-healing as
    /// [`StorageController::freshness`]
    pub fn freshness_record(
        &self,
        channel: impl IntoChannel,
        key: &str,
    ) -> StorageResult<Option<Freshness>> {
        let channel = self.resolve(channel, "freshness")?;
        self.record(channel, key)
    }

    /// Remove every expired or malformed entry without notifying watchers.
    /// Returns how many entries went.
    pub fn prune(&self) -> StorageResult<usize> {
        if self.is_shut_down() {
            return Err(StorageError::ShutDown);
        }

        let now = self.clock.now_millis();
        let mut removed = 0;

        for channel in self.own_channels() {
            let table = Self::table(self.storage.store(channel))?;
            for (key, record) in table {
                let stale = match Freshness::parse(&record) {
                    Some(fresh) => fresh.is_expired(now),
                    None => true,
                };
                if stale {
                    self.remove_resolved(channel, &key, false)?;
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            Logger::info(Event::CachePrune, &[("removed", &removed.to_string())]);
        }
        Ok(removed)
    }

    /// Stored data of every entry with a freshness record
    pub fn snapshot(&self) -> StorageResult<Snapshot> {
        if self.is_shut_down() {
            return Err(StorageError::ShutDown);
        }

        let mut snapshot = Snapshot::default();
        for channel in self.own_channels() {
            let store = self.storage.store(channel);
            for key in Self::table(store)?.keys() {
                if let Some(data) = store.get(&data_key(key))? {
                    snapshot.channel_mut(channel).insert(key.clone(), data);
                }
            }
        }
        Ok(snapshot)
    }

    /// Raw JSON snapshot
    pub fn snapshot_json(&self) -> StorageResult<String> {
        Ok(self.snapshot()?.to_json())
    }

    /// `<global> = "<encoded snapshot>";`, ready to embed in a bootstrap
    /// payload for a new context
    pub fn out(&self) -> StorageResult<String> {
        Ok(format!(
            "{} = \"{}\";",
            self.global_name,
            self.snapshot()?.encode()
        ))
    }

    /// Drop every watcher and refuse further calls
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut watchers) = self.watchers.write() {
            watchers.clear();
        }
        Logger::info(Event::ControllerShutdown, &[("namespace", self.env.namespace())]);
    }

    fn hydrate(&self, snapshot: &Snapshot) {
        if self.is_shut_down() {
            return;
        }

        if let Err(e) = self.prune() {
            Logger::error(Event::HydrationRejected, &[("error", &e.to_string())]);
        }

        let mut restored = 0;
        for channel in Channel::ALL {
            for (key, data) in snapshot.channel(channel) {
                match self.populate_with(channel, key, 0, data, true) {
                    Ok(()) => restored += 1,
                    Err(e) => Logger::error(
                        Event::HydrationRejected,
                        &[("channel", channel.as_str()), ("key", key), ("error", &e.to_string())],
                    ),
                }
            }
        }

        self.hydrated.store(true, Ordering::SeqCst);
        Logger::info(Event::HydrationComplete, &[("entries", &restored.to_string())]);
    }

    /// Channels that are not collapsed into another one
    fn own_channels(&self) -> impl Iterator<Item = Channel> + '_ {
        Channel::ALL
            .into_iter()
            .filter(|channel| self.env.resolve(*channel) == *channel)
    }

    fn table(store: &ChannelStore) -> StorageResult<Map<String, Value>> {
        match store.get(FRESHNESS_KEY)? {
            Some(Value::Object(table)) => Ok(table),
            _ => Ok(Map::new()),
        }
    }

    fn record(&self, channel: Channel, key: &str) -> StorageResult<Option<Freshness>> {
        let table = Self::table(self.storage.store(channel))?;
        let Some(raw) = table.get(key) else {
            return Ok(None);
        };

        match Freshness::parse(raw) {
            Some(fresh) => Ok(Some(fresh)),
            None => {
                Logger::warn(
                    Event::FreshnessMalformed,
                    &[("channel", channel.as_str()), ("key", key)],
                );
                self.remove_resolved(channel, key, false)?;
                Ok(None)
            }
        }
    }

    fn remove_resolved(&self, channel: Channel, key: &str, fire_events: bool) -> StorageResult<()> {
        let store = self.storage.store(channel);
        {
            let _guard = self.mutation.lock().map_err(|_| StorageError::poisoned())?;
            let mut table = Self::table(store)?;
            table.remove(key);
            store.remove(&data_key(key))?;
            store.set(FRESHNESS_KEY, &Value::Object(table))?;
        }

        if fire_events {
            self.notify(key, None);
        }
        Ok(())
    }

    fn notify(&self, key: &str, data: Option<&Value>) {
        let callbacks: Vec<WatchCallback> = match self.watchers.read() {
            Ok(watchers) => watchers
                .get(key)
                .map(|list| list.iter().map(|w| w.callback.clone()).collect())
                .unwrap_or_default(),
            Err(_) => return,
        };

        for callback in callbacks {
            callback(data.cloned());
        }
    }
}

impl Unregister for StorageController {
    fn unregister(&self, channel: Channel, key: &str, id: &str) -> StorageResult<()> {
        StorageController::unregister(self, channel, key, id)
    }
}
