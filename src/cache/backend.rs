//! # Cache Backend Trait

use std::sync::Arc;

use serde_json::Value;

use crate::bridge::WorkerProxy;
use crate::storage::{Channel, StorageController, WatchCallback, WatchHandle};

use super::errors::CacheResult;

/// What a cache reads from and writes to. Channels arrive already resolved.
pub trait CacheBackend: Send + Sync + std::fmt::Debug {
    /// Store `data`, fresh for `expiration` milliseconds
    fn populate(&self, channel: Channel, key: &str, expiration: u64, data: &Value) -> CacheResult<()>;

    /// Delete `key`, telling watchers when `fire_events` is set
    fn remove(&self, channel: Channel, key: &str, fire_events: bool) -> CacheResult<()>;

    /// Stored data, or an empty object
    fn get(&self, channel: Channel, key: &str) -> CacheResult<Value>;

    /// Last populate time, or 0
    fn freshness(&self, channel: Channel, key: &str) -> CacheResult<u64>;

    /// Subscribe to populate and removal of `key`
    fn register(&self, channel: Channel, key: &str, callback: WatchCallback) -> CacheResult<WatchHandle>;

    /// Current time on the backend's clock
    fn now_millis(&self) -> u64;
}

impl CacheBackend for StorageController {
    fn populate(&self, channel: Channel, key: &str, expiration: u64, data: &Value) -> CacheResult<()> {
        Ok(StorageController::populate(self, channel, key, expiration, data)?)
    }

    fn remove(&self, channel: Channel, key: &str, fire_events: bool) -> CacheResult<()> {
        Ok(StorageController::remove(self, channel, key, fire_events)?)
    }

    fn get(&self, channel: Channel, key: &str) -> CacheResult<Value> {
        Ok(StorageController::get(self, channel, key)?)
    }

    fn freshness(&self, channel: Channel, key: &str) -> CacheResult<u64> {
        Ok(StorageController::freshness(self, channel, key)?)
    }

    fn register(&self, channel: Channel, key: &str, callback: WatchCallback) -> CacheResult<WatchHandle> {
        Ok(StorageController::register(self, channel, key, move |data| callback(data))?)
    }

    fn now_millis(&self) -> u64 {
        self.clock().now_millis()
    }
}

impl CacheBackend for WorkerProxy {
    fn populate(&self, channel: Channel, key: &str, expiration: u64, data: &Value) -> CacheResult<()> {
        Ok(WorkerProxy::populate(self, channel, key, expiration, data)?)
    }

    fn remove(&self, channel: Channel, key: &str, fire_events: bool) -> CacheResult<()> {
        Ok(WorkerProxy::remove(self, channel, key, fire_events)?)
    }

    fn get(&self, channel: Channel, key: &str) -> CacheResult<Value> {
        Ok(WorkerProxy::get(self, channel, key))
    }

    fn freshness(&self, channel: Channel, key: &str) -> CacheResult<u64> {
        Ok(WorkerProxy::freshness(self, channel, key))
    }

    fn register(&self, channel: Channel, key: &str, callback: WatchCallback) -> CacheResult<WatchHandle> {
        Ok(WorkerProxy::register(self, channel, key, callback)?)
    }

    fn now_millis(&self) -> u64 {
        self.clock().now_millis()
    }
}

/// The backend a cache currently talks to
#[derive(Debug, Clone)]
pub enum Backend {
    Controller(Arc<StorageController>),
    Worker(Arc<WorkerProxy>),
}

impl Backend {
    pub fn as_dyn(&self) -> &dyn CacheBackend {
        match self {
            Backend::Controller(controller) => controller.as_ref(),
            Backend::Worker(proxy) => proxy.as_ref(),
        }
    }

    pub fn is_worker(&self) -> bool {
        matches!(self, Backend::Worker(_))
    }
}
