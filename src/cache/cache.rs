//! # Cache
//!
//! A key, a channel and an expiration bound to a storage backend.
//!
//! Reads go through [`Cache::cached`]: data that was never stamped (hydrated
//! from a snapshot) is served as is, stamped data is served while younger
//! than the expiration, and stale data is evicted quietly.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::Value;

use crate::bridge::{Port, WorkerProxy};
use crate::config::SymeConfig;
use crate::model::{json_type_name, FieldValue, Model, ModelError, ModelType};
use crate::observability::{Event, Logger};
use crate::storage::{Channel, StorageController, StorageError, WatchHandle};

use super::backend::Backend;
use super::errors::{CacheError, CacheResult};

/// Model type cached data is coerced into
#[derive(Debug, Clone)]
pub enum CacheModel {
    /// One instance
    Single(ModelType),
    /// An array of instances
    List(ModelType),
}

/// Data read from a cache
#[derive(Debug, Clone)]
pub enum CacheData {
    Plain(Value),
    Model(Model),
    Models(Vec<Model>),
}

impl CacheData {
    /// Plain JSON form
    pub fn to_plain(&self) -> Value {
        match self {
            CacheData::Plain(value) => value.clone(),
            CacheData::Model(model) => model.out(),
            CacheData::Models(models) => Value::Array(models.iter().map(Model::out).collect()),
        }
    }

    pub fn as_model(&self) -> Option<&Model> {
        match self {
            CacheData::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_models(&self) -> Option<&[Model]> {
        match self {
            CacheData::Models(models) => Some(models),
            _ => None,
        }
    }
}

/// Builder for a [`Cache`]
#[derive(Debug, Clone)]
pub struct CacheDefinition {
    name: String,
    key: Option<String>,
    channel: Option<String>,
    expiration: Option<Value>,
    model: Option<CacheModel>,
    default_expiration: u64,
    query_timeout: Duration,
}

impl CacheDefinition {
    /// `name` is the cache's type name: the default key, and the name used
    /// in configuration errors
    pub fn new(name: impl Into<String>) -> Self {
        let defaults = SymeConfig::default();
        Self {
            name: name.into(),
            key: None,
            channel: None,
            expiration: None,
            model: None,
            default_expiration: defaults.default_expiration_ms,
            query_timeout: defaults.query_timeout(),
        }
    }

    /// Defaults taken from `config` instead of the built-in ones
    pub fn from_config(name: impl Into<String>, config: &SymeConfig) -> Self {
        let mut definition = Self::new(name);
        definition.default_expiration = config.default_expiration_ms;
        definition.query_timeout = config.query_timeout();
        definition
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// `memory`, `local` or `session`; checked when the cache is built
    pub fn channel(mut self, channel: impl ToString) -> Self {
        self.channel = Some(channel.to_string());
        self
    }

    /// Milliseconds, as a number or a numeric string; checked when the
    /// cache is built
    pub fn expiration(mut self, expiration: impl Into<Value>) -> Self {
        self.expiration = Some(expiration.into());
        self
    }

    pub fn model(mut self, model_type: &ModelType) -> Self {
        self.model = Some(CacheModel::Single(model_type.clone()));
        self
    }

    pub fn model_list(mut self, model_type: &ModelType) -> Self {
        self.model = Some(CacheModel::List(model_type.clone()));
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    fn parse_expiration(&self) -> CacheResult<u64> {
        let invalid = || CacheError::InvalidExpiration {
            cache: self.name.clone(),
        };

        let parsed = match &self.expiration {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) if raw.is_empty() => None,
            Some(Value::Number(n)) => match (n.as_u64(), n.as_f64()) {
                (Some(v), _) => Some(v),
                (None, Some(f)) if f.is_finite() && f >= 0.0 => Some(f.trunc() as u64),
                _ => return Err(invalid()),
            },
            Some(Value::String(raw)) => {
                let digits: String = raw.trim().chars().take_while(char::is_ascii_digit).collect();
                Some(digits.parse::<u64>().map_err(|_| invalid())?)
            }
            Some(_) => return Err(invalid()),
        };

        // zero and "" fall back to the default, like an absent value
        Ok(parsed.filter(|v| *v > 0).unwrap_or(self.default_expiration))
    }
}

/// Cached data under one key
pub struct Cache {
    name: String,
    key: String,
    channel: Channel,
    expiration: u64,
    model: Option<CacheModel>,
    query_timeout: Duration,
    controller: Arc<StorageController>,
    backend: RwLock<Backend>,
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("channel", &self.channel)
            .field("expiration", &self.expiration)
            .field("worker", &self.is_worker_backed())
            .finish()
    }
}

impl Cache {
    /// Validate `definition` and bind it to `controller`.
    ///
    /// On a host without persistent media the channel collapses to memory.
    pub fn new(definition: CacheDefinition, controller: Arc<StorageController>) -> CacheResult<Self> {
        let channel = match definition.channel.as_deref() {
            None => Channel::Memory,
            Some(raw) => raw.parse::<Channel>().map_err(|_| CacheError::InvalidChannel {
                cache: definition.name.clone(),
            })?,
        };
        let expiration = definition.parse_expiration()?;
        let channel = controller.environment().resolve(channel);

        Ok(Self {
            key: definition.key.clone().unwrap_or_else(|| definition.name.clone()),
            name: definition.name,
            channel,
            expiration,
            model: definition.model,
            query_timeout: definition.query_timeout,
            backend: RwLock::new(Backend::Controller(controller.clone())),
            controller,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Channel in use, after collapsing
    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn expiration(&self) -> u64 {
        self.expiration
    }

    pub fn model(&self) -> Option<&CacheModel> {
        self.model.as_ref()
    }

    pub fn controller(&self) -> &Arc<StorageController> {
        &self.controller
    }

    pub fn is_worker_backed(&self) -> bool {
        self.backend().map(|backend| backend.is_worker()).unwrap_or(false)
    }

    /// Current data, or `None` when there is none or it went stale
    pub fn cached(&self) -> CacheResult<Option<CacheData>> {
        let backend = self.backend()?;
        let backend = backend.as_dyn();

        let stored = backend.get(self.channel, &self.key)?;
        let fresh = backend.freshness(self.channel, &self.key)?;

        if fresh == 0 && !is_empty(&stored) {
            return self.coerce(stored).map(Some);
        }
        if fresh != 0 && backend.now_millis().saturating_sub(fresh) < self.expiration {
            return self.coerce(stored).map(Some);
        }
        if fresh != 0 {
            backend.remove(self.channel, &self.key, false)?;
        }
        Ok(None)
    }

    /// Point read that asks the shared worker when there is one
    pub async fn fetch(&self) -> CacheResult<Option<CacheData>> {
        let proxy = match self.backend()? {
            Backend::Worker(proxy) => proxy,
            Backend::Controller(_) => return self.cached(),
        };

        let data = proxy.query(self.channel, &self.key).await?;
        if is_empty(&data) {
            return Ok(None);
        }
        self.coerce(data).map(Some)
    }

    /// Store `data` in its plain form
    pub fn populate(&self, data: impl Into<FieldValue>) -> CacheResult<&Self> {
        let plain = data.into().to_plain();
        self.backend()?
            .as_dyn()
            .populate(self.channel, &self.key, self.expiration, &plain)?;
        Ok(self)
    }

    /// Remove the data; watchers hear `None`
    pub fn clear(&self) -> CacheResult<&Self> {
        self.backend()?.as_dyn().remove(self.channel, &self.key, true)?;
        Ok(self)
    }

    /// Call `callback` on every populate and removal, with data coerced into
    /// the configured model. Data that does not coerce is logged and skipped.
    pub fn watch<F>(&self, callback: F) -> CacheResult<WatchHandle>
    where
        F: Fn(Option<CacheData>) + Send + Sync + 'static,
    {
        let model = self.model.clone();
        let name = self.name.clone();

        let handle = self.backend()?.as_dyn().register(
            self.channel,
            &self.key,
            Arc::new(move |data: Option<Value>| match data {
                None => callback(None),
                Some(value) => match coerce(&model, value) {
                    Ok(data) => callback(Some(data)),
                    Err(e) => Logger::warn(
                        Event::WatchCoercionFailed,
                        &[("cache", &name), ("error", &e.to_string())],
                    ),
                },
            }),
        )?;
        Ok(handle)
    }

    /// Delegate to a shared worker over `port`. Must run inside a tokio
    /// runtime. With `shared` the worker is asked for updates of this key
    /// right away.
    ///
    /// Watchers registered before the swap stay on the controller.
    pub fn register_worker(&self, port: Port, shared: bool) -> CacheResult<Arc<WorkerProxy>> {
        let proxy = WorkerProxy::connect(
            port,
            shared,
            self.controller.clock().clone(),
            self.query_timeout,
        )?;
        proxy.register_key(self.channel, &self.key)?;

        let mut backend = self
            .backend
            .write()
            .map_err(|_| CacheError::Storage(StorageError::poisoned()))?;
        *backend = Backend::Worker(proxy.clone());

        Logger::info(
            Event::WorkerRegistered,
            &[
                ("cache", &self.name),
                ("key", &self.key),
                ("shared", if shared { "true" } else { "false" }),
            ],
        );
        Ok(proxy)
    }

    fn backend(&self) -> CacheResult<Backend> {
        self.backend
            .read()
            .map(|backend| backend.clone())
            .map_err(|_| CacheError::Storage(StorageError::poisoned()))
    }

    fn coerce(&self, value: Value) -> CacheResult<CacheData> {
        coerce(&self.model, value)
    }
}

fn coerce(model: &Option<CacheModel>, value: Value) -> CacheResult<CacheData> {
    match model {
        None => Ok(CacheData::Plain(value)),
        Some(CacheModel::Single(model_type)) => Ok(CacheData::Model(model_type.construct(&value)?)),
        Some(CacheModel::List(model_type)) => match value {
            Value::Array(items) => {
                let models = items
                    .iter()
                    .map(|item| model_type.construct(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(CacheData::Models(models))
            }
            other => Err(ModelError::InvalidSource {
                model: model_type.name().to_string(),
                found: json_type_name(&other),
            }
            .into()),
        },
    }
}

/// No data worth serving
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
