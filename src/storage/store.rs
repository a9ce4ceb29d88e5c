//! # Channel stores
//!
//! One JSON value store per channel. The `memory` channel is an in-process
//! map; `local` and `session` sit on host media when the host has them and
//! those media pass a write/read/delete probe. A channel whose medium is
//! missing or fails the probe degrades to the next one down:
//! `local` to `session` to `memory`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde_json::Value;

use crate::observability::{Event, Logger};

use super::channel::Channel;
use super::errors::{StorageError, StorageResult};
use super::medium::KeyValueMedium;

fn medium_failed(key: &str, err: StorageError) -> StorageError {
    Logger::error(Event::StorageMediumFailed, &[("key", key), ("error", &err.to_string())]);
    err
}

/// Default logical namespace of the memory channel
pub const DEFAULT_NAMESPACE: &str = "ServerState";

/// JSON value store behind one channel
pub enum ChannelStore {
    /// In-process map
    Memory(RwLock<HashMap<String, Value>>),
    /// Host medium; values are JSON-encoded on write and decoded on read
    Medium(Arc<dyn KeyValueMedium>),
}

impl fmt::Debug for ChannelStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStore::Memory(_) => write!(f, "ChannelStore::Memory"),
            ChannelStore::Medium(medium) => write!(f, "ChannelStore::Medium({:?})", medium),
        }
    }
}

impl ChannelStore {
    pub fn memory() -> Self {
        ChannelStore::Memory(RwLock::new(HashMap::new()))
    }

    pub fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        match self {
            ChannelStore::Memory(map) => {
                let map = map.read().map_err(|_| StorageError::poisoned())?;
                Ok(map.get(key).cloned())
            }
            ChannelStore::Medium(medium) => match medium.get_item(key).map_err(|e| medium_failed(key, e))? {
                Some(raw) if !raw.is_empty() => serde_json::from_str(&raw)
                    .map(Some)
                    .map_err(|e| StorageError::Encoding {
                        key: key.to_string(),
                        reason: e.to_string(),
                    }),
                _ => Ok(None),
            },
        }
    }

    pub fn set(&self, key: &str, value: &Value) -> StorageResult<()> {
        match self {
            ChannelStore::Memory(map) => {
                let mut map = map.write().map_err(|_| StorageError::poisoned())?;
                map.insert(key.to_string(), value.clone());
                Ok(())
            }
            ChannelStore::Medium(medium) => {
                let raw = serde_json::to_string(value).map_err(|e| StorageError::Encoding {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
                medium.set_item(key, &raw).map_err(|e| medium_failed(key, e))
            }
        }
    }

    pub fn remove(&self, key: &str) -> StorageResult<()> {
        match self {
            ChannelStore::Memory(map) => {
                let mut map = map.write().map_err(|_| StorageError::poisoned())?;
                map.remove(key);
                Ok(())
            }
            ChannelStore::Medium(medium) => medium.remove_item(key).map_err(|e| medium_failed(key, e)),
        }
    }

    pub fn clear(&self) -> StorageResult<()> {
        match self {
            ChannelStore::Memory(map) => {
                let mut map = map.write().map_err(|_| StorageError::poisoned())?;
                map.clear();
                Ok(())
            }
            ChannelStore::Medium(medium) => medium.clear(),
        }
    }

    pub fn keys(&self) -> StorageResult<Vec<String>> {
        match self {
            ChannelStore::Memory(map) => {
                let map = map.read().map_err(|_| StorageError::poisoned())?;
                let mut keys: Vec<String> = map.keys().cloned().collect();
                keys.sort();
                Ok(keys)
            }
            ChannelStore::Medium(medium) => medium.keys(),
        }
    }
}

/// What the host offers for persistence
#[derive(Debug, Clone)]
pub struct HostEnvironment {
    namespace: String,
    persistent: bool,
    local: Option<Arc<dyn KeyValueMedium>>,
    session: Option<Arc<dyn KeyValueMedium>>,
}

impl Default for HostEnvironment {
    fn default() -> Self {
        Self::headless(DEFAULT_NAMESPACE)
    }
}

impl HostEnvironment {
    /// No persistent media; every channel collapses to `memory`
    pub fn headless(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            persistent: false,
            local: None,
            session: None,
        }
    }

    /// A host with durable and per-session media. Either may be missing, in
    /// which case that channel degrades.
    pub fn persistent(
        local: Option<Arc<dyn KeyValueMedium>>,
        session: Option<Arc<dyn KeyValueMedium>>,
    ) -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            persistent: true,
            local,
            session,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// The channel a request for `channel` actually uses
    pub fn resolve(&self, channel: Channel) -> Channel {
        if self.persistent {
            channel
        } else {
            Channel::Memory
        }
    }
}

/// Write, read back and delete a throwaway key. Any failure means the
/// medium is unavailable.
pub fn probe(medium: &dyn KeyValueMedium) -> bool {
    let uid = format!("syme.probe.{}", Utc::now().timestamp_millis());

    let result = medium
        .set_item(&uid, &uid)
        .and_then(|_| medium.get_item(&uid))
        .and_then(|read| {
            medium.remove_item(&uid)?;
            Ok(read.as_deref() == Some(uid.as_str()))
        });

    match result {
        Ok(works) => works,
        Err(e) => {
            Logger::warn(Event::StorageProbeFailed, &[("error", &e.to_string())]);
            false
        }
    }
}

/// The three channel stores of one host
#[derive(Debug, Clone)]
pub struct Storage {
    memory: Arc<ChannelStore>,
    local: Arc<ChannelStore>,
    session: Arc<ChannelStore>,
    degraded: Vec<Channel>,
}

impl Storage {
    /// Build the channel stores, probing each medium
    pub fn open(env: &HostEnvironment) -> Self {
        let memory = Arc::new(ChannelStore::memory());
        let mut degraded = Vec::new();

        let session = match env.session.as_ref().filter(|m| probe(m.as_ref())) {
            Some(medium) => Arc::new(ChannelStore::Medium(medium.clone())),
            None => {
                degraded.push(Channel::Session);
                Arc::new(ChannelStore::memory())
            }
        };

        let local = match env.local.as_ref().filter(|m| probe(m.as_ref())) {
            Some(medium) => Arc::new(ChannelStore::Medium(medium.clone())),
            None if !degraded.contains(&Channel::Session) => {
                degraded.push(Channel::Local);
                session.clone()
            }
            None => {
                degraded.push(Channel::Local);
                Arc::new(ChannelStore::memory())
            }
        };

        if env.is_persistent() {
            for channel in &degraded {
                Logger::warn(
                    Event::ChannelDegraded,
                    &[("channel", channel.as_str()), ("namespace", env.namespace())],
                );
            }
        }

        Self {
            memory,
            local,
            session,
            degraded,
        }
    }

    pub fn store(&self, channel: Channel) -> &ChannelStore {
        match channel {
            Channel::Memory => &self.memory,
            Channel::Local => &self.local,
            Channel::Session => &self.session,
        }
    }

    /// Whether `channel` runs on a fallback store
    pub fn is_degraded(&self, channel: Channel) -> bool {
        self.degraded.contains(&channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::medium::VolatileMedium;
    use serde_json::json;

    #[derive(Debug)]
    struct BrokenMedium;

    impl KeyValueMedium for BrokenMedium {
        fn get_item(&self, _key: &str) -> StorageResult<Option<String>> {
            Err(StorageError::Io("quota".into()))
        }
        fn set_item(&self, _key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::Io("quota".into()))
        }
        fn remove_item(&self, _key: &str) -> StorageResult<()> {
            Ok(())
        }
        fn clear(&self) -> StorageResult<()> {
            Ok(())
        }
        fn keys(&self) -> StorageResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_probe() {
        assert!(probe(&VolatileMedium::new()));
        assert!(!probe(&BrokenMedium));
    }

    #[test]
    fn test_headless_resolves_to_memory() {
        let env = HostEnvironment::headless("test");
        assert_eq!(env.resolve(Channel::Local), Channel::Memory);
        assert_eq!(env.resolve(Channel::Session), Channel::Memory);
    }

    #[test]
    fn test_broken_local_degrades_to_session() {
        let session: Arc<dyn KeyValueMedium> = Arc::new(VolatileMedium::new());
        let env = HostEnvironment::persistent(Some(Arc::new(BrokenMedium)), Some(session.clone()));
        let storage = Storage::open(&env);

        assert!(storage.is_degraded(Channel::Local));
        assert!(!storage.is_degraded(Channel::Session));

        storage.store(Channel::Local).set("k", &json!({"a": 1})).unwrap();
        assert_eq!(session.get_item("k").unwrap(), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn test_no_media_degrades_to_memory() {
        let storage = Storage::open(&HostEnvironment::persistent(None, None));
        assert!(storage.is_degraded(Channel::Local));
        assert!(storage.is_degraded(Channel::Session));

        storage.store(Channel::Local).set("k", &json!(1)).unwrap();
        assert_eq!(storage.store(Channel::Local).get("k").unwrap(), Some(json!(1)));
        assert_eq!(storage.store(Channel::Session).get("k").unwrap(), None);
    }

    #[test]
    fn test_medium_store_decodes_json() {
        let medium: Arc<dyn KeyValueMedium> = Arc::new(VolatileMedium::new());
        let store = ChannelStore::Medium(medium.clone());

        store.set("users", &json!([{"id": 1}])).unwrap();
        assert_eq!(store.get("users").unwrap(), Some(json!([{"id": 1}])));

        medium.set_item("bad", "{not json").unwrap();
        assert!(matches!(store.get("bad"), Err(StorageError::Encoding { .. })));
    }
}
