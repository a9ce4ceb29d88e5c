//! # Worker Proxy
//!
//! Stands in for a [`StorageController`](crate::storage::StorageController)
//! when a cache delegates to a shared worker. Writes are forwarded as
//! messages; reads answer from a local mirror of the last known data, or
//! through an explicit `query` round-trip.
//!
//! With `shared` set the worker echoes every update back to the ports that
//! registered for it, this one included, so local watchers hear about
//! changes through the listener. Without it the proxy notifies them itself.
//! Watchers are keyed by key alone, whatever channel the update names.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::host::{ident, Clock};
use crate::observability::{Event, Logger};
use crate::storage::{Channel, Freshness, StorageError, StorageResult, Unregister, WatchCallback, WatchHandle};

use super::errors::{BridgeError, BridgeResult};
use super::message::{BridgeMessage, QueryPayload};
use super::port::{Port, PortSender};

type Slot = (Channel, String);

struct Watcher {
    id: String,
    callback: WatchCallback,
}

/// Message-passing backend for a cache
pub struct WorkerProxy {
    me: Weak<WorkerProxy>,
    sender: PortSender,
    shared: bool,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    mirror: RwLock<HashMap<Slot, (Value, Freshness)>>,
    watchers: RwLock<HashMap<String, Vec<Watcher>>>,
    pending: Mutex<HashMap<String, oneshot::Sender<Value>>>,
    registered: Mutex<HashSet<Slot>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for WorkerProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerProxy")
            .field("port", &self.sender.id())
            .field("shared", &self.shared)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl WorkerProxy {
    /// Start listening on `port`. Must run inside a tokio runtime.
    pub fn connect(
        port: Port,
        shared: bool,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> BridgeResult<Arc<Self>> {
        let handle = Handle::try_current().map_err(|_| BridgeError::NoRuntime)?;
        let (sender, mut receiver) = port.split();

        let proxy = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            sender,
            shared,
            clock,
            timeout,
            mirror: RwLock::new(HashMap::new()),
            watchers: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            registered: Mutex::new(HashSet::new()),
            listener: Mutex::new(None),
        });

        let weak = Arc::downgrade(&proxy);
        let listener = handle.spawn(async move {
            while let Some(message) = receiver.recv().await {
                match weak.upgrade() {
                    Some(proxy) => proxy.dispatch(message),
                    None => return,
                }
            }
        });

        if let Ok(mut slot) = proxy.listener.lock() {
            *slot = Some(listener);
        }
        Ok(proxy)
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Ask the worker to forward future updates of `key`. Sent at most once
    /// per key, and only to a shared worker.
    pub fn register_key(&self, channel: Channel, key: &str) -> BridgeResult<()> {
        if !self.shared {
            return Ok(());
        }
        let fresh = match self.registered.lock() {
            Ok(mut registered) => registered.insert((channel, key.to_string())),
            Err(_) => false,
        };
        if fresh {
            self.sender.post(&BridgeMessage::Register {
                channel,
                key: key.to_string(),
            })?;
        }
        Ok(())
    }

    /// Record `data` locally and forward it as an `update`
    pub fn populate(&self, channel: Channel, key: &str, expiration: u64, data: &Value) -> BridgeResult<()> {
        self.mirror_set(channel, key, expiration, data.clone());
        self.sender.post(&BridgeMessage::Update {
            channel,
            key: key.to_string(),
            expiration,
            data: data.clone(),
        })?;

        if !self.shared {
            self.notify(key, Some(data));
        }
        Ok(())
    }

    /// Forget `key` locally and forward a `remove`
    pub fn remove(&self, channel: Channel, key: &str, fire_events: bool) -> BridgeResult<()> {
        if let Ok(mut mirror) = self.mirror.write() {
            mirror.remove(&(channel, key.to_string()));
        }
        self.sender.post(&BridgeMessage::Remove {
            channel,
            key: key.to_string(),
            should_update: fire_events,
        })?;

        if fire_events && !self.shared {
            self.notify(key, None);
        }
        Ok(())
    }

    /// Last known data for `key`, or an empty object
    pub fn get(&self, channel: Channel, key: &str) -> Value {
        self.mirror
            .read()
            .ok()
            .and_then(|mirror| mirror.get(&(channel, key.to_string())).map(|(data, _)| data.clone()))
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// Last known freshness record of `key`
    pub fn freshness_record(&self, channel: Channel, key: &str) -> Option<Freshness> {
        self.mirror
            .read()
            .ok()
            .and_then(|mirror| mirror.get(&(channel, key.to_string())).map(|(_, fresh)| *fresh))
    }

    pub fn freshness(&self, channel: Channel, key: &str) -> u64 {
        self.freshness_record(channel, key)
            .and_then(|fresh| fresh.hit)
            .unwrap_or(0)
    }

    /// Subscribe to updates of `key` arriving through this proxy
    pub fn register(&self, channel: Channel, key: &str, callback: WatchCallback) -> BridgeResult<WatchHandle> {
        self.register_key(channel, key)?;

        let id = {
            let mut watchers = self.watchers.write().map_err(|_| BridgeError::poisoned())?;
            let list = watchers.entry(key.to_string()).or_default();
            let id = ident::unique(ident::DEFAULT_SIZE, |candidate| {
                list.iter().any(|watcher| watcher.id == candidate)
            })?;
            list.push(Watcher {
                id: id.clone(),
                callback,
            });
            id
        };

        let owner: Weak<dyn Unregister> = self.me.clone();
        Ok(WatchHandle::new(channel, key, id, owner))
    }

    /// Point read through the worker, correlated by a fresh uuid
    pub async fn query(&self, channel: Channel, key: &str) -> BridgeResult<Value> {
        let (tx, rx) = oneshot::channel();
        let uuid = {
            let mut pending = self.pending.lock().map_err(|_| BridgeError::poisoned())?;
            let uuid = ident::unique(ident::DEFAULT_SIZE, |candidate| pending.contains_key(candidate))?;
            pending.insert(uuid.clone(), tx);
            uuid
        };

        let request = BridgeMessage::Query(QueryPayload::Request {
            channel,
            key: key.to_string(),
            uuid: uuid.clone(),
        });
        if let Err(e) = self.sender.post(&request) {
            self.forget(&uuid);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(_)) => Err(BridgeError::PortClosed),
            Err(_) => {
                self.forget(&uuid);
                let after_ms = self.timeout.as_millis() as u64;
                Logger::warn(
                    Event::QueryTimeout,
                    &[("uuid", &uuid), ("key", key), ("after_ms", &after_ms.to_string())],
                );
                Err(BridgeError::QueryTimeout { uuid, after_ms })
            }
        }
    }

    /// Queries still waiting for an answer
    pub fn pending_queries(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }

    fn dispatch(&self, message: BridgeMessage) {
        match message {
            BridgeMessage::Update {
                channel,
                key,
                expiration,
                data,
            } => {
                if data.is_null() {
                    if let Ok(mut mirror) = self.mirror.write() {
                        mirror.remove(&(channel, key.clone()));
                    }
                    self.notify(&key, None);
                } else {
                    self.mirror_set(channel, &key, expiration, data.clone());
                    self.notify(&key, Some(&data));
                }
            }
            BridgeMessage::Query(QueryPayload::Response { uuid, data }) => {
                let waiter = self
                    .pending
                    .lock()
                    .ok()
                    .and_then(|mut pending| pending.remove(&uuid));
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(data);
                    }
                    None => Logger::trace(
                        Event::BridgeMessageDropped,
                        &[("action", "query"), ("uuid", &uuid)],
                    ),
                }
            }
            other => Logger::trace(Event::BridgeMessageDropped, &[("action", other.action())]),
        }
    }

    fn mirror_set(&self, channel: Channel, key: &str, expiration: u64, data: Value) {
        let fresh = Freshness::stamp(self.clock.now_millis(), expiration);
        if let Ok(mut mirror) = self.mirror.write() {
            mirror.insert((channel, key.to_string()), (data, fresh));
        }
    }

    fn forget(&self, uuid: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(uuid);
        }
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

impl Unregister for WorkerProxy {
    fn unregister(&self, _channel: Channel, key: &str, id: &str) -> StorageResult<()> {
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
}

impl Drop for WorkerProxy {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.listener.lock() {
            if let Some(listener) = slot.take() {
                listener.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ManualClock;
    use serde_json::json;

    fn proxy(shared: bool) -> (Arc<WorkerProxy>, Port) {
        let (near, far) = Port::pair();
        let proxy = WorkerProxy::connect(
            near,
            shared,
            Arc::new(ManualClock::new(1_000)),
            Duration::from_millis(50),
        )
        .unwrap();
        (proxy, far)
    }

    #[tokio::test]
    async fn test_register_key_sent_once_when_shared() {
        let (proxy, mut far) = proxy(true);
        proxy.register_key(Channel::Memory, "k").unwrap();
        proxy.register_key(Channel::Memory, "k").unwrap();

        assert!(matches!(far.try_recv(), Some(BridgeMessage::Register { .. })));
        assert!(far.try_recv().is_none());

        let (dedicated, mut far) = self::proxy(false);
        dedicated.register_key(Channel::Memory, "k").unwrap();
        assert!(far.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_populate_mirrors_and_forwards() {
        let (proxy, mut far) = proxy(false);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        proxy
            .register(Channel::Memory, "k", Arc::new(move |data| sink.lock().unwrap().push(data)))
            .unwrap();

        proxy.populate(Channel::Memory, "k", 500, &json!({"a": 1})).unwrap();

        assert_eq!(proxy.get(Channel::Memory, "k"), json!({"a": 1}));
        assert_eq!(proxy.freshness(Channel::Memory, "k"), 1_000);
        assert!(matches!(far.try_recv(), Some(BridgeMessage::Update { expiration: 500, .. })));
        assert_eq!(*seen.lock().unwrap(), vec![Some(json!({"a": 1}))]);
    }

    #[tokio::test]
    async fn test_remove_forwards_should_update() {
        let (proxy, mut far) = proxy(true);
        proxy.populate(Channel::Local, "k", 10, &json!(1)).unwrap();
        proxy.remove(Channel::Local, "k", false).unwrap();

        far.try_recv();
        assert_eq!(
            far.try_recv(),
            Some(BridgeMessage::Remove {
                channel: Channel::Local,
                key: "k".into(),
                should_update: false,
            })
        );
        assert_eq!(proxy.get(Channel::Local, "k"), json!({}));
        assert_eq!(proxy.freshness(Channel::Local, "k"), 0);
    }

    #[tokio::test]
    async fn test_query_times_out() {
        let (proxy, _far) = proxy(true);
        let err = proxy.query(Channel::Memory, "k").await.unwrap_err();
        assert!(matches!(err, BridgeError::QueryTimeout { after_ms: 50, .. }));
        assert_eq!(proxy.pending_queries(), 0);
    }

    #[tokio::test]
    async fn test_query_resolves_by_uuid() {
        let (proxy, mut far) = proxy(true);
        let answer = tokio::spawn(async move {
            if let Some(BridgeMessage::Query(QueryPayload::Request { uuid, .. })) = far.recv().await {
                far.post(&BridgeMessage::Query(QueryPayload::Response {
                    uuid: "someone-else".into(),
                    data: json!("wrong"),
                }))
                .unwrap();
                far.post(&BridgeMessage::Query(QueryPayload::Response {
                    uuid,
                    data: json!("right"),
                }))
                .unwrap();
            }
            far
        });

        let data = proxy.query(Channel::Memory, "k").await.unwrap();
        assert_eq!(data, json!("right"));
        drop(answer.await.unwrap());
    }

    #[tokio::test]
    async fn test_null_update_means_removal() {
        let (proxy, far) = proxy(true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = proxy
            .register(Channel::Memory, "k", Arc::new(move |data| sink.lock().unwrap().push(data)))
            .unwrap();

        proxy.dispatch(BridgeMessage::Update {
            channel: Channel::Memory,
            key: "k".into(),
            expiration: 10,
            data: json!([1]),
        });
        proxy.dispatch(BridgeMessage::Update {
            channel: Channel::Memory,
            key: "k".into(),
            expiration: 10,
            data: Value::Null,
        });

        assert_eq!(*seen.lock().unwrap(), vec![Some(json!([1])), None]);
        handle.remove().unwrap();
        assert!(matches!(handle.remove(), Err(StorageError::UnknownWatch)));
        drop(far);
    }

    #[tokio::test]
    async fn test_watchers_hear_every_channel_of_their_key() {
        let (proxy, _far) = proxy(false);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        proxy
            .register(Channel::Local, "k", Arc::new(move |data| sink.lock().unwrap().push(data)))
            .unwrap();

        proxy.populate(Channel::Memory, "k", 10, &json!(42)).unwrap();
        proxy.populate(Channel::Memory, "other", 10, &json!(0)).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![Some(json!(42))]);
    }
}
