//! # Shared Worker
//!
//! Background context that several caches share through ports. It keeps the
//! last value of every (channel, key) it has seen and forwards updates to
//! the ports that registered for that key.
//!
//! Fan-out is best effort: a port whose other end is gone counts as a failed
//! delivery and is dropped from every subscription.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::host::Clock;
use crate::observability::{Event, Logger};
use crate::storage::Channel;

use super::errors::{BridgeError, BridgeResult};
use super::message::{BridgeMessage, QueryPayload};
use super::port::{Port, PortSender};

type Slot = (Channel, String);

/// Background context answering `register`, `update`, `remove` and `query`
pub struct SharedWorker {
    clock: Arc<dyn Clock>,
    data: RwLock<HashMap<Slot, Value>>,
    ports: RwLock<HashMap<u64, PortSender>>,
    subscriptions: RwLock<HashMap<Slot, Vec<u64>>>,
}

impl fmt::Debug for SharedWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedWorker")
            .field("ports", &self.port_count())
            .finish()
    }
}

impl SharedWorker {
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            data: RwLock::new(HashMap::new()),
            ports: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
        })
    }

    /// Accept a port and serve it until its other end closes
    pub fn connect(self: &Arc<Self>, port: Port) -> BridgeResult<JoinHandle<()>> {
        let handle = Handle::try_current().map_err(|_| BridgeError::NoRuntime)?;
        let (sender, mut receiver) = port.split();

        if let Ok(mut ports) = self.ports.write() {
            ports.insert(sender.id(), sender.clone());
        }

        let weak: Weak<SharedWorker> = Arc::downgrade(self);
        Ok(handle.spawn(async move {
            while let Some(message) = receiver.recv().await {
                let Some(worker) = weak.upgrade() else {
                    return;
                };
                worker.handle(&sender, message);
            }

            if let Some(worker) = weak.upgrade() {
                worker.disconnect(sender.id());
            }
        }))
    }

    /// Apply one message from `from`
    pub fn handle(&self, from: &PortSender, message: BridgeMessage) -> DeliveryReport {
        match message {
            BridgeMessage::Register { channel, key } => {
                self.subscribe(channel, &key, from.id());
                DeliveryReport::default()
            }
            BridgeMessage::Update {
                channel,
                key,
                expiration,
                data,
            } => {
                self.store(channel, &key, data.clone());
                self.fan_out(
                    channel,
                    &key,
                    BridgeMessage::Update {
                        channel,
                        key: key.clone(),
                        expiration,
                        data,
                    },
                )
            }
            BridgeMessage::Remove {
                channel,
                key,
                should_update,
            } => {
                self.store(channel, &key, Value::Null);
                if !should_update {
                    return DeliveryReport::default();
                }
                self.fan_out(
                    channel,
                    &key,
                    BridgeMessage::Update {
                        channel,
                        key: key.clone(),
                        expiration: self.clock.now_millis(),
                        data: Value::Null,
                    },
                )
            }
            BridgeMessage::Query(QueryPayload::Request { channel, key, uuid }) => {
                let reply = BridgeMessage::Query(QueryPayload::Response {
                    uuid,
                    data: self.get(channel, &key),
                });
                let mut report = DeliveryReport {
                    matched: 1,
                    ..DeliveryReport::default()
                };
                match from.post(&reply) {
                    Ok(()) => report.delivered += 1,
                    Err(_) => report.failed += 1,
                }
                report
            }
            BridgeMessage::Query(QueryPayload::Response { uuid, .. }) => {
                Logger::trace(
                    Event::BridgeMessageDropped,
                    &[("action", "query"), ("uuid", &uuid)],
                );
                DeliveryReport::default()
            }
        }
    }

    /// Last value stored for `key`, `null` when there is none
    pub fn get(&self, channel: Channel, key: &str) -> Value {
        self.data
            .read()
            .ok()
            .and_then(|data| data.get(&(channel, key.to_string())).cloned())
            .unwrap_or(Value::Null)
    }

    /// Ports registered for `key`
    pub fn subscribers(&self, channel: Channel, key: &str) -> usize {
        self.subscriptions
            .read()
            .map(|subs| subs.get(&(channel, key.to_string())).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn port_count(&self) -> usize {
        self.ports.read().map(|ports| ports.len()).unwrap_or(0)
    }

    fn store(&self, channel: Channel, key: &str, value: Value) {
        if let Ok(mut data) = self.data.write() {
            data.insert((channel, key.to_string()), value);
        }
    }

    fn subscribe(&self, channel: Channel, key: &str, port: u64) {
        if let Ok(mut subs) = self.subscriptions.write() {
            let list = subs.entry((channel, key.to_string())).or_default();
            if !list.contains(&port) {
                list.push(port);
            }
        }
    }

    fn fan_out(&self, channel: Channel, key: &str, message: BridgeMessage) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        let ids: Vec<u64> = match self.subscriptions.read() {
            Ok(subs) => subs.get(&(channel, key.to_string())).cloned().unwrap_or_default(),
            Err(_) => return report,
        };
        report.matched = ids.len();

        let senders: Vec<(u64, Option<PortSender>)> = match self.ports.read() {
            Ok(ports) => ids.iter().map(|id| (*id, ports.get(id).cloned())).collect(),
            Err(_) => return report,
        };

        let mut dead = Vec::new();
        for (id, sender) in senders {
            match sender.map(|sender| sender.post(&message)) {
                Some(Ok(())) => report.delivered += 1,
                _ => {
                    report.failed += 1;
                    dead.push(id);
                }
            }
        }

        for id in dead {
            self.disconnect(id);
        }
        report
    }

    fn disconnect(&self, port: u64) {
        let known = match self.ports.write() {
            Ok(mut ports) => ports.remove(&port).is_some(),
            Err(_) => false,
        };
        if let Ok(mut subs) = self.subscriptions.write() {
            subs.retain(|_, list| {
                list.retain(|id| *id != port);
                !list.is_empty()
            });
        }
        if known {
            Logger::info(Event::PortClosed, &[("port", &port.to_string())]);
        }
    }
}

/// Outcome of one fan-out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Ports subscribed to the key
    pub matched: usize,
    /// Messages posted
    pub delivered: usize,
    /// Ports that were gone
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ManualClock;
    use serde_json::json;

    fn worker() -> Arc<SharedWorker> {
        SharedWorker::new(Arc::new(ManualClock::new(5_000)))
    }

    fn update(data: Value) -> BridgeMessage {
        BridgeMessage::Update {
            channel: Channel::Memory,
            key: "k".into(),
            expiration: 100,
            data,
        }
    }

    #[test]
    fn test_update_reaches_registered_ports_only() {
        let worker = worker();
        let (a, mut a_far) = Port::pair();
        let (b, mut b_far) = Port::pair();
        let (a, _) = a.split();
        let (b, _) = b.split();
        worker.ports.write().unwrap().insert(a.id(), a.clone());
        worker.ports.write().unwrap().insert(b.id(), b.clone());

        worker.handle(
            &a,
            BridgeMessage::Register {
                channel: Channel::Memory,
                key: "k".into(),
            },
        );
        let report = worker.handle(&b, update(json!([1])));

        assert_eq!(report, DeliveryReport { matched: 1, delivered: 1, failed: 0 });
        assert_eq!(a_far.try_recv(), Some(update(json!([1]))));
        assert!(b_far.try_recv().is_none());
        assert_eq!(worker.get(Channel::Memory, "k"), json!([1]));
    }

    #[test]
    fn test_remove_posts_null_update() {
        let worker = worker();
        let (a, mut a_far) = Port::pair();
        let (a, _) = a.split();
        worker.ports.write().unwrap().insert(a.id(), a.clone());
        worker.handle(
            &a,
            BridgeMessage::Register {
                channel: Channel::Memory,
                key: "k".into(),
            },
        );

        let quiet = worker.handle(
            &a,
            BridgeMessage::Remove {
                channel: Channel::Memory,
                key: "k".into(),
                should_update: false,
            },
        );
        assert_eq!(quiet.matched, 0);
        assert!(a_far.try_recv().is_none());

        worker.handle(
            &a,
            BridgeMessage::Remove {
                channel: Channel::Memory,
                key: "k".into(),
                should_update: true,
            },
        );
        assert_eq!(
            a_far.try_recv(),
            Some(BridgeMessage::Update {
                channel: Channel::Memory,
                key: "k".into(),
                expiration: 5_000,
                data: Value::Null,
            })
        );
    }

    #[test]
    fn test_query_answers_asking_port() {
        let worker = worker();
        let (a, mut a_far) = Port::pair();
        let (a, _) = a.split();
        worker.handle(&a, update(json!({"a": 1})));

        worker.handle(
            &a,
            BridgeMessage::Query(QueryPayload::Request {
                channel: Channel::Memory,
                key: "k".into(),
                uuid: "q1".into(),
            }),
        );
        assert_eq!(
            a_far.try_recv(),
            Some(BridgeMessage::Query(QueryPayload::Response {
                uuid: "q1".into(),
                data: json!({"a": 1}),
            }))
        );
    }

    #[test]
    fn test_dead_ports_are_pruned() {
        let worker = worker();
        let (a, a_far) = Port::pair();
        let (a, _) = a.split();
        worker.ports.write().unwrap().insert(a.id(), a.clone());
        worker.handle(
            &a,
            BridgeMessage::Register {
                channel: Channel::Memory,
                key: "k".into(),
            },
        );
        drop(a_far);

        let report = worker.handle(&a, update(json!(1)));
        assert_eq!(report.failed, 1);
        assert_eq!(worker.subscribers(Channel::Memory, "k"), 0);
        assert_eq!(worker.port_count(), 0);
    }

    #[test]
    fn test_connect_requires_runtime() {
        let worker = worker();
        let (port, _far) = Port::pair();
        assert!(matches!(worker.connect(port), Err(BridgeError::NoRuntime)));
    }
}
