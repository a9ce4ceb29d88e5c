//! # Ports
//!
//! A [`Port`] is one end of a bidirectional message channel. Messages travel
//! as JSON values, so anything posted with [`PortSender::post_raw`] reaches
//! the other end even when it is not a bridge action; the receiving side
//! drops those.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::observability::{Event, Logger};

use super::errors::{BridgeError, BridgeResult};
use super::message::BridgeMessage;

static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

/// Sending half of a port
#[derive(Debug, Clone)]
pub struct PortSender {
    id: u64,
    tx: mpsc::UnboundedSender<Value>,
}

impl PortSender {
    /// Identity of the port this sender belongs to
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn post(&self, message: &BridgeMessage) -> BridgeResult<()> {
        self.post_raw(message.to_value())
    }

    pub fn post_raw(&self, value: Value) -> BridgeResult<()> {
        self.tx.send(value).map_err(|_| BridgeError::PortClosed)
    }

    /// Whether the other end has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of a port
#[derive(Debug)]
pub struct PortReceiver {
    id: u64,
    rx: mpsc::UnboundedReceiver<Value>,
}

impl PortReceiver {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next bridge action. Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<BridgeMessage> {
        loop {
            let raw = self.rx.recv().await?;
            if let Some(message) = self.decode(raw) {
                return Some(message);
            }
        }
    }

    /// Next already-queued bridge action, without waiting
    pub fn try_recv(&mut self) -> Option<BridgeMessage> {
        loop {
            let raw = self.rx.try_recv().ok()?;
            if let Some(message) = self.decode(raw) {
                return Some(message);
            }
        }
    }

    fn decode(&self, raw: Value) -> Option<BridgeMessage> {
        match BridgeMessage::from_value(raw) {
            Ok(message) => Some(message),
            Err(e) => {
                Logger::trace(
                    Event::BridgeMessageDropped,
                    &[("port", &self.id.to_string()), ("error", &e.to_string())],
                );
                None
            }
        }
    }
}

/// One end of a connected pair
#[derive(Debug)]
pub struct Port {
    sender: PortSender,
    receiver: PortReceiver,
}

impl Port {
    /// Two connected ends: what one posts, the other receives
    pub fn pair() -> (Port, Port) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let a = NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed);
        let b = NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed);

        (
            Port {
                sender: PortSender { id: a, tx: b_tx },
                receiver: PortReceiver { id: a, rx: a_rx },
            },
            Port {
                sender: PortSender { id: b, tx: a_tx },
                receiver: PortReceiver { id: b, rx: b_rx },
            },
        )
    }

    pub fn id(&self) -> u64 {
        self.sender.id
    }

    pub fn sender(&self) -> &PortSender {
        &self.sender
    }

    pub fn post(&self, message: &BridgeMessage) -> BridgeResult<()> {
        self.sender.post(message)
    }

    pub async fn recv(&mut self) -> Option<BridgeMessage> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<BridgeMessage> {
        self.receiver.try_recv()
    }

    pub fn split(self) -> (PortSender, PortReceiver) {
        (self.sender, self.receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Channel;
    use serde_json::json;

    #[tokio::test]
    async fn test_pair_is_bidirectional() {
        let (mut left, mut right) = Port::pair();
        let register = BridgeMessage::Register {
            channel: Channel::Memory,
            key: "k".into(),
        };

        left.post(&register).unwrap();
        assert_eq!(right.recv().await, Some(register.clone()));

        right.post(&register).unwrap();
        assert_eq!(left.recv().await, Some(register));
        assert_ne!(left.id(), right.id());
    }

    #[tokio::test]
    async fn test_non_actions_are_dropped() {
        let (left, mut right) = Port::pair();
        left.sender().post_raw(json!({"hello": "world"})).unwrap();
        left.post(&BridgeMessage::Register {
            channel: Channel::Local,
            key: "k".into(),
        })
        .unwrap();

        assert!(matches!(right.recv().await, Some(BridgeMessage::Register { .. })));
        assert!(right.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_closed_port() {
        let (left, right) = Port::pair();
        drop(right);
        assert!(left.sender().is_closed());
        assert!(matches!(
            left.sender().post_raw(json!(1)),
            Err(BridgeError::PortClosed)
        ));
    }
}
