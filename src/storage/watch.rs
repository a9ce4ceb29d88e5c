//! # Watch handles

use std::fmt;
use std::sync::{Arc, Weak};

use serde_json::Value;

use super::channel::Channel;
use super::errors::StorageResult;

/// Watcher callback: `Some(data)` on populate, `None` on removal
pub type WatchCallback = Arc<dyn Fn(Option<Value>) + Send + Sync>;

/// Whatever can take a registration back
pub(crate) trait Unregister: Send + Sync {
    fn unregister(&self, channel: Channel, key: &str, id: &str) -> StorageResult<()>;
}

/// Registration of one watcher. Dropping the handle keeps the watcher;
/// call [`WatchHandle::remove`] to stop delivery.
#[derive(Clone)]
pub struct WatchHandle {
    channel: Channel,
    key: String,
    id: String,
    owner: Weak<dyn Unregister>,
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("channel", &self.channel)
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

impl WatchHandle {
    pub(crate) fn new(channel: Channel, key: &str, id: String, owner: Weak<dyn Unregister>) -> Self {
        Self {
            channel,
            key: key.to_string(),
            id,
            owner,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stop delivery to this watcher. Fails if it was already removed; a
    /// backend that no longer exists has nothing left to deliver.
    pub fn remove(&self) -> StorageResult<()> {
        match self.owner.upgrade() {
            Some(owner) => owner.unregister(self.channel, &self.key, &self.id),
            None => Ok(()),
        }
    }
}
