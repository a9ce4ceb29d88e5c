//! # Bridge messages
//!
//! Wire protocol between caches and a shared background context. Messages
//! are JSON objects of the form `{"action": ..., "payload": {...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::Channel;

use super::errors::{BridgeError, BridgeResult};

fn default_true() -> bool {
    true
}

/// A bridge action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "lowercase")]
pub enum BridgeMessage {
    /// Subscribe the sending context to future updates of a key
    Register { channel: Channel, key: String },

    /// New data for a key; `data: null` signals removal
    Update {
        channel: Channel,
        key: String,
        expiration: u64,
        data: Value,
    },

    /// Delete a key, notifying subscribers unless `shouldUpdate` is false
    Remove {
        channel: Channel,
        key: String,
        #[serde(rename = "shouldUpdate", default = "default_true")]
        should_update: bool,
    },

    /// Point read, correlated by `uuid`
    Query(QueryPayload),
}

/// Payload of a `query` action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryPayload {
    Request {
        channel: Channel,
        key: String,
        uuid: String,
    },
    Response {
        uuid: String,
        #[serde(default)]
        data: Value,
    },
}

impl BridgeMessage {
    /// Action name on the wire
    pub fn action(&self) -> &'static str {
        match self {
            BridgeMessage::Register { .. } => "register",
            BridgeMessage::Update { .. } => "update",
            BridgeMessage::Remove { .. } => "remove",
            BridgeMessage::Query(_) => "query",
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_value(value: Value) -> BridgeResult<Self> {
        serde_json::from_value(value).map_err(|e| BridgeError::InvalidMessage(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    pub fn from_json(raw: &str) -> BridgeResult<Self> {
        serde_json::from_str(raw).map_err(|e| BridgeError::InvalidMessage(e.to_string()))
    }
}
