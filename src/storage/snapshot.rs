//! # Hydration snapshots
//!
//! The serialized state of all three channels, handed from one execution
//! context to the next. On the wire it is base64 of the JSON object
//! `{"memory": {..}, "local": {..}, "session": {..}}`; a plain JSON object
//! is accepted too.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::channel::Channel;
use super::errors::{StorageError, StorageResult};

/// Stored data of every channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub memory: Map<String, Value>,
    #[serde(default)]
    pub local: Map<String, Value>,
    #[serde(default)]
    pub session: Map<String, Value>,
}

impl Snapshot {
    pub fn channel(&self, channel: Channel) -> &Map<String, Value> {
        match channel {
            Channel::Memory => &self.memory,
            Channel::Local => &self.local,
            Channel::Session => &self.session,
        }
    }

    pub fn channel_mut(&mut self, channel: Channel) -> &mut Map<String, Value> {
        match channel {
            Channel::Memory => &mut self.memory,
            Channel::Local => &mut self.local,
            Channel::Session => &mut self.session,
        }
    }

    /// Number of entries across channels
    pub fn len(&self) -> usize {
        self.memory.len() + self.local.len() + self.session.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> String {
        Value::Object(
            Channel::ALL
                .iter()
                .map(|c| (c.as_str().to_string(), Value::Object(self.channel(*c).clone())))
                .collect(),
        )
        .to_string()
    }

    /// Transport form
    pub fn encode(&self) -> String {
        STANDARD.encode(self.to_json())
    }

    /// Decode a transport payload. `global` names where it came from, for
    /// the error message.
    pub fn decode(raw: &str, global: &str) -> StorageResult<Self> {
        let invalid = |reason: String| StorageError::InvalidSnapshot {
            global: global.to_string(),
            reason,
        };

        let raw = raw.trim();
        let json = match STANDARD.decode(raw) {
            Ok(bytes) => String::from_utf8(bytes).map_err(|e| invalid(e.to_string()))?,
            Err(_) => raw.to_string(),
        };

        let value: Value = serde_json::from_str(&json).map_err(|e| invalid(e.to_string()))?;
        let Value::Object(mut object) = value else {
            return Err(invalid("expected an object".into()));
        };

        let mut snapshot = Snapshot::default();
        for channel in Channel::ALL {
            match object.remove(channel.as_str()) {
                None | Some(Value::Null) => {}
                Some(Value::Object(entries)) => *snapshot.channel_mut(channel) = entries,
                Some(_) => {
                    return Err(invalid(format!("{} must be an object", channel.as_str())));
                }
            }
        }
        Ok(snapshot)
    }
}
