//! # Channels
//!
//! The three independent key-value namespaces a cache entry can live in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::errors::{StorageError, StorageResult};

/// Storage channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// In-process map; always available
    Memory,
    /// Durable host medium
    Local,
    /// Per-session host medium
    Session,
}

impl Channel {
    /// Every channel, in snapshot order
    pub const ALL: [Channel; 3] = [Channel::Memory, Channel::Local, Channel::Session];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Memory => "memory",
            Channel::Local => "local",
            Channel::Session => "session",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A channel name outside `memory|local|session`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown storage channel: {0}")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Channel::Memory),
            "local" => Ok(Channel::Local),
            "session" => Ok(Channel::Session),
            other => Err(UnknownChannel(other.to_string())),
        }
    }
}

/// Anything a controller operation accepts as a channel.
///
/// Names are checked on use so the error can name the operation.
pub trait IntoChannel {
    fn into_channel(self, caller: &'static str) -> StorageResult<Channel>;
}

impl IntoChannel for Channel {
    fn into_channel(self, _caller: &'static str) -> StorageResult<Channel> {
        Ok(self)
    }
}

impl IntoChannel for &str {
    fn into_channel(self, caller: &'static str) -> StorageResult<Channel> {
        self.parse()
            .map_err(|_| StorageError::InvalidChannel { caller })
    }
}

impl IntoChannel for &String {
    fn into_channel(self, caller: &'static str) -> StorageResult<Channel> {
        self.as_str().into_channel(caller)
    }
}

impl IntoChannel for String {
    fn into_channel(self, caller: &'static str) -> StorageResult<Channel> {
        self.as_str().into_channel(caller)
    }
}
