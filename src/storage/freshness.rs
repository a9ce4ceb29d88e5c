//! # Freshness records
//!
//! Per-key bookkeeping of when data was last populated and when it expires.
//! Records live in a table under a reserved key of each channel store,
//! separate from the data itself.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved store key of the freshness table
pub(crate) const FRESHNESS_KEY: &str = "syme.fresh";

/// Prefix of data keys inside a channel store
pub(crate) const DATA_PREFIX: &str = "syme.data.";

pub(crate) fn data_key(key: &str) -> String {
    format!("{}{}", DATA_PREFIX, key)
}

/// Freshness of one entry. Hydrated entries carry an empty record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Freshness {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<u64>,
}

impl Freshness {
    /// Record a populate at `now` that stays fresh for `expiration`
    pub fn stamp(now: u64, expiration: u64) -> Self {
        Self {
            hit: Some(now),
            expires: Some(now.saturating_add(expiration)),
        }
    }

    /// Length of the expiry window, when both ends are known
    pub fn window(&self) -> Option<u64> {
        match (self.hit, self.expires) {
            (Some(hit), Some(expires)) => Some(expires.saturating_sub(hit)),
            _ => None,
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires, Some(expires) if expires < now)
    }

    /// Parse a stored record. `None` means the record is malformed.
    pub fn parse(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_value(self) -> Value {
        let mut out = Map::new();
        if let Some(hit) = self.hit {
            out.insert("hit".into(), Value::from(hit));
        }
        if let Some(expires) = self.expires {
            out.insert("expires".into(), Value::from(expires));
        }
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stamp_and_window() {
        let fresh = Freshness::stamp(1_000, 500);
        assert_eq!(fresh.window(), Some(500));
        assert!(!fresh.is_expired(1_500));
        assert!(fresh.is_expired(1_501));
    }

    #[test]
    fn test_empty_record_never_expires() {
        let fresh = Freshness::parse(&json!({})).unwrap();
        assert_eq!(fresh, Freshness::default());
        assert!(!fresh.is_expired(u64::MAX));
        assert_eq!(fresh.window(), None);
    }

    #[test]
    fn test_malformed_records() {
        assert!(Freshness::parse(&json!(1_600_000_000_000u64)).is_none());
        assert!(Freshness::parse(&json!({"hit": "yesterday"})).is_none());
        assert!(Freshness::parse(&json!(null)).is_none());
    }

    #[test]
    fn test_to_value() {
        assert_eq!(
            Freshness::stamp(10, 5).to_value(),
            json!({"hit": 10, "expires": 15})
        );
        assert_eq!(Freshness::default().to_value(), json!({}));
    }
}
