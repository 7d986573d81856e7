//! Stored value shapes
//!
//! Raw store values are decoded once, here, into [`StoredEntry`]. Call sites
//! match on the variant instead of probing JSON structure themselves.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Timestamped wrapper written for every non-legacy payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// Cached payload
    pub data: T,
    /// Write time in epoch milliseconds
    pub timestamp: i64,
}

impl<T> CacheEntry<T> {
    /// Wrap payload with write time
    #[inline]
    #[must_use]
    pub fn new(data: T, timestamp: i64) -> Self {
        Self { data, timestamp }
    }

    /// Valid iff `now - timestamp <= ttl`
    #[inline]
    #[must_use]
    pub fn is_fresh(&self, now_millis: i64, ttl: Duration) -> bool {
        is_fresh(self.timestamp, now_millis, ttl)
    }
}

/// Decoded form of a raw store value
#[derive(Debug, Clone, PartialEq)]
pub enum StoredEntry {
    /// Bare array of ids with no timestamp; never expires
    Legacy(Vec<String>),
    /// `{data, timestamp}` wrapper subject to TTL
    Wrapped(CacheEntry<Value>),
    /// Anything else; treated as absent
    Corrupt(String),
}

impl StoredEntry {
    /// Decode raw store text
    #[must_use]
    pub fn decode(raw: &str) -> Self {
        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => return Self::Corrupt(format!("unparsable: {e}")),
        };

        match value {
            Value::Array(items) => {
                let ids: Option<Vec<String>> = items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect();
                ids.map_or_else(
                    || Self::Corrupt("legacy array holds non-string ids".to_string()),
                    Self::Legacy,
                )
            }
            Value::Object(mut map) => {
                let timestamp = map.get("timestamp").and_then(json_millis);
                match (map.remove("data"), timestamp) {
                    (Some(data), Some(timestamp)) => Self::Wrapped(CacheEntry { data, timestamp }),
                    (None, _) => Self::Corrupt("wrapper missing data".to_string()),
                    (_, None) => Self::Corrupt("wrapper missing numeric timestamp".to_string()),
                }
            }
            other => Self::Corrupt(format!("unexpected json kind: {}", kind_name(&other))),
        }
    }

    /// Encode a selection list in the legacy raw shape
    ///
    /// # Errors
    /// Returns the serializer error (not expected for string slices)
    pub fn encode_legacy(ids: &[String]) -> Result<String, serde_json::Error> {
        serde_json::to_string(ids)
    }

    /// Encode a payload inside the timestamped wrapper
    ///
    /// # Errors
    /// Returns the serializer error if `data` cannot be represented as JSON
    pub fn encode_wrapped<T: Serialize>(data: &T, timestamp: i64) -> Result<String, serde_json::Error> {
        serde_json::to_string(&CacheEntry { data, timestamp })
    }
}

// A timestamp more than the TTL in the future (clock skew) is expired too.
pub(crate) fn is_fresh(timestamp: i64, now_millis: i64, ttl: Duration) -> bool {
    let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    now_millis.abs_diff(timestamp) <= ttl_millis
}

// Timestamps written by other clients may be floats.
#[allow(clippy::cast_possible_truncation)]
fn json_millis(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
