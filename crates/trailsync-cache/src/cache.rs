//! TTL-bounded read-through cache over a [`KeyValueStore`]
//!
//! Reads never fail: missing, expired, corrupted and unreadable values all
//! come back as `None`. Expired wrappers are evicted on the read that finds
//! them, under the same lock as the freshness check.

use crate::clock::{Clock, SystemClock};
use crate::entry::{is_fresh, StoredEntry};
use crate::error::StoreError;
use crate::store::KeyValueStore;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Default time-to-live for wrapped entries (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Offline fallback cache for selection and progress data
#[derive(Debug, Clone)]
pub struct ProgressCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    // Serializes check-then-evict so no other writer lands in between.
    turn: Arc<Mutex<()>>,
}

impl ProgressCache {
    /// Create cache with the system clock and default TTL
    #[inline]
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), DEFAULT_TTL)
    }

    /// Create cache with explicit clock and TTL
    #[inline]
    #[must_use]
    pub fn with_clock(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            turn: Arc::new(Mutex::new(())),
        }
    }

    /// Configured time-to-live
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read and decode the raw entry for `key`
    ///
    /// Expired wrappers are removed from the store and reported as `None`.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<StoredEntry> {
        let _turn = self.turn.lock();

        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed");
                return None;
            }
        };

        match StoredEntry::decode(&raw) {
            StoredEntry::Wrapped(entry) if !is_fresh(entry.timestamp, self.clock.now_millis(), self.ttl) => {
                tracing::debug!(key, timestamp = entry.timestamp, "evicting expired cache entry");
                if let Err(e) = self.store.remove(key) {
                    tracing::warn!(key, error = %e, "failed to evict expired entry");
                }
                None
            }
            StoredEntry::Corrupt(reason) => {
                tracing::warn!(key, %reason, "ignoring corrupted cache entry");
                None
            }
            decoded => Some(decoded),
        }
    }

    /// Get cached value
    ///
    /// Legacy arrays are returned verbatim (when `T` can hold an array) and
    /// never expire; wrapped values are subject to the TTL.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let data = match self.entry(key)? {
            StoredEntry::Legacy(ids) => Value::from(ids),
            StoredEntry::Wrapped(entry) => entry.data,
            StoredEntry::Corrupt(_) => return None,
        };

        serde_json::from_value(data)
            .map_err(|e| tracing::debug!(key, error = %e, "cached value has unexpected shape"))
            .ok()
    }

    /// Get cached selection list from either stored shape
    #[inline]
    #[must_use]
    pub fn get_selection(&self, key: &str) -> Option<Vec<String>> {
        self.get(key)
    }

    /// Store a selection list in the legacy raw-array shape
    ///
    /// # Errors
    /// Returns the backend error if the write fails
    pub fn set_selection(&self, key: &str, ids: &[String]) -> Result<(), StoreError> {
        let encoded = StoredEntry::encode_legacy(ids)?;
        let _turn = self.turn.lock();
        self.store.set(key, &encoded)
    }

    /// Store value wrapped with the current timestamp
    ///
    /// # Errors
    /// Returns encode or backend errors
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let encoded = StoredEntry::encode_wrapped(value, self.clock.now_millis())?;
        let _turn = self.turn.lock();
        self.store.set(key, &encoded)
    }

    /// Remove key
    ///
    /// # Errors
    /// Returns the backend error if the delete fails
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _turn = self.turn.lock();
        self.store.remove(key)
    }

    /// Keys starting with `prefix`, sorted
    #[must_use]
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = match self.store.keys() {
            Ok(keys) => keys.into_iter().filter(|k| k.starts_with(prefix)).collect(),
            Err(e) => {
                tracing::warn!(prefix, error = %e, "cache key listing failed");
                Vec::new()
            }
        };
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use serde::Deserialize;

    const T0: i64 = 1_700_000_000_000;

    fn cache() -> (ProgressCache, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(T0));
        let cache = ProgressCache::with_clock(store.clone(), clock.clone(), DEFAULT_TTL);
        (cache, store, clock)
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Page {
        completed: u32,
        total: u32,
    }

    #[test]
    fn wrapped_entry_respects_ttl() {
        let (cache, store, clock) = cache();
        let page = Page { completed: 2, total: 4 };
        cache.set("progress:kata:intro", &page).unwrap();

        clock.advance(Duration::from_secs(4 * 60 + 59));
        assert_eq!(cache.get::<Page>("progress:kata:intro"), Some(page));

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.get::<Page>("progress:kata:intro"), None);
        // evicted, not just hidden
        assert!(store.get("progress:kata:intro").unwrap().is_none());
    }

    #[test]
    fn entry_written_by_a_fast_clock_is_evicted() {
        let (cache, store, clock) = cache();
        let page = Page { completed: 1, total: 4 };
        clock.advance(Duration::from_secs(60 * 60));
        cache.set("progress:kata:skew", &page).unwrap();

        // Host clock corrected back by an hour
        clock.set(T0);
        assert_eq!(cache.get::<Page>("progress:kata:skew"), None);
        assert!(store.get("progress:kata:skew").unwrap().is_none());
    }

    #[test]
    fn legacy_array_never_expires() {
        let (cache, store, clock) = cache();
        store.set("K", r#"["x","y"]"#).unwrap();

        clock.advance(Duration::from_secs(10 * 60));
        assert_eq!(
            cache.get::<Vec<String>>("K"),
            Some(vec!["x".to_string(), "y".to_string()])
        );
    }

    #[test]
    fn set_selection_writes_raw_array() {
        let (cache, store, _) = cache();
        cache
            .set_selection("selectedLearningPaths", &["path-foundation".to_string()])
            .unwrap();
        assert_eq!(
            store.get("selectedLearningPaths").unwrap().as_deref(),
            Some(r#"["path-foundation"]"#)
        );
    }

    #[test]
    fn get_selection_reads_wrapped_lists_too() {
        let (cache, _, _) = cache();
        cache.set("sel", &vec!["a".to_string()]).unwrap();
        assert_eq!(cache.get_selection("sel"), Some(vec!["a".to_string()]));
    }

    #[test]
    fn corrupted_value_is_absent() {
        let (cache, store, _) = cache();
        store.set("bad", "{{{{").unwrap();
        assert_eq!(cache.get::<Vec<String>>("bad"), None);
        assert!(cache.entry("bad").is_none());
    }

    #[test]
    fn shape_mismatch_is_absent() {
        let (cache, _, _) = cache();
        cache.set("page", &Page { completed: 1, total: 1 }).unwrap();
        assert_eq!(cache.get::<Vec<String>>("page"), None);
    }

    #[test]
    fn keys_with_prefix_filters_and_sorts() {
        let (cache, _, _) = cache();
        cache.set("progress:path:b", &1).unwrap();
        cache.set("progress:kata:a", &1).unwrap();
        cache.set_selection("selectedLearningPaths", &[]).unwrap();

        assert_eq!(
            cache.keys_with_prefix("progress:"),
            vec!["progress:kata:a".to_string(), "progress:path:b".to_string()]
        );
    }

    #[test]
    fn remove_deletes_key() {
        let (cache, _, _) = cache();
        cache.set("k", &1).unwrap();
        cache.remove("k").unwrap();
        assert_eq!(cache.get::<i32>("k"), None);
    }
}
