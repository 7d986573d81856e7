//! TTL and legacy-shape contract for ProgressCache

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use trailsync_cache::{FileStore, KeyValueStore, ManualClock, MemoryStore, ProgressCache, DEFAULT_TTL};

const T0: i64 = 1_700_000_000_000;

#[test]
fn entry_visible_until_ttl_then_absent() {
    let clock = Arc::new(ManualClock::new(T0));
    let cache = ProgressCache::with_clock(Arc::new(MemoryStore::new()), clock.clone(), DEFAULT_TTL);

    cache.set("progress:kata:k1", &vec![1, 2, 3]).unwrap();

    clock.set(T0 + 4 * 60_000 + 59_000);
    assert_eq!(cache.get::<Vec<i32>>("progress:kata:k1"), Some(vec![1, 2, 3]));

    clock.set(T0 + 5 * 60_000 + 1_000);
    assert_eq!(cache.get::<Vec<i32>>("progress:kata:k1"), None);
}

#[test]
fn legacy_selection_survives_ten_minutes() {
    let clock = Arc::new(ManualClock::new(T0));
    let store = Arc::new(MemoryStore::new());
    store.set("K", r#"["x","y"]"#).unwrap();
    let cache = ProgressCache::with_clock(store, clock.clone(), DEFAULT_TTL);

    clock.advance(Duration::from_secs(600));
    assert_eq!(cache.get_selection("K"), Some(vec!["x".to_string(), "y".to_string()]));
}

#[test]
fn file_backed_cache_keeps_wrapped_entries_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trailsync.json");
    let clock = Arc::new(ManualClock::new(T0));

    {
        let store = Arc::new(FileStore::open(&path).unwrap());
        let cache = ProgressCache::with_clock(store, clock.clone(), DEFAULT_TTL);
        cache.set("progress:path:p", &"done").unwrap();
    }

    let store = Arc::new(FileStore::open(&path).unwrap());
    let cache = ProgressCache::with_clock(store, clock.clone(), DEFAULT_TTL);
    assert_eq!(cache.get::<String>("progress:path:p").as_deref(), Some("done"));

    clock.advance(Duration::from_secs(301));
    assert_eq!(cache.get::<String>("progress:path:p"), None);
}

proptest! {
    #[test]
    fn prop_freshness_matches_age(age_ms in 0i64..(10 * 60_000)) {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = ProgressCache::with_clock(Arc::new(MemoryStore::new()), clock.clone(), DEFAULT_TTL);
        cache.set("k", &true).unwrap();

        clock.set(T0 + age_ms);
        let hit = cache.get::<bool>("k").is_some();
        prop_assert_eq!(hit, age_ms <= 5 * 60_000);
    }

    #[test]
    fn prop_garbage_never_panics(raw in ".*") {
        let store = Arc::new(MemoryStore::new());
        store.set("k", &raw).unwrap();
        let cache = ProgressCache::new(store);
        let _ = cache.get::<serde_json::Value>("k");
    }
}
