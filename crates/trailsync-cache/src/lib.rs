//! trailsync cache layer
//!
//! The offline fallback for selection and progress data. Values are kept in a
//! persistent key/value store and read back through a time-to-live check.
//!
//! # Architecture
//!
//! ```text
//! SyncScheduler / SyncSession
//!            │
//!            ▼
//!      ProgressCache ── StoredEntry (Legacy | Wrapped | Corrupt)
//!            │
//!            ▼
//!     dyn KeyValueStore (MemoryStore, FileStore)
//! ```
//!
//! Two stored shapes exist. Selection lists are written as a bare JSON array
//! (the legacy shape, never expires); everything else is wrapped as
//! `{"data": .., "timestamp": <epoch millis>}` and expires after the TTL.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trailsync_cache::{MemoryStore, ProgressCache};
//!
//! let cache = ProgressCache::new(Arc::new(MemoryStore::new()));
//! cache.set_selection("selectedLearningPaths", &["kata-01".to_string()]).unwrap();
//! assert_eq!(
//!     cache.get_selection("selectedLearningPaths"),
//!     Some(vec!["kata-01".to_string()])
//! );
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod cache;
pub mod clock;
pub mod entry;
pub mod error;
pub mod store;

pub use cache::{ProgressCache, DEFAULT_TTL};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{CacheEntry, StoredEntry};
pub use error::StoreError;
pub use store::{FileStore, KeyValueStore, MemoryStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
