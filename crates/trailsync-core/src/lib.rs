//! trailsync core - selection and progress reconciliation
//!
//! Keeps three copies of a learner's state consistent:
//! - the in-memory optimistic copy ([`SelectionStore`], [`ProgressBook`])
//! - the time-limited local fallback ([`trailsync_cache::ProgressCache`])
//! - the authoritative remote store ([`RemoteStore`]) plus its push channel
//!
//! Host mutations are synchronous; remote writes are debounced and
//! single-flight ([`SyncScheduler`]). Remote failures never surface to the
//! host beyond a terse [`SyncStatus`].
//!
//! # Example
//!
//! ```rust,ignore
//! use trailsync_core::prelude::*;
//!
//! let session = SessionBuilder::new(SyncConfig::new(), remote, transport, routes)
//!     .with_mapping(PathMapping::builtin()?)
//!     .build();
//! session.hydrate().await;
//! session.on_update(|event| println!("{event:?}"));
//! session.selection().add("path-foundation");
//! session.connect_realtime("/katas/intro");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod events;
pub mod progress;
pub mod push;
pub mod remote;
pub mod scheduler;
pub mod selection;
pub mod session;
pub mod types;
pub mod validate;

pub use config::{CacheConfig, SyncConfig, PROGRESS_CACHE_PREFIX, SELECTION_CACHE_KEY};
pub use error::{ConfigError, MalformedData, RemoteError};
pub use events::{UpdateCallback, UpdateListeners};
pub use progress::{PageProgress, ProgressBook, ProgressRecord};
pub use push::{ProgressPush, PushMessage, SessionPushHandler};
pub use remote::RemoteStore;
pub use scheduler::{FlushOutcome, SaveJob, SaveTrigger, SyncScheduler};
pub use selection::{SelectionSaveJob, SelectionState, SelectionStore, SharedSelection};
pub use session::{Hydration, HydrationSource, SessionBuilder, SyncSession};
pub use types::{
    CheckboxUpdate, Milestone, ProgressKind, ProgressReport, ProgressSnapshot, ProgressTotals,
    Recommendation, SelectionPayload, SessionEvent, SyncStatus,
};
pub use validate::{parse_progress, parse_recommendation, parse_selections, RemoteSelections};

pub use trailsync_paths::{PathExpander, PathMapping, Provenance};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for embedding a sync session
    pub use crate::{
        CheckboxUpdate, PathMapping, ProgressKind, ProgressSnapshot, RemoteStore, SessionBuilder, SessionEvent,
        SyncConfig, SyncSession, SyncStatus,
    };
    pub use trailsync_realtime::{ChannelState, PushTransport, SharedRoute};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
