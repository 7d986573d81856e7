//! Session context owning every sync component
//!
//! A [`SyncSession`] is built once per learner session and torn down with
//! [`SyncSession::shutdown`]. There is no global state: every component is
//! reachable only through the session.

use crate::config::{SyncConfig, PROGRESS_CACHE_PREFIX, SELECTION_CACHE_KEY};
use crate::events::UpdateListeners;
use crate::progress::{PageProgress, ProgressBook};
use crate::push::SessionPushHandler;
use crate::remote::RemoteStore;
use crate::scheduler::{FlushOutcome, SaveTrigger, SyncScheduler};
use crate::selection::{SelectionSaveJob, SelectionStore, SharedSelection};
use crate::types::{
    CheckboxUpdate, ProgressKind, ProgressReport, ProgressSnapshot, SessionEvent, SyncStatus,
};
use crate::validate::{parse_progress, parse_selections, RemoteSelections};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::runtime::Handle;
use trailsync_cache::{Clock, KeyValueStore, MemoryStore, ProgressCache, SystemClock};
use trailsync_paths::{PathExpander, PathMapping};
use trailsync_realtime::{ChannelState, PushTransport, RealtimeChannel, ReconnectState, RouteSource};
use uuid::Uuid;

/// Where hydrated state came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HydrationSource {
    /// Validated remote payload
    Remote,
    /// Cached selection with a fresh recommendation merged in
    Recommendation,
    /// Local fallback cache
    Cache,
    /// Nothing usable anywhere
    Empty,
}

/// Outcome of [`SyncSession::hydrate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hydration {
    /// Source of the selection
    pub selection: HydrationSource,
    /// Source of the progress pages
    pub progress: HydrationSource,
}

/// Builder for [`SyncSession`]
#[derive(Debug)]
pub struct SessionBuilder {
    config: SyncConfig,
    remote: Arc<dyn RemoteStore>,
    transport: Arc<dyn PushTransport>,
    routes: Arc<dyn RouteSource>,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
    mapping: Option<PathMapping>,
    runtime: Option<Handle>,
}

impl SessionBuilder {
    /// Start building a session
    #[must_use]
    pub fn new(
        config: SyncConfig,
        remote: Arc<dyn RemoteStore>,
        transport: Arc<dyn PushTransport>,
        routes: Arc<dyn RouteSource>,
    ) -> Self {
        Self {
            config,
            remote,
            transport,
            routes,
            store: None,
            clock: None,
            mapping: None,
            runtime: None,
        }
    }

    /// With cache backing store (in-memory by default)
    #[inline]
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// With clock (system clock by default)
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// With path mapping (empty by default)
    #[inline]
    #[must_use]
    pub fn with_mapping(mut self, mapping: PathMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// With runtime for timers and the push supervisor (the runtime current
    /// at `build` by default)
    #[inline]
    #[must_use]
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Wire the components together
    ///
    /// Once built, the selection API may be driven from threads outside the
    /// runtime.
    #[must_use]
    pub fn build(self) -> SyncSession {
        let config = self.config;
        let runtime = self.runtime.or_else(|| Handle::try_current().ok());
        if runtime.is_none() {
            tracing::warn!("building sync session outside a tokio runtime; saves and push are disabled");
        }
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let cache = ProgressCache::with_clock(store, Arc::clone(&clock), config.cache_ttl());
        let listeners = UpdateListeners::new();

        let state = SharedSelection::default();
        let job = SelectionSaveJob::new(
            Arc::clone(&state),
            config.user_id.clone(),
            Arc::clone(&self.remote),
            cache.clone(),
            listeners.clone(),
        );
        let scheduler = Arc::new(match runtime.clone() {
            Some(runtime) => SyncScheduler::with_runtime(job, config.debounce(), runtime),
            None => SyncScheduler::new(job, config.debounce()),
        });
        let expander = Arc::new(PathExpander::new(self.mapping.unwrap_or_default()));
        let selection = Arc::new(SelectionStore::new(
            state,
            expander,
            Arc::clone(&scheduler) as Arc<dyn SaveTrigger>,
        ));

        let progress = Arc::new(ProgressBook::new());
        let skill_level = Arc::new(RwLock::new(None));
        let handler = Arc::new(SessionPushHandler::new(
            Arc::clone(&selection),
            Arc::clone(&progress),
            cache.clone(),
            listeners.clone(),
            Arc::clone(&clock),
            config.recommendation_max_age(),
            Arc::clone(&skill_level),
        ));
        let mut channel = RealtimeChannel::new(self.transport, handler, self.routes, config.reconnect);
        if let Some(runtime) = runtime {
            channel = channel.with_runtime(runtime);
        }

        let id = Uuid::new_v4();
        tracing::info!(session_id = %id, user_id = %config.user_id, "sync session created");

        SyncSession {
            id,
            config,
            selection,
            scheduler,
            progress,
            cache,
            remote: self.remote,
            listeners,
            channel,
            skill_level,
            clock,
        }
    }
}

/// One learner's sync context
#[derive(Debug)]
pub struct SyncSession {
    id: Uuid,
    config: SyncConfig,
    selection: Arc<SelectionStore>,
    scheduler: Arc<SyncScheduler<SelectionSaveJob>>,
    progress: Arc<ProgressBook>,
    cache: ProgressCache,
    remote: Arc<dyn RemoteStore>,
    listeners: UpdateListeners,
    channel: RealtimeChannel,
    skill_level: Arc<RwLock<Option<String>>>,
    clock: Arc<dyn Clock>,
}

impl SyncSession {
    /// Session identifier used in logs
    #[inline]
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Selection API for host mutations
    #[inline]
    #[must_use]
    pub fn selection(&self) -> &SelectionStore {
        &self.selection
    }

    /// Per-page progress
    #[inline]
    #[must_use]
    pub fn progress(&self) -> &ProgressBook {
        &self.progress
    }

    /// Fallback cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &ProgressCache {
        &self.cache
    }

    /// Register a host callback
    pub fn on_update(&self, callback: impl Fn(&SessionEvent) + Send + Sync + 'static) {
        self.listeners.register(callback);
    }

    /// Full state for repainting
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            selected: self.selection.snapshot(),
            progress: self.progress.records(),
            skill_level: self.skill_level.read().clone(),
        }
    }

    /// Load selection and progress from the remote store, falling back to
    /// the cache
    ///
    /// Never fails: unreachable or malformed remote data falls back to the
    /// cache, then to an empty state.
    pub async fn hydrate(&self) -> Hydration {
        let selection = self.hydrate_selection().await;
        let progress = self.hydrate_progress().await;
        tracing::info!(?selection, ?progress, session_id = %self.id, "session hydrated");
        self.listeners.emit(&SessionEvent::SelectionChanged);
        Hydration { selection, progress }
    }

    async fn hydrate_selection(&self) -> HydrationSource {
        let now = self.clock.now_millis();
        let remote = match self.remote.fetch_selections(&self.config.user_id).await {
            Ok(body) => match parse_selections(&body, now, self.config.recommendation_max_age()) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    tracing::warn!(error = %e, "rejected remote selections, using cache");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "selection fetch failed, using cache");
                None
            }
        };

        match remote {
            Some(RemoteSelections::Saved(ids)) => {
                self.selection.replace_all(&ids);
                if let Err(e) = self
                    .cache
                    .set_selection(SELECTION_CACHE_KEY, &self.selection.snapshot())
                {
                    tracing::error!(error = %e, "failed to cache hydrated selection");
                }
                HydrationSource::Remote
            }
            Some(RemoteSelections::Recommended(rec)) => {
                let base = self.cache.get_selection(SELECTION_CACHE_KEY).unwrap_or_default();
                self.selection.replace_all(&base);
                self.selection.merge(&rec.selected_items);
                if rec.skill_level.is_some() {
                    self.skill_level.write().clone_from(&rec.skill_level);
                }
                HydrationSource::Recommendation
            }
            None => match self.cache.get_selection(SELECTION_CACHE_KEY) {
                Some(ids) => {
                    self.selection.replace_all(&ids);
                    HydrationSource::Cache
                }
                None => {
                    self.selection.replace_all(Vec::<String>::new());
                    HydrationSource::Empty
                }
            },
        }
    }

    async fn hydrate_progress(&self) -> HydrationSource {
        let remote = match self.remote.fetch_progress().await {
            Ok(body) => parse_progress(&body)
                .map_err(|e| tracing::warn!(error = %e, "rejected remote progress, using cache"))
                .ok(),
            Err(e) => {
                tracing::warn!(error = %e, "progress fetch failed, using cache");
                None
            }
        };

        if let Some(pages) = remote {
            for page in &pages {
                if let Err(e) = self.cache.set(&page.cache_key(), page) {
                    tracing::error!(error = %e, page_id = %page.page_id, "failed to cache hydrated progress");
                }
            }
            self.progress.load(pages);
            return HydrationSource::Remote;
        }

        let cached: Vec<PageProgress> = self
            .cache
            .keys_with_prefix(PROGRESS_CACHE_PREFIX)
            .iter()
            .filter_map(|key| self.cache.get::<PageProgress>(key))
            .collect();
        if cached.is_empty() {
            HydrationSource::Empty
        } else {
            self.progress.load(cached);
            HydrationSource::Cache
        }
    }

    /// Apply checkbox changes for a page and save them immediately
    ///
    /// Memory is updated first; the page is cached whatever the remote
    /// outcome. `metadata` is host-supplied page detail and always gains a
    /// `pageId` field.
    pub async fn record_progress(
        &self,
        kind: ProgressKind,
        page_id: &str,
        checkboxes: &[CheckboxUpdate],
        metadata: Value,
    ) -> SyncStatus {
        let page = self.progress.apply(kind, page_id, checkboxes, None);
        self.listeners.emit(&SessionEvent::ProgressChanged {
            page_id: page_id.to_string(),
        });

        let mut metadata = match metadata {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => Map::from_iter([("value".to_string(), other)]),
        };
        metadata.insert("pageId".to_string(), Value::from(page_id));

        let report = ProgressReport {
            kind,
            metadata: Value::Object(metadata),
            timestamp: self.timestamp(),
            progress: page.totals(),
        };

        let status = match self.remote.save_progress(&report).await {
            Ok(()) => SyncStatus::Saved,
            Err(e) => {
                tracing::warn!(error = %e, page_id, "progress save failed, kept in cache");
                SyncStatus::SavedLocally
            }
        };
        if let Err(e) = self.cache.set(&page.cache_key(), &page) {
            tracing::error!(error = %e, page_id, "failed to cache progress");
        }
        self.listeners.emit(&SessionEvent::Status(status));
        status
    }

    fn timestamp(&self) -> String {
        DateTime::<Utc>::from_timestamp_millis(self.clock.now_millis())
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Subscribe to push updates for `route`
    pub fn connect_realtime(&self, route: impl Into<String>) {
        self.channel.connect(route);
    }

    /// Host reports a wake-up
    pub fn notify_wake(&self) {
        self.channel.notify_wake();
    }

    /// Host reports the network is back
    pub fn notify_online(&self) {
        self.channel.notify_online();
    }

    /// Push channel state
    #[must_use]
    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Push channel retry bookkeeping
    #[must_use]
    pub fn reconnect_state(&self) -> Option<ReconnectState> {
        self.channel.reconnect_state()
    }

    /// Write the selection now instead of waiting for the debounce
    pub async fn flush_now(&self) -> FlushOutcome {
        self.scheduler.cancel();
        self.scheduler.flush().await
    }

    /// Tear the session down
    ///
    /// A save still waiting on its debounce timer is written before the push
    /// channel is closed.
    pub async fn shutdown(&self) {
        if self.scheduler.has_pending() {
            self.scheduler.cancel();
            let outcome = self.scheduler.flush().await;
            tracing::debug!(?outcome, "flushed pending save on shutdown");
        }
        self.channel.disconnect();
        tracing::info!(session_id = %self.id, "sync session shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::remote::MockRemoteStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use trailsync_cache::ManualClock;
    use trailsync_realtime::{PushStream, SharedRoute, TransportError};

    const NOW: i64 = 1_700_000_000_000;

    #[derive(Debug)]
    struct Offline;

    #[async_trait]
    impl PushTransport for Offline {
        async fn open(&self, _route: &str) -> Result<PushStream, TransportError> {
            Err(TransportError::Connect("offline".to_string()))
        }
    }

    fn session(remote: MockRemoteStore, store: Arc<MemoryStore>) -> SyncSession {
        SessionBuilder::new(
            SyncConfig::new().with_user_id("u1"),
            Arc::new(remote),
            Arc::new(Offline),
            Arc::new(SharedRoute::new("/")),
        )
        .with_store(store)
        .with_clock(Arc::new(ManualClock::new(NOW)))
        .with_mapping(PathMapping::from_pairs([("path-foundation", vec!["a", "b", "c"])]).unwrap())
        .build()
    }

    fn seeded_store(ids: &[&str]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        ProgressCache::new(Arc::clone(&store) as Arc<dyn KeyValueStore>)
            .set_selection(SELECTION_CACHE_KEY, &ids)
            .unwrap();
        store
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_selection_body_falls_back_to_cache() {
        let mut remote = MockRemoteStore::new();
        remote
            .expect_fetch_selections()
            .times(1)
            .returning(|_| Ok(json!({"data": {"selections": {"selectedItems": ["ok", 42]}}})));
        remote
            .expect_fetch_progress()
            .returning(|| Err(RemoteError::Timeout));

        let session = session(remote, seeded_store(&["k1", "k2"]));
        let hydration = session.hydrate().await;

        assert_eq!(hydration.selection, HydrationSource::Cache);
        assert_eq!(hydration.progress, HydrationSource::Empty);
        assert_eq!(session.snapshot().selected, vec!["k1", "k2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_remote_with_empty_cache_hydrates_empty() {
        let mut remote = MockRemoteStore::new();
        remote
            .expect_fetch_selections()
            .returning(|_| Err(RemoteError::Network("refused".to_string())));
        remote
            .expect_fetch_progress()
            .returning(|| Err(RemoteError::Network("refused".to_string())));

        let session = session(remote, Arc::new(MemoryStore::new()));
        let hydration = session.hydrate().await;
        assert_eq!(hydration.selection, HydrationSource::Empty);
        assert!(session.selection().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn saved_selection_expands_paths_and_refreshes_cache() {
        let mut remote = MockRemoteStore::new();
        remote
            .expect_fetch_selections()
            .returning(|_| Ok(json!({"data": {"selections": {"selectedItems": ["path-foundation"]}}})));
        remote.expect_fetch_progress().returning(|| {
            Ok(json!({"progressData": [
                {"type": "kata", "pageId": "a", "items": [{"id": "x", "completed": true}]}
            ]}))
        });

        let session = session(remote, Arc::new(MemoryStore::new()));
        let hydration = session.hydrate().await;

        assert_eq!(hydration, Hydration {
            selection: HydrationSource::Remote,
            progress: HydrationSource::Remote,
        });
        assert_eq!(session.selection().snapshot(), vec!["a", "b", "c", "path-foundation"]);
        assert_eq!(
            session.cache().get_selection(SELECTION_CACHE_KEY).unwrap().len(),
            4
        );
        assert_eq!(session.snapshot().progress["a"].percentage, 100);
        assert!(session.cache().get::<PageProgress>("progress:kata:a").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_recommendation_merges_onto_cached_selection() {
        let mut remote = MockRemoteStore::new();
        remote.expect_fetch_selections().returning(|_| {
            Ok(json!({
                "source": "assessment",
                "timestamp": NOW - 1_000,
                "selectedItems": ["k2"],
                "skillLevel": "beginner"
            }))
        });
        remote.expect_fetch_progress().returning(|| Ok(json!({"progressData": []})));
        remote.expect_save_selections().returning(|_| Ok(()));

        let session = session(remote, seeded_store(&["k1"]));
        let hydration = session.hydrate().await;

        assert_eq!(hydration.selection, HydrationSource::Recommendation);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.selected, vec!["k1", "k2"]);
        assert_eq!(snapshot.skill_level.as_deref(), Some("beginner"));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_recommendation_is_ignored() {
        let mut remote = MockRemoteStore::new();
        remote.expect_fetch_selections().returning(|_| {
            Ok(json!({
                "source": "assessment",
                "timestamp": NOW - 301_000,
                "selectedItems": ["k9"]
            }))
        });
        remote.expect_fetch_progress().returning(|| Ok(json!({"progressData": []})));

        let session = session(remote, seeded_store(&["k1"]));
        session.hydrate().await;

        assert_eq!(session.snapshot().selected, vec!["k1"]);
        assert!(session.snapshot().skill_level.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn record_progress_posts_report_and_caches() {
        let mut remote = MockRemoteStore::new();
        remote
            .expect_save_progress()
            .withf(|report: &ProgressReport| {
                report.metadata["pageId"] == "k1"
                    && report.metadata["title"] == "Intro"
                    && report.progress.completion_percentage == 50
                    && report.timestamp == "2023-11-14T22:13:20.000Z"
            })
            .times(1)
            .returning(|_| Ok(()));

        let session = session(remote, Arc::new(MemoryStore::new()));
        let status = session
            .record_progress(
                ProgressKind::Kata,
                "k1",
                &[CheckboxUpdate::by_id("a", true), CheckboxUpdate::by_id("b", false)],
                json!({"title": "Intro"}),
            )
            .await;

        assert_eq!(status, SyncStatus::Saved);
        let cached: PageProgress = session.cache().get("progress:kata:k1").unwrap();
        assert_eq!(cached.record.percentage, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_progress_save_is_kept_locally() {
        let mut remote = MockRemoteStore::new();
        remote
            .expect_save_progress()
            .returning(|_| Err(RemoteError::Status(500)));

        let session = session(remote, Arc::new(MemoryStore::new()));
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        session.on_update(move |event| sink.lock().push(event.clone()));

        let status = session
            .record_progress(ProgressKind::Path, "path-foundation", &[CheckboxUpdate::by_index(0, true)], Value::Null)
            .await;

        assert_eq!(status, SyncStatus::SavedLocally);
        assert!(session
            .cache()
            .get::<PageProgress>("progress:path:path-foundation")
            .is_some());
        assert_eq!(
            events.lock().last(),
            Some(&SessionEvent::Status(SyncStatus::SavedLocally))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_pending_save() {
        let mut remote = MockRemoteStore::new();
        remote
            .expect_save_selections()
            .withf(|payload| payload.selected_items == vec!["k1".to_string()] && payload.user_id == "u1")
            .times(1)
            .returning(|_| Ok(()));

        let session = session(remote, Arc::new(MemoryStore::new()));
        session.selection().add("k1");
        session.shutdown().await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(
            session.cache().get_selection(SELECTION_CACHE_KEY),
            Some(vec!["k1".to_string()])
        );
        assert_eq!(session.channel_state(), ChannelState::Disconnected);
    }
}
