//! Learner selection state
//!
//! [`SelectionStore`] mutates the in-memory selection synchronously and asks
//! its [`SaveTrigger`] for a debounced persist after every host mutation.
//! Path ids are expanded into their items on add and contracted on remove.

use crate::config::SELECTION_CACHE_KEY;
use crate::error::RemoteError;
use crate::events::UpdateListeners;
use crate::remote::RemoteStore;
use crate::scheduler::{FlushOutcome, SaveJob, SaveTrigger};
use crate::types::{SelectionPayload, SessionEvent, SyncStatus};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use trailsync_cache::{ProgressCache, StoreError};
use trailsync_paths::{PathExpander, Provenance, SelectionTarget};

/// Selected ids with their provenance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    items: BTreeMap<String, Provenance>,
}

impl SelectionState {
    /// Selected ids, sorted
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }

    /// Number of selected ids
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is selected
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Selection shared between the store and its save job
pub type SharedSelection = Arc<RwLock<SelectionState>>;

/// Host-facing selection API
#[derive(Debug)]
pub struct SelectionStore {
    state: SharedSelection,
    expander: Arc<PathExpander>,
    trigger: Arc<dyn SaveTrigger>,
}

impl SelectionStore {
    /// Create store over shared state
    #[must_use]
    pub fn new(state: SharedSelection, expander: Arc<PathExpander>, trigger: Arc<dyn SaveTrigger>) -> Self {
        Self {
            state,
            expander,
            trigger,
        }
    }

    /// Select `id`; a path id also selects its items
    ///
    /// Always schedules a save. Adding an id that is already selected is a
    /// no-op apart from marking it as directly chosen.
    ///
    /// # Returns
    /// Whether the selection changed
    pub fn add(&self, id: &str) -> bool {
        let changed = self.insert_direct(id);
        self.trigger.schedule_save();
        changed
    }

    /// Deselect `id`; a path id also deselects its items
    ///
    /// Always schedules a save. Removing an absent id is a no-op.
    ///
    /// # Returns
    /// Whether the selection changed
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.state.write().items.remove(id).is_some();
        let contracted = if self.expander.is_path_id(id) {
            self.expander.apply_contraction(self, id)
        } else {
            0
        };
        tracing::debug!(id, removed, contracted, "selection remove");
        self.trigger.schedule_save();
        removed || contracted > 0
    }

    /// Add several ids with a single scheduled save
    ///
    /// # Returns
    /// Whether the selection changed
    pub fn merge<I, S>(&self, ids: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut changed = false;
        for id in ids {
            changed |= self.insert_direct(id.as_ref());
        }
        self.trigger.schedule_save();
        changed
    }

    /// Replace the whole selection without scheduling a save
    ///
    /// Used when hydrating from the remote store or cache.
    pub fn replace_all<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.state.write().items.clear();
        for id in ids {
            self.insert_direct(id.as_ref());
        }
        tracing::debug!(count = self.len(), "selection replaced");
    }

    /// Whether `id` is selected
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.state.read().items.contains_key(id)
    }

    /// Selected ids, sorted
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.state.read().ids()
    }

    /// Number of selected ids
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    /// Whether nothing is selected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }

    /// How `id` came to be selected
    #[must_use]
    pub fn provenance(&self, id: &str) -> Option<Provenance> {
        self.state.read().items.get(id).cloned()
    }

    /// Write payload for `user_id`
    #[must_use]
    pub fn payload(&self, user_id: &str) -> SelectionPayload {
        SelectionPayload {
            user_id: user_id.to_string(),
            selected_items: self.snapshot(),
        }
    }

    /// Path expander in use
    #[inline]
    #[must_use]
    pub fn expander(&self) -> &PathExpander {
        &self.expander
    }

    fn insert_direct(&self, id: &str) -> bool {
        let inserted = self
            .state
            .write()
            .items
            .insert(id.to_string(), Provenance::Direct)
            .is_none();
        let expanded = if self.expander.is_path_id(id) {
            self.expander.apply_expansion(self, id)
        } else {
            0
        };
        tracing::debug!(id, inserted, expanded, "selection add");
        inserted || expanded > 0
    }
}

impl SelectionTarget for SelectionStore {
    fn is_selected(&self, id: &str) -> bool {
        self.contains(id)
    }

    fn select_dependent(&self, id: &str, path_id: &str) -> bool {
        let mut state = self.state.write();
        if state.items.contains_key(id) {
            return false;
        }
        state
            .items
            .insert(id.to_string(), Provenance::ViaPath(path_id.to_string()));
        true
    }

    fn deselect_dependent(&self, id: &str) -> bool {
        self.state.write().items.remove(id).is_some()
    }
}

/// Writes the selection to the remote store and the fallback cache
#[derive(Debug)]
pub struct SelectionSaveJob {
    state: SharedSelection,
    user_id: String,
    remote: Arc<dyn RemoteStore>,
    cache: ProgressCache,
    listeners: UpdateListeners,
}

impl SelectionSaveJob {
    /// Create job
    #[must_use]
    pub fn new(
        state: SharedSelection,
        user_id: impl Into<String>,
        remote: Arc<dyn RemoteStore>,
        cache: ProgressCache,
        listeners: UpdateListeners,
    ) -> Self {
        Self {
            state,
            user_id: user_id.into(),
            remote,
            cache,
            listeners,
        }
    }
}

#[async_trait]
impl SaveJob for SelectionSaveJob {
    type Payload = SelectionPayload;

    fn payload(&self) -> SelectionPayload {
        SelectionPayload {
            user_id: self.user_id.clone(),
            selected_items: self.state.read().ids(),
        }
    }

    async fn write_remote(&self, payload: &SelectionPayload) -> Result<(), RemoteError> {
        self.remote.save_selections(payload).await
    }

    fn write_cache(&self, payload: &SelectionPayload) -> Result<(), StoreError> {
        self.cache.set_selection(SELECTION_CACHE_KEY, &payload.selected_items)
    }

    fn finished(&self, outcome: FlushOutcome) {
        let status = match outcome {
            FlushOutcome::Saved => SyncStatus::Saved,
            FlushOutcome::CachedOnly => SyncStatus::SavedLocally,
            FlushOutcome::InFlight => return,
        };
        self.listeners.emit(&SessionEvent::Status(status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use trailsync_paths::PathMapping;

    #[derive(Debug, Default)]
    struct CountingTrigger(AtomicUsize);

    impl SaveTrigger for CountingTrigger {
        fn schedule_save(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn store() -> (SelectionStore, Arc<CountingTrigger>) {
        let mapping = PathMapping::from_pairs([("path-foundation", vec!["a", "b", "c"])]).unwrap();
        let trigger = Arc::new(CountingTrigger::default());
        let store = SelectionStore::new(
            SharedSelection::default(),
            Arc::new(PathExpander::new(mapping)),
            Arc::clone(&trigger) as Arc<dyn SaveTrigger>,
        );
        (store, trigger)
    }

    #[test]
    fn add_and_remove_are_idempotent() {
        let (store, trigger) = store();
        assert!(store.add("k1"));
        assert!(!store.add("k1"));
        assert_eq!(store.snapshot(), vec!["k1"]);

        assert!(store.remove("k1"));
        assert!(!store.remove("k1"));
        assert!(store.is_empty());
        assert_eq!(trigger.0.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn path_expansion_and_contraction() {
        let (store, _) = store();
        store.add("path-foundation");
        assert_eq!(store.snapshot(), vec!["a", "b", "c", "path-foundation"]);
        assert_eq!(
            store.provenance("b"),
            Some(Provenance::ViaPath("path-foundation".to_string()))
        );

        store.remove("path-foundation");
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn direct_pick_survives_expansion_but_not_contraction() {
        let (store, _) = store();
        store.add("b");
        store.add("path-foundation");
        assert_eq!(store.provenance("b"), Some(Provenance::Direct));

        store.remove("path-foundation");
        assert!(!store.contains("b"));
    }

    #[test]
    fn unknown_path_selects_only_itself() {
        let (store, _) = store();
        assert!(store.add("path-missing"));
        assert_eq!(store.snapshot(), vec!["path-missing"]);
    }

    #[test]
    fn replace_all_does_not_schedule() {
        let (store, trigger) = store();
        store.replace_all(["z", "path-foundation"]);
        assert_eq!(store.len(), 5);
        assert_eq!(trigger.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn merge_schedules_once() {
        let (store, trigger) = store();
        assert!(store.merge(["k2", "k1", "k2"]));
        assert_eq!(store.snapshot(), vec!["k1", "k2"]);
        assert_eq!(trigger.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn payload_is_sorted() {
        let (store, _) = store();
        store.add("zeta");
        store.add("alpha");
        let payload = store.payload("u1");
        assert_eq!(payload.user_id, "u1");
        assert_eq!(payload.selected_items, vec!["alpha", "zeta"]);
    }
}
