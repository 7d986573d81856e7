//! Host update callbacks

use crate::types::SessionEvent;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Host callback invoked on every session event
pub type UpdateCallback = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Registered `on_update` callbacks
#[derive(Default, Clone)]
pub struct UpdateListeners {
    callbacks: Arc<RwLock<Vec<UpdateCallback>>>,
}

impl fmt::Debug for UpdateListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateListeners")
            .field("count", &self.callbacks.read().len())
            .finish()
    }
}

impl UpdateListeners {
    /// Create empty listener set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback
    pub fn register(&self, callback: impl Fn(&SessionEvent) + Send + Sync + 'static) {
        self.callbacks.write().push(Arc::new(callback));
    }

    /// Deliver an event to every callback
    ///
    /// Callbacks run outside the lock so they may register further callbacks
    /// or read session state.
    pub fn emit(&self, event: &SessionEvent) {
        let callbacks = self.callbacks.read().clone();
        tracing::trace!(?event, listeners = callbacks.len(), "emitting session event");
        for callback in callbacks {
            callback(event);
        }
    }

    /// Number of callbacks
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    /// Whether no callback is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }
}
