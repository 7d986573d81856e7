//! Debounced single-flight persistence
//!
//! A [`SyncScheduler`] coalesces bursts of mutations into one remote write
//! per quiet period and never lets two writes overlap. Every write attempt
//! is followed by a cache write, so the fallback copy is refreshed even when
//! the remote store is unreachable.
//!
//! # Flow
//!
//! ```text
//! schedule_save() ──(abort previous timer)──→ sleep(delay) ──→ flush()
//!                                                               │
//!        in flight? ──yes──→ InFlight (no-op)                   │
//!             │ no                                              │
//!             ↓                                                 │
//!   payload() → write_remote() → release flag → payload() → write_cache()
//! ```

use crate::error::RemoteError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use trailsync_cache::StoreError;

/// Result of one flush
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushOutcome {
    /// Remote write succeeded
    Saved,
    /// Remote write failed; payload written to the cache only
    CachedOnly,
    /// Another write was in flight; nothing happened
    InFlight,
}

/// Payload provider plus the two writers a flush drives
#[async_trait]
pub trait SaveJob: Send + Sync + Debug + 'static {
    /// Value written on each flush
    type Payload: Send + Sync + Debug;

    /// Latest payload, read at flush time
    fn payload(&self) -> Self::Payload;

    /// Write to the authoritative store
    ///
    /// # Errors
    /// `RemoteError` if the store rejects or cannot be reached
    async fn write_remote(&self, payload: &Self::Payload) -> Result<(), RemoteError>;

    /// Write to the local fallback cache
    ///
    /// # Errors
    /// `StoreError` if the cache store fails
    fn write_cache(&self, payload: &Self::Payload) -> Result<(), StoreError>;

    /// Observe the outcome of a completed flush
    fn finished(&self, _outcome: FlushOutcome) {}
}

/// Anything that can be asked to persist soon
pub trait SaveTrigger: Send + Sync + Debug {
    /// Request a debounced save
    fn schedule_save(&self);
}

/// Debounced writer with at most one write in flight
#[derive(Debug)]
pub struct SyncScheduler<J: SaveJob> {
    inner: Arc<Inner<J>>,
}

#[derive(Debug)]
struct Inner<J: SaveJob> {
    job: J,
    delay: Duration,
    runtime: Option<Handle>,
    pending: Mutex<Option<JoinHandle<()>>>,
    in_flight: AtomicBool,
}

/// Releases the in-flight flag on drop, including when a flush is cancelled
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl<J: SaveJob> SyncScheduler<J> {
    /// Create scheduler with the given debounce delay
    ///
    /// Timers run on the runtime current at construction, if any.
    #[must_use]
    pub fn new(job: J, delay: Duration) -> Self {
        Self::build(job, delay, Handle::try_current().ok())
    }

    /// Create scheduler whose timers run on `runtime`
    ///
    /// `schedule_save` may then be called from any thread.
    #[must_use]
    pub fn with_runtime(job: J, delay: Duration, runtime: Handle) -> Self {
        Self::build(job, delay, Some(runtime))
    }

    fn build(job: J, delay: Duration, runtime: Option<Handle>) -> Self {
        Self {
            inner: Arc::new(Inner {
                job,
                delay,
                runtime,
                pending: Mutex::new(None),
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    /// Restart the debounce timer
    ///
    /// The flush started by the timer runs in its own task, so a later
    /// reschedule never cancels a write that is already under way. Without a
    /// reachable runtime nothing is armed; the change stays in memory until
    /// the next explicit flush.
    pub fn schedule_save(&self) {
        let Some(runtime) = self
            .inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
        else {
            tracing::warn!("no tokio runtime available, save not scheduled");
            return;
        };

        let inner = Arc::clone(&self.inner);
        let flusher = runtime.clone();
        let timer = runtime.spawn(async move {
            tokio::time::sleep(inner.delay).await;
            flusher.spawn(async move {
                inner.flush().await;
            });
        });

        if let Some(previous) = self.inner.pending.lock().replace(timer) {
            previous.abort();
        }
        tracing::trace!(delay_ms = ?self.inner.delay.as_millis(), "save scheduled");
    }

    /// Write the latest payload now
    pub async fn flush(&self) -> FlushOutcome {
        self.inner.flush().await
    }

    /// Drop the pending timer, if any
    pub fn cancel(&self) {
        if let Some(timer) = self.inner.pending.lock().take() {
            timer.abort();
            tracing::debug!("pending save cancelled");
        }
    }

    /// Whether a timer is armed and has not fired yet
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.inner
            .pending
            .lock()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Whether a remote write is under way
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Debounce delay
    #[inline]
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Job driven by this scheduler
    #[inline]
    #[must_use]
    pub fn job(&self) -> &J {
        &self.inner.job
    }
}

impl<J: SaveJob> Inner<J> {
    async fn flush(&self) -> FlushOutcome {
        let Some(guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::debug!("flush skipped, write already in flight");
            return FlushOutcome::InFlight;
        };

        let payload = self.job.payload();
        let remote = self.job.write_remote(&payload).await;
        drop(guard);

        let latest = self.job.payload();
        if let Err(e) = self.job.write_cache(&latest) {
            tracing::error!(error = %e, "cache write after flush failed");
        }

        let outcome = match remote {
            Ok(()) => {
                tracing::debug!("remote write succeeded");
                FlushOutcome::Saved
            }
            Err(e) => {
                tracing::warn!(error = %e, transient = e.is_transient(), "remote write failed, kept in cache");
                FlushOutcome::CachedOnly
            }
        };
        self.job.finished(outcome);
        outcome
    }
}

impl<J: SaveJob> SaveTrigger for SyncScheduler<J> {
    fn schedule_save(&self) {
        SyncScheduler::schedule_save(self);
    }
}

impl<J: SaveJob> Drop for SyncScheduler<J> {
    fn drop(&mut self) {
        self.cancel();
    }
}
