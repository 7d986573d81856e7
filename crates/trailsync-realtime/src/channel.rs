//! Reconnecting push channel
//!
//! A [`RealtimeChannel`] owns one supervisor task per `connect` call. The
//! supervisor opens the subscription, pumps events to the [`PushHandler`],
//! and on failure walks the backoff schedule until the retry budget is spent.
//! It then parks until the host reports a wake or network-online signal.
//!
//! # State flow
//!
//! ```text
//! Disconnected → Connecting → Connected
//!                    ↑  ↓         ↓
//!                    ErrorBackoff ←┘
//!                         ↓
//!               TerminatedMaxAttempts ──(wake/online)──→ Connecting
//! ```
//!
//! Every supervisor carries the epoch it was started under; a supervisor whose
//! epoch is stale (after `disconnect` or a new `connect`) stops touching state.

use crate::error::TransportError;
use crate::state::{validate_transition, ChannelState, ReconnectConfig, ReconnectState};
use crate::transport::{PushEnvelope, PushEvent, PushStream, PushTransport, RouteSource};
use futures::StreamExt;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Receives route-matched events and state changes
///
/// Called synchronously from the supervisor task; implementations must not
/// block.
pub trait PushHandler: Send + Sync + Debug {
    /// Apply an event addressed to the active route
    fn on_message(&self, envelope: PushEnvelope);

    /// Observe a channel state change
    fn on_state_change(&self, _state: ChannelState) {}
}

/// Environment signals that may revive a parked channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentSignal {
    /// Page or process became visible/awake again
    Wake,
    /// Network connectivity returned
    Online,
}

/// Self-healing push subscription
#[derive(Debug)]
pub struct RealtimeChannel {
    shared: Arc<Shared>,
    runtime: Option<Handle>,
}

#[derive(Debug)]
struct Shared {
    transport: Arc<dyn PushTransport>,
    handler: Arc<dyn PushHandler>,
    routes: Arc<dyn RouteSource>,
    config: ReconnectConfig,
    status: Mutex<Status>,
}

#[derive(Debug)]
struct Status {
    state: ChannelState,
    epoch: u64,
    route: Option<String>,
    reconnect: Option<ReconnectState>,
    wake: Option<Arc<Notify>>,
    task: Option<JoinHandle<()>>,
}

enum Recovery {
    Retry(Duration),
    Park,
    Stop,
}

impl RealtimeChannel {
    /// Create a disconnected channel
    ///
    /// The supervisor runs on the runtime current at construction, if any.
    #[must_use]
    pub fn new(
        transport: Arc<dyn PushTransport>,
        handler: Arc<dyn PushHandler>,
        routes: Arc<dyn RouteSource>,
        config: ReconnectConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                handler,
                routes,
                config,
                status: Mutex::new(Status {
                    state: ChannelState::Disconnected,
                    epoch: 0,
                    route: None,
                    reconnect: None,
                    wake: None,
                    task: None,
                }),
            }),
            runtime: Handle::try_current().ok(),
        }
    }

    /// Run the supervisor on `runtime`, so `connect` may be called from any
    /// thread
    #[must_use]
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Subscribe to `route`, replacing any existing subscription
    ///
    /// The route is fixed for the lifetime of this subscription, including
    /// reconnects. Without a reachable runtime the channel stays
    /// disconnected.
    pub fn connect(&self, route: impl Into<String>) {
        let route = route.into();
        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            tracing::error!(%route, "no tokio runtime available, push channel not connected");
            return;
        };
        let mut changes = Vec::new();
        {
            let mut status = self.shared.status.lock();
            if status.state != ChannelState::Disconnected {
                stop_locked(&mut status);
                changes.push(ChannelState::Disconnected);
            }

            status.epoch += 1;
            if self.shared.transition(&mut status, ChannelState::Connecting) {
                changes.push(ChannelState::Connecting);
            }
            status.route = Some(route.clone());
            status.reconnect = Some(ReconnectState::new(self.shared.config));

            let wake = Arc::new(Notify::new());
            status.wake = Some(Arc::clone(&wake));
            status.task = Some(runtime.spawn(supervise(
                Arc::clone(&self.shared),
                route.clone(),
                status.epoch,
                wake,
            )));
        }
        tracing::info!(%route, "push channel connecting");
        self.shared.announce(changes);
    }

    /// Tear down the subscription and cancel any pending retry
    pub fn disconnect(&self) {
        let was_active = {
            let mut status = self.shared.status.lock();
            let was_active = status.state != ChannelState::Disconnected;
            stop_locked(&mut status);
            was_active
        };
        if was_active {
            tracing::info!("push channel disconnected");
            self.shared.announce(vec![ChannelState::Disconnected]);
        }
    }

    /// Host reports that the page/process woke up
    pub fn notify_wake(&self) {
        self.signal(EnvironmentSignal::Wake);
    }

    /// Host reports that the network came back
    pub fn notify_online(&self) {
        self.signal(EnvironmentSignal::Online);
    }

    /// Handle an environment signal
    ///
    /// Resets the retry budget while disconnected. A parked channel restarts
    /// immediately; a channel in backoff keeps its pending retry.
    pub fn signal(&self, signal: EnvironmentSignal) {
        let (wake, changed) = {
            let mut status = self.shared.status.lock();
            let Some(reconnect) = status.reconnect.as_mut() else {
                return;
            };
            if !reconnect.record_wake() {
                return;
            }
            tracing::debug!(?signal, "environment signal reset reconnect attempts");

            if status.state == ChannelState::TerminatedMaxAttempts
                && self.shared.transition(&mut status, ChannelState::Connecting)
            {
                (status.wake.clone(), true)
            } else {
                (None, false)
            }
        };

        if let Some(wake) = wake {
            tracing::info!(?signal, "reviving parked push channel");
            wake.notify_one();
        }
        if changed {
            self.shared.announce(vec![ChannelState::Connecting]);
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.shared.status.lock().state
    }

    /// Retry bookkeeping; `None` while disconnected
    #[must_use]
    pub fn reconnect_state(&self) -> Option<ReconnectState> {
        self.shared.status.lock().reconnect
    }

    /// Route of the current subscription
    #[must_use]
    pub fn route(&self) -> Option<String> {
        self.shared.status.lock().route.clone()
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        stop_locked(&mut self.shared.status.lock());
    }
}

fn stop_locked(status: &mut Status) {
    if let Some(task) = status.task.take() {
        task.abort();
    }
    status.epoch += 1;
    status.state = ChannelState::Disconnected;
    status.route = None;
    status.reconnect = None;
    status.wake = None;
}

impl Shared {
    fn transition(&self, status: &mut Status, to: ChannelState) -> bool {
        match validate_transition(status.state, to) {
            Ok(()) => {
                tracing::debug!(from = ?status.state, ?to, "push channel transition");
                status.state = to;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "rejected push channel transition");
                false
            }
        }
    }

    fn announce(&self, changes: Vec<ChannelState>) {
        for state in changes {
            self.handler.on_state_change(state);
        }
    }

    fn opened(&self, epoch: u64) -> bool {
        let changed = {
            let mut status = self.status.lock();
            if status.epoch != epoch {
                return false;
            }
            if let Some(reconnect) = status.reconnect.as_mut() {
                reconnect.record_connected();
            }
            self.transition(&mut status, ChannelState::Connected)
        };
        if changed {
            tracing::info!("push channel connected");
            self.announce(vec![ChannelState::Connected]);
        }
        true
    }

    fn failed(&self, epoch: u64, error: &TransportError) -> Recovery {
        let (recovery, changes) = {
            let mut status = self.status.lock();
            if status.epoch != epoch {
                return Recovery::Stop;
            }
            let Some(reconnect) = status.reconnect.as_mut() else {
                return Recovery::Stop;
            };
            let next = reconnect.record_failure();
            let (attempts, max_attempts) = (reconnect.attempts, reconnect.max_attempts);

            // An exhausted budget passes through ErrorBackoff without announcing it
            let backed_off = self.transition(&mut status, ChannelState::ErrorBackoff);
            let mut changes = Vec::new();
            match next {
                Some(delay) => {
                    if backed_off {
                        changes.push(ChannelState::ErrorBackoff);
                    }
                    tracing::warn!(
                        error = %error,
                        attempt = attempts,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "push channel failed, scheduling reconnect"
                    );
                    (Recovery::Retry(delay), changes)
                }
                None => {
                    if self.transition(&mut status, ChannelState::TerminatedMaxAttempts) {
                        changes.push(ChannelState::TerminatedMaxAttempts);
                    }
                    tracing::warn!(
                        error = %error,
                        max_attempts,
                        "push channel out of reconnect attempts, waiting for wake/online"
                    );
                    (Recovery::Park, changes)
                }
            }
        };
        self.announce(changes);
        recovery
    }

    fn retry_due(&self, epoch: u64) -> bool {
        let changed = {
            let mut status = self.status.lock();
            if status.epoch != epoch {
                return false;
            }
            self.transition(&mut status, ChannelState::Connecting)
        };
        if changed {
            self.announce(vec![ChannelState::Connecting]);
        }
        true
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.status.lock().epoch == epoch
    }

    async fn pump(&self, mut stream: PushStream, epoch: u64) -> TransportError {
        while let Some(item) = stream.next().await {
            if !self.is_current(epoch) {
                return TransportError::Closed;
            }
            match item {
                Ok(event) => self.dispatch(&event),
                Err(e) => return e,
            }
        }
        TransportError::Closed
    }

    fn dispatch(&self, event: &PushEvent) {
        let Some(envelope) = PushEnvelope::decode(event) else {
            tracing::debug!(event = %event.event, "dropping push event without json route");
            return;
        };

        let active = self.routes.current_route();
        if envelope.route != active {
            tracing::debug!(route = %envelope.route, %active, "discarding push for inactive route");
            return;
        }

        self.handler.on_message(envelope);
    }
}

async fn supervise(shared: Arc<Shared>, route: String, epoch: u64, wake: Arc<Notify>) {
    loop {
        let error = match shared.transport.open(&route).await {
            Ok(stream) => {
                if !shared.opened(epoch) {
                    return;
                }
                shared.pump(stream, epoch).await
            }
            Err(e) => e,
        };

        match shared.failed(epoch, &error) {
            Recovery::Retry(delay) => {
                tokio::time::sleep(delay).await;
                if !shared.retry_due(epoch) {
                    return;
                }
            }
            Recovery::Park => {
                wake.notified().await;
                if !shared.is_current(epoch) {
                    return;
                }
            }
            Recovery::Stop => return,
        }
    }
}
