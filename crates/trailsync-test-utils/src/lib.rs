//! Testing utilities for trailsync workspace
//!
//! Fakes for the remote store, the push transport and the channel handler.

#![allow(missing_docs)]

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
use trailsync_core::{ProgressReport, RemoteError, RemoteStore, SelectionPayload, SyncConfig};
use trailsync_realtime::{
    ChannelState, PushEnvelope, PushEvent, PushHandler, PushStream, PushTransport, TransportError,
};

pub use trailsync_cache::ManualClock;
pub use trailsync_realtime::SharedRoute;

/// Epoch millis used as "now" across tests
pub const TEST_NOW: i64 = 1_700_000_000_000;

/// Remote store that records writes and serves canned bodies
///
/// GETs return `Err(RemoteError::Network)` until a body is set.
#[derive(Debug, Default)]
pub struct RecordingRemote {
    saved: Mutex<Vec<SelectionPayload>>,
    reports: Mutex<Vec<ProgressReport>>,
    save_calls: AtomicUsize,
    fail_writes: AtomicBool,
    gate: Option<Arc<Semaphore>>,
    selections_body: Mutex<Option<Value>>,
    progress_body: Mutex<Option<Value>>,
}

impl RecordingRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every selection write waits for one permit of `gate`
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_selections_body(&self, body: Value) {
        *self.selections_body.lock() = Some(body);
    }

    pub fn set_progress_body(&self, body: Value) {
        *self.progress_body.lock() = Some(body);
    }

    /// Selection payloads received, in call order
    pub fn saved(&self) -> Vec<SelectionPayload> {
        self.saved.lock().clone()
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn reports(&self) -> Vec<ProgressReport> {
        self.reports.lock().clone()
    }

    fn write_result(&self) -> Result<(), RemoteError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(RemoteError::Network("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteStore for RecordingRemote {
    async fn fetch_selections(&self, _user_id: &str) -> Result<Value, RemoteError> {
        self.selections_body
            .lock()
            .clone()
            .ok_or_else(|| RemoteError::Network("no canned selections".to_string()))
    }

    async fn save_selections(&self, payload: &SelectionPayload) -> Result<(), RemoteError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.saved.lock().push(payload.clone());
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.write_result()
    }

    async fn fetch_progress(&self) -> Result<Value, RemoteError> {
        self.progress_body
            .lock()
            .clone()
            .ok_or_else(|| RemoteError::Network("no canned progress".to_string()))
    }

    async fn save_progress(&self, report: &ProgressReport) -> Result<(), RemoteError> {
        self.reports.lock().push(report.clone());
        self.write_result()
    }
}

/// One scripted answer to `PushTransport::open`
#[derive(Debug)]
pub enum ScriptedConnection {
    /// Fail the open call
    Refuse(TransportError),
    /// Deliver the events, then end (or stay open when `hold_open`)
    Stream {
        events: Vec<Result<PushEvent, TransportError>>,
        hold_open: bool,
    },
    /// Deliver whatever the test sends on the paired sender
    Live(mpsc::UnboundedReceiver<Result<PushEvent, TransportError>>),
}

impl ScriptedConnection {
    /// Live connection plus the sender that feeds it
    pub fn live() -> (Self, mpsc::UnboundedSender<Result<PushEvent, TransportError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::Live(rx), tx)
    }

    fn into_stream(self) -> Result<PushStream, TransportError> {
        match self {
            Self::Refuse(e) => Err(e),
            Self::Stream { events, hold_open } => {
                let events = stream::iter(events);
                if hold_open {
                    Ok(events.chain(stream::pending()).boxed())
                } else {
                    Ok(events.boxed())
                }
            }
            Self::Live(rx) => Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed()),
        }
    }
}

/// Push transport that plays back a script of connections
///
/// Once the script runs out every open is refused.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ScriptedConnection>>,
    opens: Mutex<Vec<(Instant, String)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose every open is refused
    pub fn refusing() -> Self {
        Self::default()
    }

    pub fn push(&self, connection: ScriptedConnection) -> &Self {
        self.script.lock().push_back(connection);
        self
    }

    pub fn then_refuse(&self) -> &Self {
        self.push(ScriptedConnection::Refuse(TransportError::Connect("refused".to_string())))
    }

    pub fn then_hold(&self, events: Vec<PushEvent>) -> &Self {
        self.push(ScriptedConnection::Stream {
            events: events.into_iter().map(Ok).collect(),
            hold_open: true,
        })
    }

    pub fn then_close(&self, events: Vec<PushEvent>) -> &Self {
        self.push(ScriptedConnection::Stream {
            events: events.into_iter().map(Ok).collect(),
            hold_open: false,
        })
    }

    pub fn open_count(&self) -> usize {
        self.opens.lock().len()
    }

    /// Instants of every open call
    pub fn open_times(&self) -> Vec<Instant> {
        self.opens.lock().iter().map(|(at, _)| *at).collect()
    }

    /// Routes of every open call
    pub fn routes(&self) -> Vec<String> {
        self.opens.lock().iter().map(|(_, route)| route.clone()).collect()
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn open(&self, route: &str) -> Result<PushStream, TransportError> {
        self.opens.lock().push((Instant::now(), route.to_string()));
        let next = self.script.lock().pop_front();
        match next {
            Some(connection) => connection.into_stream(),
            None => Err(TransportError::Connect("script exhausted".to_string())),
        }
    }
}

/// Handler that records everything the channel delivers
#[derive(Debug, Default)]
pub struct RecordingHandler {
    messages: Mutex<Vec<PushEnvelope>>,
    states: Mutex<Vec<ChannelState>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<PushEnvelope> {
        self.messages.lock().clone()
    }

    pub fn states(&self) -> Vec<ChannelState> {
        self.states.lock().clone()
    }
}

impl PushHandler for RecordingHandler {
    fn on_message(&self, envelope: PushEnvelope) {
        self.messages.lock().push(envelope);
    }

    fn on_state_change(&self, state: ChannelState) {
        self.states.lock().push(state);
    }
}

/// `progress-update` event for `route` with `(identifier, checked)` pairs
pub fn progress_event(route: &str, checkboxes: &[(&str, bool)]) -> PushEvent {
    let checkboxes: Vec<Value> = checkboxes
        .iter()
        .map(|(id, checked)| json!({"identifier": id, "checked": checked}))
        .collect();
    PushEvent::new(
        "progress-update",
        json!({"route": route, "checkboxes": checkboxes}).to_string(),
    )
}

/// Config for `learner-1` with the production 500 ms debounce, which
/// timer-driven tests advance past with paused time
pub fn test_config() -> SyncConfig {
    SyncConfig::new()
        .with_user_id("learner-1")
        .with_debounce(std::time::Duration::from_millis(500))
}
