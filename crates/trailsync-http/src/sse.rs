//! Server-sent events push transport
//!
//! Only the subset of the event-stream format the progress server emits is
//! handled: `event:` and `data:` fields, comments, and blank-line
//! dispatch. `id:` and `retry:` are ignored; reconnect pacing belongs to the
//! channel, not the server.

use crate::remote::join_url;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::time::Duration;
use trailsync_realtime::{PushEvent, PushStream, PushTransport, TransportError};

/// Default connect deadline for the subscription request
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest undispatched event the decoder buffers before giving up
pub const DEFAULT_MAX_PENDING: usize = 1024 * 1024;

/// Incremental event-stream parser
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    // Bytes already searched for a blank line
    scanned: usize,
    max_pending: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

impl SseDecoder {
    /// Create empty decoder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With limit on buffered, not yet terminated bytes
    #[inline]
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Feed a chunk; returns every event completed by it
    ///
    /// # Errors
    /// `TransportError::Stream` when more than the pending limit accumulates
    /// without an event terminator. The buffer is discarded; the stream
    /// should be dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<PushEvent>, TransportError> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = self.next_blank_line() {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            self.scanned = 0;
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block[..end])) {
                events.push(event);
            }
        }
        // Keep the last byte in range; it may be the first half of a blank line
        self.scanned = self.buffer.len().saturating_sub(1);

        if self.buffer.len() > self.max_pending {
            let pending = self.buffer.len();
            self.buffer = Vec::new();
            self.scanned = 0;
            tracing::warn!(pending, limit = self.max_pending, "event stream overflowed decoder buffer");
            return Err(TransportError::Stream(format!(
                "{pending} bytes without an event terminator (limit {})",
                self.max_pending
            )));
        }
        Ok(events)
    }

    /// Bytes received but not yet dispatched
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn next_blank_line(&self) -> Option<usize> {
        let from = self.scanned.min(self.buffer.len());
        self.buffer[from..]
            .windows(2)
            .position(|w| w == b"\n\n")
            .map(|i| i + from)
    }
}

fn parse_block(block: &str) -> Option<PushEvent> {
    let mut name = None;
    let mut data = Vec::new();
    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = line
            .split_once(':')
            .map_or((line, ""), |(f, v)| (f, v.strip_prefix(' ').unwrap_or(v)));
        match field {
            "event" => name = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }
    if data.is_empty() {
        return None;
    }
    Some(PushEvent::new(
        name.unwrap_or_else(|| "message".to_string()),
        data.join("\n"),
    ))
}

/// Push transport subscribing to `GET {base}/progress/events?route=`
#[derive(Debug, Clone)]
pub struct SseTransport {
    client: Client,
    base_url: String,
}

impl SseTransport {
    /// Create transport; the client has a connect deadline but no overall
    /// timeout so the stream may stay open indefinitely
    ///
    /// # Errors
    /// Returns the client build error
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create transport over an existing client
    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Subscription URL (without the route query)
    #[must_use]
    pub fn events_url(&self) -> String {
        join_url(&self.base_url, "progress/events")
    }
}

#[async_trait]
impl PushTransport for SseTransport {
    async fn open(&self, route: &str) -> Result<PushStream, TransportError> {
        let response = self
            .client
            .get(self.events_url())
            .query(&[("route", route)])
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        tracing::debug!(route, "event stream opened");

        let mut decoder = SseDecoder::new();
        let events = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => match decoder.feed(&bytes) {
                    Ok(events) => events.into_iter().map(Ok).collect::<Vec<_>>(),
                    Err(e) => vec![Err(e)],
                },
                Err(e) => vec![Err(TransportError::Stream(e.to_string()))],
            })
            .flat_map(stream::iter)
            .boxed();
        Ok(events)
    }
}
