//! Push transport seam and route-scoped envelopes

use crate::error::TransportError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// One named event as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    /// Event name (`message` when the server sent none)
    pub event: String,
    /// Raw payload text
    pub data: String,
}

impl PushEvent {
    /// Create event
    #[inline]
    #[must_use]
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

/// Stream of events from one open subscription
pub type PushStream = BoxStream<'static, Result<PushEvent, TransportError>>;

/// Opens long-lived push subscriptions
#[async_trait]
pub trait PushTransport: Send + Sync + Debug {
    /// Subscribe to updates for `route`
    ///
    /// # Errors
    /// Returns `TransportError` if the subscription cannot be opened
    async fn open(&self, route: &str) -> Result<PushStream, TransportError>;
}

/// Decoded event with its route context
#[derive(Debug, Clone, PartialEq)]
pub struct PushEnvelope {
    /// Event name
    pub event: String,
    /// Route the payload is addressed to
    pub route: String,
    /// Full JSON payload
    pub payload: Value,
}

impl PushEnvelope {
    /// Parse the event payload and pull out its route
    ///
    /// Returns `None` for non-JSON payloads and payloads without a string
    /// `route` field.
    #[must_use]
    pub fn decode(event: &PushEvent) -> Option<Self> {
        let payload: Value = serde_json::from_str(&event.data).ok()?;
        let route = payload.get("route")?.as_str()?.to_string();
        Some(Self {
            event: event.event.clone(),
            route,
            payload,
        })
    }
}

/// Host-provided view of the active content route
pub trait RouteSource: Send + Sync + Debug {
    /// Route currently shown to the learner
    fn current_route(&self) -> String;
}

/// Route holder the host updates on navigation
#[derive(Debug, Clone, Default)]
pub struct SharedRoute {
    inner: Arc<RwLock<String>>,
}

impl SharedRoute {
    /// Create holder with initial route
    #[inline]
    #[must_use]
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(route.into())),
        }
    }

    /// Replace the active route
    pub fn set(&self, route: impl Into<String>) {
        *self.inner.write() = route.into();
    }
}

impl RouteSource for SharedRoute {
    fn current_route(&self) -> String {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_requires_route() {
        let ok = PushEvent::new("progress-update", r#"{"route":"/katas/a","checkboxes":[]}"#);
        let envelope = PushEnvelope::decode(&ok).unwrap();
        assert_eq!(envelope.route, "/katas/a");
        assert_eq!(envelope.event, "progress-update");

        assert!(PushEnvelope::decode(&PushEvent::new("x", r#"{"checkboxes":[]}"#)).is_none());
        assert!(PushEnvelope::decode(&PushEvent::new("x", r#"{"route":7}"#)).is_none());
        assert!(PushEnvelope::decode(&PushEvent::new("x", "not json")).is_none());
    }

    #[test]
    fn shared_route_updates_are_visible() {
        let route = SharedRoute::new("/a");
        let observer = route.clone();
        route.set("/b");
        assert_eq!(observer.current_route(), "/b");
    }
}
