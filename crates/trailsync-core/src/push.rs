//! Applying push-channel messages to session state

use crate::error::MalformedData;
use crate::events::UpdateListeners;
use crate::progress::ProgressBook;
use crate::selection::SelectionStore;
use crate::types::{CheckboxUpdate, Milestone, ProgressKind, SessionEvent, SyncStatus};
use crate::validate::parse_recommendation;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use trailsync_cache::{Clock, ProgressCache};
use trailsync_realtime::{ChannelState, PushEnvelope, PushHandler};

/// Progress update pushed for one page
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressPush {
    /// Page kind
    pub kind: ProgressKind,
    /// Page id (the route when the sender omitted it)
    pub page_id: String,
    /// Checkbox changes
    pub checkboxes: Vec<CheckboxUpdate>,
    /// Sender's percentage, used only without checkbox detail
    pub completion_percentage: Option<f64>,
}

/// Decoded push payload
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    /// Checkbox progress
    Progress(ProgressPush),
    /// Milestone or achievement
    Milestone(Milestone),
    /// Unvalidated recommendation body
    Recommendation(Value),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProgressPush {
    #[serde(rename = "type", default)]
    kind: Option<ProgressKind>,
    #[serde(default)]
    page_id: Option<String>,
    checkboxes: Vec<CheckboxUpdate>,
    #[serde(default)]
    completion_percentage: Option<f64>,
}

impl PushMessage {
    /// Classify an envelope by event name, falling back to payload shape
    ///
    /// # Errors
    /// `MalformedData::Shape` if the payload fits no known message
    pub fn decode(envelope: &PushEnvelope) -> Result<Self, MalformedData> {
        match envelope.event.as_str() {
            "progress" | "progress-update" => Self::progress(envelope),
            "milestone" | "achievement" => Self::milestone(envelope, &envelope.event),
            "recommendation" => Ok(Self::Recommendation(envelope.payload.clone())),
            _ => Self::by_shape(envelope),
        }
    }

    fn by_shape(envelope: &PushEnvelope) -> Result<Self, MalformedData> {
        let payload = &envelope.payload;
        if payload.get("checkboxes").is_some() {
            Self::progress(envelope)
        } else if payload.get("milestone").is_some() {
            Self::milestone(envelope, "milestone")
        } else if payload.get("achievement").is_some() {
            Self::milestone(envelope, "achievement")
        } else if payload.get("source").is_some() && payload.get("selectedItems").is_some() {
            Ok(Self::Recommendation(payload.clone()))
        } else {
            Err(MalformedData::Shape(format!(
                "unrecognised push event '{}'",
                envelope.event
            )))
        }
    }

    fn progress(envelope: &PushEnvelope) -> Result<Self, MalformedData> {
        let raw = RawProgressPush::deserialize(&envelope.payload)?;
        Ok(Self::Progress(ProgressPush {
            kind: raw.kind.unwrap_or(ProgressKind::Kata),
            page_id: raw.page_id.unwrap_or_else(|| envelope.route.clone()),
            checkboxes: raw.checkboxes,
            completion_percentage: raw.completion_percentage,
        }))
    }

    fn milestone(envelope: &PushEnvelope, kind: &str) -> Result<Self, MalformedData> {
        let detail = envelope
            .payload
            .get(kind)
            .cloned()
            .unwrap_or_else(|| envelope.payload.clone());
        let title = match &detail {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map.get("title").and_then(Value::as_str).map(str::to_string),
            _ => None,
        };
        Ok(Self::Milestone(Milestone {
            kind: kind.to_string(),
            route: envelope.route.clone(),
            title,
            detail,
        }))
    }
}

/// Routes channel messages into the session's state
#[derive(Debug)]
pub struct SessionPushHandler {
    selection: Arc<SelectionStore>,
    progress: Arc<ProgressBook>,
    cache: ProgressCache,
    listeners: UpdateListeners,
    clock: Arc<dyn Clock>,
    recommendation_max_age: Duration,
    skill_level: Arc<RwLock<Option<String>>>,
}

impl SessionPushHandler {
    /// Create handler
    #[must_use]
    pub fn new(
        selection: Arc<SelectionStore>,
        progress: Arc<ProgressBook>,
        cache: ProgressCache,
        listeners: UpdateListeners,
        clock: Arc<dyn Clock>,
        recommendation_max_age: Duration,
        skill_level: Arc<RwLock<Option<String>>>,
    ) -> Self {
        Self {
            selection,
            progress,
            cache,
            listeners,
            clock,
            recommendation_max_age,
            skill_level,
        }
    }

    fn apply_progress(&self, push: &ProgressPush) {
        let page = self.progress.apply(
            push.kind,
            &push.page_id,
            &push.checkboxes,
            push.completion_percentage,
        );
        if let Err(e) = self.cache.set(&page.cache_key(), &page) {
            tracing::error!(error = %e, page_id = %page.page_id, "failed to cache pushed progress");
        }
        tracing::debug!(page_id = %page.page_id, percentage = page.record.percentage, "applied pushed progress");
        self.listeners.emit(&SessionEvent::ProgressChanged {
            page_id: page.page_id,
        });
    }

    fn apply_recommendation(&self, payload: &Value) {
        match parse_recommendation(payload, self.clock.now_millis(), self.recommendation_max_age) {
            Ok(rec) => {
                self.selection.merge(&rec.selected_items);
                if rec.skill_level.is_some() {
                    self.skill_level.write().clone_from(&rec.skill_level);
                }
                tracing::info!(items = rec.selected_items.len(), "applied pushed recommendation");
                self.listeners.emit(&SessionEvent::SelectionChanged);
            }
            Err(e @ MalformedData::StaleRecommendation { .. }) => {
                tracing::debug!(error = %e, "ignoring stale recommendation");
            }
            Err(e) => tracing::warn!(error = %e, "rejected pushed recommendation"),
        }
    }
}

impl PushHandler for SessionPushHandler {
    fn on_message(&self, envelope: PushEnvelope) {
        match PushMessage::decode(&envelope) {
            Ok(PushMessage::Progress(push)) => self.apply_progress(&push),
            Ok(PushMessage::Milestone(milestone)) => {
                tracing::info!(kind = %milestone.kind, route = %milestone.route, "milestone received");
                self.listeners.emit(&SessionEvent::Milestone(milestone));
            }
            Ok(PushMessage::Recommendation(payload)) => self.apply_recommendation(&payload),
            Err(e) => tracing::warn!(error = %e, event = %envelope.event, "dropping malformed push"),
        }
    }

    fn on_state_change(&self, state: ChannelState) {
        let status = match state {
            ChannelState::Connected => SyncStatus::Live,
            ChannelState::ErrorBackoff => SyncStatus::Reconnecting,
            ChannelState::TerminatedMaxAttempts => SyncStatus::Offline,
            ChannelState::Disconnected | ChannelState::Connecting => return,
        };
        self.listeners.emit(&SessionEvent::Status(status));
    }
}
