//! Wire and domain types shared across the core

use crate::progress::ProgressRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Body of `POST /learning/selections`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionPayload {
    /// Learner identity
    pub user_id: String,
    /// Every selected id, sorted
    pub selected_items: Vec<String>,
}

/// What a progress page tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    /// A single exercise
    Kata,
    /// A learning path overview
    Path,
}

impl ProgressKind {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kata => "kata",
            Self::Path => "path",
        }
    }
}

impl fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One checkbox change, addressed by identifier or position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckboxUpdate {
    /// Stable checkbox identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Position on the page when no identifier exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// New state
    pub checked: bool,
}

impl CheckboxUpdate {
    /// Update addressed by identifier
    #[must_use]
    pub fn by_id(identifier: impl Into<String>, checked: bool) -> Self {
        Self {
            identifier: Some(identifier.into()),
            index: None,
            checked,
        }
    }

    /// Update addressed by position
    #[must_use]
    pub fn by_index(index: usize, checked: bool) -> Self {
        Self {
            identifier: None,
            index: Some(index),
            checked,
        }
    }

    /// Key under which the state is stored; `None` if unaddressed
    #[must_use]
    pub fn key(&self) -> Option<String> {
        self.identifier
            .clone()
            .or_else(|| self.index.map(|i| format!("#{i}")))
    }
}

/// Body of `POST /progress/save`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    /// Page kind
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    /// Host-supplied page metadata, always carrying `pageId`
    pub metadata: Value,
    /// RFC 3339 write time
    pub timestamp: String,
    /// Totals for the page
    pub progress: ProgressTotals,
}

/// Progress section of a [`ProgressReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressTotals {
    /// Checkbox key to checked state
    pub checkbox_states: BTreeMap<String, bool>,
    /// Checked count
    pub completed_tasks: u32,
    /// Checkbox count
    pub total_tasks: u32,
    /// Derived percentage
    pub completion_percentage: u8,
}

/// Validated recommendation payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Recommended ids
    pub selected_items: Vec<String>,
    /// Assessed skill level, if reported
    pub skill_level: Option<String>,
    /// Issue time in epoch milliseconds
    pub timestamp: i64,
}

/// Milestone or achievement pushed by the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    /// `milestone` or `achievement`
    pub kind: String,
    /// Page the milestone belongs to
    pub route: String,
    /// Short title, when provided
    pub title: Option<String>,
    /// Full descriptor as received
    pub detail: Value,
}

/// Terse status for the host's indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Remote write succeeded
    Saved,
    /// Remote write failed; change kept in the local cache
    SavedLocally,
    /// Push channel gave up until the next wake/online signal
    Offline,
    /// Push channel connected
    Live,
    /// Push channel waiting to retry
    Reconnecting,
}

impl SyncStatus {
    /// Short indicator text
    #[inline]
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Saved => "saved",
            Self::SavedLocally => "saved locally",
            Self::Offline => "offline",
            Self::Live => "live",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Notification delivered to `on_update` callbacks
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Selection changed from a non-host source
    SelectionChanged,
    /// Progress for a page changed
    ProgressChanged {
        /// Affected page
        page_id: String,
    },
    /// Milestone or achievement arrived
    Milestone(Milestone),
    /// Status indicator update
    Status(SyncStatus),
}

/// Full state snapshot for building payloads and repainting
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Selected ids, sorted
    pub selected: Vec<String>,
    /// Per-page progress
    pub progress: BTreeMap<String, ProgressRecord>,
    /// Last accepted skill level
    pub skill_level: Option<String>,
}
