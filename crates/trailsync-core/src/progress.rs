//! Per-page progress records

use crate::config::PROGRESS_CACHE_PREFIX;
use crate::types::{CheckboxUpdate, ProgressKind, ProgressTotals};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Completion of one page
///
/// `percentage` is always derived from `completed / total` when `total > 0`;
/// a sender-supplied percentage is only used when there is no item detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// 0..=100
    pub percentage: u8,
    /// Completed items
    pub completed: u32,
    /// Total items
    pub total: u32,
}

impl ProgressRecord {
    /// Build record, deriving the percentage from counts when possible
    #[must_use]
    pub fn derive(completed: u32, total: u32, provided: Option<f64>) -> Self {
        let percentage = if total > 0 {
            clamp_percentage(f64::from(completed) / f64::from(total) * 100.0)
        } else {
            provided.map_or(0, clamp_percentage)
        };
        Self {
            percentage,
            completed,
            total,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_percentage(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

/// Checkbox states and derived record for one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageProgress {
    /// Page kind
    pub kind: ProgressKind,
    /// Page identifier
    pub page_id: String,
    /// Checkbox key to checked state
    pub checkboxes: BTreeMap<String, bool>,
    /// Derived totals
    pub record: ProgressRecord,
}

impl PageProgress {
    /// Empty page
    #[must_use]
    pub fn new(kind: ProgressKind, page_id: impl Into<String>) -> Self {
        Self {
            kind,
            page_id: page_id.into(),
            checkboxes: BTreeMap::new(),
            record: ProgressRecord::default(),
        }
    }

    /// Merge checkbox updates and re-derive the record
    ///
    /// `provided` is only consulted when the page has no checkboxes at all.
    pub fn apply(&mut self, updates: &[CheckboxUpdate], provided: Option<f64>) {
        for update in updates {
            match update.key() {
                Some(key) => {
                    self.checkboxes.insert(key, update.checked);
                }
                None => tracing::debug!(page_id = %self.page_id, "ignoring unaddressed checkbox update"),
            }
        }
        self.rederive(provided);
    }

    /// Recompute the record from the checkbox map
    pub fn rederive(&mut self, provided: Option<f64>) {
        let total = u32::try_from(self.checkboxes.len()).unwrap_or(u32::MAX);
        let completed = u32::try_from(self.checkboxes.values().filter(|c| **c).count()).unwrap_or(u32::MAX);
        self.record = ProgressRecord::derive(completed, total, provided);
    }

    /// Namespaced cache key
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("{PROGRESS_CACHE_PREFIX}{}:{}", self.kind, self.page_id)
    }

    /// Totals section for a progress report
    #[must_use]
    pub fn totals(&self) -> ProgressTotals {
        ProgressTotals {
            checkbox_states: self.checkboxes.clone(),
            completed_tasks: self.record.completed,
            total_tasks: self.record.total,
            completion_percentage: self.record.percentage,
        }
    }
}

/// In-memory progress for every known page
#[derive(Debug, Default)]
pub struct ProgressBook {
    pages: RwLock<BTreeMap<String, PageProgress>>,
}

impl ProgressBook {
    /// Create empty book
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply checkbox updates to a page, creating it if needed
    ///
    /// # Returns
    /// The page after the update
    pub fn apply(
        &self,
        kind: ProgressKind,
        page_id: &str,
        updates: &[CheckboxUpdate],
        provided: Option<f64>,
    ) -> PageProgress {
        let mut pages = self.pages.write();
        let page = pages
            .entry(page_id.to_string())
            .or_insert_with(|| PageProgress::new(kind, page_id));
        page.kind = kind;
        page.apply(updates, provided);
        page.clone()
    }

    /// Replace whole pages (hydration)
    pub fn load(&self, pages: impl IntoIterator<Item = PageProgress>) {
        let mut book = self.pages.write();
        for page in pages {
            book.insert(page.page_id.clone(), page);
        }
    }

    /// Page by id
    #[must_use]
    pub fn get(&self, page_id: &str) -> Option<PageProgress> {
        self.pages.read().get(page_id).cloned()
    }

    /// Records keyed by page id
    #[must_use]
    pub fn records(&self) -> BTreeMap<String, ProgressRecord> {
        self.pages
            .read()
            .iter()
            .map(|(id, page)| (id.clone(), page.record))
            .collect()
    }

    /// Number of tracked pages
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.read().len()
    }

    /// Whether no pages are tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.read().is_empty()
    }
}
