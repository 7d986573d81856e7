//! Validation of remote payloads
//!
//! Every parser here is all-or-nothing: one bad element rejects the whole
//! payload so callers fall back to cached or default state rather than
//! applying half of it.

use crate::error::MalformedData;
use crate::progress::PageProgress;
use crate::types::{ProgressKind, Recommendation};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Only recommendations from this source are trusted
pub const TRUSTED_RECOMMENDATION_SOURCE: &str = "assessment";

/// Result of validating a selections GET
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSelections {
    /// Previously saved selection
    Saved(Vec<String>),
    /// Fresh assessment recommendation
    Recommended(Recommendation),
}

#[derive(Deserialize)]
struct SelectionsEnvelope {
    data: SelectionsData,
}

#[derive(Deserialize)]
struct SelectionsData {
    selections: SelectionsBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectionsBody {
    selected_items: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecommendation {
    source: String,
    #[serde(default)]
    timestamp: Option<Value>,
    selected_items: Vec<String>,
    #[serde(default)]
    skill_level: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressEnvelope {
    progress_data: Vec<RawPage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPage {
    #[serde(rename = "type")]
    kind: ProgressKind,
    page_id: String,
    #[serde(default)]
    items: Vec<RawItem>,
    #[serde(default)]
    completion_percentage: Option<f64>,
}

#[derive(Deserialize)]
struct RawItem {
    id: String,
    completed: bool,
}

/// Validate a `GET /learning/selections` response
///
/// A body carrying a `source` field is treated as a recommendation and must
/// pass [`parse_recommendation`].
///
/// # Errors
/// `MalformedData` if the body matches neither shape or the recommendation
/// is untrusted or stale
pub fn parse_selections(value: &Value, now_ms: i64, max_age: Duration) -> Result<RemoteSelections, MalformedData> {
    if value.get("source").is_some() {
        return parse_recommendation(value, now_ms, max_age).map(RemoteSelections::Recommended);
    }
    let envelope = SelectionsEnvelope::deserialize(value)?;
    Ok(RemoteSelections::Saved(envelope.data.selections.selected_items))
}

/// Validate a recommendation payload
///
/// # Errors
/// - `MalformedData::UntrustedSource` unless `source == "assessment"`
/// - `MalformedData::Shape` if the timestamp is missing or not numeric
/// - `MalformedData::StaleRecommendation` if older than `max_age`
pub fn parse_recommendation(value: &Value, now_ms: i64, max_age: Duration) -> Result<Recommendation, MalformedData> {
    let raw = RawRecommendation::deserialize(value)?;
    if raw.source != TRUSTED_RECOMMENDATION_SOURCE {
        return Err(MalformedData::UntrustedSource(raw.source));
    }

    let timestamp = raw
        .timestamp
        .as_ref()
        .and_then(Value::as_f64)
        .ok_or_else(|| MalformedData::Shape("recommendation timestamp missing or not numeric".to_string()))?;
    #[allow(clippy::cast_possible_truncation)]
    let timestamp = timestamp as i64;

    let age_ms = now_ms.saturating_sub(timestamp);
    let max_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
    if age_ms > max_ms {
        return Err(MalformedData::stale(age_ms, max_age));
    }

    Ok(Recommendation {
        selected_items: raw.selected_items,
        skill_level: raw.skill_level,
        timestamp,
    })
}

/// Validate a `GET /progress` response into per-page progress
///
/// # Errors
/// `MalformedData::Shape` if any page or item is malformed
pub fn parse_progress(value: &Value) -> Result<Vec<PageProgress>, MalformedData> {
    let envelope = ProgressEnvelope::deserialize(value)?;
    Ok(envelope
        .progress_data
        .into_iter()
        .map(|raw| {
            let mut page = PageProgress::new(raw.kind, raw.page_id);
            page.checkboxes = raw.items.into_iter().map(|item| (item.id, item.completed)).collect();
            page.rederive(raw.completion_percentage);
            page
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;
    const FIVE_MIN: Duration = Duration::from_secs(300);

    #[test]
    fn saved_selections_parse() {
        let body = json!({"data": {"selections": {"selectedItems": ["a", "path-x"]}}});
        assert_eq!(
            parse_selections(&body, NOW, FIVE_MIN).unwrap(),
            RemoteSelections::Saved(vec!["a".to_string(), "path-x".to_string()])
        );
    }

    #[test]
    fn one_bad_item_rejects_the_payload() {
        let body = json!({"data": {"selections": {"selectedItems": ["a", 7]}}});
        assert!(matches!(
            parse_selections(&body, NOW, FIVE_MIN),
            Err(MalformedData::Shape(_))
        ));
        assert!(parse_selections(&json!({"data": null}), NOW, FIVE_MIN).is_err());
        assert!(parse_selections(&json!([]), NOW, FIVE_MIN).is_err());
    }

    #[test]
    fn fresh_assessment_is_accepted() {
        let body = json!({
            "source": "assessment",
            "timestamp": NOW - 60_000,
            "selectedItems": ["k1", "k2"],
            "skillLevel": "intermediate"
        });
        let RemoteSelections::Recommended(rec) = parse_selections(&body, NOW, FIVE_MIN).unwrap() else {
            panic!("expected recommendation");
        };
        assert_eq!(rec.selected_items, vec!["k1", "k2"]);
        assert_eq!(rec.skill_level.as_deref(), Some("intermediate"));
    }

    #[test]
    fn boundary_age_is_accepted() {
        let body = json!({"source": "assessment", "timestamp": NOW - 300_000, "selectedItems": []});
        assert!(parse_recommendation(&body, NOW, FIVE_MIN).is_ok());
    }

    #[test]
    fn stale_recommendation_is_rejected() {
        let body = json!({"source": "assessment", "timestamp": NOW - 300_001, "selectedItems": ["k1"]});
        assert!(matches!(
            parse_recommendation(&body, NOW, FIVE_MIN),
            Err(MalformedData::StaleRecommendation { age_ms: 300_001, .. })
        ));
    }

    #[test]
    fn untrusted_or_untimed_recommendation_is_rejected() {
        let manual = json!({"source": "manual", "timestamp": NOW, "selectedItems": ["k1"]});
        assert_eq!(
            parse_recommendation(&manual, NOW, FIVE_MIN).unwrap_err(),
            MalformedData::UntrustedSource("manual".to_string())
        );

        let untimed = json!({"source": "assessment", "selectedItems": ["k1"]});
        assert!(matches!(parse_recommendation(&untimed, NOW, FIVE_MIN), Err(MalformedData::Shape(_))));

        let text_time = json!({"source": "assessment", "timestamp": "now", "selectedItems": ["k1"]});
        assert!(matches!(parse_recommendation(&text_time, NOW, FIVE_MIN), Err(MalformedData::Shape(_))));
    }

    #[test]
    fn progress_pages_rederive_percentage() {
        let body = json!({"progressData": [
            {"type": "kata", "pageId": "k1", "items": [
                {"id": "a", "completed": true},
                {"id": "b", "completed": false},
                {"id": "c", "completed": false},
                {"id": "d", "completed": false}
            ], "completionPercentage": 90},
            {"type": "path", "pageId": "path-foundation", "completionPercentage": 40}
        ]});
        let pages = parse_progress(&body).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].record.percentage, 25);
        assert_eq!(pages[0].record.total, 4);
        assert_eq!(pages[1].kind, ProgressKind::Path);
        assert_eq!(pages[1].record.percentage, 40);
    }

    #[test]
    fn unknown_page_type_rejects_progress() {
        let body = json!({"progressData": [
            {"type": "kata", "pageId": "k1"},
            {"type": "lesson", "pageId": "l1"}
        ]});
        assert!(parse_progress(&body).is_err());
    }
}
