//! Building feature briefs from operator input.
//!
//! Each intake path produces a [`FeatureBrief`] with at least one titled
//! feature, or an [`IntakeError`] that the service reports as a validation
//! failure.

use pipeline::{FeatureBrief, FeatureRequest, Priority, Timestamp};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Meeting id stamped on briefs imported as JSON.
pub const JSON_IMPORT_MEETING: &str = "json-import";
/// Meeting id stamped on briefs typed in by an operator.
pub const MANUAL_MEETING: &str = "manual";
/// Meeting id stamped on briefs created by phase one.
pub const DIRECT_INPUT_MEETING: &str = "direct-input";

/// Characters of raw text kept as the title of a direct-input feature.
pub const DIRECT_TITLE_CHARS: usize = 80;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("invalid JSON input: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("input text is empty")]
    EmptyText,

    #[error("feature title is empty")]
    EmptyTitle,

    #[error("feature index {index} is out of range (brief has {len} features)")]
    FeatureIndexOutOfRange { index: usize, len: usize },

    #[error("feature index {0} selected more than once")]
    DuplicateFeatureIndex(usize),
}

fn feature(title: String, description: String, priority: Priority) -> FeatureRequest {
    FeatureRequest {
        id: Uuid::new_v4().to_string(),
        title,
        description,
        priority,
    }
}

fn str_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| value.get(*k).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
}

/// Builds a brief from an arbitrary JSON document.
///
/// Features come from a `features` or `actionItems` array. Each item's title
/// is `title` or `name`, its description `description` or `reason`, and its
/// priority `high` / `low` (anything else is medium). Without items, a single
/// feature is built from the top-level `title` / `description`.
pub fn brief_from_json(raw: &str) -> Result<FeatureBrief, IntakeError> {
    let data: Value = serde_json::from_str(raw)?;

    let items = ["features", "actionItems"]
        .iter()
        .find_map(|k| data.get(*k).and_then(Value::as_array))
        .filter(|items| !items.is_empty());

    let features = match items {
        Some(items) => items
            .iter()
            .map(|item| {
                feature(
                    str_field(item, &["title", "name"])
                        .unwrap_or("Untitled Feature")
                        .to_string(),
                    str_field(item, &["description", "reason"])
                        .unwrap_or("Feature recommendation")
                        .to_string(),
                    item.get("priority")
                        .and_then(Value::as_str)
                        .map(Priority::from_label)
                        .unwrap_or_default(),
                )
            })
            .collect(),
        None => vec![feature(
            str_field(&data, &["title"])
                .unwrap_or("Manual JSON Entry")
                .to_string(),
            str_field(&data, &["description"])
                .unwrap_or("No specific features found in JSON")
                .to_string(),
            Priority::Medium,
        )],
    };

    Ok(FeatureBrief {
        meeting_id: JSON_IMPORT_MEETING.into(),
        meeting_date: Timestamp::now(),
        context: str_field(&data, &["summary", "context"])
            .unwrap_or("Imported via JSON")
            .to_string(),
        features,
        supporting_quotes: Vec::new(),
    })
}

/// Builds a single-feature brief from an explicit title and description.
pub fn manual_brief(title: &str, description: &str) -> Result<FeatureBrief, IntakeError> {
    if title.trim().is_empty() {
        return Err(IntakeError::EmptyTitle);
    }
    Ok(FeatureBrief {
        meeting_id: MANUAL_MEETING.into(),
        meeting_date: Timestamp::now(),
        context: "Manual Input".into(),
        features: vec![feature(
            title.to_string(),
            description.to_string(),
            Priority::Medium,
        )],
        supporting_quotes: Vec::new(),
    })
}

/// Builds the brief phase one runs on: the text becomes a single high-priority
/// feature titled with its first [`DIRECT_TITLE_CHARS`] characters.
pub fn direct_input_brief(text: &str) -> Result<FeatureBrief, IntakeError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(IntakeError::EmptyText);
    }
    let title: String = text.chars().take(DIRECT_TITLE_CHARS).collect();
    Ok(FeatureBrief {
        meeting_id: DIRECT_INPUT_MEETING.into(),
        meeting_date: Timestamp::now(),
        context: text.to_string(),
        features: vec![feature(title, text.to_string(), Priority::High)],
        supporting_quotes: Vec::new(),
    })
}

/// Keeps only the features at `indices`, in the order given.
///
/// An empty selection keeps everything.
pub fn select_features(
    brief: &FeatureBrief,
    indices: &[usize],
) -> Result<FeatureBrief, IntakeError> {
    if indices.is_empty() {
        return Ok(brief.clone());
    }
    let len = brief.features.len();
    let mut seen = vec![false; len];
    let mut features = Vec::with_capacity(indices.len());
    for &index in indices {
        let Some(feature) = brief.features.get(index) else {
            return Err(IntakeError::FeatureIndexOutOfRange { index, len });
        };
        if std::mem::replace(&mut seen[index], true) {
            return Err(IntakeError::DuplicateFeatureIndex(index));
        }
        features.push(feature.clone());
    }
    Ok(FeatureBrief {
        features,
        ..brief.clone()
    })
}
