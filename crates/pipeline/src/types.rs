//! Shared value types for the Demoflow pipeline domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! the content that flows through a run: the feature brief captured at intake,
//! the enriched context, the PRD and UI contract, and the timestamps stamped on
//! every mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API. Serialised as RFC 3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Feature brief
// ---------------------------------------------------------------------------

/// Relative importance of a requested feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Must be demoed first.
    High,
    /// Default when the source gives no signal.
    #[default]
    Medium,
    /// Nice to have.
    Low,
}

impl Priority {
    /// Maps a free-form priority label onto a [`Priority`].
    ///
    /// `high` and `low` are recognised case-insensitively; anything else is
    /// [`Priority::Medium`].
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }
}

/// One feature request extracted from a meeting or typed in by an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRequest {
    /// Stable identifier within the brief.
    pub id: String,
    /// Short title; never empty in a valid brief.
    pub title: String,
    /// What was asked for.
    pub description: String,
    /// Relative importance.
    #[serde(default)]
    pub priority: Priority,
}

/// The seed input of every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBrief {
    /// Meeting the brief came from, or a marker such as `manual` or
    /// `json-import` for other intake paths.
    pub meeting_id: String,
    /// When the meeting (or intake) happened.
    pub meeting_date: Timestamp,
    /// Free-text context around the requests.
    pub context: String,
    /// Requested features; at least one in a valid brief.
    pub features: Vec<FeatureRequest>,
    /// Verbatim quotes supporting the requests.
    #[serde(default)]
    pub supporting_quotes: Vec<String>,
}

impl FeatureBrief {
    /// Titles of all features, joined with `", "`.
    pub fn feature_titles(&self) -> String {
        self.features
            .iter()
            .map(|f| f.title.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ---------------------------------------------------------------------------
// Context packet
// ---------------------------------------------------------------------------

/// Technical and business context produced by the enrichment step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPacket {
    /// Account the work is for, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Description of the project the feature lands in.
    pub project_context: String,
    /// What is in scope for the demo.
    pub scope: String,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
}

impl ContextPacket {
    /// Derives a minimal context packet straight from a brief, for flows that
    /// skip enrichment.
    pub fn from_brief(brief: &FeatureBrief) -> Self {
        let project_context = if brief.context.trim().is_empty() {
            "Feature request".to_string()
        } else {
            brief.context.clone()
        };
        Self {
            account_id: None,
            project_context,
            scope: brief.feature_titles(),
            assumptions: Vec::new(),
            open_questions: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// PRD and UI contract
// ---------------------------------------------------------------------------

/// MoSCoW-style priority of a PRD requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementPriority {
    Must,
    #[default]
    Should,
    Could,
}

/// A single PRD requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub priority: RequirementPriority,
}

/// Product requirements document produced by the PRD generation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prd {
    pub id: String,
    /// Never empty in a generated PRD.
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub user_stories: Vec<String>,
}

/// A UI component placed on a screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiComponent {
    pub name: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub props: serde_json::Map<String, serde_json::Value>,
}

/// A screen the prototype must render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screen {
    pub id: String,
    pub name: String,
    #[serde(default = "default_route")]
    pub route: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub components: Vec<UiComponent>,
}

fn default_route() -> String {
    "/".to_string()
}

/// Primitive type of a fixture entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
}

/// One field of a data entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
}

/// A data entity the prototype displays; used to generate fixtures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<EntityField>,
}

/// Contract between the PRD and the prototype generator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UiContract {
    #[serde(default)]
    pub screens: Vec<Screen>,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

/// Output of the `generate_prd` capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPrd {
    pub prd: Prd,
    pub ui_contract: UiContract,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brief() -> FeatureBrief {
        FeatureBrief {
            meeting_id: "m-1".into(),
            meeting_date: Timestamp::now(),
            context: String::new(),
            features: vec![
                FeatureRequest {
                    id: "f1".into(),
                    title: "Dark mode".into(),
                    description: "toggle".into(),
                    priority: Priority::High,
                },
                FeatureRequest {
                    id: "f2".into(),
                    title: "Export".into(),
                    description: "csv".into(),
                    priority: Priority::Low,
                },
            ],
            supporting_quotes: vec![],
        }
    }

    #[test]
    fn priority_labels_are_case_insensitive() {
        assert_eq!(Priority::from_label("HIGH"), Priority::High);
        assert_eq!(Priority::from_label(" low "), Priority::Low);
        assert_eq!(Priority::from_label("urgent"), Priority::Medium);
    }

    #[test]
    fn context_from_brief_joins_titles_and_defaults_context() {
        let ctx = ContextPacket::from_brief(&brief());
        assert_eq!(ctx.scope, "Dark mode, Export");
        assert_eq!(ctx.project_context, "Feature request");
    }

    #[test]
    fn entity_field_kind_uses_type_key() {
        let field: EntityField =
            serde_json::from_str(r#"{"name":"created","type":"date"}"#).unwrap();
        assert_eq!(field.kind, FieldKind::Date);
    }
}
