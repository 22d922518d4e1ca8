//! Prompt construction and lenient decoding of model replies.
//!
//! Models drift from the schema they are given, so decoding accepts the
//! common variations (nested or flat PRDs, requirements as strings or
//! objects) and only fails when nothing usable is present.

use pipeline::{
    ContextPacket, Entity, FeatureBrief, FeatureRequest, GeneratedPrd, Prd, Priority, Requirement,
    RequirementPriority, Screen, Timestamp, UiComponent, UiContract,
};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::LlmError;

/// Meeting id stamped on briefs produced from free text.
pub(crate) const TEXT_MEETING: &str = "manual-text";

/// Returned when the prototype endpoint answers with an empty message.
pub(crate) const EMPTY_PROTOTYPE: &str = "No content returned from v0";

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

pub(crate) const FORMAT_SYSTEM_PROMPT: &str = r#"You are an expert product manager.
Extract feature requests from the provided text into a JSON object.
The output must match this schema:
{
    "title": "Overall feature set title",
    "description": "High level context",
    "features": [
        { "title": "...", "description": "...", "priority": "high|medium|low" }
    ]
}"#;

pub(crate) const ENRICH_SYSTEM_PROMPT: &str = r#"You are a Senior Solutions Architect.
Enrich the following feature brief with technical context, assumptions, and scope definition.
Output JSON schema:
{
    "projectContext": "...",
    "scope": "...",
    "assumptions": ["..."],
    "openQuestions": ["..."]
}"#;

pub(crate) const PRD_SYSTEM_PROMPT: &str = r#"You are ChatPRD, a world-class Product Manager.
Based on the enriched context provided, generate a detailed PRD and a UI Contract
for a prototype generator.
Output JSON schema:
{
    "prd": {
        "title": "...",
        "overview": "...",
        "requirements": [{ "description": "...", "priority": "must|should|could" }],
        "acceptanceCriteria": ["AC 1", "AC 2"],
        "userStories": ["As a ..., I want ..."]
    },
    "uiContract": {
        "screens": [
            {
                "name": "Screen Name",
                "route": "/route",
                "description": "What this screen does",
                "components": ["Header", "Toggle", "List"]
            }
        ],
        "entities": [
            {
                "name": "Entity",
                "fields": [{ "name": "field", "type": "string|number|boolean|date" }]
            }
        ]
    }
}"#;

pub(crate) const PROTOTYPE_SYSTEM_PROMPT: &str =
    "You are v0, an expert UI engineer. Generate high-quality React code using Tailwind CSS.";

/// Builds the code-generation prompt for a UI contract and its fixtures.
pub(crate) fn prototype_prompt(contract: &UiContract, fixtures: &str) -> String {
    let screens = contract
        .screens
        .iter()
        .map(|s| {
            let components = s
                .components
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "Feature: {}\n  Description: {}\n  Components: {}",
                s.name, s.description, components
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Build exactly this feature as a single, self-contained React + Tailwind CSS component:\n\n\
         {screens}\n\n\
         Data fixtures:\n{fixtures}\n\n\
         IMPORTANT:\n\
         - Focus on implementing EXACTLY the described feature with high visual quality\n\
         - Use modern, polished UI with smooth animations and transitions\n\
         - Make it a SINGLE self-contained component that demonstrates the feature\n\
         - Do NOT generate boilerplate apps, multi-page routing, or generic templates\n\
         - Return only the TSX code for the component"
    )
}

/// Normalises the prototype reply: an empty reply becomes [`EMPTY_PROTOTYPE`].
pub(crate) fn prototype_output(content: String) -> String {
    if content.trim().is_empty() {
        EMPTY_PROTOTYPE.to_string()
    } else {
        content
    }
}

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

/// Removes a surrounding Markdown code fence (```json ... ```), if any.
pub(crate) fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parses a reply that must be a JSON object.
pub(crate) fn parse_object(content: &str) -> Result<Value, LlmError> {
    let value: Value = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| LlmError::Parse(format!("reply is not JSON: {e}")))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(LlmError::Parse("reply is not a JSON object".into()))
    }
}

fn text<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Brief and context
// ---------------------------------------------------------------------------

/// Decodes a formatted brief: `{title, description, features: [...]}`.
pub(crate) fn brief_from_reply(value: &Value) -> Result<FeatureBrief, LlmError> {
    let features: Vec<FeatureRequest> = value
        .get("features")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|f| FeatureRequest {
            id: new_id(),
            title: text(f, "title").unwrap_or("Untitled Feature").to_string(),
            description: text(f, "description").unwrap_or_default().to_string(),
            priority: text(f, "priority")
                .map(Priority::from_label)
                .unwrap_or_default(),
        })
        .collect();

    if features.is_empty() {
        return Err(LlmError::Parse("reply contains no features".into()));
    }

    Ok(FeatureBrief {
        meeting_id: TEXT_MEETING.into(),
        meeting_date: Timestamp::now(),
        context: text(value, "description")
            .or_else(|| text(value, "title"))
            .unwrap_or_default()
            .to_string(),
        features,
        supporting_quotes: Vec::new(),
    })
}

/// Decodes an enrichment reply: `{projectContext, scope, assumptions, openQuestions}`.
pub(crate) fn context_from_reply(value: &Value) -> Result<ContextPacket, LlmError> {
    let project_context = text(value, "projectContext")
        .ok_or_else(|| LlmError::Parse("reply has no projectContext".into()))?;
    let scope =
        text(value, "scope").ok_or_else(|| LlmError::Parse("reply has no scope".into()))?;

    Ok(ContextPacket {
        account_id: Some(new_id()),
        project_context: project_context.to_string(),
        scope: scope.to_string(),
        assumptions: strings(value.get("assumptions")),
        open_questions: strings(value.get("openQuestions")),
    })
}

// ---------------------------------------------------------------------------
// PRD
// ---------------------------------------------------------------------------

fn requirement_priority(label: Option<&str>) -> RequirementPriority {
    match label.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
        Some("must") => RequirementPriority::Must,
        Some("could") => RequirementPriority::Could,
        _ => RequirementPriority::Should,
    }
}

fn requirement(item: &Value) -> Option<Requirement> {
    let (description, priority) = match item {
        Value::String(s) => (s.as_str(), None),
        Value::Object(_) => (text(item, "description")?, text(item, "priority")),
        _ => return None,
    };
    Some(Requirement {
        id: new_id(),
        description: description.to_string(),
        priority: requirement_priority(priority),
    })
}

fn component(item: &Value) -> Option<UiComponent> {
    match item {
        Value::String(name) => Some(UiComponent {
            name: name.clone(),
            props: Map::new(),
        }),
        Value::Object(_) => Some(UiComponent {
            name: text(item, "name")?.to_string(),
            props: item
                .get("props")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        }),
        _ => None,
    }
}

fn screen(index: usize, item: &Value) -> Screen {
    Screen {
        id: new_id(),
        name: text(item, "name")
            .map(str::to_string)
            .unwrap_or_else(|| format!("Screen {}", index + 1)),
        route: text(item, "route").unwrap_or("/").to_string(),
        description: text(item, "description").unwrap_or_default().to_string(),
        components: item
            .get("components")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(component)
            .collect(),
    }
}

/// Decodes a structured PRD reply.
///
/// Accepts `{prd: {...}, uiContract: {...}}` or the same fields flattened at
/// the top level. The title falls back to `"Generated PRD"`.
pub(crate) fn prd_from_reply(value: &Value) -> GeneratedPrd {
    let nested = value.get("prd").filter(|v| v.is_object());
    let field = |key: &str| value.get(key).or_else(|| nested.and_then(|p| p.get(key)));

    let contract = value.get("uiContract").filter(|v| v.is_object());
    let screens = contract
        .and_then(|c| c.get("screens"))
        .or_else(|| value.get("screens"))
        .and_then(Value::as_array);
    let entities = contract
        .and_then(|c| c.get("entities"))
        .or_else(|| value.get("entities"))
        .cloned()
        .and_then(|v| serde_json::from_value::<Vec<Entity>>(v).ok())
        .unwrap_or_default();

    let prd = Prd {
        id: new_id(),
        title: field("title")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("Generated PRD")
            .to_string(),
        overview: field("overview")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        requirements: field("requirements")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(requirement)
            .collect(),
        acceptance_criteria: strings(field("acceptanceCriteria")),
        user_stories: strings(field("userStories")),
    };

    GeneratedPrd {
        prd,
        ui_contract: UiContract {
            screens: screens
                .into_iter()
                .flatten()
                .enumerate()
                .map(|(i, s)| screen(i, s))
                .collect(),
            entities,
        },
    }
}

/// Builds a PRD around a free-text reply the model failed to structure.
pub(crate) fn prd_from_text(reply: &str, context: &ContextPacket) -> GeneratedPrd {
    GeneratedPrd {
        prd: Prd {
            id: new_id(),
            title: format!("PRD: {}", context.scope),
            overview: reply.trim().to_string(),
            requirements: vec![Requirement {
                id: new_id(),
                description: context.scope.clone(),
                priority: RequirementPriority::Must,
            }],
            acceptance_criteria: vec!["Generated from free-text PRD reply".into()],
            user_stories: Vec::new(),
        },
        ui_contract: UiContract {
            screens: vec![Screen {
                id: new_id(),
                name: "Main".into(),
                route: "/".into(),
                description: context.scope.clone(),
                components: vec![UiComponent {
                    name: "App".into(),
                    props: Map::new(),
                }],
            }],
            entities: Vec::new(),
        },
    }
}

/// Decodes a PRD reply, structured when it parses as a JSON object and
/// free-text otherwise.
pub(crate) fn generated_prd(reply: &str, context: &ContextPacket) -> GeneratedPrd {
    match parse_object(reply) {
        Ok(value) => prd_from_reply(&value),
        Err(_) => prd_from_text(reply, context),
    }
}
