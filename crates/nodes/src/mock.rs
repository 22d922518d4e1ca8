//! Deterministic in-process capability implementations.
//!
//! Used as the default wiring, as the fallback half of every resilient
//! capability, and in tests. None of them touch the network.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    Adapters, BriefFormatter, CapabilityError, ContextEnricher, ContextPacket, DownstreamPusher,
    Entity, EntityField, FeatureBrief, FeatureRequest, FieldKind, GeneratedPrd, MeetingRef,
    MeetingSource, Prd, PrdGenerator, Priority, PrototypeAdapter, PrototypeGenerator, Requirement,
    RequirementPriority, RunRecord, Screen, Timestamp, UiComponent, UiContract,
};
use tracing::{debug, info};
use uuid::Uuid;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Every capability backed by its mock.
pub fn mock_adapters() -> Adapters {
    Adapters {
        meeting_source: Arc::new(MockMeetingSource),
        brief_formatter: Arc::new(MockBriefFormatter),
        context_enricher: Arc::new(MockContextEnricher),
        prd_generator: Arc::new(MockPrdGenerator),
        prototype_generator: Arc::new(MockPrototypeGenerator),
        prototype_adapter: Arc::new(MockPrototypeAdapter),
        downstream_pusher: Arc::new(MockDownstreamPusher),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MockMeetingSource;

#[async_trait]
impl MeetingSource for MockMeetingSource {
    async fn get_feature_brief(
        &self,
        meeting: &MeetingRef,
    ) -> Result<FeatureBrief, CapabilityError> {
        Ok(FeatureBrief {
            meeting_id: meeting.to_string(),
            meeting_date: Timestamp::now(),
            context: "Initial mock context".into(),
            features: vec![FeatureRequest {
                id: new_id(),
                title: "Mock Feature Request".into(),
                description: "A mock feature request from a meeting.".into(),
                priority: Priority::Medium,
            }],
            supporting_quotes: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MockBriefFormatter;

#[async_trait]
impl BriefFormatter for MockBriefFormatter {
    async fn format_feature_brief(&self, raw_text: &str) -> Result<FeatureBrief, CapabilityError> {
        let excerpt: String = raw_text.chars().take(20).collect();
        Ok(FeatureBrief {
            meeting_id: "mock-text".into(),
            meeting_date: Timestamp::now(),
            context: "Mock formatted context".into(),
            features: vec![FeatureRequest {
                id: new_id(),
                title: "Mock derived feature".into(),
                description: format!("Derived from: {excerpt}"),
                priority: Priority::Medium,
            }],
            supporting_quotes: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MockContextEnricher;

#[async_trait]
impl ContextEnricher for MockContextEnricher {
    async fn enrich_context(&self, brief: &FeatureBrief) -> Result<ContextPacket, CapabilityError> {
        let first = brief
            .features
            .first()
            .map(|f| f.title.as_str())
            .unwrap_or("the request");
        Ok(ContextPacket {
            account_id: Some(new_id()),
            project_context: "Mock project context".into(),
            scope: format!("Mock scope based on {first}"),
            assumptions: vec!["Assumption 1".into(), "Assumption 2".into()],
            open_questions: vec!["Question 1?".into()],
        })
    }
}

/// Builds a PRD and a single-screen contract from the context's scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockPrdGenerator;

#[async_trait]
impl PrdGenerator for MockPrdGenerator {
    async fn generate_prd(&self, context: &ContextPacket) -> Result<GeneratedPrd, CapabilityError> {
        let feature = [context.scope.as_str(), context.project_context.as_str()]
            .into_iter()
            .find(|s| !s.trim().is_empty())
            .unwrap_or("Feature")
            .to_string();
        let requirement = |description: String, priority: RequirementPriority| Requirement {
            id: new_id(),
            description,
            priority,
        };

        let prd = Prd {
            id: new_id(),
            title: format!("PRD: {feature}"),
            overview: format!(
                "Product Requirements Document for: {feature}\n\nContext: {}",
                context.project_context
            ),
            requirements: vec![
                requirement(
                    format!("Implement the core feature: {feature}"),
                    RequirementPriority::Must,
                ),
                requirement(
                    "Ensure responsive design across desktop and mobile".into(),
                    RequirementPriority::Must,
                ),
                requirement(
                    "Add smooth animations and visual polish".into(),
                    RequirementPriority::Should,
                ),
                requirement(
                    "Include accessibility support".into(),
                    RequirementPriority::Should,
                ),
            ],
            acceptance_criteria: vec![
                format!("The feature \"{feature}\" works as described"),
                "UI is responsive and visually polished".into(),
                "No console errors or warnings".into(),
            ],
            user_stories: vec![format!("As a user, I want {feature} so that I can do my job")],
        };

        let mut props = serde_json::Map::new();
        props.insert("feature".into(), serde_json::Value::from(feature.clone()));
        let ui_contract = UiContract {
            screens: vec![Screen {
                id: new_id(),
                name: feature.clone(),
                route: "/".into(),
                description: format!("Main screen implementing: {feature}"),
                components: vec![UiComponent {
                    name: "FeatureComponent".into(),
                    props,
                }],
            }],
            entities: vec![Entity {
                name: "Item".into(),
                fields: vec![
                    EntityField {
                        name: "name".into(),
                        kind: FieldKind::String,
                    },
                    EntityField {
                        name: "enabled".into(),
                        kind: FieldKind::Boolean,
                    },
                    EntityField {
                        name: "updatedAt".into(),
                        kind: FieldKind::Date,
                    },
                ],
            }],
        };

        Ok(GeneratedPrd { prd, ui_contract })
    }
}

/// Renders a placeholder component listing the contract's screens.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockPrototypeGenerator;

#[async_trait]
impl PrototypeGenerator for MockPrototypeGenerator {
    async fn generate_prototype(
        &self,
        ui_contract: &UiContract,
        fixtures: &str,
    ) -> Result<String, CapabilityError> {
        let screens: String = ui_contract
            .screens
            .iter()
            .map(|s| {
                format!(
                    "      <section data-route=\"{}\"><h2>{}</h2></section>\n",
                    s.route, s.name
                )
            })
            .collect();
        Ok(format!(
            "{fixtures}\n\n\
             export default function Prototype() {{\n  return (\n    <main>\n\
             {screens}    </main>\n  );\n}}\n"
        ))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MockPrototypeAdapter;

#[async_trait]
impl PrototypeAdapter for MockPrototypeAdapter {
    async fn adapt_prototype(&self, artifact: &str) -> Result<String, CapabilityError> {
        Ok(format!("Mock Adapted Prototype based on {artifact}"))
    }
}

/// Hands the generated prototype to the developer's IDE for review.
///
/// The real adaptation capability: it performs no transformation of its own
/// and only marks the artefact as ready.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewHandoffAdapter;

#[async_trait]
impl PrototypeAdapter for ReviewHandoffAdapter {
    async fn adapt_prototype(&self, artifact: &str) -> Result<String, CapabilityError> {
        info!(bytes = artifact.len(), "prototype handed off for IDE review");
        Ok(format!("Ready for IDE review. v0 output: {artifact}"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MockDownstreamPusher;

#[async_trait]
impl DownstreamPusher for MockDownstreamPusher {
    async fn push_downstream(&self, record: &RunRecord) -> Result<(), CapabilityError> {
        debug!(run_id = %record.run_id, "mock downstream push");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_prd_title_follows_scope() {
        let context = ContextPacket {
            account_id: None,
            project_context: "Settings".into(),
            scope: "Dark mode".into(),
            assumptions: vec![],
            open_questions: vec![],
        };
        let out = MockPrdGenerator.generate_prd(&context).await.unwrap();
        assert_eq!(out.prd.title, "PRD: Dark mode");
        assert_eq!(out.prd.requirements.len(), 4);
        assert_eq!(out.ui_contract.screens.len(), 1);
    }

    #[tokio::test]
    async fn mock_prd_falls_back_to_project_context_then_placeholder() {
        let mut context = ContextPacket {
            account_id: None,
            project_context: "Billing".into(),
            scope: " ".into(),
            assumptions: vec![],
            open_questions: vec![],
        };
        let out = MockPrdGenerator.generate_prd(&context).await.unwrap();
        assert_eq!(out.prd.title, "PRD: Billing");

        context.project_context.clear();
        let out = MockPrdGenerator.generate_prd(&context).await.unwrap();
        assert_eq!(out.prd.title, "PRD: Feature");
    }

    #[tokio::test]
    async fn handoff_marks_output_ready_for_review() {
        let out = ReviewHandoffAdapter.adapt_prototype("<App/>").await.unwrap();
        assert_eq!(out, "Ready for IDE review. v0 output: <App/>");
    }

    #[tokio::test]
    async fn formatter_quotes_first_twenty_characters() {
        let brief = MockBriefFormatter
            .format_feature_brief("Add dark mode toggle to the settings page")
            .await
            .unwrap();
        assert_eq!(brief.features[0].description, "Derived from: Add dark mode toggle");
    }
}
