//! Capability ports: the external collaborators the engine consumes.
//!
//! Each trait is one abstract operation with interchangeable implementations
//! (a real adapter in an infrastructure crate, a deterministic mock in
//! `nodes`). The orchestrator never knows which one it holds; selection is
//! made by the composition root and handed over as an [`Adapters`] map.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    CapabilityError, ContextPacket, FeatureBrief, GeneratedPrd, MeetingRef, RunRecord, UiContract,
};

/// Names the capabilities, for logs and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    MeetingSource,
    BriefFormatting,
    ContextEnrichment,
    PrdGeneration,
    PrototypeGeneration,
    PrototypeAdaptation,
    DownstreamPush,
}

impl Capability {
    /// All capabilities, in pipeline order.
    pub const ALL: [Capability; 7] = [
        Capability::MeetingSource,
        Capability::BriefFormatting,
        Capability::ContextEnrichment,
        Capability::PrdGeneration,
        Capability::PrototypeGeneration,
        Capability::PrototypeAdaptation,
        Capability::DownstreamPush,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::MeetingSource => "meeting_source",
            Capability::BriefFormatting => "brief_formatting",
            Capability::ContextEnrichment => "context_enrichment",
            Capability::PrdGeneration => "prd_generation",
            Capability::PrototypeGeneration => "prototype_generation",
            Capability::PrototypeAdaptation => "prototype_adaptation",
            Capability::DownstreamPush => "downstream_push",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retrieves the feature brief captured for a meeting.
#[async_trait]
pub trait MeetingSource: Send + Sync {
    async fn get_feature_brief(
        &self,
        meeting: &MeetingRef,
    ) -> Result<FeatureBrief, CapabilityError>;
}

/// Turns free text into a structured brief.
#[async_trait]
pub trait BriefFormatter: Send + Sync {
    async fn format_feature_brief(&self, raw_text: &str) -> Result<FeatureBrief, CapabilityError>;
}

/// Adds technical and business context to a brief.
#[async_trait]
pub trait ContextEnricher: Send + Sync {
    async fn enrich_context(&self, brief: &FeatureBrief) -> Result<ContextPacket, CapabilityError>;
}

/// Writes a PRD and the UI contract the prototype is built against.
#[async_trait]
pub trait PrdGenerator: Send + Sync {
    async fn generate_prd(&self, context: &ContextPacket) -> Result<GeneratedPrd, CapabilityError>;
}

/// Generates a prototype artefact (source code or a preview URL).
#[async_trait]
pub trait PrototypeGenerator: Send + Sync {
    async fn generate_prototype(
        &self,
        ui_contract: &UiContract,
        fixtures: &str,
    ) -> Result<String, CapabilityError>;
}

/// Adapts a generated prototype for review.
#[async_trait]
pub trait PrototypeAdapter: Send + Sync {
    async fn adapt_prototype(&self, artifact: &str) -> Result<String, CapabilityError>;
}

/// Pushes a finished run to the downstream tracker.
#[async_trait]
pub trait DownstreamPusher: Send + Sync {
    async fn push_downstream(&self, record: &RunRecord) -> Result<(), CapabilityError>;
}

/// The capability-to-implementation map injected into the orchestrator.
///
/// Built by the composition root; the engine never chooses implementations
/// itself.
#[derive(Clone)]
pub struct Adapters {
    pub meeting_source: Arc<dyn MeetingSource>,
    pub brief_formatter: Arc<dyn BriefFormatter>,
    pub context_enricher: Arc<dyn ContextEnricher>,
    pub prd_generator: Arc<dyn PrdGenerator>,
    pub prototype_generator: Arc<dyn PrototypeGenerator>,
    pub prototype_adapter: Arc<dyn PrototypeAdapter>,
    pub downstream_pusher: Arc<dyn DownstreamPusher>,
}

impl std::fmt::Debug for Adapters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapters").finish_non_exhaustive()
    }
}
