//! Pipeline step implementations, one per processing stage.
//!
//! Every step is a thin sequencing shim: read its inputs from the snapshot,
//! call at most one capability, write its outputs onto a clone. Step names are
//! the stage names, so logs and failure records line up with the gate state
//! machine.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    ArtifactSink, ContextEnricher, ContextPacket, DownstreamPusher, GateState, PipelineStep,
    PrdGenerator, PrototypeAdapter, PrototypeGenerator, RecordField, RunRecord, StepError,
};
use tracing::{debug, info};

use crate::clean_room::CleanRoom;
use crate::fixtures::{generate_fixtures, EMPTY_FIXTURES};

/// Artefact name the prototype step writes.
pub const PROTOTYPE_ARTIFACT: &str = "prototype.tsx";

// ---------------------------------------------------------------------------
// Clean room
// ---------------------------------------------------------------------------

/// Redacts personal data from the feature brief.
#[derive(Debug, Clone)]
pub struct CleanRoomStep {
    room: Arc<CleanRoom>,
}

impl CleanRoomStep {
    pub fn new(room: Arc<CleanRoom>) -> Self {
        Self { room }
    }
}

#[async_trait]
impl PipelineStep for CleanRoomStep {
    fn name(&self) -> &str {
        GateState::CleanRoom.as_str()
    }

    fn requires(&self) -> &[RecordField] {
        &[RecordField::FeatureBrief]
    }

    fn produces(&self) -> &[RecordField] {
        &[RecordField::FeatureBrief]
    }

    async fn execute(&self, record: &RunRecord) -> Result<RunRecord, StepError> {
        let mut next = record.clone();
        next.feature_brief = self.room.scrub_brief(&record.feature_brief);
        if next.feature_brief != record.feature_brief {
            info!(run_id = %record.run_id, "personal data redacted from brief");
        }
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

pub struct EnrichmentStep {
    enricher: Arc<dyn ContextEnricher>,
}

impl EnrichmentStep {
    pub fn new(enricher: Arc<dyn ContextEnricher>) -> Self {
        Self { enricher }
    }
}

#[async_trait]
impl PipelineStep for EnrichmentStep {
    fn name(&self) -> &str {
        GateState::Enrichment.as_str()
    }

    fn requires(&self) -> &[RecordField] {
        &[RecordField::FeatureBrief]
    }

    fn produces(&self) -> &[RecordField] {
        &[RecordField::ContextPacket]
    }

    async fn execute(&self, record: &RunRecord) -> Result<RunRecord, StepError> {
        let packet = self
            .enricher
            .enrich_context(&record.feature_brief)
            .await
            .map_err(|e| StepError::new(self.name(), e))?;
        let mut next = record.clone();
        next.context_packet = Some(packet);
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// PRD generation
// ---------------------------------------------------------------------------

/// Generates the PRD and UI contract. Derives a context packet from the brief
/// when enrichment has not run.
pub struct PrdGenerationStep {
    generator: Arc<dyn PrdGenerator>,
}

impl PrdGenerationStep {
    pub fn new(generator: Arc<dyn PrdGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl PipelineStep for PrdGenerationStep {
    fn name(&self) -> &str {
        GateState::PrdGeneration.as_str()
    }

    fn requires(&self) -> &[RecordField] {
        &[RecordField::FeatureBrief]
    }

    fn produces(&self) -> &[RecordField] {
        &[
            RecordField::ContextPacket,
            RecordField::Prd,
            RecordField::UiContract,
        ]
    }

    async fn execute(&self, record: &RunRecord) -> Result<RunRecord, StepError> {
        let context = record
            .context_packet
            .clone()
            .unwrap_or_else(|| ContextPacket::from_brief(&record.feature_brief));
        let generated = self
            .generator
            .generate_prd(&context)
            .await
            .map_err(|e| StepError::new(self.name(), e))?;
        debug!(run_id = %record.run_id, title = %generated.prd.title, "PRD generated");

        let mut next = record.clone();
        next.context_packet = Some(context);
        next.prd = Some(generated.prd);
        next.ui_contract = Some(generated.ui_contract);
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// Fixture generation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureGenerationStep;

#[async_trait]
impl PipelineStep for FixtureGenerationStep {
    fn name(&self) -> &str {
        GateState::FixtureGeneration.as_str()
    }

    fn requires(&self) -> &[RecordField] {
        &[RecordField::UiContract]
    }

    fn produces(&self) -> &[RecordField] {
        &[RecordField::Fixtures]
    }

    async fn execute(&self, record: &RunRecord) -> Result<RunRecord, StepError> {
        let contract = record
            .ui_contract
            .as_ref()
            .ok_or_else(|| StepError::missing(self.name(), RecordField::UiContract))?;
        let mut next = record.clone();
        next.fixtures = Some(generate_fixtures(contract));
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// Prototype generation
// ---------------------------------------------------------------------------

/// Generates the prototype and writes it as [`PROTOTYPE_ARTIFACT`].
pub struct PrototypeGenerationStep {
    generator: Arc<dyn PrototypeGenerator>,
    artifacts: Arc<dyn ArtifactSink>,
}

impl PrototypeGenerationStep {
    pub fn new(generator: Arc<dyn PrototypeGenerator>, artifacts: Arc<dyn ArtifactSink>) -> Self {
        Self {
            generator,
            artifacts,
        }
    }
}

#[async_trait]
impl PipelineStep for PrototypeGenerationStep {
    fn name(&self) -> &str {
        GateState::PrototypeGeneration.as_str()
    }

    fn requires(&self) -> &[RecordField] {
        &[RecordField::UiContract]
    }

    fn produces(&self) -> &[RecordField] {
        &[RecordField::Fixtures, RecordField::PrototypeOutput]
    }

    async fn execute(&self, record: &RunRecord) -> Result<RunRecord, StepError> {
        let contract = record
            .ui_contract
            .as_ref()
            .ok_or_else(|| StepError::missing(self.name(), RecordField::UiContract))?;
        let fixtures = record
            .fixtures
            .clone()
            .unwrap_or_else(|| EMPTY_FIXTURES.to_string());

        let output = self
            .generator
            .generate_prototype(contract, &fixtures)
            .await
            .map_err(|e| StepError::new(self.name(), e))?;
        let path = self
            .artifacts
            .write_artifact(&record.run_id, PROTOTYPE_ARTIFACT, &output)
            .await
            .map_err(|e| StepError::new(self.name(), e))?;
        info!(run_id = %record.run_id, artifact = %path, "prototype written");

        let mut next = record.clone();
        next.fixtures = Some(fixtures);
        next.prototype_output = Some(output);
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// Adaptation
// ---------------------------------------------------------------------------

pub struct AdaptationStep {
    adapter: Arc<dyn PrototypeAdapter>,
}

impl AdaptationStep {
    pub fn new(adapter: Arc<dyn PrototypeAdapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl PipelineStep for AdaptationStep {
    fn name(&self) -> &str {
        GateState::Adaptation.as_str()
    }

    fn requires(&self) -> &[RecordField] {
        &[RecordField::PrototypeOutput]
    }

    fn produces(&self) -> &[RecordField] {
        &[RecordField::AdaptedOutput]
    }

    async fn execute(&self, record: &RunRecord) -> Result<RunRecord, StepError> {
        let prototype = record
            .prototype_output
            .as_deref()
            .ok_or_else(|| StepError::missing(self.name(), RecordField::PrototypeOutput))?;
        let adapted = self
            .adapter
            .adapt_prototype(prototype)
            .await
            .map_err(|e| StepError::new(self.name(), e))?;
        let mut next = record.clone();
        next.adapted_output = Some(adapted);
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// Downstream push
// ---------------------------------------------------------------------------

pub struct PushDownstreamStep {
    pusher: Arc<dyn DownstreamPusher>,
}

impl PushDownstreamStep {
    pub fn new(pusher: Arc<dyn DownstreamPusher>) -> Self {
        Self { pusher }
    }
}

#[async_trait]
impl PipelineStep for PushDownstreamStep {
    fn name(&self) -> &str {
        GateState::PushDownstream.as_str()
    }

    fn requires(&self) -> &[RecordField] {
        &[RecordField::AdaptedOutput]
    }

    async fn execute(&self, record: &RunRecord) -> Result<RunRecord, StepError> {
        if record.adapted_output.is_none() {
            return Err(StepError::missing(self.name(), RecordField::AdaptedOutput));
        }
        self.pusher
            .push_downstream(record)
            .await
            .map_err(|e| StepError::new(self.name(), e))?;
        info!(run_id = %record.run_id, "run pushed downstream");
        Ok(record.clone())
    }
}
