//! Capability implementations backed by a [`ChatClient`].

use async_trait::async_trait;
use pipeline::{
    BriefFormatter, CapabilityError, ContextEnricher, ContextPacket, FeatureBrief, GeneratedPrd,
    PrdGenerator, PrototypeGenerator, UiContract,
};
use tracing::{debug, info, instrument};

use crate::client::ChatClient;
use crate::parse;

fn to_json(value: &impl serde::Serialize) -> Result<String, CapabilityError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CapabilityError::Parse(format!("failed to encode prompt input: {e}")))
}

// ---------------------------------------------------------------------------
// Brief formatting
// ---------------------------------------------------------------------------

/// Extracts a feature brief from free text.
#[derive(Debug, Clone)]
pub struct LlmBriefFormatter {
    client: ChatClient,
}

impl LlmBriefFormatter {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BriefFormatter for LlmBriefFormatter {
    #[instrument(skip_all, fields(model = %self.client.model(), text_chars = raw_text.len()))]
    async fn format_feature_brief(&self, raw_text: &str) -> Result<FeatureBrief, CapabilityError> {
        let reply = self
            .client
            .complete_json(parse::FORMAT_SYSTEM_PROMPT, raw_text)
            .await?;
        let brief = parse::parse_object(&reply).and_then(|v| parse::brief_from_reply(&v))?;
        debug!(features = brief.features.len(), "Formatted feature brief");
        Ok(brief)
    }
}

// ---------------------------------------------------------------------------
// Context enrichment
// ---------------------------------------------------------------------------

/// Adds technical context, scope, assumptions and open questions to a brief.
#[derive(Debug, Clone)]
pub struct LlmContextEnricher {
    client: ChatClient,
}

impl LlmContextEnricher {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContextEnricher for LlmContextEnricher {
    #[instrument(skip_all, fields(model = %self.client.model(), meeting_id = %brief.meeting_id))]
    async fn enrich_context(&self, brief: &FeatureBrief) -> Result<ContextPacket, CapabilityError> {
        let input = to_json(brief)?;
        let reply = self
            .client
            .complete_json(parse::ENRICH_SYSTEM_PROMPT, &input)
            .await?;
        let packet = parse::parse_object(&reply).and_then(|v| parse::context_from_reply(&v))?;
        debug!(
            assumptions = packet.assumptions.len(),
            open_questions = packet.open_questions.len(),
            "Enriched context"
        );
        Ok(packet)
    }
}

// ---------------------------------------------------------------------------
// PRD generation
// ---------------------------------------------------------------------------

/// Writes a PRD and UI contract from an enriched context.
#[derive(Debug, Clone)]
pub struct LlmPrdGenerator {
    client: ChatClient,
}

impl LlmPrdGenerator {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PrdGenerator for LlmPrdGenerator {
    #[instrument(skip_all, fields(model = %self.client.model()))]
    async fn generate_prd(&self, context: &ContextPacket) -> Result<GeneratedPrd, CapabilityError> {
        let input = to_json(context)?;
        let reply = self
            .client
            .complete_json(parse::PRD_SYSTEM_PROMPT, &input)
            .await?;
        let generated = parse::generated_prd(&reply, context);
        info!(
            title = %generated.prd.title,
            requirements = generated.prd.requirements.len(),
            screens = generated.ui_contract.screens.len(),
            "Generated PRD"
        );
        Ok(generated)
    }
}

// ---------------------------------------------------------------------------
// Prototype generation
// ---------------------------------------------------------------------------

/// Generates prototype source code from a UI contract and fixtures, using a
/// v0-style code model.
#[derive(Debug, Clone)]
pub struct LlmPrototypeGenerator {
    client: ChatClient,
}

impl LlmPrototypeGenerator {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PrototypeGenerator for LlmPrototypeGenerator {
    #[instrument(
        skip_all,
        fields(model = %self.client.model(), screens = ui_contract.screens.len())
    )]
    async fn generate_prototype(
        &self,
        ui_contract: &UiContract,
        fixtures: &str,
    ) -> Result<String, CapabilityError> {
        let prompt = parse::prototype_prompt(ui_contract, fixtures);
        let reply = self
            .client
            .complete_text(parse::PROTOTYPE_SYSTEM_PROMPT, &prompt)
            .await?;
        let output = parse::prototype_output(reply);
        info!(output_chars = output.len(), "Generated prototype");
        Ok(output)
    }
}
