//! The run record: the persisted unit of work.
//!
//! A [`RunRecord`] is plain data. It is mutated only by pipeline steps (which
//! return a new value) and by gate approvals issued through the orchestrator.
//! The approval ledger is append-only and `updated_at` never moves backwards.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gate::{Gate, GateState, Track};
use crate::{ApproverId, ContextPacket, FeatureBrief, Prd, RunId, Timestamp, UiContract};

/// Current on-disk schema version of [`RunRecord`].
pub const SCHEMA_VERSION: u32 = 1;

fn current_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Coarse lifecycle status, governing whether new steps may execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "awaiting_prd_review")]
    AwaitingPrdReview,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::InProgress => "in-progress",
            RunStatus::AwaitingPrdReview => "awaiting_prd_review",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// `true` for `completed` and `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content fields of a run record that steps consume and produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    FeatureBrief,
    ContextPacket,
    Prd,
    UiContract,
    Fixtures,
    PrototypeOutput,
    AdaptedOutput,
}

impl RecordField {
    pub const ALL: [RecordField; 7] = [
        RecordField::FeatureBrief,
        RecordField::ContextPacket,
        RecordField::Prd,
        RecordField::UiContract,
        RecordField::Fixtures,
        RecordField::PrototypeOutput,
        RecordField::AdaptedOutput,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordField::FeatureBrief => "feature_brief",
            RecordField::ContextPacket => "context_packet",
            RecordField::Prd => "prd",
            RecordField::UiContract => "ui_contract",
            RecordField::Fixtures => "fixtures",
            RecordField::PrototypeOutput => "prototype_output",
            RecordField::AdaptedOutput => "adapted_output",
        }
    }
}

impl std::fmt::Display for RecordField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the approval ledger. Never edited once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub gate: Gate,
    pub approver: ApproverId,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

/// Where and why a run died.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    /// Name of the step that failed.
    pub step: String,
    /// Processing stage the step was running for.
    pub stage: GateState,
    pub message: String,
    pub at: Timestamp,
}

/// A schema-valid payload that still breaks a record invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordInvalid {
    #[error("feature brief has no features")]
    NoFeatures,

    #[error("feature {index} has an empty title")]
    EmptyFeatureTitle { index: usize },

    #[error("updated_at precedes created_at")]
    TimestampsInverted,

    #[error("unsupported schema version {found} (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },
}

/// The persisted workflow instance tracking one feature's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    #[serde(default = "current_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub status: RunStatus,
    #[serde(default)]
    pub stage: GateState,
    #[serde(default)]
    pub track: Track,
    pub feature_brief: FeatureBrief,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_packet: Option<ContextPacket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prd: Option<Prd>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_contract: Option<UiContract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixtures: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prototype_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapted_output: Option<String>,
    #[serde(default)]
    pub approvals: Vec<Approval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl RunRecord {
    /// Creates a fresh record at [`GateState::Idle`] with `status = pending`.
    pub fn new(feature_brief: FeatureBrief, track: Track) -> Self {
        let now = Timestamp::now();
        Self {
            schema_version: SCHEMA_VERSION,
            run_id: RunId::new_random(),
            status: RunStatus::Pending,
            stage: GateState::Idle,
            track,
            feature_brief,
            context_packet: None,
            prd: None,
            ui_contract: None,
            fixtures: None,
            prototype_output: None,
            adapted_output: None,
            approvals: Vec::new(),
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refreshes `updated_at`, never moving it backwards.
    pub fn touch(&mut self) {
        let now = Timestamp::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Whether `field` is populated.
    pub fn has(&self, field: RecordField) -> bool {
        match field {
            RecordField::FeatureBrief => true,
            RecordField::ContextPacket => self.context_packet.is_some(),
            RecordField::Prd => self.prd.is_some(),
            RecordField::UiContract => self.ui_contract.is_some(),
            RecordField::Fixtures => self.fixtures.is_some(),
            RecordField::PrototypeOutput => self.prototype_output.is_some(),
            RecordField::AdaptedOutput => self.adapted_output.is_some(),
        }
    }

    /// Appends an approval to the ledger and stamps `updated_at`.
    pub fn record_approval(&mut self, gate: Gate, approver: ApproverId, comments: Option<String>) {
        self.approvals.push(Approval {
            gate,
            approver,
            timestamp: Timestamp::now(),
            comments,
        });
        self.touch();
    }

    /// Number of ledger entries for `gate`.
    pub fn approvals_for(&self, gate: Gate) -> usize {
        self.approvals.iter().filter(|a| a.gate == gate).count()
    }

    /// Merges a partial update into the content fields and stamps `updated_at`.
    pub fn apply_patch(&mut self, patch: RunPatch) {
        let RunPatch {
            feature_brief,
            context_packet,
            prd,
            ui_contract,
            fixtures,
            prototype_output,
            adapted_output,
        } = patch;
        if let Some(v) = feature_brief {
            self.feature_brief = v;
        }
        if let Some(v) = context_packet {
            self.context_packet = Some(v);
        }
        if let Some(v) = prd {
            self.prd = Some(v);
        }
        if let Some(v) = ui_contract {
            self.ui_contract = Some(v);
        }
        if let Some(v) = fixtures {
            self.fixtures = Some(v);
        }
        if let Some(v) = prototype_output {
            self.prototype_output = Some(v);
        }
        if let Some(v) = adapted_output {
            self.adapted_output = Some(v);
        }
        self.touch();
    }

    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), RecordInvalid> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(RecordInvalid::SchemaVersion {
                found: self.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        if self.feature_brief.features.is_empty() {
            return Err(RecordInvalid::NoFeatures);
        }
        if let Some(index) = self
            .feature_brief
            .features
            .iter()
            .position(|f| f.title.trim().is_empty())
        {
            return Err(RecordInvalid::EmptyFeatureTitle { index });
        }
        if self.updated_at < self.created_at {
            return Err(RecordInvalid::TimestampsInverted);
        }
        Ok(())
    }
}

/// Caller-supplied partial update used for manual correction.
///
/// Only content fields may be patched; identity, status, stage and the
/// approval ledger are rejected at deserialisation time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_brief: Option<FeatureBrief>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_packet: Option<ContextPacket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prd: Option<Prd>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_contract: Option<UiContract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixtures: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prototype_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapted_output: Option<String>,
}
