//! The orchestrator façade.
//!
//! [`OrchestratorService`] owns the run store, the artefact sink and the
//! capability map. Every operation loads the record from the store, asks the
//! [`GateMachine`] what the trigger means, runs the resulting processing steps
//! through a fresh [`PipelineRunner`], and persists the outcome. The service
//! keeps no record cache; the store is the only source of truth.
//!
//! ## Concurrency
//!
//! Mutating operations on one run are serialised by an in-process async mutex
//! keyed by run id, held across the whole load → mutate → save sequence.
//! Different runs proceed concurrently. Nothing coordinates separate
//! processes sharing a store; there the store stays last-writer-wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use pipeline::{
    Adapters, ApproverId, ArtifactSink, Capability, ContextPacket, FeatureBrief, Gate,
    GateDecision, GateMachine, GateState, MeetingRef, OrchestratorError, PipelineError,
    PipelineRunner, PipelineStep, RecordField, RunFailure, RunId, RunPatch, RunRecord, RunStatus,
    RunStore, Timestamp, Track, Transition,
};
use tokio::sync::OwnedMutexGuard;
use tracing::{info, instrument, warn};

use crate::clean_room::CleanRoom;
use crate::intake::{self, IntakeError};
use crate::steps::{
    AdaptationStep, CleanRoomStep, EnrichmentStep, FixtureGenerationStep, PrdGenerationStep,
    PrototypeGenerationStep, PushDownstreamStep,
};

/// Service-level settings resolved by the composition root.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Approver recorded by [`OrchestratorService::approve_and_continue`].
    pub default_approver: ApproverId,
    pub clean_room: Arc<CleanRoom>,
}

/// Input to [`OrchestratorService::approve_gate`].
#[derive(Debug, Clone, PartialEq)]
pub struct GateApproval {
    pub gate: Gate,
    pub approver: ApproverId,
    pub comments: Option<String>,
    /// Zero-based feature indices to carry forward; gate1 only. Empty keeps
    /// every feature.
    pub selected_features: Vec<usize>,
}

impl GateApproval {
    pub fn new(gate: Gate, approver: ApproverId) -> Self {
        Self {
            gate,
            approver,
            comments: None,
            selected_features: Vec::new(),
        }
    }

    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }

    pub fn with_selection(mut self, indices: Vec<usize>) -> Self {
        self.selected_features = indices;
        self
    }
}

impl From<IntakeError> for OrchestratorError {
    fn from(err: IntakeError) -> Self {
        OrchestratorError::validation(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Per-run locks
// ---------------------------------------------------------------------------

/// One async mutex per run id. Entries nobody holds are pruned on the next
/// acquisition.
#[derive(Debug, Default)]
struct RunLocks {
    inner: Mutex<HashMap<RunId, Arc<tokio::sync::Mutex<()>>>>,
}

impl RunLocks {
    async fn acquire(&self, run_id: RunId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.retain(|id, lock| *id == run_id || Arc::strong_count(lock) > 1);
            Arc::clone(map.entry(run_id).or_default())
        };
        lock.lock_owned().await
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct OrchestratorService {
    store: Arc<dyn RunStore>,
    artifacts: Arc<dyn ArtifactSink>,
    adapters: Adapters,
    config: ServiceConfig,
    locks: RunLocks,
}

impl std::fmt::Debug for OrchestratorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorService")
            .field("adapters", &self.adapters)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OrchestratorService {
    pub fn new(
        store: Arc<dyn RunStore>,
        artifacts: Arc<dyn ArtifactSink>,
        adapters: Adapters,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            artifacts,
            adapters,
            config,
            locks: RunLocks::default(),
        }
    }

    // -- intake -------------------------------------------------------------

    /// Creates a gated run from the brief captured for `meeting`.
    #[instrument(skip_all, fields(meeting = %meeting))]
    pub async fn start_run_from_meeting(
        &self,
        meeting: &MeetingRef,
    ) -> Result<RunRecord, OrchestratorError> {
        let brief = self
            .adapters
            .meeting_source
            .get_feature_brief(meeting)
            .await
            .map_err(|source| OrchestratorError::CapabilityUnavailable {
                capability: Capability::MeetingSource,
                source,
            })?;
        self.create_run(brief, None).await
    }

    /// Creates a gated run from free text: the text is formatted into a brief
    /// and enriched straight away.
    #[instrument(skip_all)]
    pub async fn start_run_from_text(&self, text: &str) -> Result<RunRecord, OrchestratorError> {
        if text.trim().is_empty() {
            return Err(IntakeError::EmptyText.into());
        }
        let brief = self
            .adapters
            .brief_formatter
            .format_feature_brief(text)
            .await
            .map_err(|source| OrchestratorError::CapabilityUnavailable {
                capability: Capability::BriefFormatting,
                source,
            })?;
        let context = self
            .adapters
            .context_enricher
            .enrich_context(&brief)
            .await
            .map_err(|source| OrchestratorError::CapabilityUnavailable {
                capability: Capability::ContextEnrichment,
                source,
            })?;
        self.create_run(brief, Some(context)).await
    }

    /// Creates a gated run from a structured JSON document.
    #[instrument(skip_all)]
    pub async fn start_run_from_json(&self, raw: &str) -> Result<RunRecord, OrchestratorError> {
        let brief = intake::brief_from_json(raw)?;
        self.create_run(brief, None).await
    }

    /// Creates a gated run from an explicit title and description.
    #[instrument(skip_all, fields(title = %title))]
    pub async fn start_manual_run(
        &self,
        title: &str,
        description: &str,
    ) -> Result<RunRecord, OrchestratorError> {
        let brief = intake::manual_brief(title, description)?;
        self.create_run(brief, None).await
    }

    async fn create_run(
        &self,
        brief: FeatureBrief,
        context: Option<ContextPacket>,
    ) -> Result<RunRecord, OrchestratorError> {
        let mut record = RunRecord::new(brief, Track::Gated);
        record.context_packet = context;
        record
            .validate()
            .map_err(|e| OrchestratorError::validation(e.to_string()))?;

        let begin = GateMachine::begin(Track::Gated);
        record.stage = begin.to;
        record.status = RunStatus::Pending;
        self.store.save(&record).await?;
        info!(
            run_id = %record.run_id,
            features = record.feature_brief.features.len(),
            "run created"
        );
        Ok(record)
    }

    // -- express track ------------------------------------------------------

    /// Phase one of the express track: builds a brief from `text`, generates
    /// the PRD and stops for review with `status = awaiting_prd_review`.
    ///
    /// The initial record is persisted before generation, so a crash leaves
    /// evidence of the attempt.
    #[instrument(skip_all)]
    pub async fn run_phase_one(&self, text: &str) -> Result<RunRecord, OrchestratorError> {
        let brief = intake::direct_input_brief(text)?;
        let mut record = RunRecord::new(brief, Track::Express);
        record.status = RunStatus::InProgress;
        self.store.save(&record).await?;

        let _guard = self.locks.acquire(record.run_id).await;
        info!(run_id = %record.run_id, "phase one: generating PRD");
        let record = self
            .execute(record, GateMachine::begin(Track::Express))
            .await?;
        info!(
            run_id = %record.run_id,
            status = %record.status,
            "phase one finished, awaiting PRD review"
        );
        Ok(record)
    }

    /// Phase two of the express track: records a gate3 approval by the
    /// default approver and runs prototype generation and adaptation.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn approve_and_continue(
        &self,
        run_id: RunId,
    ) -> Result<RunRecord, OrchestratorError> {
        let _guard = self.locks.acquire(run_id).await;
        let record = self.load(run_id).await?;
        if record.status != RunStatus::AwaitingPrdReview {
            return Err(OrchestratorError::precondition(
                run_id,
                format!("run is not awaiting PRD review (status: {})", record.status),
            ));
        }
        let approval = GateApproval::new(Gate::PrdApproval, self.config.default_approver.clone());
        self.approve_locked(record, approval).await
    }

    // -- gated track --------------------------------------------------------

    /// Approves a gate and runs the processing stages that follow it.
    ///
    /// Approving a gate the run has already passed appends to the ledger but
    /// re-runs nothing. Approving a gate the run has not reached is a
    /// precondition failure.
    #[instrument(skip_all, fields(run_id = %run_id, gate = %approval.gate))]
    pub async fn approve_gate(
        &self,
        run_id: RunId,
        approval: GateApproval,
    ) -> Result<RunRecord, OrchestratorError> {
        let _guard = self.locks.acquire(run_id).await;
        let record = self.load(run_id).await?;
        self.approve_locked(record, approval).await
    }

    async fn approve_locked(
        &self,
        mut record: RunRecord,
        approval: GateApproval,
    ) -> Result<RunRecord, OrchestratorError> {
        let run_id = record.run_id;
        let GateApproval {
            gate,
            approver,
            comments,
            selected_features,
        } = approval;

        if record.status.is_terminal() {
            return Err(OrchestratorError::precondition(
                run_id,
                format!("run is {}", record.status),
            ));
        }
        let decision =
            GateMachine::on_approval(record.stage, record.track, gate, &record.approvals)
                .map_err(|e| OrchestratorError::precondition(run_id, e.to_string()))?;

        let selects_features =
            gate == Gate::FeatureSelect && matches!(decision, GateDecision::Advance(_));
        if !selected_features.is_empty() && !selects_features {
            return Err(OrchestratorError::validation(
                "feature selection is only accepted when approving gate1",
            ));
        }

        match decision {
            GateDecision::ReApproval => {
                warn!(
                    run_id = %run_id,
                    gate = %gate,
                    stage = %record.stage,
                    "gate already approved, recording re-approval only"
                );
                record.record_approval(gate, approver, comments);
                self.store.save(&record).await?;
                Ok(record)
            }
            GateDecision::Advance(transition) => {
                if let Some(field) = missing_for_gate(&record, gate) {
                    return Err(OrchestratorError::precondition(
                        run_id,
                        format!("{gate} requires '{field}'"),
                    ));
                }
                if gate == Gate::FeatureSelect {
                    record.feature_brief =
                        intake::select_features(&record.feature_brief, &selected_features)?;
                }
                record.record_approval(gate, approver.clone(), comments);
                info!(run_id = %run_id, gate = %gate, approver = %approver, "gate approved");
                self.execute(record, transition).await
            }
        }
    }

    /// Runs the processing stages of `transition` and persists the outcome.
    async fn execute(
        &self,
        record: RunRecord,
        transition: Transition,
    ) -> Result<RunRecord, OrchestratorError> {
        let run_id = record.run_id;
        let mut runner = PipelineRunner::new();
        for stage in &transition.processing {
            let step = self.step_for(*stage).ok_or_else(|| {
                OrchestratorError::validation(format!("no step handles stage '{stage}'"))
            })?;
            runner.append(step);
        }

        match runner.run(record).await {
            Ok(mut next) => {
                next.stage = transition.to;
                next.status = GateMachine::status_for(next.stage, next.track);
                next.touch();
                self.store.save(&next).await?;
                info!(
                    run_id = %run_id,
                    stage = %next.stage,
                    status = %next.status,
                    "transition complete"
                );
                Ok(next)
            }
            Err(PipelineError::Validation { step, field }) => Err(OrchestratorError::validation(
                format!("step '{step}' requires '{field}'"),
            )),
            Err(PipelineError::StepFailed {
                step,
                index,
                message,
                record,
                source,
            }) => {
                let mut failed = *record;
                let stage = transition
                    .processing
                    .get(index)
                    .copied()
                    .unwrap_or(transition.from);
                failed.stage = GateState::Failed;
                failed.status = RunStatus::Failed;
                failed.failure = Some(RunFailure {
                    step: step.clone(),
                    stage,
                    message: message.clone(),
                    at: Timestamp::now(),
                });
                failed.touch();
                self.store.save(&failed).await?;
                Err(OrchestratorError::StepExecution {
                    run_id,
                    step,
                    message,
                    source,
                })
            }
        }
    }

    /// The step that runs during a processing stage.
    fn step_for(&self, stage: GateState) -> Option<Arc<dyn PipelineStep>> {
        let step: Arc<dyn PipelineStep> = match stage {
            GateState::CleanRoom => {
                Arc::new(CleanRoomStep::new(Arc::clone(&self.config.clean_room)))
            }
            GateState::Enrichment => Arc::new(EnrichmentStep::new(Arc::clone(
                &self.adapters.context_enricher,
            ))),
            GateState::PrdGeneration => Arc::new(PrdGenerationStep::new(Arc::clone(
                &self.adapters.prd_generator,
            ))),
            GateState::FixtureGeneration => Arc::new(FixtureGenerationStep),
            GateState::PrototypeGeneration => Arc::new(PrototypeGenerationStep::new(
                Arc::clone(&self.adapters.prototype_generator),
                Arc::clone(&self.artifacts),
            )),
            GateState::Adaptation => Arc::new(AdaptationStep::new(Arc::clone(
                &self.adapters.prototype_adapter,
            ))),
            GateState::PushDownstream => Arc::new(PushDownstreamStep::new(Arc::clone(
                &self.adapters.downstream_pusher,
            ))),
            _ => return None,
        };
        Some(step)
    }

    // -- queries and manual correction --------------------------------------

    pub async fn get_run(&self, run_id: RunId) -> Result<RunRecord, OrchestratorError> {
        self.load(run_id).await
    }

    /// All readable runs, newest first.
    pub async fn list_runs(&self) -> Result<Vec<RunRecord>, OrchestratorError> {
        let mut runs = self.store.list().await?;
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    /// Merges caller-supplied content fields into a run.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn update_run_fields(
        &self,
        run_id: RunId,
        patch: RunPatch,
    ) -> Result<RunRecord, OrchestratorError> {
        let _guard = self.locks.acquire(run_id).await;
        let mut record = self.load(run_id).await?;
        if record.status.is_terminal() {
            return Err(OrchestratorError::precondition(
                run_id,
                format!("run is {} and can no longer be edited", record.status),
            ));
        }
        record.apply_patch(patch);
        record
            .validate()
            .map_err(|e| OrchestratorError::validation(e.to_string()))?;
        self.store.save(&record).await?;
        info!(run_id = %run_id, "run fields updated");
        Ok(record)
    }

    async fn load(&self, run_id: RunId) -> Result<RunRecord, OrchestratorError> {
        self.store
            .get(&run_id)
            .await?
            .ok_or(OrchestratorError::NotFound { run_id })
    }
}

/// First field `gate` needs that the record lacks.
fn missing_for_gate(record: &RunRecord, gate: Gate) -> Option<RecordField> {
    let required: &[RecordField] = match gate {
        Gate::ContextApproval => &[RecordField::ContextPacket],
        Gate::PrdApproval => &[RecordField::Prd, RecordField::UiContract],
        Gate::DemoReview => &[RecordField::AdaptedOutput],
        Gate::Consent | Gate::FeatureSelect | Gate::FinalApproval => &[],
    };
    required.iter().copied().find(|f| !record.has(*f))
}
