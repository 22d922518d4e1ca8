//! End-to-end orchestrator scenarios against a filesystem store in a scratch
//! directory, with mock capabilities and hand-written failing doubles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use nodes::mock::MockPrdGenerator;
use nodes::{mock_adapters, CleanRoom, GateApproval, OrchestratorService, ServiceConfig};
use pipeline::{
    Adapters, ApproverId, Capability, CapabilityError, ContextPacket, FeatureBrief,
    FeatureRequest, Gate, GateState, GeneratedPrd, MeetingRef, MeetingSource, OrchestratorError,
    PrdGenerator, Priority, PrototypeGenerator, Resilient, RunId, RunPatch, RunRecord, RunStatus,
    RunStore, Timestamp, Track, UiContract,
};
use store::FsRunStore;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    _dir: TempDir,
    store: Arc<FsRunStore>,
    service: OrchestratorService,
}

fn harness(adapters: Adapters) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FsRunStore::new(dir.path().join("runs")));
    let service = OrchestratorService::new(
        store.clone(),
        store.clone(),
        adapters,
        ServiceConfig {
            default_approver: approver("reviewer"),
            clean_room: Arc::new(CleanRoom::standard().unwrap()),
        },
    );
    Harness {
        _dir: dir,
        store,
        service,
    }
}

fn approver(name: &str) -> ApproverId {
    ApproverId::new(name).unwrap()
}

fn approve(gate: Gate) -> GateApproval {
    GateApproval::new(gate, approver("dana"))
}

/// PRD generator that counts calls and delegates to the mock.
#[derive(Default)]
struct CountingPrd {
    calls: AtomicUsize,
}

#[async_trait]
impl PrdGenerator for CountingPrd {
    async fn generate_prd(&self, context: &ContextPacket) -> Result<GeneratedPrd, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        MockPrdGenerator.generate_prd(context).await
    }
}

/// PRD generator whose credentials are always rejected.
#[derive(Default)]
struct RejectedPrd {
    calls: AtomicUsize,
}

#[async_trait]
impl PrdGenerator for RejectedPrd {
    async fn generate_prd(
        &self,
        _context: &ContextPacket,
    ) -> Result<GeneratedPrd, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CapabilityError::Auth("401 Unauthorized".into()))
    }
}

struct DownPrototype;

#[async_trait]
impl PrototypeGenerator for DownPrototype {
    async fn generate_prototype(
        &self,
        _ui_contract: &UiContract,
        _fixtures: &str,
    ) -> Result<String, CapabilityError> {
        Err(CapabilityError::Unavailable("503 Service Unavailable".into()))
    }
}

struct DownMeetings;

#[async_trait]
impl MeetingSource for DownMeetings {
    async fn get_feature_brief(
        &self,
        _meeting: &MeetingRef,
    ) -> Result<FeatureBrief, CapabilityError> {
        Err(CapabilityError::Transport("connection refused".into()))
    }
}

async fn walk_to(h: &Harness, run_id: RunId, through: Gate) -> RunRecord {
    let mut last = None;
    for gate in Gate::ALL.into_iter().take_while(|g| *g <= through) {
        last = Some(h.service.approve_gate(run_id, approve(gate)).await.unwrap());
    }
    last.unwrap()
}

// ---------------------------------------------------------------------------
// Express track
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dark_mode_request_runs_through_both_phases() {
    let h = harness(mock_adapters());

    let phase_one = h.service.run_phase_one("Add dark mode toggle").await.unwrap();
    assert_eq!(phase_one.status, RunStatus::AwaitingPrdReview);
    assert_eq!(phase_one.stage, GateState::Gate3PrdApproval);
    assert_eq!(phase_one.track, Track::Express);
    assert_eq!(phase_one.feature_brief.meeting_id, "direct-input");
    assert!(!phase_one.prd.as_ref().unwrap().title.is_empty());
    assert_eq!(
        h.store.get(&phase_one.run_id).await.unwrap().as_ref(),
        Some(&phase_one)
    );

    let done = h.service.approve_and_continue(phase_one.run_id).await.unwrap();
    assert_eq!(done.status, RunStatus::Completed);
    assert_eq!(done.stage, GateState::Completed);
    assert!(!done.adapted_output.as_deref().unwrap_or_default().is_empty());
    assert_eq!(done.approvals.len(), 1);
    assert_eq!(done.approvals[0].gate, Gate::PrdApproval);
    assert_eq!(done.approvals[0].approver.as_str(), "reviewer");

    let artifact = h
        .store
        .root()
        .join(done.run_id.to_string())
        .join("artifacts")
        .join("prototype.tsx");
    assert_eq!(
        std::fs::read_to_string(artifact).unwrap(),
        done.prototype_output.clone().unwrap()
    );
}

#[tokio::test]
async fn approve_and_continue_requires_prd_review() {
    let h = harness(mock_adapters());
    let run = h.service.start_manual_run("Dark mode", "toggle").await.unwrap();

    let err = h.service.approve_and_continue(run.run_id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Precondition { .. }), "{err:?}");

    let done = {
        let p1 = h.service.run_phase_one("Export CSV").await.unwrap();
        h.service.approve_and_continue(p1.run_id).await.unwrap()
    };
    let err = h.service.approve_and_continue(done.run_id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Precondition { .. }), "{err:?}");
}

#[tokio::test]
async fn empty_phase_one_text_is_rejected_without_persisting() {
    let h = harness(mock_adapters());
    let err = h.service.run_phase_one("   ").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation { .. }));
    assert!(h.service.list_runs().await.unwrap().is_empty());
}

#[tokio::test]
async fn rejected_prd_credentials_fall_back_to_mock() {
    let primary = Arc::new(RejectedPrd::default());
    let resilient = Arc::new(Resilient::<dyn PrdGenerator>::new(
        Capability::PrdGeneration,
        primary.clone(),
        Arc::new(MockPrdGenerator),
    ));
    let mut adapters = mock_adapters();
    adapters.prd_generator = resilient.clone();
    let h = harness(adapters);

    let run = h.service.run_phase_one("Add dark mode toggle").await.unwrap();

    assert_eq!(run.status, RunStatus::AwaitingPrdReview);
    assert!(run.prd.unwrap().title.starts_with("PRD: "));
    assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    assert_eq!(resilient.fallback_count(), 1);
}

// ---------------------------------------------------------------------------
// Gated track
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_gated_walk_completes_with_six_approvals() {
    let h = harness(mock_adapters());
    let run = h.service.start_manual_run("Dark mode", "toggle").await.unwrap();
    assert_eq!(run.status, RunStatus::Pending);
    assert_eq!(run.stage, GateState::Gate0Consent);

    let at_gate1 = h.service.approve_gate(run.run_id, approve(Gate::Consent)).await.unwrap();
    assert_eq!(at_gate1.stage, GateState::Gate1FeatureSelect);
    assert_eq!(at_gate1.status, RunStatus::InProgress);

    let at_gate2 = h
        .service
        .approve_gate(run.run_id, approve(Gate::FeatureSelect))
        .await
        .unwrap();
    assert_eq!(at_gate2.stage, GateState::Gate2ContextApproval);
    assert!(at_gate2.context_packet.is_some());

    let done = walk_to_from(&h, run.run_id, Gate::ContextApproval).await;

    assert_eq!(done.status, RunStatus::Completed);
    assert_eq!(done.stage, GateState::Completed);
    assert_eq!(done.approvals.len(), 6);
    let gates: Vec<Gate> = done.approvals.iter().map(|a| a.gate).collect();
    assert_eq!(gates, Gate::ALL.to_vec());
    assert!(done.context_packet.is_some());
    assert!(done.prd.is_some());
    assert!(done.ui_contract.is_some());
    assert!(done.fixtures.is_some());
    assert!(done.prototype_output.is_some());
    assert!(done.adapted_output.is_some());
    assert!(done.updated_at >= done.created_at);
    assert_eq!(h.service.get_run(run.run_id).await.unwrap(), done);
}

async fn walk_to_from(h: &Harness, run_id: RunId, from: Gate) -> RunRecord {
    let mut last = None;
    for gate in Gate::ALL.into_iter().skip_while(|g| *g < from) {
        last = Some(h.service.approve_gate(run_id, approve(gate)).await.unwrap());
    }
    last.unwrap()
}

#[tokio::test]
async fn gate2_without_context_is_a_precondition_failure() {
    let h = harness(mock_adapters());
    let mut record = RunRecord::new(
        FeatureBrief {
            meeting_id: "manual".into(),
            meeting_date: Timestamp::now(),
            context: "ctx".into(),
            features: vec![FeatureRequest {
                id: "f1".into(),
                title: "Dark mode".into(),
                description: "toggle".into(),
                priority: Priority::Medium,
            }],
            supporting_quotes: vec![],
        },
        Track::Gated,
    );
    record.stage = GateState::Gate2ContextApproval;
    record.status = RunStatus::InProgress;
    h.store.save(&record).await.unwrap();

    let err = h
        .service
        .approve_gate(record.run_id, approve(Gate::ContextApproval))
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Precondition { .. }), "{err:?}");
    assert_eq!(h.store.get(&record.run_id).await.unwrap(), Some(record));
}

#[tokio::test]
async fn skipping_ahead_is_rejected_and_changes_nothing() {
    let h = harness(mock_adapters());
    let run = h.service.start_manual_run("Dark mode", "toggle").await.unwrap();

    let err = h
        .service
        .approve_gate(run.run_id, approve(Gate::PrdApproval))
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Precondition { .. }), "{err:?}");
    assert_eq!(h.store.get(&run.run_id).await.unwrap(), Some(run));
}

#[tokio::test]
async fn duplicate_approval_is_recorded_but_never_reruns_steps() {
    let prd = Arc::new(CountingPrd::default());
    let mut adapters = mock_adapters();
    adapters.prd_generator = prd.clone();
    let h = harness(adapters);
    let run = h.service.start_manual_run("Dark mode", "toggle").await.unwrap();

    let at_gate3 = walk_to(&h, run.run_id, Gate::ContextApproval).await;
    assert_eq!(at_gate3.stage, GateState::Gate3PrdApproval);
    assert_eq!(prd.calls.load(Ordering::SeqCst), 1);

    let again = h
        .service
        .approve_gate(
            run.run_id,
            approve(Gate::ContextApproval).with_comments("looked again"),
        )
        .await
        .unwrap();

    assert_eq!(prd.calls.load(Ordering::SeqCst), 1);
    assert_eq!(again.stage, GateState::Gate3PrdApproval);
    assert_eq!(again.prd, at_gate3.prd);
    assert_eq!(again.approvals.len(), at_gate3.approvals.len() + 1);
    assert_eq!(again.approvals_for(Gate::ContextApproval), 2);
    assert_eq!(
        again.approvals.last().unwrap().comments.as_deref(),
        Some("looked again")
    );
    assert_eq!(h.store.get(&run.run_id).await.unwrap(), Some(again));
}

#[tokio::test]
async fn step_failure_persists_failed_run_and_stops() {
    let mut adapters = mock_adapters();
    adapters.prototype_generator = Arc::new(DownPrototype);
    let h = harness(adapters);
    let run = h.service.start_manual_run("Dark mode", "toggle").await.unwrap();
    walk_to(&h, run.run_id, Gate::ContextApproval).await;

    let err = h
        .service
        .approve_gate(run.run_id, approve(Gate::PrdApproval))
        .await
        .unwrap_err();

    match &err {
        OrchestratorError::StepExecution { step, .. } => assert_eq!(step, "prototype_generation"),
        other => panic!("unexpected error: {other:?}"),
    }
    let stored = h.store.get(&run.run_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
    assert_eq!(stored.stage, GateState::Failed);
    let failure = stored.failure.clone().unwrap();
    assert_eq!(failure.step, "prototype_generation");
    assert_eq!(failure.stage, GateState::PrototypeGeneration);
    assert!(stored.fixtures.is_some(), "fixture step ran before the failure");
    assert!(stored.adapted_output.is_none(), "adaptation must not run");
    assert_eq!(stored.approvals_for(Gate::PrdApproval), 1);

    let err = h
        .service
        .approve_gate(run.run_id, approve(Gate::PrdApproval))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Precondition { .. }));
}

#[tokio::test]
async fn gate1_selection_keeps_chosen_features_in_order() {
    let h = harness(mock_adapters());
    let run = h
        .service
        .start_run_from_json(
            r#"{"features": [{"title": "A"}, {"title": "B"}, {"title": "C"}]}"#,
        )
        .await
        .unwrap();
    h.service.approve_gate(run.run_id, approve(Gate::Consent)).await.unwrap();

    let err = h
        .service
        .approve_gate(run.run_id, approve(Gate::FeatureSelect).with_selection(vec![0, 7]))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation { .. }));
    assert_eq!(
        h.store.get(&run.run_id).await.unwrap().unwrap().stage,
        GateState::Gate1FeatureSelect
    );

    let at_gate2 = h
        .service
        .approve_gate(run.run_id, approve(Gate::FeatureSelect).with_selection(vec![2, 0]))
        .await
        .unwrap();
    let titles: Vec<&str> = at_gate2
        .feature_brief
        .features
        .iter()
        .map(|f| f.title.as_str())
        .collect();
    assert_eq!(titles, vec!["C", "A"]);
}

#[tokio::test]
async fn selection_outside_gate1_is_rejected() {
    let h = harness(mock_adapters());
    let run = h.service.start_manual_run("Dark mode", "toggle").await.unwrap();
    let err = h
        .service
        .approve_gate(run.run_id, approve(Gate::Consent).with_selection(vec![0]))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation { .. }));
}

#[tokio::test]
async fn clean_room_redacts_before_enrichment() {
    let h = harness(mock_adapters());
    let run = h
        .service
        .start_manual_run("Call 555-123-4567", "mail ops@example.com")
        .await
        .unwrap();
    let at_gate2 = walk_to(&h, run.run_id, Gate::FeatureSelect).await;
    let feature = &at_gate2.feature_brief.features[0];
    assert_eq!(feature.title, "Call [REDACTED]");
    assert_eq!(feature.description, "mail [REDACTED]");
}

// ---------------------------------------------------------------------------
// Intake, queries, manual correction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn text_intake_formats_and_enriches() {
    let h = harness(mock_adapters());
    let run = h.service.start_run_from_text("We need dark mode").await.unwrap();
    assert_eq!(run.status, RunStatus::Pending);
    assert!(run.context_packet.is_some());
    assert_eq!(run.feature_brief.meeting_id, "mock-text");
}

#[tokio::test]
async fn meeting_source_failure_is_capability_unavailable() {
    let mut adapters = mock_adapters();
    adapters.meeting_source = Arc::new(DownMeetings);
    let h = harness(adapters);

    let err = h
        .service
        .start_run_from_meeting(&MeetingRef::new("m-42").unwrap())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::CapabilityUnavailable {
            capability: Capability::MeetingSource,
            ..
        }
    ));
    assert!(h.service.list_runs().await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_json_intake_is_a_validation_error() {
    let h = harness(mock_adapters());
    let err = h.service.start_run_from_json("{oops").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation { .. }));
    assert!(h.service.list_runs().await.unwrap().is_empty());
}

#[tokio::test]
async fn list_runs_is_newest_first() {
    let h = harness(mock_adapters());
    let first = h.service.start_manual_run("First", "").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = h
        .service
        .start_run_from_meeting(&MeetingRef::new("m-1").unwrap())
        .await
        .unwrap();

    let ids: Vec<RunId> = h
        .service
        .list_runs()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.run_id)
        .collect();
    assert_eq!(ids, vec![second.run_id, first.run_id]);
}

#[tokio::test]
async fn unknown_run_is_not_found() {
    let h = harness(mock_adapters());
    let err = h.service.get_run(RunId::new_random()).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound { .. }));
}

#[tokio::test]
async fn update_merges_content_and_refuses_terminal_runs() {
    let h = harness(mock_adapters());
    let run = h.service.run_phase_one("Add dark mode toggle").await.unwrap();

    let patched = h
        .service
        .update_run_fields(
            run.run_id,
            RunPatch {
                fixtures: Some("export const fixtures = { custom: [] };".into()),
                ..RunPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        patched.fixtures.as_deref(),
        Some("export const fixtures = { custom: [] };")
    );
    assert_eq!(patched.prd, run.prd);
    assert!(patched.updated_at >= run.updated_at);

    // The edited fixtures feed phase two.
    let done = h.service.approve_and_continue(run.run_id).await.unwrap();
    assert!(done
        .prototype_output
        .unwrap()
        .starts_with("export const fixtures = { custom: [] };"));

    let err = h
        .service
        .update_run_fields(run.run_id, RunPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Precondition { .. }));
}

#[tokio::test]
async fn concurrent_approvals_of_one_gate_advance_once() {
    let prd = Arc::new(CountingPrd::default());
    let mut adapters = mock_adapters();
    adapters.prd_generator = prd.clone();
    let h = Arc::new(harness(adapters));
    let run = h.service.start_manual_run("Dark mode", "toggle").await.unwrap();
    walk_to(&h, run.run_id, Gate::FeatureSelect).await;

    let a = {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            h.service
                .approve_gate(run.run_id, approve(Gate::ContextApproval))
                .await
        })
    };
    let b = {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            h.service
                .approve_gate(run.run_id, approve(Gate::ContextApproval))
                .await
        })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let stored = h.store.get(&run.run_id).await.unwrap().unwrap();
    assert_eq!(prd.calls.load(Ordering::SeqCst), 1);
    assert_eq!(stored.approvals_for(Gate::ContextApproval), 2);
    assert_eq!(stored.stage, GateState::Gate3PrdApproval);
}

