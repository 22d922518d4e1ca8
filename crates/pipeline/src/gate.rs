//! Gate state machine.
//!
//! The single authority for where a run is in the workflow. Gate states only
//! advance on an explicit approval; processing states advance when their step
//! succeeds; any step failure moves the run to [`GateState::Failed`].
//!
//! The machine itself is pure: it answers "what happens if gate N is approved
//! now" with a [`Transition`] and leaves executing the processing steps to the
//! orchestrator.
//!
//! ## Tracks
//!
//! [`Track::Gated`]:
//!
//! ```text
//! idle → gate0 → gate1 → clean_room → enrichment → gate2 → prd_generation → gate3
//!      → fixture_generation → prototype_generation → adaptation → gate4
//!      → push_downstream → gate5 → completed
//! ```
//!
//! [`Track::Express`]:
//!
//! ```text
//! idle → prd_generation → gate3 → prototype_generation → adaptation → completed
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{Approval, RunStatus};

// ---------------------------------------------------------------------------
// Gates
// ---------------------------------------------------------------------------

/// A mandatory human-approval checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Gate {
    /// Consent to process the meeting content.
    #[serde(rename = "gate0")]
    Consent,
    /// Selection of the features to carry forward.
    #[serde(rename = "gate1")]
    FeatureSelect,
    /// Approval of the enriched context packet.
    #[serde(rename = "gate2")]
    ContextApproval,
    /// Approval of the generated PRD.
    #[serde(rename = "gate3")]
    PrdApproval,
    /// Review of the generated demo.
    #[serde(rename = "gate4")]
    DemoReview,
    /// Final sign-off after the downstream push.
    #[serde(rename = "gate5")]
    FinalApproval,
}

impl Gate {
    /// All gates in workflow order.
    pub const ALL: [Gate; 6] = [
        Gate::Consent,
        Gate::FeatureSelect,
        Gate::ContextApproval,
        Gate::PrdApproval,
        Gate::DemoReview,
        Gate::FinalApproval,
    ];

    /// Short wire name (`gate0` .. `gate5`).
    pub fn as_str(self) -> &'static str {
        match self {
            Gate::Consent => "gate0",
            Gate::FeatureSelect => "gate1",
            Gate::ContextApproval => "gate2",
            Gate::PrdApproval => "gate3",
            Gate::DemoReview => "gate4",
            Gate::FinalApproval => "gate5",
        }
    }

    /// The state a run waits in until this gate is approved.
    pub fn state(self) -> GateState {
        match self {
            Gate::Consent => GateState::Gate0Consent,
            Gate::FeatureSelect => GateState::Gate1FeatureSelect,
            Gate::ContextApproval => GateState::Gate2ContextApproval,
            Gate::PrdApproval => GateState::Gate3PrdApproval,
            Gate::DemoReview => GateState::Gate4DemoReview,
            Gate::FinalApproval => GateState::Gate5FinalApproval,
        }
    }
}

impl std::fmt::Display for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown gate '{0}' (expected gate0..gate5)")]
pub struct UnknownGate(pub String);

impl FromStr for Gate {
    type Err = UnknownGate;

    /// Accepts `gate2`, `2`, or the full state name such as
    /// `gate2_context_approval`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let short = normalized.split('_').next().unwrap_or_default();
        let short = short.strip_prefix("gate").unwrap_or(short);
        Gate::ALL
            .into_iter()
            .find(|g| g.as_str().strip_prefix("gate") == Some(short))
            .ok_or_else(|| UnknownGate(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Every stage a run can be in. Declaration order is workflow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    #[default]
    Idle,
    Gate0Consent,
    Gate1FeatureSelect,
    CleanRoom,
    Enrichment,
    Gate2ContextApproval,
    PrdGeneration,
    Gate3PrdApproval,
    FixtureGeneration,
    PrototypeGeneration,
    Adaptation,
    Gate4DemoReview,
    PushDownstream,
    Gate5FinalApproval,
    Completed,
    Failed,
}

impl GateState {
    /// Wire name, identical to the serialised form.
    pub fn as_str(self) -> &'static str {
        match self {
            GateState::Idle => "idle",
            GateState::Gate0Consent => "gate0_consent",
            GateState::Gate1FeatureSelect => "gate1_feature_select",
            GateState::CleanRoom => "clean_room",
            GateState::Enrichment => "enrichment",
            GateState::Gate2ContextApproval => "gate2_context_approval",
            GateState::PrdGeneration => "prd_generation",
            GateState::Gate3PrdApproval => "gate3_prd_approval",
            GateState::FixtureGeneration => "fixture_generation",
            GateState::PrototypeGeneration => "prototype_generation",
            GateState::Adaptation => "adaptation",
            GateState::Gate4DemoReview => "gate4_demo_review",
            GateState::PushDownstream => "push_downstream",
            GateState::Gate5FinalApproval => "gate5_final_approval",
            GateState::Completed => "completed",
            GateState::Failed => "failed",
        }
    }

    /// `true` for `completed` and `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, GateState::Completed | GateState::Failed)
    }

    /// The gate this state waits on, if it is a gate state.
    pub fn gate(self) -> Option<Gate> {
        Gate::ALL.into_iter().find(|g| g.state() == self)
    }

    /// `true` for states that run a pipeline step.
    pub fn is_processing(self) -> bool {
        matches!(
            self,
            GateState::CleanRoom
                | GateState::Enrichment
                | GateState::PrdGeneration
                | GateState::FixtureGeneration
                | GateState::PrototypeGeneration
                | GateState::Adaptation
                | GateState::PushDownstream
        )
    }

    fn ordinal(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for GateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which path through the machine a run follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    /// Full gate0..gate5 flow.
    #[default]
    Gated,
    /// Phase one (PRD) followed by a single approve-and-continue call.
    Express,
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// The effect of a trigger: which processing stages run, in order, and where
/// the run rests once they all succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: GateState,
    pub processing: Vec<GateState>,
    pub to: GateState,
}

/// What approving a gate means for a run right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The run is waiting on this gate: advance.
    Advance(Transition),
    /// The gate was already passed. The approval is recorded in the ledger but
    /// nothing is re-run.
    ReApproval,
}

/// A trigger the machine refuses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("run is in terminal stage '{stage}'")]
    Terminal { stage: GateState },

    #[error("{gate} cannot be approved while the run is at '{stage}'")]
    OutOfOrder { gate: Gate, stage: GateState },
}

/// Transition rules. Stateless; the current stage lives on the run record.
#[derive(Debug, Clone, Copy, Default)]
pub struct GateMachine;

impl GateMachine {
    /// Transition fired by creating a run on `track`.
    pub fn begin(track: Track) -> Transition {
        match track {
            Track::Gated => Transition {
                from: GateState::Idle,
                processing: Vec::new(),
                to: GateState::Gate0Consent,
            },
            Track::Express => Transition {
                from: GateState::Idle,
                processing: vec![GateState::PrdGeneration],
                to: GateState::Gate3PrdApproval,
            },
        }
    }

    /// Decides what approving `gate` does for a run at `stage`.
    ///
    /// `ledger` is the run's approval history, used to tell a re-approval of a
    /// passed gate from an attempt to skip ahead.
    pub fn on_approval(
        stage: GateState,
        track: Track,
        gate: Gate,
        ledger: &[Approval],
    ) -> Result<GateDecision, GateError> {
        if stage.is_terminal() {
            return Err(GateError::Terminal { stage });
        }
        if stage == gate.state() {
            return Ok(GateDecision::Advance(Self::after_gate(gate, track)));
        }
        let already_approved = ledger.iter().any(|a| a.gate == gate);
        if already_approved && stage.ordinal() > gate.state().ordinal() {
            return Ok(GateDecision::ReApproval);
        }
        Err(GateError::OutOfOrder { gate, stage })
    }

    /// Processing stages and resting stage after `gate` is approved.
    pub fn after_gate(gate: Gate, track: Track) -> Transition {
        use GateState::*;
        let (processing, to) = match (track, gate) {
            (_, Gate::Consent) => (vec![], Gate1FeatureSelect),
            (_, Gate::FeatureSelect) => (vec![CleanRoom, Enrichment], Gate2ContextApproval),
            (_, Gate::ContextApproval) => (vec![PrdGeneration], Gate3PrdApproval),
            (Track::Gated, Gate::PrdApproval) => (
                vec![FixtureGeneration, PrototypeGeneration, Adaptation],
                Gate4DemoReview,
            ),
            (Track::Express, Gate::PrdApproval) => {
                (vec![PrototypeGeneration, Adaptation], Completed)
            }
            (_, Gate::DemoReview) => (vec![PushDownstream], Gate5FinalApproval),
            (_, Gate::FinalApproval) => (vec![], Completed),
        };
        Transition {
            from: gate.state(),
            processing,
            to,
        }
    }

    /// Run status implied by resting at `stage`.
    pub fn status_for(stage: GateState, track: Track) -> RunStatus {
        match (stage, track) {
            (GateState::Completed, _) => RunStatus::Completed,
            (GateState::Failed, _) => RunStatus::Failed,
            (GateState::Idle | GateState::Gate0Consent, _) => RunStatus::Pending,
            (GateState::Gate3PrdApproval, Track::Express) => RunStatus::AwaitingPrdReview,
            _ => RunStatus::InProgress,
        }
    }
}
