//! Core orchestration domain for Demoflow.
//!
//! This crate contains every domain concept of the gated pipeline: the run
//! record, the gate state machine, the sequential step runner, the capability
//! and persistence ports, and the cross-cutting error types. Infrastructure
//! crates implement the traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RunId`, `ApproverId`, `MeetingRef`, `ArtifactPath`) |
//! | [`types`] | Feature briefs, context packets, PRDs, UI contracts |
//! | [`record`] | The persisted [`RunRecord`], its status and approval ledger |
//! | [`gate`] | The [`GateMachine`] transition rules |
//! | [`runner`] | [`PipelineStep`] and the sequential [`PipelineRunner`] |
//! | [`capabilities`] | Capability ports and the injected [`Adapters`] map |
//! | [`resilient`] | One-shot primary/fallback wrapper for capabilities |
//! | [`store`] | [`RunStore`] and [`ArtifactSink`] persistence ports |
//! | [`errors`] | Error taxonomy from adapter to service |

pub mod capabilities;
pub mod errors;
pub mod gate;
pub mod identifiers;
pub mod record;
pub mod resilient;
pub mod runner;
pub mod store;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use capabilities::{
    Adapters, BriefFormatter, Capability, ContextEnricher, DownstreamPusher, MeetingSource,
    PrdGenerator, PrototypeAdapter, PrototypeGenerator,
};
pub use errors::{
    CapabilityError, OrchestratorError, PipelineError, StepError, StepFailure, StoreError,
};
pub use gate::{
    Gate, GateDecision, GateError, GateMachine, GateState, Track, Transition, UnknownGate,
};
pub use identifiers::{ApproverId, ArtifactPath, MeetingRef, RunId};
pub use record::{
    Approval, RecordField, RecordInvalid, RunFailure, RunPatch, RunRecord, RunStatus,
    SCHEMA_VERSION,
};
pub use resilient::Resilient;
pub use runner::{PipelineRunner, PipelineStep};
pub use store::{ArtifactSink, RunStore};
pub use types::{
    ContextPacket, Entity, EntityField, FeatureBrief, FeatureRequest, FieldKind, GeneratedPrd,
    Prd, Priority, Requirement, RequirementPriority, Screen, Timestamp, UiComponent, UiContract,
};
