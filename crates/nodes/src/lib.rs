//! Demoflow pipeline steps and the orchestrator service.
//!
//! This crate provides one [`PipelineStep`](pipeline::PipelineStep) per
//! processing stage of the gate state machine, deterministic mock
//! implementations of every capability, the intake parsers that turn operator
//! input into feature briefs, and the [`OrchestratorService`] façade that ties
//! them to a run store.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Steps and the service sequence calls between
//! business logic in the [`pipeline`] crate and the capability and store
//! ports. Transition rules live in [`pipeline::GateMachine`]; nothing here
//! re-implements them.

pub mod clean_room;
pub mod fixtures;
pub mod intake;
pub mod mock;
pub mod service;
pub mod steps;

pub use clean_room::CleanRoom;
pub use intake::IntakeError;
pub use mock::{mock_adapters, ReviewHandoffAdapter};
pub use service::{GateApproval, OrchestratorService, ServiceConfig};
