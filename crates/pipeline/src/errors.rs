//! Error types for the Demoflow pipeline domain.
//!
//! The taxonomy, from the inside out:
//!
//! | Type | Raised by | Persisted? |
//! |------|-----------|------------|
//! | [`CapabilityError`] | an adapter (transport / auth / parse failure) | no |
//! | [`StepError`] | a pipeline step | via [`PipelineError::StepFailed`] |
//! | [`PipelineError`] | the runner | failed record is persisted by the orchestrator |
//! | [`StoreError`] | a run store or artifact sink | no |
//! | [`OrchestratorError`] | the service façade | only `StepExecution` leaves a persisted trace |
//!
//! Validation and precondition errors never reach persistence. Step execution
//! errors are persisted (so operators can see where a run died) and then
//! returned to the caller.

use thiserror::Error;

use crate::capabilities::Capability;
use crate::{RecordField, RunId, RunRecord};

// ---------------------------------------------------------------------------
// Adapter-level errors
// ---------------------------------------------------------------------------

/// Failure of an external capability.
///
/// The engine treats every variant the same way ("capability unavailable");
/// the distinction exists for logs and for the resilient wrapper's warning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// Network or connection failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Credentials missing or rejected (HTTP 401/403).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The service answered with something that could not be decoded.
    #[error("malformed response: {0}")]
    Parse(String),

    /// The service reported itself unavailable (rate limit, 5xx).
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Failure of a [`crate::RunStore`] or [`crate::ArtifactSink`].
///
/// Always scoped to one record: a store never lets one broken entry poison
/// another.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialise run {run_id}: {source}")]
    Serialize {
        run_id: RunId,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid artifact name '{0}'")]
    InvalidArtifactName(String),

    #[error("background store task failed: {0}")]
    Task(String),
}

// ---------------------------------------------------------------------------
// Step and pipeline errors
// ---------------------------------------------------------------------------

/// Why a step failed.
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error("required input '{0}' is missing")]
    MissingInput(RecordField),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("artifact could not be written: {0}")]
    Artifact(#[from] StoreError),
}

/// A pipeline step failed.
#[derive(Debug, Error)]
#[error("step '{step}' failed: {cause}")]
pub struct StepError {
    pub step: String,
    #[source]
    pub cause: StepFailure,
}

impl StepError {
    pub fn new(step: impl Into<String>, cause: impl Into<StepFailure>) -> Self {
        Self {
            step: step.into(),
            cause: cause.into(),
        }
    }

    /// Shorthand for a missing required input.
    pub fn missing(step: impl Into<String>, field: RecordField) -> Self {
        Self::new(step, StepFailure::MissingInput(field))
    }
}

/// A pipeline run did not complete.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Pre-flight check failed; no step ran and the record is untouched.
    #[error("step '{step}' requires '{field}', which no earlier step provides")]
    Validation { step: String, field: RecordField },

    /// A step failed; later steps never ran.
    ///
    /// `record` is the snapshot handed to the failing step, with
    /// `status = failed` and a fresh `updated_at`.
    #[error("pipeline failed at step \"{step}\": {message}")]
    StepFailed {
        step: String,
        index: usize,
        message: String,
        record: Box<RunRecord>,
        #[source]
        source: StepError,
    },
}

impl PipelineError {
    /// Name of the step the error refers to.
    pub fn step(&self) -> &str {
        match self {
            PipelineError::Validation { step, .. } | PipelineError::StepFailed { step, .. } => step,
        }
    }
}

// ---------------------------------------------------------------------------
// Service-level errors
// ---------------------------------------------------------------------------

/// Errors returned by the orchestrator façade.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("run {run_id} not found")]
    NotFound { run_id: RunId },

    /// Missing or invalid input. Nothing was persisted.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// Operation not allowed in the run's current state. Nothing was persisted.
    #[error("precondition failed for run {run_id}: {reason}")]
    Precondition { run_id: RunId, reason: String },

    /// A step failed after fallback. The run was persisted with `status = failed`.
    #[error("run {run_id} failed at step \"{step}\": {message}")]
    StepExecution {
        run_id: RunId,
        step: String,
        message: String,
        #[source]
        source: StepError,
    },

    /// An intake capability failed after fallback. Nothing was persisted.
    #[error("{capability} unavailable: {source}")]
    CapabilityUnavailable {
        capability: Capability,
        #[source]
        source: CapabilityError,
    },

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl OrchestratorError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn precondition(run_id: RunId, reason: impl Into<String>) -> Self {
        Self::Precondition {
            run_id,
            reason: reason.into(),
        }
    }
}
