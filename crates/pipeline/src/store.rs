//! Persistence ports.
//!
//! The run store is the sole source of truth for run records; the orchestrator
//! keeps no cache of its own. Implementations live in infrastructure crates.

use async_trait::async_trait;

use crate::{ArtifactPath, RunId, RunRecord, StoreError};

/// Durable keyed storage for run records.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persists the full record keyed by its `run_id`, creating any needed
    /// containers. Last writer wins.
    async fn save(&self, record: &RunRecord) -> Result<(), StoreError>;

    /// Loads a record.
    ///
    /// Returns `Ok(None)` both when the record does not exist and when its
    /// payload fails schema validation; the latter is logged by the
    /// implementation. `Err` is reserved for storage that cannot be read at all.
    async fn get(&self, run_id: &RunId) -> Result<Option<RunRecord>, StoreError>;

    /// Loads every readable record, in no particular order.
    async fn list(&self) -> Result<Vec<RunRecord>, StoreError>;
}

/// Durable storage for artefacts a step produces as a side effect.
///
/// Writing the same `name` for the same run again overwrites the previous
/// content, so steps that write artefacts stay safe to repeat.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn write_artifact(
        &self,
        run_id: &RunId,
        name: &str,
        content: &str,
    ) -> Result<ArtifactPath, StoreError>;
}
