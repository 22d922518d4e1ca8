//! Filesystem implementation of the Demoflow persistence ports.
//!
//! [`FsRunStore`] implements both [`RunStore`] and [`ArtifactSink`] over a
//! single root directory:
//!
//! ```text
//! <runs_dir>/
//!   <run_id>/
//!     run.json          pretty-printed RunRecord
//!     artifacts/
//!       prototype.tsx   artefacts written by steps
//! ```
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Implements the `pipeline` ports; adds no domain rules.
//!
//! Every write goes through a temp file in the target directory, is fsynced,
//! and is then renamed over the target, so a crash never leaves a torn file.
//! Reads treat a payload that fails schema validation as "not found" and log
//! it, so one corrupt record never hides the others.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipeline::{ArtifactPath, ArtifactSink, RunId, RunRecord, RunStore, StoreError};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// File name of the serialised record inside a run directory.
pub const RECORD_FILE: &str = "run.json";

/// Sub-directory of a run directory that holds artefacts.
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Run store rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsRunStore {
    root: PathBuf,
}

impl FsRunStore {
    /// Creates a store rooted at `root`. The directory is created lazily on
    /// the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    fn record_path(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join(RECORD_FILE)
    }

    /// Reads and validates one record. `Ok(None)` when absent or unreadable.
    async fn load(&self, run_id: &RunId) -> Result<Option<RunRecord>, StoreError> {
        let path = self.record_path(run_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };

        let record: RunRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    run_id = %run_id,
                    path = %path.display(),
                    error = %e,
                    "unreadable run record, skipping"
                );
                return Ok(None);
            }
        };
        if let Err(e) = record.validate() {
            warn!(
                run_id = %run_id,
                path = %path.display(),
                error = %e,
                "invalid run record, skipping"
            );
            return Ok(None);
        }
        if record.run_id != *run_id {
            warn!(
                run_id = %run_id,
                found = %record.run_id,
                "run record stored under a different key, skipping"
            );
            return Ok(None);
        }
        Ok(Some(record))
    }
}

#[async_trait]
impl RunStore for FsRunStore {
    async fn save(&self, record: &RunRecord) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(record).map_err(|source| StoreError::Serialize {
            run_id: record.run_id,
            source,
        })?;
        let path = self.record_path(&record.run_id);
        write_atomic(path, json).await?;
        debug!(
            run_id = %record.run_id,
            status = %record.status,
            stage = %record.stage,
            "run saved"
        );
        Ok(())
    }

    async fn get(&self, run_id: &RunId) -> Result<Option<RunRecord>, StoreError> {
        self.load(run_id).await
    }

    async fn list(&self) -> Result<Vec<RunRecord>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.root, e)),
        };

        let mut records = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(io_error(&self.root, e)),
            };
            let name = entry.file_name();
            let Some(run_id) = name
                .to_str()
                .and_then(|n| RunId::parse(n).filter(|id| id.to_string() == n))
            else {
                warn!(
                    entry = %entry.path().display(),
                    "unexpected entry in runs directory, skipping"
                );
                continue;
            };
            match self.load(&run_id).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "run record could not be read, skipping")
                }
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl ArtifactSink for FsRunStore {
    async fn write_artifact(
        &self,
        run_id: &RunId,
        name: &str,
        content: &str,
    ) -> Result<ArtifactPath, StoreError> {
        if !is_valid_artifact_name(name) {
            return Err(StoreError::InvalidArtifactName(name.to_string()));
        }
        let path = self.run_dir(run_id).join(ARTIFACTS_DIR).join(name);
        write_atomic(path.clone(), content.as_bytes().to_vec()).await?;
        debug!(run_id = %run_id, artifact = name, bytes = content.len(), "artifact written");
        ArtifactPath::new(path.to_string_lossy().into_owned())
            .ok_or_else(|| StoreError::InvalidArtifactName(name.to_string()))
    }
}

/// Artefact names are a single path component of `[A-Za-z0-9._-]` that does
/// not start with a dot.
pub fn is_valid_artifact_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

async fn write_atomic(path: PathBuf, bytes: Vec<u8>) -> Result<(), StoreError> {
    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &bytes))
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

/// Temp file in the target directory, fsync, then rename over the target.
fn write_atomic_blocking(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| io_error(parent, e))?;
    temp.write_all(bytes).map_err(|e| io_error(temp.path(), e))?;
    temp.as_file().sync_all().map_err(|e| io_error(path, e))?;
    temp.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}
