//! Pipeline steps and the sequential runner that executes them.
//!
//! A [`PipelineRunner`] is composed once (append / prepend / insert) and then
//! run against a record. Steps execute strictly in order, each receiving the
//! record its predecessor returned. The first failure stops the run: later
//! steps never execute and the error carries the failed record so the caller
//! can persist it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, info, info_span, Instrument};

use crate::{PipelineError, RecordField, RunRecord, RunStatus, StepError};

/// One named transformation of a run record.
///
/// A step receives an immutable snapshot and returns a new record; it must not
/// keep a reference to the record after returning. Side effects on external
/// systems must be safe to repeat from the same input.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Human-readable step name, used in logs and errors.
    fn name(&self) -> &str;

    /// Fields that must be present before this step can run.
    fn requires(&self) -> &[RecordField] {
        &[]
    }

    /// Fields this step guarantees to populate on success.
    fn produces(&self) -> &[RecordField] {
        &[]
    }

    async fn execute(&self, record: &RunRecord) -> Result<RunRecord, StepError>;
}

/// Runs an ordered list of [`PipelineStep`]s against a run record.
#[derive(Clone, Default)]
pub struct PipelineRunner {
    steps: Vec<Arc<dyn PipelineStep>>,
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("steps", &self.step_names())
            .finish()
    }
}

impl PipelineRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step to the end of the pipeline.
    pub fn append(&mut self, step: Arc<dyn PipelineStep>) -> &mut Self {
        self.steps.push(step);
        self
    }

    /// Prepends a step to the beginning of the pipeline.
    pub fn prepend(&mut self, step: Arc<dyn PipelineStep>) -> &mut Self {
        self.steps.insert(0, step);
        self
    }

    /// Inserts a step at `index`. An index past the end appends.
    pub fn insert_at(&mut self, index: usize, step: Arc<dyn PipelineStep>) -> &mut Self {
        let index = index.min(self.steps.len());
        self.steps.insert(index, step);
        self
    }

    /// Names of the composed steps, in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Checks that every step's required inputs are either on the record or
    /// produced by an earlier step.
    pub fn validate(&self, record: &RunRecord) -> Result<(), PipelineError> {
        let mut available: HashSet<RecordField> = RecordField::ALL
            .into_iter()
            .filter(|f| record.has(*f))
            .collect();
        for step in &self.steps {
            if let Some(missing) = step.requires().iter().find(|f| !available.contains(f)) {
                return Err(PipelineError::Validation {
                    step: step.name().to_string(),
                    field: *missing,
                });
            }
            available.extend(step.produces().iter().copied());
        }
        Ok(())
    }

    /// Executes every step in order.
    ///
    /// On success the returned record has `status = completed`. On the first
    /// failing step the run stops and [`PipelineError::StepFailed`] carries
    /// the record with `status = failed`.
    pub async fn run(&self, initial: RunRecord) -> Result<RunRecord, PipelineError> {
        self.validate(&initial)?;

        let total = self.steps.len();
        let run_id = initial.run_id;
        let mut current = initial;

        for (index, step) in self.steps.iter().enumerate() {
            let position = index + 1;
            let span = info_span!(
                "pipeline_step",
                run_id = %run_id,
                step = step.name(),
                position,
                total
            );
            info!(parent: &span, "running step {position}/{total}: {}", step.name());
            let started = Instant::now();

            match step.execute(&current).instrument(span.clone()).await {
                Ok(mut next) => {
                    if next.updated_at < current.updated_at {
                        next.updated_at = current.updated_at;
                    }
                    next.touch();
                    current = next;
                    info!(
                        parent: &span,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "step completed"
                    );
                }
                Err(source) => {
                    let message = source.cause.to_string();
                    error!(parent: &span, error = %message, "step failed");
                    current.status = RunStatus::Failed;
                    current.touch();
                    return Err(PipelineError::StepFailed {
                        step: step.name().to_string(),
                        index,
                        message,
                        record: Box::new(current),
                        source,
                    });
                }
            }
        }

        current.status = RunStatus::Completed;
        current.touch();
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CapabilityError, FeatureBrief, FeatureRequest, Priority, StepFailure, Timestamp, Track,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record() -> RunRecord {
        RunRecord::new(
            FeatureBrief {
                meeting_id: "manual".into(),
                meeting_date: Timestamp::now(),
                context: "ctx".into(),
                features: vec![FeatureRequest {
                    id: "f1".into(),
                    title: "Dark mode".into(),
                    description: "toggle".into(),
                    priority: Priority::High,
                }],
                supporting_quotes: vec![],
            },
            Track::Gated,
        )
    }

    /// Appends its label to `fixtures`, so the output records the order in
    /// which steps saw the record.
    struct Mark {
        label: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PipelineStep for Mark {
        fn name(&self) -> &str {
            self.label
        }

        fn produces(&self) -> &[RecordField] {
            &[RecordField::Fixtures]
        }

        async fn execute(&self, record: &RunRecord) -> Result<RunRecord, StepError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut next = record.clone();
            let mut trail = next.fixtures.take().unwrap_or_default();
            trail.push_str(self.label);
            next.fixtures = Some(trail);
            Ok(next)
        }
    }

    struct Fail {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PipelineStep for Fail {
        fn name(&self) -> &str {
            "boom"
        }

        async fn execute(&self, _record: &RunRecord) -> Result<RunRecord, StepError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StepError::new(
                "boom",
                CapabilityError::Unavailable("down".into()),
            ))
        }
    }

    struct NeedsPrd;

    #[async_trait]
    impl PipelineStep for NeedsPrd {
        fn name(&self) -> &str {
            "needs-prd"
        }

        fn requires(&self) -> &[RecordField] {
            &[RecordField::Prd]
        }

        async fn execute(&self, record: &RunRecord) -> Result<RunRecord, StepError> {
            Ok(record.clone())
        }
    }

    fn mark(label: &'static str, calls: &Arc<AtomicUsize>) -> Arc<dyn PipelineStep> {
        Arc::new(Mark {
            label,
            calls: Arc::clone(calls),
        })
    }

    #[tokio::test]
    async fn all_steps_succeed_in_order_and_complete() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut runner = PipelineRunner::new();
        runner
            .append(mark("b", &calls))
            .append(mark("c", &calls))
            .prepend(mark("a", &calls));

        let initial = record();
        let created = initial.updated_at;
        let out = runner.run(initial).await.unwrap();

        assert_eq!(out.status, RunStatus::Completed);
        assert_eq!(out.fixtures.as_deref(), Some("abc"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(out.updated_at >= created);
    }

    #[tokio::test]
    async fn failure_short_circuits_and_marks_failed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fail_calls = Arc::new(AtomicUsize::new(0));
        let mut runner = PipelineRunner::new();
        runner
            .append(mark("a", &calls))
            .append(Arc::new(Fail {
                calls: Arc::clone(&fail_calls),
            }))
            .append(mark("c", &calls));

        let err = runner.run(record()).await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1, "step after failure ran");
        assert_eq!(fail_calls.load(Ordering::SeqCst), 1);
        match err {
            PipelineError::StepFailed {
                step,
                index,
                record,
                source,
                ..
            } => {
                assert_eq!(step, "boom");
                assert_eq!(index, 1);
                assert_eq!(record.status, RunStatus::Failed);
                // output of the step before the failure is kept
                assert_eq!(record.fixtures.as_deref(), Some("a"));
                assert!(matches!(source.cause, StepFailure::Capability(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_input_fails_before_any_step_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut runner = PipelineRunner::new();
        runner.append(mark("a", &calls)).append(Arc::new(NeedsPrd));

        let initial = record();
        let err = runner.run(initial.clone()).await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        match err {
            PipelineError::Validation { step, field } => {
                assert_eq!(step, "needs-prd");
                assert_eq!(field, RecordField::Prd);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn insert_at_clamps_to_end() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut runner = PipelineRunner::new();
        runner
            .append(mark("a", &calls))
            .append(mark("c", &calls))
            .insert_at(1, mark("b", &calls))
            .insert_at(99, mark("d", &calls));
        assert_eq!(runner.step_names(), vec!["a", "b", "c", "d"]);
        assert_eq!(runner.len(), 4);
    }

    #[tokio::test]
    async fn empty_runner_completes_immediately() {
        let out = PipelineRunner::new().run(record()).await.unwrap();
        assert_eq!(out.status, RunStatus::Completed);
    }
}
