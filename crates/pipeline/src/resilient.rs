//! One-shot fallback wrapper for capabilities.
//!
//! [`Resilient`] holds a primary and a fallback implementation of the same
//! capability. Each call tries the primary once; on any [`CapabilityError`] it
//! logs a warning and tries the fallback once. If the fallback fails too, its
//! error is returned. There are no retries beyond that single fallback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::{
    BriefFormatter, Capability, CapabilityError, ContextEnricher, ContextPacket, DownstreamPusher,
    FeatureBrief, GeneratedPrd, MeetingRef, MeetingSource, PrdGenerator, PrototypeAdapter,
    PrototypeGenerator, RunRecord, UiContract,
};

/// A capability with a fallback implementation.
///
/// `C` is the capability trait object, e.g. `Resilient<dyn PrdGenerator>`.
pub struct Resilient<C: ?Sized> {
    capability: Capability,
    primary: Arc<C>,
    fallback: Arc<C>,
    fallbacks: AtomicU64,
}

impl<C: ?Sized> Resilient<C> {
    pub fn new(capability: Capability, primary: Arc<C>, fallback: Arc<C>) -> Self {
        Self {
            capability,
            primary,
            fallback,
            fallbacks: AtomicU64::new(0),
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Number of calls that fell back since construction.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    fn primary_failed(&self, err: &CapabilityError) {
        let count = self.fallbacks.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            capability = %self.capability,
            error = %err,
            fallback_count = count,
            "primary {} failed, falling back",
            self.capability
        );
    }

    fn fallback_failed(&self, err: CapabilityError) -> CapabilityError {
        error!(
            capability = %self.capability,
            error = %err,
            "fallback {} failed as well",
            self.capability
        );
        err
    }
}

impl<C: ?Sized> std::fmt::Debug for Resilient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resilient")
            .field("capability", &self.capability)
            .field("fallbacks", &self.fallback_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MeetingSource for Resilient<dyn MeetingSource> {
    async fn get_feature_brief(
        &self,
        meeting: &MeetingRef,
    ) -> Result<FeatureBrief, CapabilityError> {
        match self.primary.get_feature_brief(meeting).await {
            Ok(brief) => Ok(brief),
            Err(err) => {
                self.primary_failed(&err);
                self.fallback
                    .get_feature_brief(meeting)
                    .await
                    .map_err(|e| self.fallback_failed(e))
            }
        }
    }
}

#[async_trait]
impl BriefFormatter for Resilient<dyn BriefFormatter> {
    async fn format_feature_brief(&self, raw_text: &str) -> Result<FeatureBrief, CapabilityError> {
        match self.primary.format_feature_brief(raw_text).await {
            Ok(brief) => Ok(brief),
            Err(err) => {
                self.primary_failed(&err);
                self.fallback
                    .format_feature_brief(raw_text)
                    .await
                    .map_err(|e| self.fallback_failed(e))
            }
        }
    }
}

#[async_trait]
impl ContextEnricher for Resilient<dyn ContextEnricher> {
    async fn enrich_context(&self, brief: &FeatureBrief) -> Result<ContextPacket, CapabilityError> {
        match self.primary.enrich_context(brief).await {
            Ok(packet) => Ok(packet),
            Err(err) => {
                self.primary_failed(&err);
                self.fallback
                    .enrich_context(brief)
                    .await
                    .map_err(|e| self.fallback_failed(e))
            }
        }
    }
}

#[async_trait]
impl PrdGenerator for Resilient<dyn PrdGenerator> {
    async fn generate_prd(&self, context: &ContextPacket) -> Result<GeneratedPrd, CapabilityError> {
        match self.primary.generate_prd(context).await {
            Ok(prd) => Ok(prd),
            Err(err) => {
                self.primary_failed(&err);
                self.fallback
                    .generate_prd(context)
                    .await
                    .map_err(|e| self.fallback_failed(e))
            }
        }
    }
}

#[async_trait]
impl PrototypeGenerator for Resilient<dyn PrototypeGenerator> {
    async fn generate_prototype(
        &self,
        ui_contract: &UiContract,
        fixtures: &str,
    ) -> Result<String, CapabilityError> {
        match self.primary.generate_prototype(ui_contract, fixtures).await {
            Ok(artifact) => Ok(artifact),
            Err(err) => {
                self.primary_failed(&err);
                self.fallback
                    .generate_prototype(ui_contract, fixtures)
                    .await
                    .map_err(|e| self.fallback_failed(e))
            }
        }
    }
}

#[async_trait]
impl PrototypeAdapter for Resilient<dyn PrototypeAdapter> {
    async fn adapt_prototype(&self, artifact: &str) -> Result<String, CapabilityError> {
        match self.primary.adapt_prototype(artifact).await {
            Ok(adapted) => Ok(adapted),
            Err(err) => {
                self.primary_failed(&err);
                self.fallback
                    .adapt_prototype(artifact)
                    .await
                    .map_err(|e| self.fallback_failed(e))
            }
        }
    }
}

#[async_trait]
impl DownstreamPusher for Resilient<dyn DownstreamPusher> {
    async fn push_downstream(&self, record: &RunRecord) -> Result<(), CapabilityError> {
        match self.primary.push_downstream(record).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.primary_failed(&err);
                self.fallback
                    .push_downstream(record)
                    .await
                    .map_err(|e| self.fallback_failed(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        calls: AtomicUsize,
        fail_with: Option<CapabilityError>,
        label: &'static str,
    }

    impl Counting {
        fn ok(label: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_with: None,
                label,
            })
        }

        fn failing(err: CapabilityError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_with: Some(err),
                label: "unused",
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PrototypeAdapter for Counting {
        async fn adapt_prototype(&self, artifact: &str) -> Result<String, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(format!("{}:{artifact}", self.label)),
            }
        }
    }

    fn wrap(primary: &Arc<Counting>, fallback: &Arc<Counting>) -> Resilient<dyn PrototypeAdapter> {
        let primary: Arc<dyn PrototypeAdapter> = primary.clone();
        let fallback: Arc<dyn PrototypeAdapter> = fallback.clone();
        Resilient::new(Capability::PrototypeAdaptation, primary, fallback)
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let primary = Counting::ok("real");
        let fallback = Counting::ok("mock");
        let resilient = wrap(&primary, &fallback);

        let out = resilient.adapt_prototype("x").await.unwrap();

        assert_eq!(out, "real:x");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 0);
        assert_eq!(resilient.fallback_count(), 0);
    }

    #[tokio::test]
    async fn primary_failure_uses_fallback_once() {
        let primary = Counting::failing(CapabilityError::Auth("401".into()));
        let fallback = Counting::ok("mock");
        let resilient = wrap(&primary, &fallback);

        let out = resilient.adapt_prototype("x").await.unwrap();

        assert_eq!(out, "mock:x");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
        assert_eq!(resilient.fallback_count(), 1);
    }

    #[tokio::test]
    async fn both_failing_returns_fallback_error_without_retrying() {
        let primary = Counting::failing(CapabilityError::Transport("refused".into()));
        let fallback = Counting::failing(CapabilityError::Unavailable("mock down".into()));
        let resilient = wrap(&primary, &fallback);

        let err = resilient.adapt_prototype("x").await.unwrap_err();

        assert_eq!(err, CapabilityError::Unavailable("mock down".into()));
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn fallback_count_accumulates_across_calls() {
        let primary = Counting::failing(CapabilityError::Parse("junk".into()));
        let fallback = Counting::ok("mock");
        let resilient = wrap(&primary, &fallback);

        for _ in 0..3 {
            resilient.adapt_prototype("x").await.unwrap();
        }

        assert_eq!(resilient.fallback_count(), 3);
        assert_eq!(primary.calls(), 3);
    }
}
