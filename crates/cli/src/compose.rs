//! Composition root: turns configuration into a ready [`OrchestratorService`].
//!
//! Each capability is resolved independently from `[adapters]`:
//!
//! | Mode | Backing |
//! |------|---------|
//! | `mock` | the deterministic implementation from `nodes::mock` |
//! | `real` | the HTTP / LLM implementation; startup fails if it cannot be built |
//! | `resilient` | the real implementation wrapped in [`Resilient`] with the mock as fallback |

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use integrations::{HttpMeetingSource, WebhookPusher};
use llm::{
    ChatClient, ChatSettings, LlmBriefFormatter, LlmContextEnricher, LlmPrdGenerator,
    LlmPrototypeGenerator,
};
use nodes::mock::{
    MockBriefFormatter, MockContextEnricher, MockDownstreamPusher, MockMeetingSource,
    MockPrdGenerator, MockPrototypeAdapter, MockPrototypeGenerator,
};
use nodes::{CleanRoom, OrchestratorService, ReviewHandoffAdapter, ServiceConfig};
use pipeline::{
    Adapters, ApproverId, ArtifactSink, BriefFormatter, Capability, ContextEnricher,
    DownstreamPusher, MeetingSource, PrdGenerator, PrototypeAdapter, PrototypeGenerator,
    Resilient, RunStore,
};
use store::FsRunStore;
use tracing::info;

use crate::config::{AdapterMode, DemoflowConfig};

/// Builds the service described by `config`.
pub fn build_service(config: &DemoflowConfig) -> Result<OrchestratorService> {
    let adapters = build_adapters(config)?;

    let clean_room = CleanRoom::with_extra_patterns(&config.service.redact_patterns)
        .context("invalid [service] redact_patterns")?;
    let default_approver = ApproverId::new(config.service.default_approver.clone())
        .ok_or_else(|| anyhow!("[service] default_approver must not be empty"))?;

    let fs = Arc::new(FsRunStore::new(config.store.runs_dir.clone()));
    let store: Arc<dyn RunStore> = fs.clone();
    let artifacts: Arc<dyn ArtifactSink> = fs;

    info!(runs_dir = %config.store.runs_dir.display(), "Run store ready");

    Ok(OrchestratorService::new(
        store,
        artifacts,
        adapters,
        ServiceConfig {
            default_approver,
            clean_room: Arc::new(clean_room),
        },
    ))
}

/// Resolves every capability according to `[adapters]`.
pub fn build_adapters(config: &DemoflowConfig) -> Result<Adapters> {
    let modes = &config.adapters;
    let timeout = Duration::from_secs(config.integrations.timeout_secs);

    Ok(Adapters {
        meeting_source: resolve::<dyn MeetingSource>(
            Capability::MeetingSource,
            modes.meeting_source,
            Arc::new(MockMeetingSource),
            || {
                let url = required(
                    config.integrations.meeting_source_url.as_deref(),
                    "[integrations] meeting_source_url",
                )?;
                Ok(Arc::new(HttpMeetingSource::new(url, timeout)?))
            },
            |real, mock| -> Arc<dyn MeetingSource> {
                Arc::new(Resilient::new(Capability::MeetingSource, real, mock))
            },
        )?,
        brief_formatter: resolve::<dyn BriefFormatter>(
            Capability::BriefFormatting,
            modes.brief_formatting,
            Arc::new(MockBriefFormatter),
            || {
                let client = chat_client(config.llm.as_ref(), "[llm]")?;
                Ok(Arc::new(LlmBriefFormatter::new(client)))
            },
            |real, mock| -> Arc<dyn BriefFormatter> {
                Arc::new(Resilient::new(Capability::BriefFormatting, real, mock))
            },
        )?,
        context_enricher: resolve::<dyn ContextEnricher>(
            Capability::ContextEnrichment,
            modes.context_enrichment,
            Arc::new(MockContextEnricher),
            || {
                let client = chat_client(config.llm.as_ref(), "[llm]")?;
                Ok(Arc::new(LlmContextEnricher::new(client)))
            },
            |real, mock| -> Arc<dyn ContextEnricher> {
                Arc::new(Resilient::new(Capability::ContextEnrichment, real, mock))
            },
        )?,
        prd_generator: resolve::<dyn PrdGenerator>(
            Capability::PrdGeneration,
            modes.prd_generation,
            Arc::new(MockPrdGenerator),
            || {
                let client = chat_client(config.llm.as_ref(), "[llm]")?;
                Ok(Arc::new(LlmPrdGenerator::new(client)))
            },
            |real, mock| -> Arc<dyn PrdGenerator> {
                Arc::new(Resilient::new(Capability::PrdGeneration, real, mock))
            },
        )?,
        prototype_generator: resolve::<dyn PrototypeGenerator>(
            Capability::PrototypeGeneration,
            modes.prototype_generation,
            Arc::new(MockPrototypeGenerator),
            || {
                let client = chat_client(config.prototype.as_ref(), "[prototype]")?;
                Ok(Arc::new(LlmPrototypeGenerator::new(client)))
            },
            |real, mock| -> Arc<dyn PrototypeGenerator> {
                Arc::new(Resilient::new(Capability::PrototypeGeneration, real, mock))
            },
        )?,
        prototype_adapter: resolve::<dyn PrototypeAdapter>(
            Capability::PrototypeAdaptation,
            modes.prototype_adaptation,
            Arc::new(MockPrototypeAdapter),
            || Ok(Arc::new(ReviewHandoffAdapter)),
            |real, mock| -> Arc<dyn PrototypeAdapter> {
                Arc::new(Resilient::new(Capability::PrototypeAdaptation, real, mock))
            },
        )?,
        downstream_pusher: resolve::<dyn DownstreamPusher>(
            Capability::DownstreamPush,
            modes.downstream_push,
            Arc::new(MockDownstreamPusher),
            || {
                let url = required(
                    config.integrations.push_url.as_deref(),
                    "[integrations] push_url",
                )?;
                Ok(Arc::new(WebhookPusher::new(url, timeout)?))
            },
            |real, mock| -> Arc<dyn DownstreamPusher> {
                Arc::new(Resilient::new(Capability::DownstreamPush, real, mock))
            },
        )?,
    })
}

fn resolve<C: ?Sized>(
    capability: Capability,
    mode: AdapterMode,
    mock: Arc<C>,
    real: impl FnOnce() -> Result<Arc<C>>,
    resilient: impl FnOnce(Arc<C>, Arc<C>) -> Arc<C>,
) -> Result<Arc<C>> {
    let resolved = match mode {
        AdapterMode::Mock => mock,
        AdapterMode::Real => {
            real().with_context(|| format!("cannot build real {capability} adapter"))?
        }
        AdapterMode::Resilient => {
            let primary =
                real().with_context(|| format!("cannot build real {capability} adapter"))?;
            resilient(primary, mock)
        }
    };
    info!(%capability, mode = mode.as_str(), "Capability resolved");
    Ok(resolved)
}

fn required<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("{key} is required"))
}

fn chat_client(settings: Option<&ChatSettings>, section: &str) -> Result<ChatClient> {
    let settings = settings.ok_or_else(|| anyhow!("{section} section is required"))?;
    Ok(ChatClient::from_env(settings)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterModes;
    use pipeline::{MeetingRef, UiContract};

    fn config(toml: &str) -> DemoflowConfig {
        DemoflowConfig::from_toml(toml).unwrap()
    }

    #[tokio::test]
    async fn default_config_wires_mocks() {
        let adapters = build_adapters(&DemoflowConfig::default()).unwrap();
        let brief = adapters
            .meeting_source
            .get_feature_brief(&MeetingRef::new("m-1").unwrap())
            .await
            .unwrap();
        assert_eq!(brief.meeting_id, "m-1");
        let output = adapters
            .prototype_generator
            .generate_prototype(&UiContract::default(), "export const fixtures = {};")
            .await
            .unwrap();
        assert!(output.starts_with("export const fixtures = {};"));
    }

    #[tokio::test]
    async fn real_adaptation_needs_no_backend_config() {
        let adapters =
            build_adapters(&config("[adapters]\nprototype_adaptation = \"real\"")).unwrap();
        let adapted = adapters.prototype_adapter.adapt_prototype("<App/>").await.unwrap();
        assert!(adapted.starts_with("Ready for IDE review"));
    }

    #[test]
    fn real_llm_capability_without_section_fails() {
        let err = build_adapters(&config("[adapters]\nprd_generation = \"real\"")).unwrap_err();
        let chain = format!("{err:#}");
        assert!(chain.contains("prd_generation"), "{chain}");
        assert!(chain.contains("[llm] section is required"), "{chain}");
    }

    #[test]
    fn missing_api_key_variable_fails_at_startup() {
        let err = build_adapters(&config(
            r#"
            [adapters]
            brief_formatting = "resilient"

            [llm]
            base_url = "https://llm.example.test/v1"
            model = "gpt-test"
            api_key_env = "DEMOFLOW_COMPOSE_TEST_KEY_NEVER_SET"
            "#,
        ))
        .unwrap_err();
        assert!(format!("{err:#}").contains("DEMOFLOW_COMPOSE_TEST_KEY_NEVER_SET"));
    }

    #[test]
    fn http_integrations_need_urls() {
        let err = build_adapters(&config("[adapters]\ndownstream_push = \"real\"")).unwrap_err();
        assert!(format!("{err:#}").contains("push_url"));

        let ok = config(
            r#"
            [adapters]
            meeting_source = "resilient"
            downstream_push = "real"

            [integrations]
            meeting_source_url = "https://notes.example.test/api"
            push_url = "https://hooks.example.test/runs"
            "#,
        );
        assert!(build_adapters(&ok).is_ok());
    }

    #[test]
    fn invalid_redact_pattern_fails_service_build() {
        let mut cfg = DemoflowConfig::default();
        cfg.service.redact_patterns = vec!["(unclosed".into()];
        let err = build_service(&cfg).err().unwrap();
        assert!(format!("{err:#}").contains("redact_patterns"));
    }

    #[test]
    fn modes_default_to_mock() {
        let modes = AdapterModes::default();
        for capability in Capability::ALL {
            assert_eq!(modes.mode(capability), AdapterMode::Mock);
        }
    }
}
