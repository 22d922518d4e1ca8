//! Configuration file loading.
//!
//! The file is TOML, read from `--config` or [`DEFAULT_CONFIG_PATH`]. Every
//! section is optional; a missing default file yields built-in defaults, a
//! missing explicit file is an error.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use llm::ChatSettings;
use pipeline::Capability;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = ".demoflow/config.toml";

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoflowConfig {
    pub store: StoreSection,
    pub service: ServiceSection,
    pub adapters: AdapterModes,
    /// Chat endpoint for brief formatting, enrichment and PRD generation.
    pub llm: Option<ChatSettings>,
    /// Code-generation endpoint for prototypes.
    pub prototype: Option<ChatSettings>,
    pub integrations: IntegrationsSection,
    pub telemetry: TelemetrySection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub runs_dir: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            runs_dir: PathBuf::from(".demoflow/runs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSection {
    /// Approver recorded by `approve-prd` and by `approve` without `--approver`.
    pub default_approver: String,
    /// Extra clean-room patterns, applied after the standard ones.
    pub redact_patterns: Vec<String>,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            default_approver: "operator".into(),
            redact_patterns: Vec::new(),
        }
    }
}

/// How a capability is backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterMode {
    #[default]
    Mock,
    Real,
    /// Real, falling back to the mock on failure.
    Resilient,
}

impl AdapterMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterMode::Mock => "mock",
            AdapterMode::Real => "real",
            AdapterMode::Resilient => "resilient",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdapterModes {
    pub meeting_source: AdapterMode,
    pub brief_formatting: AdapterMode,
    pub context_enrichment: AdapterMode,
    pub prd_generation: AdapterMode,
    pub prototype_generation: AdapterMode,
    pub prototype_adaptation: AdapterMode,
    pub downstream_push: AdapterMode,
}

impl AdapterModes {
    pub fn mode(&self, capability: Capability) -> AdapterMode {
        match capability {
            Capability::MeetingSource => self.meeting_source,
            Capability::BriefFormatting => self.brief_formatting,
            Capability::ContextEnrichment => self.context_enrichment,
            Capability::PrdGeneration => self.prd_generation,
            Capability::PrototypeGeneration => self.prototype_generation,
            Capability::PrototypeAdaptation => self.prototype_adaptation,
            Capability::DownstreamPush => self.downstream_push,
        }
    }
}

fn default_integration_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntegrationsSection {
    pub meeting_source_url: Option<String>,
    pub push_url: Option<String>,
    #[serde(default = "default_integration_timeout")]
    pub timeout_secs: u64,
}

impl Default for IntegrationsSection {
    fn default() -> Self {
        Self {
            meeting_source_url: None,
            push_url: None,
            timeout_secs: default_integration_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetrySection {
    pub format: LogFormat,
    /// OTLP gRPC endpoint; span export is off when unset.
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            otlp_endpoint: None,
            service_name: "demoflow".into(),
        }
    }
}

impl DemoflowConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    /// Loads `explicit`, or [`DEFAULT_CONFIG_PATH`] when it exists, or the
    /// built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }
}
