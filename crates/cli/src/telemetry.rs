//! Observability wiring.
//!
//! All `tracing` spans and events from every crate flow through one
//! subscriber: an `EnvFilter` (`RUST_LOG`, falling back to
//! [`DEFAULT_FILTER`]), a human-readable or JSON formatter writing to stderr,
//! and, when `[telemetry] otlp_endpoint` is set, an OpenTelemetry layer
//! exporting spans over OTLP/gRPC.

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{runtime, trace::TracerProvider, Resource};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, TelemetrySection};

/// Directives used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str =
    "warn,demoflow=info,pipeline=info,nodes=info,store=info,llm=info,integrations=info";

/// Keeps the OTLP exporter alive; call [`TelemetryGuard::shutdown`] before
/// exit so buffered spans are flushed.
#[must_use]
pub struct TelemetryGuard {
    provider: Option<TracerProvider>,
}

impl TelemetryGuard {
    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            if let Err(e) = provider.shutdown() {
                eprintln!("failed to flush OpenTelemetry spans: {e}");
            }
        }
    }
}

/// Installs the global subscriber. Must be called from inside the Tokio
/// runtime when OTLP export is enabled.
pub fn init(settings: &TelemetrySection) -> Result<TelemetryGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = match settings.format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .boxed(),
    };

    let provider = settings
        .otlp_endpoint
        .as_deref()
        .map(|endpoint| otlp_provider(endpoint, &settings.service_name))
        .transpose()?;
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("demoflow")));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    if let Some(endpoint) = &settings.otlp_endpoint {
        tracing::info!(%endpoint, "OpenTelemetry span export enabled");
    }

    Ok(TelemetryGuard { provider })
}

fn otlp_provider(endpoint: &str, service_name: &str) -> Result<TracerProvider> {
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .with_context(|| format!("failed to build OTLP exporter for {endpoint}"))?;

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            service_name.to_string(),
        )]))
        .build())
}
