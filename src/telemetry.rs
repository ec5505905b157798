//! Logging and optional OpenTelemetry tracing.
//!
//! Logs go to stderr through `tracing-subscriber`, filtered by `RUST_LOG`
//! (default `flowcanvas=info`). When enabled, spans are also exported to an
//! OTLP collector.
//!
//! # Environment Variables
//!
//! - `FLOWCANVAS_OTEL_ENABLED`: Set to "true" to enable OpenTelemetry (default: false)
//! - `FLOWCANVAS_OTEL_ENDPOINT`: OTLP endpoint URL (default: http://localhost:4317)
//! - `FLOWCANVAS_OTEL_SERVICE_NAME`: Service name for traces (default: flowcanvas)
//! - `FLOWCANVAS_OTEL_SAMPLE_RATE`: Sampling rate 0.0-1.0 (default: 1.0)

use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    runtime,
    trace::{RandomIdGenerator, Sampler, TracerProvider as SdkTracerProvider},
    Resource,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "flowcanvas=info";

#[derive(Debug, Clone, PartialEq)]
pub struct OtelConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub service_name: String,
    /// Sampling rate (0.0 to 1.0).
    pub sample_rate: f64,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl OtelConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            enabled: lookup("FLOWCANVAS_OTEL_ENABLED")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            endpoint: lookup("FLOWCANVAS_OTEL_ENDPOINT")
                .unwrap_or_else(|| "http://localhost:4317".to_string()),
            service_name: lookup("FLOWCANVAS_OTEL_SERVICE_NAME")
                .unwrap_or_else(|| "flowcanvas".to_string()),
            sample_rate: lookup("FLOWCANVAS_OTEL_SAMPLE_RATE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1.0),
        }
    }

    fn sampler(&self) -> Sampler {
        if self.sample_rate >= 1.0 {
            Sampler::AlwaysOn
        } else if self.sample_rate <= 0.0 {
            Sampler::AlwaysOff
        } else {
            Sampler::TraceIdRatioBased(self.sample_rate)
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn fmt_layer<S>() -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(env_filter())
}

/// Install the global subscriber.
///
/// Returns the tracer provider when OpenTelemetry is enabled; pass it to
/// [`shutdown_telemetry`] before exit so buffered spans are flushed.
pub fn init_telemetry(
    config: &OtelConfig,
) -> Result<Option<SdkTracerProvider>, Box<dyn std::error::Error + Send + Sync>> {
    if !config.enabled {
        tracing_subscriber::registry().with(fmt_layer()).try_init()?;
        return Ok(None);
    }

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.endpoint)
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_sampler(config.sampler())
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(Resource::new(vec![
            KeyValue::new("service.name", config.service_name.clone()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ]))
        .build();

    let tracer = provider.tracer("flowcanvas");
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(fmt_layer())
        .try_init()?;

    info!(
        endpoint = %config.endpoint,
        service_name = %config.service_name,
        sample_rate = config.sample_rate,
        "OpenTelemetry tracing initialized"
    );

    Ok(Some(provider))
}

pub fn shutdown_telemetry(provider: Option<SdkTracerProvider>) {
    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            tracing::error!("Failed to shutdown OpenTelemetry provider: {:?}", e);
        }
    }
}
