//! `tracing` subscriber wiring
//!
//! Console output is always on. With a telemetry pipeline, spans are also
//! exported through `tracing-opentelemetry` and events through the
//! OpenTelemetry log bridge.

use super::error::TelemetryError;
use super::lifecycle::TelemetryLifecycle;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use tracing::Metadata;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Instrumentation scope for spans emitted by this service
pub const TRACER_NAME: &str = "futar";

/// Targets whose events must not be fed back into the log exporter
const EXPORTER_TARGETS: &[&str] = &["opentelemetry", "hyper", "h2", "reqwest", "tonic"];

/// Install the global `tracing` subscriber
///
/// Filtering follows `RUST_LOG`, defaulting to `info`.
pub fn init_subscriber(telemetry: Option<&TelemetryLifecycle>) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let trace_layer = telemetry.map(|t| {
        tracing_opentelemetry::layer().with_tracer(t.tracer_provider().tracer(TRACER_NAME))
    });

    let log_layer = telemetry.map(|t| {
        OpenTelemetryTracingBridge::new(t.logger_provider())
            .with_filter(filter_fn(|metadata| !is_exporter_event(metadata)))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(trace_layer)
        .with(log_layer)
        .try_init()?;

    Ok(())
}

fn is_exporter_event(metadata: &Metadata<'_>) -> bool {
    is_exporter_target(metadata.target())
}

fn is_exporter_target(target: &str) -> bool {
    EXPORTER_TARGETS.iter().any(|prefix| target.starts_with(prefix))
}
