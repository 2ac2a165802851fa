//! Provider construction strategy
//!
//! Each signal is built the same way whatever the export mode; only the
//! exporter differs. [`Pipeline`] is the seam: [`SdkPipeline`] builds real SDK
//! providers with console or OTLP exporters, tests substitute fakes.

use super::error::{Signal, TelemetryError};
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::logs::{BatchLogProcessor, LogExporter, SdkLoggerProvider};
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, SdkTracerProvider, SpanExporter,
};
use opentelemetry_sdk::Resource;
use std::time::Duration;

/// How long spans sit in the batch before being flushed (SDK default is 5s)
pub const TRACE_BATCH_DELAY: Duration = Duration::from_secs(1);

/// Where telemetry is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// Write signals to stdout, for local development
    Console,
    /// Send signals to an OTLP/HTTP collector, configured by the standard
    /// `OTEL_EXPORTER_OTLP_*` variables
    Otlp,
}

/// A provider that can be torn down within a time budget
pub trait Teardown: Send + Sync {
    /// Flush and shut the provider down, giving up after `timeout`
    fn teardown(&self, timeout: Duration) -> OTelSdkResult;
}

impl Teardown for SdkTracerProvider {
    fn teardown(&self, timeout: Duration) -> OTelSdkResult {
        self.shutdown_with_timeout(timeout)
    }
}

impl Teardown for SdkMeterProvider {
    fn teardown(&self, timeout: Duration) -> OTelSdkResult {
        self.shutdown_with_timeout(timeout)
    }
}

impl Teardown for SdkLoggerProvider {
    fn teardown(&self, timeout: Duration) -> OTelSdkResult {
        self.shutdown_with_timeout(timeout)
    }
}

/// Builds and installs the three signal providers
pub trait Pipeline {
    type Tracer: Teardown + Clone + 'static;
    type Meter: Teardown + Clone + 'static;
    type Logger: Teardown + Clone + 'static;

    /// Install the process-wide context propagator
    fn install_propagator(&self) {}

    fn tracer_provider(&self, resource: &Resource) -> Result<Self::Tracer, TelemetryError>;

    fn meter_provider(
        &self,
        resource: &Resource,
        interval: Duration,
    ) -> Result<Self::Meter, TelemetryError>;

    fn logger_provider(&self, resource: &Resource) -> Result<Self::Logger, TelemetryError>;

    /// Make the tracer provider visible to instrumentation that resolves it globally
    fn install_tracer_provider(&self, _provider: &Self::Tracer) {}

    /// Make the meter provider visible to instrumentation that resolves it globally
    fn install_meter_provider(&self, _provider: &Self::Meter) {}
}

/// OpenTelemetry SDK providers with exporters selected by [`ExportMode`]
#[derive(Debug, Clone, Copy)]
pub struct SdkPipeline {
    mode: ExportMode,
}

impl SdkPipeline {
    pub fn new(mode: ExportMode) -> Self {
        Self { mode }
    }
}

impl Pipeline for SdkPipeline {
    type Tracer = SdkTracerProvider;
    type Meter = SdkMeterProvider;
    type Logger = SdkLoggerProvider;

    fn install_propagator(&self) {
        let propagator = TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ]);
        opentelemetry::global::set_text_map_propagator(propagator);
    }

    fn tracer_provider(&self, resource: &Resource) -> Result<SdkTracerProvider, TelemetryError> {
        match self.mode {
            ExportMode::Console => Ok(tracer_provider_with(
                opentelemetry_stdout::SpanExporter::default(),
                resource,
            )),
            ExportMode::Otlp => {
                let exporter = opentelemetry_otlp::SpanExporter::builder()
                    .with_http()
                    .build()
                    .map_err(|e| TelemetryError::exporter(Signal::Trace, e))?;
                Ok(tracer_provider_with(exporter, resource))
            }
        }
    }

    fn meter_provider(
        &self,
        resource: &Resource,
        interval: Duration,
    ) -> Result<SdkMeterProvider, TelemetryError> {
        match self.mode {
            ExportMode::Console => Ok(meter_provider_with(
                opentelemetry_stdout::MetricExporter::default(),
                resource,
                interval,
            )),
            ExportMode::Otlp => {
                let exporter = opentelemetry_otlp::MetricExporter::builder()
                    .with_http()
                    .build()
                    .map_err(|e| TelemetryError::exporter(Signal::Metric, e))?;
                Ok(meter_provider_with(exporter, resource, interval))
            }
        }
    }

    fn logger_provider(&self, resource: &Resource) -> Result<SdkLoggerProvider, TelemetryError> {
        match self.mode {
            ExportMode::Console => Ok(logger_provider_with(
                opentelemetry_stdout::LogExporter::default(),
                resource,
            )),
            ExportMode::Otlp => {
                let exporter = opentelemetry_otlp::LogExporter::builder()
                    .with_http()
                    .build()
                    .map_err(|e| TelemetryError::exporter(Signal::Log, e))?;
                Ok(logger_provider_with(exporter, resource))
            }
        }
    }

    fn install_tracer_provider(&self, provider: &SdkTracerProvider) {
        opentelemetry::global::set_tracer_provider(provider.clone());
    }

    fn install_meter_provider(&self, provider: &SdkMeterProvider) {
        opentelemetry::global::set_meter_provider(provider.clone());
    }
}

fn tracer_provider_with<E>(exporter: E, resource: &Resource) -> SdkTracerProvider
where
    E: SpanExporter + 'static,
{
    let batch_config = BatchConfigBuilder::default()
        .with_scheduled_delay(TRACE_BATCH_DELAY)
        .build();

    let span_processor = BatchSpanProcessor::builder(exporter)
        .with_batch_config(batch_config)
        .build();

    SdkTracerProvider::builder()
        .with_span_processor(span_processor)
        .with_resource(resource.clone())
        .build()
}

fn meter_provider_with<E>(exporter: E, resource: &Resource, interval: Duration) -> SdkMeterProvider
where
    E: PushMetricExporter,
{
    let reader = PeriodicReader::builder(exporter)
        .with_interval(interval)
        .build();

    SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource.clone())
        .build()
}

fn logger_provider_with<E>(exporter: E, resource: &Resource) -> SdkLoggerProvider
where
    E: LogExporter + 'static,
{
    let log_processor = BatchLogProcessor::builder(exporter).build();

    SdkLoggerProvider::builder()
        .with_log_processor(log_processor)
        .with_resource(resource.clone())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::resource::{build_resource, ServiceIdentity};

    fn resource() -> Resource {
        build_resource(&ServiceIdentity {
            name: "futar-test".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_console_providers_build_and_tear_down() {
        let pipeline = SdkPipeline::new(ExportMode::Console);
        let resource = resource();

        let tracer = pipeline
            .tracer_provider(&resource)
            .expect("Console tracer provider should build");
        let meter = pipeline
            .meter_provider(&resource, Duration::from_secs(60))
            .expect("Console meter provider should build");
        let logger = pipeline
            .logger_provider(&resource)
            .expect("Console logger provider should build");

        assert!(tracer.teardown(Duration::from_secs(5)).is_ok());
        assert!(meter.teardown(Duration::from_secs(5)).is_ok());
        assert!(logger.teardown(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_second_teardown_reports_already_shutdown() {
        let pipeline = SdkPipeline::new(ExportMode::Console);
        let tracer = pipeline
            .tracer_provider(&resource())
            .expect("Console tracer provider should build");

        assert!(tracer.teardown(Duration::from_secs(5)).is_ok());
        assert!(tracer.teardown(Duration::from_secs(5)).is_err());
    }
}
