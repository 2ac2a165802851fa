//! OpenTelemetry provider lifecycle management.
//!
//! [`TelemetryLifecycle::bootstrap`] builds the trace, metric and log
//! providers in that order. Every provider that builds successfully is
//! registered for teardown; if a later one fails, the ones already built are
//! shut down before the error is returned, so nothing is left exporting in the
//! background. [`TelemetryLifecycle::shutdown`] drains the registry exactly
//! once and reports every failure, not just the first.

use super::error::{join, Signal, TelemetryError};
use super::pipeline::{ExportMode, Pipeline, SdkPipeline, Teardown};
use super::resource::{build_resource, ServiceIdentity};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Budget for the implicit shutdown performed on drop
const DROP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Inputs to [`TelemetryLifecycle::bootstrap`]
#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub identity: ServiceIdentity,
    pub export_mode: ExportMode,
    /// Cadence of the periodic metric reader
    pub metric_interval: Duration,
    /// Deadline for tearing down already-built providers when bootstrap fails
    pub cleanup_timeout: Duration,
}

/// Ordered teardown handles, drained at most once
#[derive(Default)]
pub struct ShutdownRegistry {
    entries: Mutex<Vec<(Signal, Box<dyn Teardown>)>>,
}

impl ShutdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, signal: Signal, teardown: impl Teardown + 'static) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((signal, Box::new(teardown)));
    }

    /// Signals still waiting for teardown, in registration order
    pub fn pending(&self) -> Vec<Signal> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(signal, _)| *signal)
            .collect()
    }

    /// Tear down every registered provider within `timeout`
    ///
    /// The deadline is fixed before the first teardown; each one gets
    /// whatever time is left. A failure never stops the remaining teardowns.
    /// The registry is emptied before any teardown runs, so concurrent or
    /// repeated calls find nothing to do and return `Ok`.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), TelemetryError> {
        let entries =
            std::mem::take(&mut *self.entries.lock().unwrap_or_else(PoisonError::into_inner));
        if entries.is_empty() {
            return Ok(());
        }

        let deadline = Instant::now() + timeout;
        let errors = entries.into_iter().filter_map(|(signal, teardown)| {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match teardown.teardown(remaining) {
                Ok(()) => {
                    info!(signal = %signal, "Telemetry provider shut down");
                    None
                }
                Err(e) => {
                    warn!(signal = %signal, error = %e, "Failed to shut down telemetry provider");
                    Some(TelemetryError::Shutdown { signal, source: e })
                }
            }
        });

        match join(errors.collect::<Vec<_>>()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Owns the three signal providers and their teardown
///
/// Drop runs [`shutdown`](Self::shutdown) if it was never called.
pub struct TelemetryLifecycle<P: Pipeline = SdkPipeline> {
    tracer_provider: P::Tracer,
    meter_provider: P::Meter,
    logger_provider: P::Logger,
    registry: ShutdownRegistry,
}

impl TelemetryLifecycle<SdkPipeline> {
    /// Build the SDK providers for `settings.export_mode` and install them
    pub fn bootstrap(settings: &TelemetrySettings) -> Result<Self, TelemetryError> {
        Self::bootstrap_with(settings, &SdkPipeline::new(settings.export_mode))
    }
}

impl<P: Pipeline> TelemetryLifecycle<P> {
    /// Build and install the providers produced by `pipeline`
    pub fn bootstrap_with(
        settings: &TelemetrySettings,
        pipeline: &P,
    ) -> Result<Self, TelemetryError> {
        let resource = build_resource(&settings.identity);
        let registry = ShutdownRegistry::new();

        pipeline.install_propagator();

        let abort = |error: TelemetryError| -> TelemetryError {
            match registry.shutdown(settings.cleanup_timeout) {
                Ok(()) => error,
                Err(cleanup) => error.and(cleanup),
            }
        };

        let tracer_provider = pipeline.tracer_provider(&resource).map_err(abort)?;
        registry.register(Signal::Trace, tracer_provider.clone());
        pipeline.install_tracer_provider(&tracer_provider);

        let meter_provider = pipeline
            .meter_provider(&resource, settings.metric_interval)
            .map_err(abort)?;
        registry.register(Signal::Metric, meter_provider.clone());
        pipeline.install_meter_provider(&meter_provider);

        let logger_provider = pipeline.logger_provider(&resource).map_err(abort)?;
        registry.register(Signal::Log, logger_provider.clone());

        Ok(Self {
            tracer_provider,
            meter_provider,
            logger_provider,
            registry,
        })
    }

    pub fn tracer_provider(&self) -> &P::Tracer {
        &self.tracer_provider
    }

    pub fn meter_provider(&self) -> &P::Meter {
        &self.meter_provider
    }

    pub fn logger_provider(&self) -> &P::Logger {
        &self.logger_provider
    }

    /// Shut down all providers within `timeout`
    ///
    /// Runs every teardown once, in construction order, and joins their
    /// errors. Later calls are no-ops returning `Ok`.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), TelemetryError> {
        self.registry.shutdown(timeout)
    }
}

impl<P: Pipeline> Drop for TelemetryLifecycle<P> {
    fn drop(&mut self) {
        if let Err(e) = self.registry.shutdown(DROP_SHUTDOWN_TIMEOUT) {
            eprintln!("Error shutting down telemetry providers: {e}");
        }
    }
}
