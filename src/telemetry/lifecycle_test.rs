//! Tests for telemetry bootstrap and shutdown
//!
//! A fake pipeline stands in for the SDK so tests can inject construction and
//! teardown failures and count how often each provider is torn down.

use super::error::{Signal, TelemetryError};
use super::lifecycle::*;
use super::pipeline::{ExportMode, Pipeline, Teardown};
use super::resource::ServiceIdentity;
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::Resource;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct FakeProvider {
    teardowns: Arc<AtomicUsize>,
    fail_teardown: bool,
    /// Shared log of teardown order across providers
    order: Arc<Mutex<Vec<Signal>>>,
    signal: Option<Signal>,
    last_timeout: Arc<Mutex<Option<Duration>>>,
}

impl FakeProvider {
    fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }
}

impl Teardown for FakeProvider {
    fn teardown(&self, timeout: Duration) -> OTelSdkResult {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        *self.last_timeout.lock().expect("timeout lock poisoned") = Some(timeout);
        if let Some(signal) = self.signal {
            self.order.lock().expect("order lock poisoned").push(signal);
        }
        if self.fail_teardown {
            Err(OTelSdkError::InternalFailure("exporter flush failed".to_string()))
        } else {
            Ok(())
        }
    }
}

struct FakePipeline {
    tracer: FakeProvider,
    meter: FakeProvider,
    logger: FakeProvider,
    fail_build: Option<Signal>,
    installed: Mutex<Vec<Signal>>,
}

impl FakePipeline {
    fn new() -> Self {
        let order = Arc::new(Mutex::new(Vec::new()));
        let provider = |signal| FakeProvider {
            signal: Some(signal),
            order: order.clone(),
            ..Default::default()
        };
        Self {
            tracer: provider(Signal::Trace),
            meter: provider(Signal::Metric),
            logger: provider(Signal::Log),
            fail_build: None,
            installed: Mutex::new(Vec::new()),
        }
    }

    fn failing_build(mut self, signal: Signal) -> Self {
        self.fail_build = Some(signal);
        self
    }

    fn failing_teardown(mut self, signal: Signal) -> Self {
        match signal {
            Signal::Trace => self.tracer.fail_teardown = true,
            Signal::Metric => self.meter.fail_teardown = true,
            Signal::Log => self.logger.fail_teardown = true,
        }
        self
    }

    fn build(&self, signal: Signal, provider: &FakeProvider) -> Result<FakeProvider, TelemetryError> {
        if self.fail_build == Some(signal) {
            return Err(TelemetryError::exporter(signal, "collector unreachable"));
        }
        Ok(provider.clone())
    }

    fn teardown_order(&self) -> Vec<Signal> {
        self.tracer.order.lock().expect("order lock poisoned").clone()
    }

    fn installed(&self) -> Vec<Signal> {
        self.installed.lock().expect("installed lock poisoned").clone()
    }
}

impl Pipeline for FakePipeline {
    type Tracer = FakeProvider;
    type Meter = FakeProvider;
    type Logger = FakeProvider;

    fn tracer_provider(&self, _resource: &Resource) -> Result<FakeProvider, TelemetryError> {
        self.build(Signal::Trace, &self.tracer)
    }

    fn meter_provider(
        &self,
        _resource: &Resource,
        _interval: Duration,
    ) -> Result<FakeProvider, TelemetryError> {
        self.build(Signal::Metric, &self.meter)
    }

    fn logger_provider(&self, _resource: &Resource) -> Result<FakeProvider, TelemetryError> {
        self.build(Signal::Log, &self.logger)
    }

    fn install_tracer_provider(&self, _provider: &FakeProvider) {
        self.installed.lock().expect("installed lock poisoned").push(Signal::Trace);
    }

    fn install_meter_provider(&self, _provider: &FakeProvider) {
        self.installed.lock().expect("installed lock poisoned").push(Signal::Metric);
    }
}

fn settings() -> TelemetrySettings {
    TelemetrySettings {
        identity: ServiceIdentity {
            name: "futar".to_string(),
            version: "test".to_string(),
            instance_id: "ab12c".to_string(),
        },
        export_mode: ExportMode::Console,
        metric_interval: Duration::from_secs(60),
        cleanup_timeout: Duration::from_secs(1),
    }
}

#[test]
fn test_bootstrap_registers_all_providers_in_order() {
    let pipeline = FakePipeline::new();

    let lifecycle = TelemetryLifecycle::bootstrap_with(&settings(), &pipeline)
        .expect("Bootstrap should succeed");

    assert_eq!(pipeline.installed(), vec![Signal::Trace, Signal::Metric]);

    lifecycle
        .shutdown(Duration::from_secs(1))
        .expect("Shutdown should succeed");
    assert_eq!(
        pipeline.teardown_order(),
        vec![Signal::Trace, Signal::Metric, Signal::Log]
    );
}

#[test]
fn test_trace_failure_tears_down_nothing() {
    let pipeline = FakePipeline::new().failing_build(Signal::Trace);

    let result = TelemetryLifecycle::bootstrap_with(&settings(), &pipeline);

    let err = result.err().expect("Bootstrap should fail");
    assert_eq!(err.signals(), vec![Signal::Trace]);
    assert!(pipeline.teardown_order().is_empty());
    assert!(pipeline.installed().is_empty());
}

#[test]
fn test_metric_failure_tears_down_trace_once() {
    let pipeline = FakePipeline::new().failing_build(Signal::Metric);

    let result = TelemetryLifecycle::bootstrap_with(&settings(), &pipeline);

    let err = result.err().expect("Bootstrap should fail");
    assert!(
        matches!(
            err,
            TelemetryError::Exporter {
                signal: Signal::Metric,
                ..
            }
        ),
        "Only the metric failure should be reported, got {:?}",
        err
    );
    assert_eq!(pipeline.tracer.teardowns(), 1);
    assert_eq!(pipeline.meter.teardowns(), 0);
    assert_eq!(pipeline.logger.teardowns(), 0);
    assert_eq!(
        pipeline.installed(),
        vec![Signal::Trace],
        "Meter provider must not be installed when it failed to build"
    );
}

#[test]
fn test_log_failure_tears_down_trace_and_metric() {
    let pipeline = FakePipeline::new().failing_build(Signal::Log);

    let result = TelemetryLifecycle::bootstrap_with(&settings(), &pipeline);

    assert!(result.is_err());
    assert_eq!(pipeline.teardown_order(), vec![Signal::Trace, Signal::Metric]);
    assert_eq!(pipeline.logger.teardowns(), 0);
}

#[test]
fn test_bootstrap_failure_reports_cleanup_errors_too() {
    let pipeline = FakePipeline::new()
        .failing_build(Signal::Log)
        .failing_teardown(Signal::Trace);

    let err = TelemetryLifecycle::bootstrap_with(&settings(), &pipeline)
        .err()
        .expect("Bootstrap should fail");

    assert_eq!(err.signals(), vec![Signal::Log, Signal::Trace]);
    assert_eq!(pipeline.meter.teardowns(), 1);
}

#[test]
fn test_second_shutdown_is_noop() {
    let pipeline = FakePipeline::new();
    let lifecycle = TelemetryLifecycle::bootstrap_with(&settings(), &pipeline)
        .expect("Bootstrap should succeed");

    assert!(lifecycle.shutdown(Duration::from_secs(1)).is_ok());
    assert!(lifecycle.shutdown(Duration::from_secs(1)).is_ok());

    assert_eq!(pipeline.tracer.teardowns(), 1);
    assert_eq!(pipeline.meter.teardowns(), 1);
    assert_eq!(pipeline.logger.teardowns(), 1);
}

#[test]
fn test_shutdown_aggregates_failures_and_continues() {
    let pipeline = FakePipeline::new()
        .failing_teardown(Signal::Trace)
        .failing_teardown(Signal::Metric);
    let lifecycle = TelemetryLifecycle::bootstrap_with(&settings(), &pipeline)
        .expect("Bootstrap should succeed");

    let err = lifecycle
        .shutdown(Duration::from_secs(1))
        .expect_err("Shutdown should report failures");

    match &err {
        TelemetryError::Composite(errors) => assert_eq!(errors.len(), 2),
        other => panic!("Expected composite error, got {:?}", other),
    }
    assert_eq!(err.signals(), vec![Signal::Trace, Signal::Metric]);
    assert_eq!(
        pipeline.logger.teardowns(),
        1,
        "Log provider must still be torn down after earlier failures"
    );

    // A failed shutdown still drains the registry
    assert!(lifecycle.shutdown(Duration::from_secs(1)).is_ok());
    assert_eq!(pipeline.tracer.teardowns(), 1);
}

#[test]
fn test_drop_shuts_down_when_never_called() {
    let pipeline = FakePipeline::new();
    let lifecycle = TelemetryLifecycle::bootstrap_with(&settings(), &pipeline)
        .expect("Bootstrap should succeed");

    drop(lifecycle);

    assert_eq!(pipeline.tracer.teardowns(), 1);
    assert_eq!(pipeline.meter.teardowns(), 1);
    assert_eq!(pipeline.logger.teardowns(), 1);
}

#[test]
fn test_drop_after_shutdown_does_not_repeat() {
    let pipeline = FakePipeline::new();
    let lifecycle = TelemetryLifecycle::bootstrap_with(&settings(), &pipeline)
        .expect("Bootstrap should succeed");

    lifecycle
        .shutdown(Duration::from_secs(1))
        .expect("Shutdown should succeed");
    drop(lifecycle);

    assert_eq!(pipeline.logger.teardowns(), 1);
}

#[test]
fn test_registry_shares_one_deadline() {
    let registry = ShutdownRegistry::new();
    let first = FakeProvider::default();
    let second = FakeProvider::default();
    registry.register(Signal::Trace, first.clone());
    registry.register(Signal::Metric, second.clone());
    assert_eq!(registry.pending(), vec![Signal::Trace, Signal::Metric]);

    registry
        .shutdown(Duration::from_secs(5))
        .expect("Shutdown should succeed");

    let first_budget = first.last_timeout.lock().expect("lock").expect("first timeout");
    let second_budget = second.last_timeout.lock().expect("lock").expect("second timeout");
    assert!(first_budget <= Duration::from_secs(5));
    assert!(
        second_budget <= first_budget,
        "Later teardowns get the remaining budget, not a fresh one"
    );
    assert!(registry.pending().is_empty());
}

#[test]
fn test_concurrent_shutdown_runs_teardown_once() {
    let registry = Arc::new(ShutdownRegistry::new());
    let provider = FakeProvider::default();
    registry.register(Signal::Trace, provider.clone());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            std::thread::spawn(move || registry.shutdown(Duration::from_secs(1)).is_ok())
        })
        .collect();

    for handle in handles {
        assert!(handle.join().expect("Shutdown thread panicked"));
    }
    assert_eq!(provider.teardowns(), 1);
}

#[test]
fn test_console_bootstrap_end_to_end() {
    let lifecycle =
        TelemetryLifecycle::bootstrap(&settings()).expect("Console bootstrap should succeed");

    assert!(lifecycle.shutdown(Duration::from_secs(5)).is_ok());
    assert!(lifecycle.shutdown(Duration::from_secs(5)).is_ok());
}
