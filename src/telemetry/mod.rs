//! Telemetry pipeline: trace, metric and log providers
//!
//! - [`TelemetryLifecycle`] - builds, installs and tears down the providers
//! - [`Pipeline`] / [`SdkPipeline`] - exporter selection per [`ExportMode`]
//! - [`init_subscriber`] - routes `tracing` output into the pipeline

mod error;
mod lifecycle;
mod pipeline;
mod resource;
mod subscriber;

pub use error::{join, BoxError, Signal, TelemetryError};
pub use lifecycle::{ShutdownRegistry, TelemetryLifecycle, TelemetrySettings};
pub use pipeline::{ExportMode, Pipeline, SdkPipeline, Teardown, TRACE_BATCH_DELAY};
pub use resource::{build_resource, ServiceIdentity};
pub use subscriber::{init_subscriber, TRACER_NAME};

#[cfg(test)]
#[path = "lifecycle_test.rs"]
mod lifecycle_tests;
