//! HTTP server for probe endpoints
//!
//! Provides health probes for orchestrators:
//! - `/meta/healthz` - Liveness probe (with synthetic failures)
//! - `/meta/ready` - Readiness probe (service is ready to serve)
//! - `/meta/app-service-warmup` - Blocking warmup probe
//!
//! Also provides the readiness gate and graceful shutdown handling for
//! SIGTERM/SIGINT.

mod health;
mod metrics;
mod readiness;
pub mod shutdown;
mod trace;

pub use health::{
    build_router, serve, CheckStatus, HealthCheck, ServerState, ServiceHealth, ServiceInfo,
};
pub use metrics::ProbeMetrics;
pub use readiness::{schedule_ready, ReadinessGate};
pub use shutdown::{drain, shutdown_channel, wait_for_signal, ShutdownController, ShutdownSignal};

#[cfg(test)]
#[path = "health_test.rs"]
mod health_tests;

#[cfg(test)]
#[path = "readiness_test.rs"]
mod readiness_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;

#[cfg(test)]
#[path = "trace_test.rs"]
mod trace_tests;
