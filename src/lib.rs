//! futar: a demo service with readiness gating and an OpenTelemetry pipeline
//!
//! - [`server`] - HTTP probe endpoints, readiness gate and graceful shutdown
//! - [`telemetry`] - trace, metric and log provider lifecycle
//! - [`config`] - environment-driven configuration

pub mod clock;
pub mod config;
pub mod server;
pub mod telemetry;
