//! Health, readiness and warmup endpoints
//!
//! - `/` - Demo page echoing client info
//! - `/meta/ready` - Readiness: 200 once ready, 503 before
//! - `/meta/health` - Structured health report (pretty JSON)
//! - `/meta/healthz` - Liveness with synthetic failures for chaos testing
//! - `/meta/app-service-warmup` - Blocks until ready, then answers

use super::metrics::ProbeMetrics;
use super::readiness::ReadinessGate;
use super::shutdown::ShutdownSignal;
use super::trace::request_span;
use crate::clock::{Clock, SystemClock};
use crate::config::UptimeBaseline;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

/// Static facts about this service instance
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    /// Instance name reported in health payloads, e.g. `futar-ab12c`
    pub name: String,
    pub version: String,
    pub environment: String,
    /// Percentage (0-100) of liveness/warmup probes that fail on purpose
    pub healthz_error_rate: u8,
    pub uptime_baseline: UptimeBaseline,
}

/// Shared state for the probe handlers
#[derive(Clone)]
pub struct ServerState {
    readiness: ReadinessGate,
    info: Arc<ServiceInfo>,
    metrics: ProbeMetrics,
    clock: Arc<dyn Clock>,
    started_at: DateTime<Utc>,
}

impl ServerState {
    /// Create new server state
    pub fn new(readiness: ReadinessGate, info: ServiceInfo, metrics: ProbeMetrics) -> Self {
        Self::with_clock(readiness, info, metrics, Arc::new(SystemClock))
    }

    pub fn with_clock(
        readiness: ReadinessGate,
        info: ServiceInfo,
        metrics: ProbeMetrics,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let started_at = clock.now();
        Self {
            readiness,
            info: Arc::new(info),
            metrics,
            clock,
            started_at,
        }
    }

    /// Time since the configured baseline, or `None` while not ready
    fn uptime(&self) -> Option<std::time::Duration> {
        let since = self.readiness.ready_since()?;
        let baseline = match self.info.uptime_baseline {
            UptimeBaseline::Start => self.started_at,
            UptimeBaseline::Ready => since,
        };
        Some(self.clock.elapsed_since(baseline))
    }

    /// Plain-text description of the caller, echoed by most endpoints
    fn client_info(&self, request: &Request) -> String {
        let uptime = self
            .uptime()
            .map(|uptime| format!("Uptime: {:?}", uptime))
            .unwrap_or_default();
        let remote = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        format!(
            "{}\nRequest from ip: {}\nHeaders: \n{}",
            uptime,
            remote,
            sorted_headers(request.headers()).join("\n")
        )
    }

    /// Roll the dice for a synthetic failure
    fn synthetic_failure(&self) -> bool {
        rand::thread_rng().gen_range(1..=100u8) <= self.info.healthz_error_rate
    }
}

/// Check status as reported in the health payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Ok,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub message: String,
    pub name: String,
    pub status: CheckStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub checks: Vec<HealthCheck>,
    pub environment_name: String,
    pub service_name: String,
}

/// One ` - name: value` line per header, first value only, sorted
fn sorted_headers(headers: &HeaderMap) -> Vec<String> {
    let mut lines: Vec<String> = headers
        .keys()
        .map(|name| {
            let value = headers
                .get(name)
                .map(|v| v.to_str().unwrap_or("<binary>"))
                .unwrap_or_default();
            format!(" - {}: {}", name, value)
        })
        .collect();
    lines.sort();
    lines
}

/// Demo handler
///
/// Always returns 200 OK with the caller's client info.
async fn hello(State(state): State<ServerState>, request: Request) -> (StatusCode, String) {
    let info = state.client_info(&request);
    info!(client = %info, "Hello");
    (StatusCode::OK, info + "\n")
}

/// Readiness probe handler
///
/// Returns 200 OK if ready, 503 Service Unavailable if not.
async fn ready(State(state): State<ServerState>) -> (StatusCode, &'static str) {
    let response = if state.readiness.is_ready() {
        (StatusCode::OK, "ready\n")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready\n")
    };
    state.metrics.record_response("ready", response.0);
    response
}

/// Structured health report
///
/// Always 200; readiness shows up as a check status rather than a failure.
async fn health(State(state): State<ServerState>) -> Response {
    let readiness = if state.readiness.is_ready() {
        HealthCheck {
            message: "Ready".to_string(),
            name: "readiness".to_string(),
            status: CheckStatus::Ok,
        }
    } else {
        HealthCheck {
            message: "Not ready".to_string(),
            name: "readiness".to_string(),
            status: CheckStatus::Warning,
        }
    };

    let report = ServiceHealth {
        checks: vec![
            HealthCheck {
                message: format!("Version: {}", state.info.version),
                name: crate::config::SERVICE_NAME.to_string(),
                status: CheckStatus::Ok,
            },
            readiness,
        ],
        environment_name: state.info.environment.clone(),
        service_name: state.info.name.clone(),
    };

    state.metrics.record_response("health", StatusCode::OK);
    match serde_json::to_string_pretty(&report) {
        Ok(body) => (StatusCode::OK, [(CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode health report: {}", e),
        )
            .into_response(),
    }
}

/// Liveness probe handler
///
/// 503 while not ready, otherwise 500 for the configured share of requests
/// and 200 for the rest.
async fn healthz(State(state): State<ServerState>, request: Request) -> (StatusCode, String) {
    let (status, message) = if !state.readiness.is_ready() {
        (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
    } else if state.synthetic_failure() {
        (StatusCode::INTERNAL_SERVER_ERROR, "random error")
    } else {
        (StatusCode::OK, "OK")
    };

    let info = state.client_info(&request);
    info!(status = status.as_u16(), outcome = message, client = %info, "Liveness probe");
    state.metrics.record_response("healthz", status);
    (status, info)
}

/// Warmup handler
///
/// Holds the request until the service is ready instead of failing it, for
/// orchestrators that poll-and-block.
async fn warmup(State(state): State<ServerState>, request: Request) -> (StatusCode, String) {
    let status = if state.synthetic_failure() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    let mut message = if status.is_success() {
        "OK"
    } else {
        "random error"
    };

    if !state.readiness.is_ready() {
        info!(client = %state.client_info(&request), "waiting (sync)");
        let started = Instant::now();
        state.readiness.wait_ready().await;
        state.metrics.record_warmup_wait(started.elapsed());
        message = "ready (sync)";
    }

    let info = state.client_info(&request);
    info!(status = status.as_u16(), outcome = message, client = %info, "Warmup probe");
    state.metrics.record_response("warmup", status);
    (status, info + "\n")
}

/// Build the router for the probe endpoints
pub fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/meta/ready", get(ready))
        .route("/meta/health", get(health))
        .route("/meta/healthz", get(healthz))
        .route("/meta/app-service-warmup", get(warmup))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Serve the probe endpoints on `listener` until `shutdown` fires
///
/// After the signal, in-flight requests are allowed to finish; bounding that
/// drain is left to the caller.
pub async fn serve(
    listener: TcpListener,
    state: ServerState,
    mut shutdown: ShutdownSignal,
) -> Result<(), std::io::Error> {
    let app = build_router(state);

    match listener.local_addr() {
        Ok(addr) => info!(addr = %addr, "Health server listening (HTTP)"),
        Err(e) => warn!(error = %e, "Health server listening on unknown address"),
    }

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.wait().await })
    .await
}
