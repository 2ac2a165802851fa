//! Probe metrics recorded through the OpenTelemetry meter
//!
//! The meter is handed in explicitly; without a telemetry pipeline it is the
//! no-op meter and recording costs nothing.

use axum::http::StatusCode;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;
use std::time::Duration;

#[derive(Clone)]
pub struct ProbeMetrics {
    requests: Counter<u64>,
    warmup_wait: Histogram<f64>,
}

impl ProbeMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            requests: meter
                .u64_counter("futar.probe.requests")
                .with_description("Probe responses by endpoint and status")
                .build(),
            warmup_wait: meter
                .f64_histogram("futar.warmup.wait")
                .with_description("Time warmup requests spent blocked on readiness")
                .with_unit("s")
                .build(),
        }
    }

    /// Record one probe response
    pub fn record_response(&self, probe: &'static str, status: StatusCode) {
        self.requests.add(
            1,
            &[
                KeyValue::new("probe", probe),
                KeyValue::new("http.response.status_code", i64::from(status.as_u16())),
            ],
        );
    }

    /// Record how long a warmup request waited for readiness
    pub fn record_warmup_wait(&self, waited: Duration) {
        self.warmup_wait.record(waited.as_secs_f64(), &[]);
    }
}
