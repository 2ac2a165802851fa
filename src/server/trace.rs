//! Request spans for the probe router
//!
//! Every request gets an `info` span so it survives the default filter and
//! reaches the OpenTelemetry trace layer. A `traceparent`/`baggage` pair sent
//! by the caller is extracted with the global propagator and becomes the
//! span's parent, continuing the caller's trace instead of starting a new one.

use axum::extract::Request;
use axum::http::HeaderMap;
use opentelemetry::propagation::Extractor;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

struct HeaderMapExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderMapExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// `MakeSpan` for `TraceLayer`: one server span per request
pub(super) fn request_span(request: &Request) -> Span {
    let span = tracing::info_span!(
        "request",
        otel.kind = "server",
        http.request.method = %request.method(),
        url.path = %request.uri().path(),
        version = ?request.version(),
    );

    let parent = opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderMapExtractor(request.headers()))
    });
    let _ = span.set_parent(parent);

    span
}
