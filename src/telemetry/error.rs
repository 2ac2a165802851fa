//! Telemetry errors, tagged by the signal they originate from

use opentelemetry_sdk::error::OTelSdkError;
use std::fmt;
use thiserror::Error;

/// Boxed error from an exporter builder
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One of the three OpenTelemetry signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Trace,
    Metric,
    Log,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Signal::Trace => "trace",
            Signal::Metric => "metric",
            Signal::Log => "log",
        })
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to build {signal} exporter: {source}")]
    Exporter {
        signal: Signal,
        #[source]
        source: BoxError,
    },

    #[error("Failed to shut down {signal} provider: {source}")]
    Shutdown {
        signal: Signal,
        #[source]
        source: OTelSdkError,
    },

    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),

    #[error("{}", display_all(.0))]
    Composite(Vec<TelemetryError>),
}

impl TelemetryError {
    pub fn exporter(signal: Signal, source: impl Into<BoxError>) -> Self {
        Self::Exporter {
            signal,
            source: source.into(),
        }
    }

    /// Signals this error refers to, in the order they failed
    pub fn signals(&self) -> Vec<Signal> {
        match self {
            Self::Exporter { signal, .. } | Self::Shutdown { signal, .. } => vec![*signal],
            Self::Subscriber(_) => Vec::new(),
            Self::Composite(errors) => errors.iter().flat_map(Self::signals).collect(),
        }
    }

    /// Append `other` to this error, flattening composites
    pub fn and(self, other: TelemetryError) -> TelemetryError {
        let mut errors = self.into_errors();
        errors.extend(other.into_errors());
        TelemetryError::Composite(errors)
    }

    fn into_errors(self) -> Vec<TelemetryError> {
        match self {
            Self::Composite(errors) => errors,
            other => vec![other],
        }
    }
}

/// Join errors into one
///
/// `None` when there are no errors, the error itself when there is one, and
/// a flattened [`TelemetryError::Composite`] otherwise.
pub fn join(errors: impl IntoIterator<Item = TelemetryError>) -> Option<TelemetryError> {
    let mut flat: Vec<TelemetryError> = errors
        .into_iter()
        .flat_map(TelemetryError::into_errors)
        .collect();

    match flat.len() {
        0 => None,
        1 => flat.pop(),
        _ => Some(TelemetryError::Composite(flat)),
    }
}

fn display_all(errors: &[TelemetryError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
