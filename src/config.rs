//! Environment-driven configuration
//!
//! All values are read once at startup. Malformed numbers are fatal: the
//! process refuses to serve rather than run with a guessed value.

use crate::telemetry::ExportMode;
use std::num::ParseIntError;
use std::time::Duration;
use thiserror::Error;

/// Name reported in telemetry resources and health payloads
pub const SERVICE_NAME: &str = "futar";

/// Credential whose presence switches telemetry to OTLP export
pub const CONNECTION_STRING_VAR: &str = "APPLICATIONINSIGHTS_CONNECTION_STRING";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a number, got {value:?}: {source}")]
    InvalidNumber {
        var: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("{var} must be at most {max}, got {value}")]
    OutOfRange {
        var: &'static str,
        value: u64,
        max: u64,
    },

    #[error("{var} has unsupported value {value:?} (expected one of: {expected})")]
    InvalidChoice {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// What the uptime reported to clients is measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UptimeBaseline {
    /// Process start
    Start,
    /// The readiness transition
    Ready,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: String,
    /// Delay before the service reports ready
    pub startup_delay: Duration,
    /// Percentage (0-100) of liveness probes that fail on purpose
    pub healthz_error_rate: u8,
    /// `None` disables the telemetry pipeline entirely
    pub export_mode: Option<ExportMode>,
    pub metric_interval: Duration,
    /// How long in-flight requests may drain after a shutdown signal
    pub shutdown_grace: Duration,
    pub telemetry_shutdown_timeout: Duration,
    pub uptime_baseline: UptimeBaseline,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            environment: "local".to_string(),
            startup_delay: Duration::from_millis(10_000),
            healthz_error_rate: 20,
            export_mode: None,
            metric_interval: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(10),
            telemetry_shutdown_timeout: Duration::from_secs(5),
            uptime_baseline: UptimeBaseline::Ready,
        }
    }
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value
    ///
    /// Unset and blank variables fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let port = match get("PORT") {
            Some(value) => {
                let port = parse_number("PORT", &value)?;
                u16::try_from(port).map_err(|_| ConfigError::OutOfRange {
                    var: "PORT",
                    value: port,
                    max: u64::from(u16::MAX),
                })?
            }
            None => defaults.port,
        };

        let healthz_error_rate = match get("HEALTHZ_ERROR_RATE") {
            Some(value) => {
                let rate = parse_number("HEALTHZ_ERROR_RATE", &value)?;
                if rate > 100 {
                    return Err(ConfigError::OutOfRange {
                        var: "HEALTHZ_ERROR_RATE",
                        value: rate,
                        max: 100,
                    });
                }
                rate as u8
            }
            None => defaults.healthz_error_rate,
        };

        let export_mode = if get(CONNECTION_STRING_VAR).is_some() {
            Some(ExportMode::Otlp)
        } else if get("TELEMETRY_CONSOLE").is_some_and(|v| is_truthy(&v)) {
            Some(ExportMode::Console)
        } else {
            None
        };

        let uptime_baseline = match get("UPTIME_BASELINE").as_deref() {
            None | Some("ready") => UptimeBaseline::Ready,
            Some("start") => UptimeBaseline::Start,
            Some(other) => {
                return Err(ConfigError::InvalidChoice {
                    var: "UPTIME_BASELINE",
                    value: other.to_string(),
                    expected: "ready, start",
                })
            }
        };

        Ok(Self {
            port,
            environment: get("ENV").unwrap_or(defaults.environment),
            startup_delay: millis(&get, "STARTUP_DELAY", defaults.startup_delay)?,
            healthz_error_rate,
            export_mode,
            metric_interval: millis(&get, "METRIC_EXPORT_INTERVAL", defaults.metric_interval)?,
            shutdown_grace: millis(&get, "SHUTDOWN_GRACE", defaults.shutdown_grace)?,
            telemetry_shutdown_timeout: millis(
                &get,
                "TELEMETRY_SHUTDOWN_TIMEOUT",
                defaults.telemetry_shutdown_timeout,
            )?,
            uptime_baseline,
        })
    }
}

fn parse_number(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|source| ConfigError::InvalidNumber {
        var,
        value: value.to_string(),
        source,
    })
}

fn millis(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match get(var) {
        Some(value) => Ok(Duration::from_millis(parse_number(var, &value)?)),
        None => Ok(default),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "True" | "yes")
}

/// Version string baked in at build time
///
/// `FUTAR_VERSION` wins when set. Otherwise the version is `local`, suffixed
/// with the build date and git commit when those were provided.
pub fn build_version() -> String {
    compose_version(
        option_env!("FUTAR_VERSION"),
        option_env!("FUTAR_BUILD_DATE"),
        option_env!("FUTAR_GIT_COMMIT"),
    )
}

pub(crate) fn compose_version(
    version: Option<&str>,
    date: Option<&str>,
    commit: Option<&str>,
) -> String {
    if let Some(version) = version.filter(|v| !v.is_empty()) {
        return version.to_string();
    }

    let mut composed = "local".to_string();
    if let Some(date) = date.filter(|d| !d.is_empty()) {
        composed.push_str(&format!(", date={}", date));
    }
    if let Some(commit) = commit.filter(|c| !c.is_empty()) {
        composed.push_str(&format!(", git={}", commit));
    }
    composed
}

/// Short random id distinguishing replicas of the service
pub fn new_instance_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..5].to_string()
}

/// Environment variables sorted by name, with the telemetry credential masked
pub fn redacted_environment(vars: impl IntoIterator<Item = (String, String)>) -> Vec<String> {
    let mut entries: Vec<String> = vars
        .into_iter()
        .map(|(key, value)| {
            if key == CONNECTION_STRING_VAR {
                format!("{}=<redacted>", key)
            } else {
                format!("{}={}", key, value)
            }
        })
        .collect();
    entries.sort();
    entries
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
