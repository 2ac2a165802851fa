use anyhow::Context as _;
use futar::config::{self, Config, SERVICE_NAME};
use futar::server::{
    drain, schedule_ready, serve, shutdown_channel, wait_for_signal, ProbeMetrics,
    ReadinessGate, ServerState, ServiceInfo,
};
use futar::telemetry::{
    init_subscriber, ServiceIdentity, TelemetryError, TelemetryLifecycle, TelemetrySettings,
};
use opentelemetry::metrics::MeterProvider as _;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Cleanup budget when telemetry bootstrap fails halfway
const BOOTSTRAP_CLEANUP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;
    let version = config::build_version();
    let instance_id = config::new_instance_id();

    // Exporters are built before the async runtime exists: the OTLP HTTP
    // exporter uses a blocking client that must not be created inside it.
    let telemetry = match config.export_mode {
        Some(mode) => Some(
            TelemetryLifecycle::bootstrap(&TelemetrySettings {
                identity: ServiceIdentity {
                    name: SERVICE_NAME.to_string(),
                    version: version.clone(),
                    instance_id: instance_id.clone(),
                },
                export_mode: mode,
                metric_interval: config.metric_interval,
                cleanup_timeout: BOOTSTRAP_CLEANUP_TIMEOUT,
            })
            .context("Failed to initialize telemetry")?,
        ),
        None => None,
    };

    init_subscriber(telemetry.as_ref()).context("Failed to initialize logging")?;
    if let Some(mode) = config.export_mode {
        info!(
            service = SERVICE_NAME,
            version = %version,
            instance_id = %instance_id,
            mode = ?mode,
            "Telemetry pipeline initialized"
        );
    }

    info!(
        version = %version,
        instance_id = %instance_id,
        telemetry = ?config.export_mode,
        "Application is starting"
    );
    debug!(
        environment = %config::redacted_environment(std::env::vars()).join("\n"),
        "Environment variables"
    );

    let meter = match &telemetry {
        Some(t) => t.meter_provider().meter(SERVICE_NAME),
        None => opentelemetry::global::meter(SERVICE_NAME),
    };

    let readiness = ReadinessGate::new();
    let state = ServerState::new(
        readiness.clone(),
        ServiceInfo {
            name: format!("{}-{}", SERVICE_NAME, instance_id),
            version,
            environment: config.environment.clone(),
            healthz_error_rate: config.healthz_error_rate,
            uptime_baseline: config.uptime_baseline,
        },
        ProbeMetrics::new(&meter),
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let served = runtime.block_on(run(&config, state, readiness));
    drop(runtime);

    let flushed = match &telemetry {
        Some(t) => t.shutdown(config.telemetry_shutdown_timeout),
        None => Ok(()),
    };

    finish(served, flushed)
}

/// Serve until the server fails or a termination signal arrives
async fn run(
    config: &Config,
    state: ServerState,
    readiness: ReadinessGate,
) -> anyhow::Result<()> {
    let (shutdown_controller, shutdown_signal) = shutdown_channel();

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        startup_delay_ms = config.startup_delay.as_millis() as u64,
        healthz_error_rate = config.healthz_error_rate,
        environment = %config.environment,
        "Config"
    );
    schedule_ready(&readiness, config.startup_delay);

    let mut server = tokio::spawn(serve(listener, state, shutdown_signal));

    tokio::select! {
        result = &mut server => {
            // Server stopped on its own: nothing left to drain
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(anyhow::Error::new(e).context("Health server failed")),
                Err(e) => Err(anyhow::Error::new(e).context("Health server task failed")),
            };
        }
        signal = wait_for_signal() => {
            let signal = signal.context("Failed to listen for termination signals")?;
            info!(signal = signal, "Stopping!");
        }
    }

    shutdown_controller.shutdown();

    match drain(server, config.shutdown_grace).await {
        Some(Ok(())) => info!("Health server drained"),
        Some(Err(e)) => warn!(error = %e, "Health server stopped with error"),
        None => {}
    }
    Ok(())
}

/// Combine the serving outcome with the telemetry teardown outcome
fn finish(served: anyhow::Result<()>, flushed: Result<(), TelemetryError>) -> anyhow::Result<()> {
    match (served, flushed) {
        (Ok(()), Ok(())) => {
            info!("futar shut down gracefully");
            Ok(())
        }
        (Ok(()), Err(e)) => Err(anyhow::Error::new(e).context("Telemetry shutdown failed")),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(flush)) => {
            error!(error = %flush, "Telemetry shutdown failed");
            Err(e.context(format!("telemetry shutdown also failed: {}", flush)))
        }
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
