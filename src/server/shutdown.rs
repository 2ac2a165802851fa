//! Graceful shutdown handling for futar
//!
//! Handles SIGTERM and SIGINT signals for clean shutdown:
//! - Stops accepting new connections
//! - Lets in-flight requests drain for a bounded grace period
//! - Hands over to telemetry teardown

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Receiving side of the shutdown channel
///
/// Cloned and passed to every component that must stop on shutdown.
#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait for shutdown signal
    pub async fn wait(&mut self) {
        // Sender dropped is treated as shutdown
        let _ = self.receiver.wait_for(|shutdown| *shutdown).await;
    }

    /// Check if shutdown was signaled (non-blocking)
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Controller for triggering shutdown
pub struct ShutdownController {
    sender: watch::Sender<bool>,
}

impl ShutdownController {
    /// Trigger shutdown
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
        info!("Shutdown signal sent");
    }
}

/// Create a new shutdown signal pair
///
/// Returns (controller, signal) where:
/// - controller: Used to trigger shutdown
/// - signal: Cloned and passed to components that need to listen
pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownController { sender }, ShutdownSignal { receiver })
}

/// Wait for SIGTERM or SIGINT signal
///
/// Returns the signal name that was received, or an error if the signal
/// handlers could not be registered.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    info!(signal = name, "Received termination signal");
    Ok(name)
}

/// Wait for Ctrl+C signal (Windows)
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C");
    Ok("CTRL_C")
}

/// Wait for a server task to finish draining, for at most `grace`
///
/// Returns `None` when the grace period ran out; the task is aborted then.
pub async fn drain<T>(handle: JoinHandle<T>, grace: Duration) -> Option<T> {
    let abort = handle.abort_handle();
    match tokio::time::timeout(grace, handle).await {
        Ok(Ok(output)) => Some(output),
        Ok(Err(e)) => {
            warn!(error = %e, "Server task did not complete cleanly");
            None
        }
        Err(_) => {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "Grace period elapsed, aborting in-flight requests"
            );
            abort.abort();
            None
        }
    }
}
