//! Readiness gate shared between the startup timer and the probe handlers
//!
//! The gate is a one-way latch: it starts not ready, flips to ready exactly
//! once, and wakes every waiter on that flip. State and broadcast live in the
//! same `watch` channel so a waiter can never check, miss the transition, and
//! then sleep forever.

use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Cloneable handle to the process readiness state
///
/// Clones share the same state; hand one to every component that needs to
/// query or wait on readiness.
#[derive(Clone)]
pub struct ReadinessGate {
    /// `None` while not ready, `Some(since)` once ready
    state: Arc<watch::Sender<Option<DateTime<Utc>>>>,
    clock: Arc<dyn Clock>,
}

impl ReadinessGate {
    /// Create a new gate (initially not ready)
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a gate that timestamps the ready transition with `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            state: Arc::new(sender),
            clock,
        }
    }

    /// Check if the service is ready
    pub fn is_ready(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// When the gate flipped to ready, if it has
    pub fn ready_since(&self) -> Option<DateTime<Utc>> {
        *self.state.borrow()
    }

    /// Mark the service as ready and release all waiters
    ///
    /// Returns `true` only for the call that performed the transition.
    /// Later calls leave the original timestamp in place and notify nobody.
    pub fn mark_ready(&self) -> bool {
        let now = self.clock.now();
        let flipped = self.state.send_if_modified(|since| {
            if since.is_some() {
                return false;
            }
            *since = Some(now);
            true
        });

        if flipped {
            info!(ready_since = %now, "Application is ready");
        }
        flipped
    }

    /// Receiver that observes the ready transition
    ///
    /// Marks the current state as seen; it reports a change at most once.
    pub fn subscribe(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.state.subscribe()
    }

    /// Wait until the service is ready
    ///
    /// Returns immediately if already ready.
    pub async fn wait_ready(&self) {
        let mut receiver = self.subscribe();
        // The sender is owned by `self`, so the channel stays open for the whole wait.
        if receiver.wait_for(Option::is_some).await.is_err() {
            warn!("Readiness channel closed while waiting");
        }
    }

    /// Blocking variant of [`wait_ready`](Self::wait_ready) for plain threads
    ///
    /// Must not be called from inside an async task.
    pub fn wait_ready_blocking(&self) {
        futures::executor::block_on(self.wait_ready());
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Schedule the startup transition to ready
///
/// A zero delay marks the gate ready before returning, so the server never
/// observes a not-ready window. Otherwise a timer task flips the gate once
/// `delay` has elapsed and its handle is returned.
pub fn schedule_ready(gate: &ReadinessGate, delay: Duration) -> Option<JoinHandle<()>> {
    if delay.is_zero() {
        gate.mark_ready();
        return None;
    }

    let gate = gate.clone();
    Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        gate.mark_ready();
    }))
}
