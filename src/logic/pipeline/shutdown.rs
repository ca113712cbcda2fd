//! Shutdown Coordinator
//!
//! Holds the single process-wide stop signal. Tasks receive a
//! [`ShutdownSignal`] and poll it cooperatively; nothing is cancelled by force
//! until the grace period of [`join_with_grace`] runs out.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Lifecycle of the pipeline. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelineState {
    Running = 0,
    Draining = 1,
    Stopped = 2,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => PipelineState::Running,
            1 => PipelineState::Draining,
            _ => PipelineState::Stopped,
        }
    }
}

/// Owner of the stop signal and the pipeline state.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    tx: Arc<watch::Sender<bool>>,
    state: Arc<AtomicU8>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            state: Arc::new(AtomicU8::new(PipelineState::Running as u8)),
        }
    }

    /// Hand out a receiver for a worker task.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Set the stop signal and enter `Draining`. Idempotent.
    pub fn request_stop(&self) {
        if self.advance(PipelineState::Draining) {
            log::info!("Stop requested, pipeline draining");
        }
        self.tx.send_replace(true);
    }

    /// Enter `Stopped`. Also sets the signal in case nobody asked before.
    pub fn mark_stopped(&self) {
        self.tx.send_replace(true);
        if self.advance(PipelineState::Stopped) {
            log::info!("Pipeline stopped");
        }
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_stopping(&self) -> bool {
        *self.tx.borrow()
    }

    /// Move forward to `next`; returns false when already there or beyond.
    fn advance(&self, next: PipelineState) -> bool {
        let prev = self.state.fetch_max(next as u8, Ordering::SeqCst);
        prev < next as u8
    }

    /// Wait for Ctrl+C (or SIGTERM on unix), then request a stop.
    pub async fn listen_for_termination(&self) {
        wait_for_termination().await;
        log::info!("Termination signal received, shutting down gracefully...");
        self.request_stop();
    }
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            log::warn!("SIGTERM handler unavailable ({}), listening for Ctrl+C only", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Read side of the stop signal, one per task.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_stopping(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop is requested. Cancel-safe.
    ///
    /// A dropped coordinator counts as a stop.
    pub async fn stopped(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Join a task, waiting no later than `deadline`.
///
/// A task still running at the deadline is logged as a straggler and aborted.
pub async fn join_with_grace<T>(name: &str, handle: JoinHandle<T>, deadline: Instant) -> Option<T> {
    let abort = handle.abort_handle();

    match tokio::time::timeout_at(deadline, handle).await {
        Ok(Ok(value)) => {
            log::debug!("Task '{}' joined", name);
            Some(value)
        }
        Ok(Err(e)) => {
            log::error!("Task '{}' failed: {}", name, e);
            None
        }
        Err(_) => {
            log::warn!("Task '{}' did not finish within the grace period, aborting", name);
            abort.abort();
            None
        }
    }
}

/// Deadline helper: now + grace.
pub fn grace_deadline(grace: Duration) -> Instant {
    Instant::now() + grace
}

/// Drop the runtime, waiting at most `grace` for blocking-pool threads.
///
/// A device read parked on the blocking pool cannot be cancelled. Past the
/// grace period it is abandoned along with the runtime.
pub fn shutdown_runtime(runtime: tokio::runtime::Runtime, grace: Duration) {
    let started = std::time::Instant::now();
    runtime.shutdown_timeout(grace);
    log::debug!("Runtime shut down in {:?}", started.elapsed());
}
