//! src/lifecycle/mod.rs
//!
//! Process-wide readiness and shutdown signals. Scheduled work waits on
//! readiness (the gateway said READY) and stops on shutdown.

use tokio::sync::watch;
use tracing::info;

pub struct Lifecycle {
    ready_tx: watch::Sender<bool>,
    shutdown_tx: watch::Sender<bool>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (ready_tx, _) = watch::channel(false);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            ready_tx,
            shutdown_tx,
        }
    }

    /// One-shot: later calls are no-ops.
    pub fn mark_ready(&self) {
        if !self.ready_tx.send_replace(true) {
            info!("Channel connection is ready; scheduled work may start.");
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }

    pub async fn wait_until_ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    pub fn shutdown(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("Shutdown requested.");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Resolves once `shutdown()` has been called (immediately if it already was).
    pub async fn shutdown_requested(&self) {
        let mut rx = self.shutdown_tx.subscribe();
        let _ = rx.wait_for(|stop| *stop).await;
    }
}
