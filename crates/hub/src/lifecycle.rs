//! Graceful shutdown signalling
//!
//! Every background loop subscribes to one broadcast channel and stops at
//! its next suspension point when the channel fires.

use tokio::sync::broadcast;
use tracing::info;

/// Shutdown signal receiver type
pub type ShutdownReceiver = broadcast::Receiver<()>;

/// Shutdown fan-out for the hub's background loops
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Get a receiver for one background loop.
    pub fn subscribe(&self) -> ShutdownReceiver {
        self.tx.subscribe()
    }

    /// Signal every subscriber to stop.
    pub fn trigger(&self) {
        info!("Shutdown signalled");
        let _ = self.tx.send(());
    }

    /// Block until SIGTERM or SIGINT, then signal shutdown.
    #[cfg(unix)]
    #[allow(clippy::expect_used)] // Signal handler setup failure is unrecoverable
    pub async fn wait_for_signal(&self) {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }

        self.trigger();
    }

    /// Block until Ctrl+C, then signal shutdown.
    #[cfg(not(unix))]
    #[allow(clippy::expect_used)] // Signal handler setup failure is unrecoverable
    pub async fn wait_for_signal(&self) {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received Ctrl+C");
        self.trigger();
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
