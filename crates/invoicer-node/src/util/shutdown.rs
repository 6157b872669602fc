//! Graceful shutdown on SIGTERM and SIGINT.
//!
//! ```ignore
//! use invoicer_node::util::ShutdownSignal;
//!
//! let shutdown = ShutdownSignal::listen()?;
//! let token = shutdown.token();
//! axum::serve(listener, app)
//!     .with_graceful_shutdown(async move { token.cancelled().await })
//!     .await?;
//! ```

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Cancels a token once the process is asked to stop.
pub struct ShutdownSignal {
    tracker: TaskTracker,
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Installs the signal handlers. Fails if they cannot be registered.
    pub fn listen() -> Result<Self, std::io::Error> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let cancel = token.clone();
        tracker.spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
                _ = cancel.cancelled() => return,
            }
            cancel.cancel();
        });
        tracker.close();
        Ok(Self { tracker, token })
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Requests shutdown without a signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Resolves once shutdown was requested and the listener task ended.
    pub async fn wait(&self) {
        self.token.cancelled().await;
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_releases_waiters() {
        let shutdown = ShutdownSignal::listen().unwrap();
        let token = shutdown.token();
        assert!(!token.is_cancelled());
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .unwrap();
        assert!(token.is_cancelled());
    }
}
