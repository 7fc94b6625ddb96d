//! Shutdown signaling for check runs.
//!
//! Abstracts tokio's watch channels into a shutdown signal that one owner
//! fires and any number of workers observe. The signal carries no payload;
//! observing it means "stop at the next safe point".

use tokio::sync::watch;

/// Transmitter side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

/// Receiver side of the shutdown signal.
///
/// Cloning preserves the seen-version of the underlying watch channel, so a
/// receiver cloned before the signal fires will still observe it afterwards.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<()>);

impl ShutdownTx {
    /// Fires the shutdown signal.
    ///
    /// All current and future receivers will observe the signal. Firing more
    /// than once is harmless.
    pub fn shutdown(&self) {
        // An error here means no receivers are left, which is fine.
        let _ = self.0.send(());
    }

    /// Creates a receiver subscribed to this signal.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

impl ShutdownRx {
    /// Completes when the shutdown signal fires.
    ///
    /// If the signal fired before this call, completes immediately. Also
    /// completes if the transmitter was dropped, since no further work can be
    /// coordinated in that case.
    pub async fn signaled(&mut self) {
        let _ = self.0.changed().await;
    }

    /// Returns whether the signal has fired without waiting.
    pub fn is_signaled(&self) -> bool {
        self.0.has_changed().unwrap_or(true)
    }
}

/// Creates a connected shutdown signal pair.
pub fn create_shutdown() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), ShutdownRx(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_is_observed_by_receiver() {
        let (tx, mut rx) = create_shutdown();

        assert!(!rx.is_signaled());

        tx.shutdown();

        rx.signaled().await;
        assert!(rx.is_signaled());
    }

    #[tokio::test]
    async fn clone_preserves_unseen_signal() {
        let (tx, rx) = create_shutdown();

        tx.shutdown();

        let mut cloned = rx.clone();
        cloned.signaled().await;
    }

    #[tokio::test]
    async fn dropped_transmitter_releases_waiters() {
        let (tx, mut rx) = create_shutdown();

        drop(tx);

        rx.signaled().await;
        assert!(rx.is_signaled());
    }
}
