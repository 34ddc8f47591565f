//! Shutdown broadcast.
//!
//! A one-shot cancellation signal shared by every long-running part of the
//! watcher. Triggering it, or dropping the last trigger, is observed by all
//! receivers and never reverts.

use std::sync::Arc;
use tokio::sync::watch;

/// Fires the shutdown signal
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<bool>>,
}

/// Observes the shutdown signal
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Creates a connected trigger/receiver pair
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx: Arc::new(tx) }, Shutdown { rx })
}

impl ShutdownTrigger {
    /// Signal shutdown to every receiver
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    /// True once shutdown was triggered or every trigger was dropped
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once shutdown is triggered
    pub async fn wait(&mut self) {
        // An error means every trigger is gone, which counts as shutdown
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}
