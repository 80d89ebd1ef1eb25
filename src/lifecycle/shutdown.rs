//! Shutdown coordination for the gateway.

use tokio::sync::watch;

/// Coordinator for graceful shutdown.
///
/// Backed by a watch channel rather than a broadcast so that a task
/// subscribing after the trigger still observes it.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether shutdown has been triggered.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of [`Shutdown`]. Cheap to clone, one per task.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown is triggered.
    ///
    /// A dropped coordinator counts as a trigger: nobody is left to
    /// keep the subscriber alive.
    pub async fn recv(&mut self) {
        // wait_for checks the current value first, so a trigger that
        // happened before this call is seen immediately.
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }

    /// Whether shutdown has already been triggered.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn late_subscriber_sees_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let mut signal = shutdown.subscribe();
        assert!(signal.is_triggered());
        tokio::time::timeout(Duration::from_secs(1), signal.recv())
            .await
            .expect("signal should resolve after trigger");
    }

    #[tokio::test]
    async fn pending_until_triggered() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();

        let waited = tokio::time::timeout(Duration::from_millis(50), signal.recv()).await;
        assert!(waited.is_err());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), signal.recv())
            .await
            .expect("signal should resolve after trigger");
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn dropped_coordinator_releases_subscribers() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 1);
        drop(shutdown);

        tokio::time::timeout(Duration::from_secs(1), signal.recv())
            .await
            .expect("signal should resolve once the coordinator is gone");
    }
}
