//! Two-phase cooperative shutdown.
//!
//! Shutdown happens in two phases: `quiesce` tells long-running loops to finish their current
//! tick and stop scheduling new work, `stop` releases the resources they were holding (sockets,
//! listeners). Heartbeat loops observe quiesce between ticks; transport tasks park on quiesce and
//! let go of their streams at stop.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
pub struct Stopper {
    inner: Arc<Inner>,
}

struct Inner {
    quiesce_tx: watch::Sender<bool>,
    quiesce_rx: watch::Receiver<bool>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl Stopper {
    pub fn new() -> Stopper {
        let (quiesce_tx, quiesce_rx) = watch::channel(false);
        let (stop_tx, stop_rx) = watch::channel(false);
        Stopper { inner: Arc::new(Inner { quiesce_tx, quiesce_rx, stop_tx, stop_rx }) }
    }

    /// Signal loops to drain. Idempotent.
    pub fn quiesce(&self) {
        let _ = self.inner.quiesce_tx.send(true);
    }

    /// Signal the final phase. Implies `quiesce`. Idempotent.
    pub fn stop(&self) {
        self.quiesce();
        let _ = self.inner.stop_tx.send(true);
    }

    pub fn is_quiescing(&self) -> bool {
        *self.inner.quiesce_rx.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.stop_rx.borrow()
    }

    /// Resolves once `quiesce` has been signalled.
    pub async fn on_quiesce(&self) {
        Self::wait(self.inner.quiesce_rx.clone()).await
    }

    /// Resolves once `stop` has been signalled.
    pub async fn on_stop(&self) {
        Self::wait(self.inner.stop_rx.clone()).await
    }

    async fn wait(mut rx: watch::Receiver<bool>) {
        // The senders live as long as any `Stopper` clone, so `changed` only errors after the
        // last clone is gone, at which point waiting tasks are being torn down anyway.
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for Stopper {
    fn default() -> Self {
        Stopper::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn phases_fire_in_order() {
        let stopper = Stopper::new();
        assert!(!stopper.is_quiescing());
        assert!(!stopper.is_stopped());

        let waiter = stopper.clone();
        let handle = tokio::spawn(async move {
            waiter.on_quiesce().await;
            assert!(!waiter.is_stopped());
            waiter.on_stop().await;
        });

        stopper.quiesce();
        assert!(stopper.is_quiescing());
        assert!(!stopper.is_stopped());

        stopper.stop();
        assert!(stopper.is_stopped());

        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stop_implies_quiesce() {
        let stopper = Stopper::new();
        stopper.stop();
        assert!(stopper.is_quiescing());
        // Already-signalled phases resolve immediately.
        timeout(Duration::from_millis(100), stopper.on_quiesce()).await.unwrap();
        timeout(Duration::from_millis(100), stopper.on_stop()).await.unwrap();
    }
}
