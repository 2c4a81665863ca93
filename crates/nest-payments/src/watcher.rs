//! Payment Status Watcher
//!
//! Polls the gateway for a charge's settlement state on a fixed
//! cadence until it sees `approved` or the watch is cancelled. The
//! watch is an explicit cancellable task: callers hold a
//! [`CancelHandle`] whose lifetime is tied to the payment dialog, so a
//! dismissed dialog can never leave a timer confirming into the void.
//!
//! Poll failures are transient by definition: no backoff, nothing
//! surfaced, the next tick simply retries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::charge::PaymentStatus;
use crate::gateway::PixGateway;

/// Fixed cadence between settlement polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How a watch ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The gateway reported the charge as approved.
    Confirmed,
    /// The watch was cancelled before approval.
    Abandoned,
}

/// Create a linked cancellation pair. Dropping the handle cancels the
/// token, so binding the handle to the dialog's lifetime is enough.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// Revokes the watch it is paired with.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(true);
    }
}

/// Await-side of a cancellation pair.
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Resolve once the paired handle cancels or is dropped.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Polls one charge until settlement or cancellation.
pub struct PaymentWatcher {
    gateway: Arc<dyn PixGateway>,
    charge_id: String,
    interval: Duration,
}

impl PaymentWatcher {
    pub fn new(gateway: Arc<dyn PixGateway>, charge_id: impl Into<String>) -> Self {
        Self {
            gateway,
            charge_id: charge_id.into(),
            interval: POLL_INTERVAL,
        }
    }

    /// Override the poll cadence (tests).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the watch to completion.
    pub async fn watch(self, mut cancel: CancelToken) -> WatchOutcome {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick fires immediately; the cadence starts
        // one full interval after the charge is shown.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!(charge_id = %self.charge_id, "Payment watch cancelled");
                    return WatchOutcome::Abandoned;
                }
                _ = ticker.tick() => {
                    match self.gateway.charge_status(&self.charge_id).await {
                        Ok(PaymentStatus::Approved) => {
                            tracing::info!(charge_id = %self.charge_id, "Charge approved");
                            return WatchOutcome::Confirmed;
                        }
                        Ok(status) => {
                            tracing::trace!(charge_id = %self.charge_id, %status, "Charge not settled yet");
                        }
                        Err(e) => {
                            // Transient: swallowed, retried next tick.
                            tracing::debug!(charge_id = %self.charge_id, error = %e, "Status poll failed");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockPixGateway;
    use tokio::time::timeout;

    const TICK: Duration = Duration::from_millis(5);
    const TEST_DEADLINE: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_watch_confirms_on_approval() {
        let gateway = Arc::new(MockPixGateway::approving_after(2));
        let watcher = PaymentWatcher::new(gateway.clone(), "charge-1").with_interval(TICK);
        let (_handle, token) = cancel_pair();

        let outcome = timeout(TEST_DEADLINE, watcher.watch(token)).await.unwrap();
        assert_eq!(outcome, WatchOutcome::Confirmed);
        assert_eq!(gateway.status_calls(), 3);
    }

    #[tokio::test]
    async fn test_poll_errors_are_transient() {
        let gateway = MockPixGateway::new();
        gateway.push_status(PaymentStatus::Pending);
        gateway.push_failure();
        gateway.push_status(PaymentStatus::Approved);
        let gateway = Arc::new(gateway);

        let watcher = PaymentWatcher::new(gateway.clone(), "charge-1").with_interval(TICK);
        let (_handle, token) = cancel_pair();

        let outcome = timeout(TEST_DEADLINE, watcher.watch(token)).await.unwrap();
        assert_eq!(outcome, WatchOutcome::Confirmed);
        assert_eq!(gateway.status_calls(), 3);
    }

    #[tokio::test]
    async fn test_cancel_abandons_watch() {
        // Gateway that never settles
        let gateway = Arc::new(MockPixGateway::new());
        let watcher = PaymentWatcher::new(gateway, "charge-1").with_interval(TICK);
        let (handle, token) = cancel_pair();

        let task = tokio::spawn(watcher.watch(token));
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let outcome = timeout(TEST_DEADLINE, task).await.unwrap().unwrap();
        assert_eq!(outcome, WatchOutcome::Abandoned);
    }

    #[tokio::test]
    async fn test_dropping_handle_tears_down_watch() {
        let gateway = Arc::new(MockPixGateway::new());
        let watcher = PaymentWatcher::new(gateway, "charge-1").with_interval(TICK);
        let (handle, token) = cancel_pair();

        let task = tokio::spawn(watcher.watch(token));
        drop(handle);

        let outcome = timeout(TEST_DEADLINE, task).await.unwrap().unwrap();
        assert_eq!(outcome, WatchOutcome::Abandoned);
    }
}
