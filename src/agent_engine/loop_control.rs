use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct CancelState {
    flag: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation shared between the executor and its callers.
///
/// The run loop polls [`CancelHandle::is_cancelled`] between actions; the
/// confirmation gate awaits [`CancelHandle::cancelled`] so it can stop
/// mid-wait.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<CancelState>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.0.flag.swap(true, Ordering::AcqRel) {
            tracing::info!("cancellation requested");
        }
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.flag.load(Ordering::Acquire)
    }

    /// Clears the flag at the start of a new run.
    pub fn reset(&self) {
        self.0.flag.store(false, Ordering::Release);
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.0.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancelled_wakes_waiter() {
        let handle = CancelHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("waiter woke")
            .unwrap();
        assert!(handle.is_cancelled());
        handle.reset();
        assert!(!handle.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_returns_immediately() {
        let handle = CancelHandle::new();
        handle.cancel();
        tokio::time::timeout(Duration::from_millis(100), handle.cancelled())
            .await
            .expect("no wait when already cancelled");
    }
}
