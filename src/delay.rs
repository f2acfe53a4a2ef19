//! Cancellable delay.
//!
//! `wait_millis` is a thin coat over `tokio::time::sleep`; the cancellable
//! variant resolves early and quietly when its [`CancelSource`] fires, which
//! is what test code wants when it gives up waiting. Cancellation resolves
//! the wait rather than erroring it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Owning side of a cancellation pair.
#[derive(Clone, Debug, Default)]
pub struct CancelSource {
    inner: Arc<CancelInner>,
}

impl CancelSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Cancel every wait holding a signal from this source, including waits
    /// that have not started yet.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }
}

/// Listening side of a cancellation pair.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    inner: Arc<CancelInner>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register the waiter before re-checking the flag so a concurrent
        // cancel cannot slip between the check and the await.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Resolve after `millis` milliseconds.
pub async fn wait_millis(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

/// Resolve after `millis` milliseconds, or as soon as `signal` is cancelled,
/// whichever comes first.
pub async fn wait_millis_cancellable(millis: u64, signal: &CancelSignal) {
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(millis)) => {}
        _ = signal.cancelled() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_waits_the_full_duration() {
        let start = tokio::time::Instant::now();
        wait_millis(1000).await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_wait_resolves_immediately() {
        let source = CancelSource::new();
        let signal = source.signal();
        source.cancel();

        let start = tokio::time::Instant::now();
        wait_millis_cancellable(60_000, &signal).await;
        assert!(start.elapsed() < Duration::from_millis(60_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_wakes_an_in_flight_wait() {
        let source = CancelSource::new();
        let signal = source.signal();
        let start = tokio::time::Instant::now();

        let waiter = tokio::spawn(async move {
            wait_millis_cancellable(60_000, &signal).await;
        });
        tokio::task::yield_now().await;
        source.cancel();
        waiter.await.unwrap();

        assert!(start.elapsed() < Duration::from_millis(60_000));
    }

    #[tokio::test]
    async fn test_is_cancelled_reflects_source_state() {
        let source = CancelSource::new();
        let signal = source.signal();
        assert!(!signal.is_cancelled());
        source.cancel();
        assert!(signal.is_cancelled());
    }
}
