//! Counting permit pool bounding simultaneous in-flight loads.
//!
//! Permits are scoped: [`LimiterPermit`] releases its slot on drop, so the
//! release runs on every exit path of the guarded operation. There is no
//! way to release a permit that was never acquired.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tickflow_core::{PipelineError, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Default)]
struct LimiterStats {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    acquired: AtomicUsize,
}

/// Bounds the number of concurrently running operations to `max_concurrency`.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    stats: Arc<LimiterStats>,
}

impl ConcurrencyLimiter {
    /// Create a limiter admitting at most `max_concurrency` holders.
    pub fn new(max_concurrency: usize) -> Result<Self> {
        if max_concurrency == 0 {
            return Err(PipelineError::invalid_input(
                "concurrency limit must be at least 1",
            ));
        }

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            stats: Arc::new(LimiterStats::default()),
        })
    }

    /// Wait for a free permit.
    ///
    /// Fails with `Cancelled` once the limiter has been closed.
    pub async fn acquire(&self) -> Result<LimiterPermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::Cancelled)?;

        Ok(self.track(permit))
    }

    /// Wait for a free permit unless `token` is cancelled first.
    pub async fn acquire_cancellable(&self, token: &CancellationToken) -> Result<LimiterPermit> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(PipelineError::Cancelled),
            permit = self.acquire() => permit,
        }
    }

    /// Take a permit only if one is free right now.
    pub fn try_acquire(&self) -> Option<LimiterPermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| self.track(permit))
    }

    /// Refuse all pending and future acquisitions. Held permits stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held
    pub fn in_flight(&self) -> usize {
        self.stats.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of permits held at the same time since creation
    pub fn peak_in_flight(&self) -> usize {
        self.stats.peak.load(Ordering::SeqCst)
    }

    /// Total permits handed out since creation
    pub fn acquired_total(&self) -> usize {
        self.stats.acquired.load(Ordering::SeqCst)
    }

    fn track(&self, permit: OwnedSemaphorePermit) -> LimiterPermit {
        let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak.fetch_max(now, Ordering::SeqCst);
        self.stats.acquired.fetch_add(1, Ordering::SeqCst);
        trace!(in_flight = now, "Limiter permit acquired");

        LimiterPermit {
            stats: Arc::clone(&self.stats),
            _permit: permit,
        }
    }
}

/// A held slot of a [`ConcurrencyLimiter`]; dropping it is the release.
#[derive(Debug)]
pub struct LimiterPermit {
    stats: Arc<LimiterStats>,
    // Dropped after `Drop::drop` runs, so the counter falls before the slot frees.
    _permit: OwnedSemaphorePermit,
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(matches!(
            ConcurrencyLimiter::new(0),
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_permits_are_bounded() {
        let limiter = ConcurrencyLimiter::new(2).unwrap();

        let a = limiter.acquire().await.unwrap();
        let _b = limiter.acquire().await.unwrap();
        assert_eq!(limiter.in_flight(), 2);
        assert_eq!(limiter.available(), 0);
        assert!(limiter.try_acquire().is_none());

        drop(a);
        assert_eq!(limiter.in_flight(), 1);
        assert!(limiter.try_acquire().is_some());
        assert_eq!(limiter.peak_in_flight(), 2);
        assert_eq!(limiter.acquired_total(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_release() {
        let limiter = ConcurrencyLimiter::new(1).unwrap();
        let held = limiter.acquire().await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_acquire() {
        let limiter = ConcurrencyLimiter::new(1).unwrap();
        let _held = limiter.acquire().await.unwrap();
        let token = CancellationToken::new();

        let waiter = {
            let limiter = limiter.clone();
            let token = token.clone();
            tokio::spawn(async move { limiter.acquire_cancellable(&token).await.map(|_| ()) })
        };

        token.cancel();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(limiter.acquired_total(), 1);
    }

    #[tokio::test]
    async fn test_close_rejects_acquire() {
        let limiter = ConcurrencyLimiter::new(3).unwrap();
        let held = limiter.acquire().await.unwrap();

        limiter.close();
        assert!(limiter.is_closed());
        assert!(limiter.acquire().await.unwrap_err().is_cancelled());

        drop(held);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_release_on_panic() {
        let limiter = ConcurrencyLimiter::new(1).unwrap();

        let task = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let _permit = limiter.acquire().await.unwrap();
                panic!("load blew up");
            })
        };
        assert!(task.await.is_err());

        assert_eq!(limiter.in_flight(), 0);
        assert_eq!(limiter.available(), 1);
    }
}
