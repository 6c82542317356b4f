//! Limiter-gated fan-out of loads into a bounded queue.
//!
//! ```text
//! identifiers ──▶ acquire permit ──▶ spawn load ──┬─ ok ──▶ enqueue (may wait) ──▶ progress
//!                      ▲                           └─ err ─▶ record failure ──────▶ progress
//!                      └── stops on cancellation
//! ```
//!
//! A failed load never affects its siblings. Once every dispatched load has
//! resolved the queue is completed, exactly once.

use super::limiter::{ConcurrencyLimiter, LimiterPermit};
use super::progress::ProgressTracker;
use super::queue::BoundedQueue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tickflow_core::{ItemFailure, PipelineError, RecordLoader, Result, StockData};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Summary of one producer run.
#[derive(Debug, Default)]
pub struct ProducerReport {
    /// Requests whose load was started
    pub dispatched: usize,
    /// Records written to the queue
    pub loaded: usize,
    pub failures: Vec<ItemFailure>,
    /// Requests never started because the run was cancelled
    pub skipped: usize,
    pub cancelled: bool,
}

enum ItemOutcome {
    Loaded,
    Failed(ItemFailure),
}

/// Fans out loads under a [`ConcurrencyLimiter`] and feeds a [`BoundedQueue`].
pub struct Producer<L> {
    loader: Arc<L>,
    limiter: ConcurrencyLimiter,
    load_timeout: Option<Duration>,
}

impl<L> Producer<L>
where
    L: RecordLoader + 'static,
{
    pub fn new(loader: Arc<L>, limiter: ConcurrencyLimiter) -> Self {
        Self {
            loader,
            limiter,
            load_timeout: None,
        }
    }

    /// Bound each individual load; expiry fails that item with `Timeout`.
    pub fn with_load_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Load every identifier and enqueue the successes.
    pub async fn produce(
        &self,
        identifiers: Vec<String>,
        queue: Arc<BoundedQueue<StockData>>,
        progress: Arc<ProgressTracker>,
        cancel: CancellationToken,
    ) -> Result<ProducerReport> {
        let mut report = ProducerReport::default();
        let mut tasks = JoinSet::new();
        let mut names = HashMap::new();

        let mut pending = identifiers.into_iter();
        while let Some(identifier) = pending.next() {
            let permit = match self.limiter.acquire_cancellable(&cancel).await {
                Ok(permit) => permit,
                Err(_) => {
                    report.skipped = 1 + pending.len();
                    debug!(skipped = report.skipped, "Dispatch stopped by cancellation");
                    break;
                }
            };

            report.dispatched += 1;
            let handle = tasks.spawn(produce_one(
                Arc::clone(&self.loader),
                identifier.clone(),
                Arc::clone(&queue),
                Arc::clone(&progress),
                cancel.clone(),
                self.load_timeout,
                permit,
            ));
            names.insert(handle.id(), identifier);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, ItemOutcome::Loaded)) => report.loaded += 1,
                Ok((_, ItemOutcome::Failed(failure))) => report.failures.push(failure),
                Err(join_error) => {
                    let identifier = names.remove(&join_error.id()).unwrap_or_default();
                    error!(identifier = %identifier, error = %join_error, "Load task aborted");
                    progress.completed(&identifier, Some(join_error.to_string()));
                    report.failures.push(ItemFailure::new(
                        identifier,
                        PipelineError::Other(anyhow::anyhow!("load task failed: {}", join_error)),
                    ));
                }
            }
        }

        queue.complete()?;
        report.cancelled = cancel.is_cancelled();

        info!(
            dispatched = report.dispatched,
            loaded = report.loaded,
            failed = report.failures.len(),
            skipped = report.skipped,
            cancelled = report.cancelled,
            "Producer finished"
        );
        Ok(report)
    }
}

async fn produce_one<L: RecordLoader + ?Sized>(
    loader: Arc<L>,
    identifier: String,
    queue: Arc<BoundedQueue<StockData>>,
    progress: Arc<ProgressTracker>,
    cancel: CancellationToken,
    load_timeout: Option<Duration>,
    _permit: LimiterPermit,
) -> ItemOutcome {
    progress.pending(&identifier);

    let result = match guarded_load(&*loader, &identifier, load_timeout, &cancel).await {
        Ok(record) => {
            let symbol = record.symbol.clone();
            queue.enqueue(record).await.map(|()| symbol)
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(symbol) => {
            debug!(identifier = %identifier, symbol = %symbol, "Produced record");
            progress.completed(&identifier, None);
            ItemOutcome::Loaded
        }
        Err(e) => {
            warn!(identifier = %identifier, error = %e, "Failed to produce record");
            progress.completed(&identifier, Some(e.to_string()));
            ItemOutcome::Failed(ItemFailure::new(identifier, e))
        }
    }
}

/// Run one load under its per-call deadline and the run's cancellation scope.
///
/// The two are independent: an expired deadline fails only this load with
/// `Timeout`, while cancellation yields `Cancelled`.
pub async fn guarded_load<L: RecordLoader + ?Sized>(
    loader: &L,
    identifier: &str,
    load_timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<StockData> {
    let load = async {
        match load_timeout {
            Some(after) => tokio::time::timeout(after, loader.load_one(identifier))
                .await
                .map_err(|_| PipelineError::timeout(identifier, after))?,
            None => loader.load_one(identifier).await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        result = load => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrent::progress::CollectingReporter;
    use crate::concurrent::queue::QueueOptions;
    use crate::testing::{sample_stock, ScriptedLoader};

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let loader = Arc::new(ScriptedLoader::new().fail_not_found("bad"));
        let producer = Producer::new(loader, ConcurrencyLimiter::new(2).unwrap());
        let queue = Arc::new(BoundedQueue::new(QueueOptions::bounded(8)).unwrap());
        let sink = Arc::new(CollectingReporter::new());
        let progress = Arc::new(ProgressTracker::new(4, sink.clone()));

        let report = producer
            .produce(
                ids(&["A", "bad", "B", "C"]),
                Arc::clone(&queue),
                progress,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.dispatched, 4);
        assert_eq!(report.loaded, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].identifier, "bad");
        assert!(report.failures[0].error.is_not_found());
        assert!(queue.is_completed());
        assert_eq!(queue.len(), 3);
        assert_eq!(sink.error_events().len(), 1);
    }

    #[tokio::test]
    async fn test_pending_and_completed_phases_reported() {
        let loader = Arc::new(ScriptedLoader::new());
        let producer = Producer::new(loader, ConcurrencyLimiter::new(1).unwrap());
        let queue = Arc::new(BoundedQueue::new(QueueOptions::bounded(4)).unwrap());
        let sink = Arc::new(CollectingReporter::new());
        let progress = Arc::new(ProgressTracker::new(2, sink.clone()));

        producer
            .produce(ids(&["A", "B"]), queue, progress, CancellationToken::new())
            .await
            .unwrap();

        let completed: Vec<_> = sink.events().iter().map(|e| e.completed).collect();
        assert_eq!(completed, vec![0, 1, 1, 2]);
    }

    #[tokio::test]
    async fn test_single_permit_dispatches_in_input_order() {
        let loader = Arc::new(ScriptedLoader::new());
        let producer = Producer::new(Arc::clone(&loader), ConcurrencyLimiter::new(1).unwrap());
        let queue = Arc::new(BoundedQueue::new(QueueOptions::bounded(4)).unwrap());

        producer
            .produce(
                ids(&["C", "A", "D", "B"]),
                queue,
                Arc::new(ProgressTracker::silent(4)),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(loader.started(), ids(&["C", "A", "D", "B"]));
        assert_eq!(producer.limiter().acquired_total(), 4);
        assert_eq!(producer.limiter().peak_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_timeout_is_per_item() {
        let loader = Arc::new(
            ScriptedLoader::new()
                .with_delay("slow", Duration::from_secs(10))
                .with_delay("quick", Duration::from_millis(5)),
        );
        let producer = Producer::new(loader, ConcurrencyLimiter::new(2).unwrap())
            .with_load_timeout(Some(Duration::from_secs(1)));
        let queue = Arc::new(BoundedQueue::new(QueueOptions::bounded(4)).unwrap());
        let cancel = CancellationToken::new();

        let report = producer
            .produce(
                ids(&["slow", "quick"]),
                queue,
                Arc::new(ProgressTracker::silent(2)),
                cancel.clone(),
            )
            .await
            .unwrap();

        assert_eq!(report.loaded, 1);
        assert!(report.failures[0].error.is_timeout());
        assert!(!report.cancelled);
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_guarded_load_cancelled() {
        let loader = ScriptedLoader::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = guarded_load(&loader, "A", None, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_guarded_load_success() {
        let loader = ScriptedLoader::new();
        let record = guarded_load(&loader, "MSFT", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(record, sample_stock("MSFT"));
    }
}
