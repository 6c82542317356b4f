//! Run modes wiring the limiter, queue, producer and consumers together.
//!
//! ```text
//!                  ┌──────────────────────── Pipeline ─────────────────────────┐
//!  identifiers ──▶ │ Producer ──▶ BoundedQueue ──┬─▶ Consumer × K    (run)      │ ──▶ RunReport
//!                  │                             └─▶ BatchAccumulator (batched) │
//!                  │ AsCompleted (stream)   load_all_with_progress (ordered)    │
//!                  └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every mode runs under one child of the pipeline's cancellation token, so
//! [`Pipeline::cancel`] stops whatever is running. A run always resolves to a
//! report; `Err` is reserved for invalid parameters and internal faults.

use crate::concurrent::{
    consume_in_batches, guarded_load, AsCompleted, BatchAccumulator, BoundedQueue,
    ConcurrencyLimiter, Consumer, ConsumerReport, NoopReporter, Producer, ProducerReport,
    ProgressTracker, QueueOptions,
};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tickflow_core::{
    ItemFailure, LoadResult, PipelineConfig, PipelineError, ProgressReporter, RecordLoader,
    RecordProcessor, Result, StockAnalysis, StockData,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Outcome of one pipeline run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Identifiers submitted
    pub total: usize,
    /// Records loaded and queued
    pub loaded: usize,
    /// Records processed successfully
    pub processed: usize,
    pub load_failures: Vec<ItemFailure>,
    pub processing_failures: Vec<ItemFailure>,
    /// Identifiers never dispatched because the run was cancelled
    pub skipped: usize,
    pub cancelled: bool,
    /// Flushed batch sizes, batched mode only
    pub batch_sizes: Vec<usize>,
    pub elapsed: Duration,
}

impl RunReport {
    fn assemble(
        total: usize,
        produced: ProducerReport,
        consumed: ConsumerReport,
        started: Instant,
    ) -> Self {
        Self {
            total,
            loaded: produced.loaded,
            processed: consumed.processed,
            load_failures: produced.failures,
            processing_failures: consumed.failures,
            skipped: produced.skipped,
            cancelled: produced.cancelled || consumed.cancelled,
            batch_sizes: Vec::new(),
            elapsed: started.elapsed(),
        }
    }

    /// Load and processing failures combined
    pub fn failed(&self) -> usize {
        self.load_failures.len() + self.processing_failures.len()
    }

    /// Every identifier was loaded and processed
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failed() == 0 && self.processed == self.total
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemFailure> {
        self.load_failures.iter().chain(self.processing_failures.iter())
    }
}

/// Bulk-load pipeline over a loader and a processor.
pub struct Pipeline<L, P> {
    config: PipelineConfig,
    loader: Arc<L>,
    processor: Arc<P>,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

impl<L, P> Pipeline<L, P>
where
    L: RecordLoader + 'static,
    P: RecordProcessor + 'static,
{
    pub fn new(config: PipelineConfig, loader: Arc<L>, processor: Arc<P>) -> Self {
        Self {
            config,
            loader,
            processor,
            reporter: Arc::new(NoopReporter),
            cancel: CancellationToken::new(),
        }
    }

    /// Progress sink for the queue-based run modes.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn processor(&self) -> &Arc<P> {
        &self.processor
    }

    /// Cancel the current and all future runs of this pipeline.
    pub fn cancel(&self) {
        info!("Pipeline cancellation requested");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token whose cancellation stops the pipeline
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn producer(&self, concurrency: usize) -> Result<Producer<L>> {
        let limiter = ConcurrencyLimiter::new(concurrency)?;
        Ok(Producer::new(Arc::clone(&self.loader), limiter)
            .with_load_timeout(self.config.load_timeout()))
    }

    /// Load with `concurrency` and drain the queue with the configured
    /// number of consumers.
    #[instrument(skip(self, identifiers), fields(total = identifiers.len()))]
    pub async fn run_producer_consumer(
        &self,
        identifiers: Vec<String>,
        queue_capacity: usize,
        concurrency: usize,
    ) -> Result<RunReport> {
        let started = Instant::now();
        let total = identifiers.len();
        let consumers = self.config.consumers.max(1);
        let cancel = self.cancel.child_token();

        let producer = self.producer(concurrency)?;
        let queue = Arc::new(BoundedQueue::with_cancellation(
            QueueOptions::bounded(queue_capacity).single_consumer(consumers == 1),
            cancel.clone(),
        )?);
        let progress = Arc::new(ProgressTracker::new(total, Arc::clone(&self.reporter)));

        info!(total, queue_capacity, concurrency, consumers, "Starting producer/consumer run");

        let mut workers = JoinSet::new();
        let mut names = HashMap::new();
        for index in 0..consumers {
            let consumer = Consumer::new(format!("consumer-{}", index), Arc::clone(&self.processor));
            let queue = Arc::clone(&queue);
            let handle = workers.spawn(async move { consumer.consume(&queue).await });
            names.insert(handle.id(), format!("consumer-{}", index));
        }

        let produce = async {
            let result = producer
                .produce(identifiers, Arc::clone(&queue), progress, cancel.clone())
                .await;
            if result.is_err() {
                queue.cancel();
            }
            result
        };

        // A dead consumer leaves writers blocked on a full queue; cancel the
        // run so they resolve.
        let drain = async {
            let mut consumed = ConsumerReport::default();
            while let Some(joined) = workers.join_next_with_id().await {
                match joined {
                    Ok((_, report)) => consumed.merge(report),
                    Err(join_error) => {
                        let name = names.remove(&join_error.id()).unwrap_or_default();
                        error!(consumer = %name, error = %join_error, "Consumer task aborted, cancelling run");
                        cancel.cancel();
                        consumed.cancelled = true;
                        consumed.failures.push(ItemFailure::new(
                            name,
                            PipelineError::Other(anyhow::anyhow!("consumer task failed: {}", join_error)),
                        ));
                    }
                }
            }
            if !queue.is_completed() && !cancel.is_cancelled() {
                warn!("All consumers exited before the queue was completed, cancelling run");
                cancel.cancel();
            }
            consumed
        };

        let (produced, consumed) = tokio::join!(produce, drain);
        let produced = produced?;

        let report = RunReport::assemble(total, produced, consumed, started);
        log_report("producer/consumer", &report);
        Ok(report)
    }

    /// Load with `concurrency` and process in batches of `batch_size`
    /// under the configured flush policy.
    #[instrument(skip(self, identifiers), fields(total = identifiers.len()))]
    pub async fn run_batched(
        &self,
        identifiers: Vec<String>,
        batch_size: usize,
        concurrency: usize,
    ) -> Result<RunReport> {
        let started = Instant::now();
        let total = identifiers.len();
        let cancel = self.cancel.child_token();

        let accumulator = BatchAccumulator::new(batch_size, self.config.flush_policy)?;
        let producer = self.producer(concurrency)?;
        let queue = Arc::new(BoundedQueue::with_cancellation(
            QueueOptions::bounded(batch_size).single_consumer(true),
            cancel.clone(),
        )?);
        let progress = Arc::new(ProgressTracker::new(total, Arc::clone(&self.reporter)));

        info!(total, batch_size, concurrency, policy = ?self.config.flush_policy, "Starting batched run");

        let (produced, batched) = tokio::join!(
            producer.produce(identifiers, Arc::clone(&queue), progress, cancel),
            consume_in_batches(&queue, accumulator, Arc::clone(&self.processor)),
        );
        let produced = produced?;

        let mut report = RunReport::assemble(total, produced, batched.consumer, started);
        report.batch_sizes = batched.batch_sizes;
        log_report("batched", &report);
        Ok(report)
    }

    /// Start every load now, gated by `concurrency`, and yield results as
    /// they finish.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn stream_as_completed(
        &self,
        identifiers: Vec<String>,
        concurrency: usize,
    ) -> Result<AsCompleted> {
        let limiter = ConcurrencyLimiter::new(concurrency)?;
        info!(total = identifiers.len(), concurrency, "Streaming loads as completed");

        Ok(AsCompleted::launch(
            Arc::clone(&self.loader),
            identifiers,
            limiter,
            self.config.load_timeout(),
            self.cancel.child_token(),
        ))
    }

    /// Load every identifier with `concurrency`, reporting to `reporter`.
    ///
    /// Results come back in input order. Loads that never started because of
    /// cancellation resolve to `Cancelled` without a progress event.
    #[instrument(skip(self, identifiers, reporter), fields(total = identifiers.len()))]
    pub async fn load_all_with_progress(
        &self,
        identifiers: Vec<String>,
        concurrency: usize,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Vec<LoadResult>> {
        let limiter = ConcurrencyLimiter::new(concurrency)?;
        let progress = Arc::new(ProgressTracker::new(identifiers.len(), reporter));
        let cancel = self.cancel.child_token();
        let load_timeout = self.config.load_timeout();

        let handles: Vec<_> = identifiers
            .iter()
            .cloned()
            .map(|identifier| {
                let loader = Arc::clone(&self.loader);
                let limiter = limiter.clone();
                let progress = Arc::clone(&progress);
                let cancel = cancel.clone();

                tokio::spawn(async move {
                    let _permit = match limiter.acquire_cancellable(&cancel).await {
                        Ok(permit) => permit,
                        Err(e) => return Err(ItemFailure::new(identifier, e)),
                    };

                    progress.pending(&identifier);
                    let result = guarded_load(&*loader, &identifier, load_timeout, &cancel).await;
                    progress.completed(&identifier, result.as_ref().err().map(|e| e.to_string()));
                    result.map_err(|e| ItemFailure::new(identifier, e))
                })
            })
            .collect();

        let results = join_all(handles)
            .await
            .into_iter()
            .zip(identifiers)
            .map(|(joined, identifier)| match joined {
                Ok(result) => result,
                Err(join_error) => {
                    error!(identifier = %identifier, error = %join_error, "Load task aborted");
                    progress.completed(&identifier, Some(join_error.to_string()));
                    Err(ItemFailure::new(
                        identifier,
                        PipelineError::Other(anyhow::anyhow!("load task failed: {}", join_error)),
                    ))
                }
            })
            .collect::<Vec<_>>();

        let loaded = results.iter().filter(|r| r.is_ok()).count();
        info!(loaded, failed = results.len() - loaded, peak = limiter.peak_in_flight(), "Bulk load finished");
        Ok(results)
    }

    /// Load, analyse and collect through two bounded stages.
    ///
    /// ```text
    /// loader ──▶ load queue (stage_load_capacity) ──▶ analyzers ──▶ analysis queue (stage_analysis_capacity) ──▶ collector
    /// ```
    #[instrument(skip(self, identifiers), fields(total = identifiers.len()))]
    pub async fn run_analysis_pipeline(
        &self,
        identifiers: Vec<String>,
    ) -> Result<(Vec<StockAnalysis>, RunReport)> {
        let started = Instant::now();
        let total = identifiers.len();
        let cancel = self.cancel.child_token();

        let producer = self.producer(self.config.concurrency)?;
        let loaded: Arc<BoundedQueue<StockData>> = Arc::new(BoundedQueue::with_cancellation(
            QueueOptions::bounded(self.config.stage_load_capacity),
            cancel.clone(),
        )?);
        let analysed: BoundedQueue<StockAnalysis> = BoundedQueue::with_cancellation(
            QueueOptions::bounded(self.config.stage_analysis_capacity).single_consumer(true),
            cancel.clone(),
        )?;
        let progress = Arc::new(ProgressTracker::new(total, Arc::clone(&self.reporter)));

        let analyzers: Vec<_> = (0..self.config.consumers.max(1))
            .map(|index| Consumer::new(format!("analyzer-{}", index), Arc::clone(&self.processor)))
            .collect();

        let analysis_stage = async {
            let reports = join_all(analyzers.iter().map(|a| a.forward(&loaded, &analysed))).await;
            let mut merged = ConsumerReport::default();
            for report in reports {
                merged.merge(report);
            }
            if let Err(e) = analysed.complete() {
                warn!(error = %e, "Analysis queue already completed");
            }
            merged
        };

        let collect_stage = async {
            let mut analyses = Vec::new();
            loop {
                match analysed.dequeue().await {
                    Ok(Some(analysis)) => analyses.push(analysis),
                    Ok(None) => break,
                    Err(e) => {
                        if !e.is_cancelled() {
                            error!(error = %e, "Collector stopped");
                        }
                        break;
                    }
                }
            }
            analyses
        };

        let (produced, consumed, analyses) = tokio::join!(
            producer.produce(identifiers, Arc::clone(&loaded), progress, cancel),
            analysis_stage,
            collect_stage,
        );
        let produced = produced?;

        let report = RunReport::assemble(total, produced, consumed, started);
        log_report("analysis pipeline", &report);
        Ok((analyses, report))
    }
}

fn log_report(mode: &str, report: &RunReport) {
    info!(
        mode,
        total = report.total,
        loaded = report.loaded,
        processed = report.processed,
        failed = report.failed(),
        skipped = report.skipped,
        cancelled = report.cancelled,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Run finished"
    );
}
