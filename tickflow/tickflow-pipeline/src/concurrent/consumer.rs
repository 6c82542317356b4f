//! Queue drain loop applying a [`RecordProcessor`] to every record.
//!
//! A processing failure is recorded with the record's symbol and the loop
//! moves on; only queue closure or cancellation ends the drain.

use super::queue::BoundedQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tickflow_core::{ItemFailure, RecordProcessor, StockAnalysis, StockData};
use tracing::{debug, error, info, warn};

/// Summary of one consumer's drain.
#[derive(Debug, Default)]
pub struct ConsumerReport {
    pub processed: usize,
    pub failures: Vec<ItemFailure>,
    pub cancelled: bool,
}

impl ConsumerReport {
    /// Fold another consumer's report into this one.
    pub fn merge(&mut self, other: ConsumerReport) {
        self.processed += other.processed;
        self.failures.extend(other.failures);
        self.cancelled |= other.cancelled;
    }
}

/// Drains a queue of records.
pub struct Consumer<P: ?Sized> {
    name: String,
    processed: AtomicUsize,
    processor: Arc<P>,
}

impl<P> Consumer<P>
where
    P: RecordProcessor + ?Sized,
{
    pub fn new(name: impl Into<String>, processor: Arc<P>) -> Self {
        Self {
            name: name.into(),
            processor,
            processed: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records successfully processed so far; readable while draining.
    pub fn processed_count(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    /// Process records until the queue is closed or cancelled.
    pub async fn consume(&self, queue: &BoundedQueue<StockData>) -> ConsumerReport {
        self.drain(queue, None).await
    }

    /// Like [`consume`](Self::consume), forwarding each analysis downstream.
    pub async fn forward(
        &self,
        queue: &BoundedQueue<StockData>,
        output: &BoundedQueue<StockAnalysis>,
    ) -> ConsumerReport {
        self.drain(queue, Some(output)).await
    }

    async fn drain(
        &self,
        queue: &BoundedQueue<StockData>,
        output: Option<&BoundedQueue<StockAnalysis>>,
    ) -> ConsumerReport {
        let mut report = ConsumerReport::default();

        loop {
            let record = match queue.dequeue().await {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) if e.is_cancelled() => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    error!(consumer = %self.name, error = %e, "Queue fault while draining");
                    report.failures.push(ItemFailure::new(self.name.clone(), e));
                    break;
                }
            };

            let analysis = match self.processor.process(&record).await {
                Ok(analysis) => analysis,
                Err(e) => {
                    warn!(consumer = %self.name, symbol = %record.symbol, error = %e, "Processing failed");
                    report.failures.push(ItemFailure::new(record.symbol, e));
                    continue;
                }
            };

            if let Some(output) = output {
                if let Err(e) = output.enqueue(analysis).await {
                    report.cancelled |= e.is_cancelled();
                    report.failures.push(ItemFailure::new(record.symbol, e));
                    break;
                }
            }

            let total = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
            report.processed += 1;
            debug!(consumer = %self.name, symbol = %record.symbol, total, "Processed record");
        }

        info!(
            consumer = %self.name,
            processed = report.processed,
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "Consumer finished"
        );
        report
    }
}
