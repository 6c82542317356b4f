//! Batch accumulation over a queue.
//!
//! Records are grouped into sequentially numbered batches. A batch is flushed
//! according to its [`FlushPolicy`]; all records of a flushed batch are
//! processed concurrently and the next batch starts only after the whole
//! batch has finished. The trailing partial batch is flushed when the queue
//! closes.

use super::consumer::ConsumerReport;
use super::queue::BoundedQueue;
use futures::future::join_all;
use std::sync::Arc;
use tickflow_core::{FlushPolicy, ItemFailure, PipelineError, RecordProcessor, Result, StockData};
use tracing::{debug, error, info, warn};

/// Ordered group of records, numbered from 1.
#[derive(Debug, Clone)]
pub struct Batch {
    pub number: usize,
    pub records: Vec<StockData>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Groups records into batches according to a flush policy.
#[derive(Debug)]
pub struct BatchAccumulator {
    batch_size: usize,
    policy: FlushPolicy,
    next_number: usize,
    current: Vec<StockData>,
}

impl BatchAccumulator {
    pub fn new(batch_size: usize, policy: FlushPolicy) -> Result<Self> {
        if batch_size == 0 {
            return Err(PipelineError::invalid_input("batch size must be at least 1"));
        }

        Ok(Self {
            batch_size,
            policy,
            next_number: 1,
            current: Vec::with_capacity(batch_size + 1),
        })
    }

    /// Add a record; returns the batch to flush when the policy triggers.
    pub fn push(&mut self, record: StockData) -> Option<Batch> {
        self.current.push(record);
        if self.policy.should_flush(self.current.len(), self.batch_size) {
            Some(self.cut())
        } else {
            None
        }
    }

    /// Remaining partial batch, if any.
    pub fn finish(&mut self) -> Option<Batch> {
        (!self.current.is_empty()).then(|| self.cut())
    }

    fn cut(&mut self) -> Batch {
        let records = std::mem::replace(&mut self.current, Vec::with_capacity(self.batch_size + 1));
        let batch = Batch {
            number: self.next_number,
            records,
        };
        self.next_number += 1;
        batch
    }
}

/// Outcome of draining a queue in batches.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub consumer: ConsumerReport,
    /// Size of every flushed batch, in flush order
    pub batch_sizes: Vec<usize>,
}

/// Drain `queue` through `accumulator`, processing each flushed batch concurrently.
pub async fn consume_in_batches<P>(
    queue: &BoundedQueue<StockData>,
    mut accumulator: BatchAccumulator,
    processor: Arc<P>,
) -> BatchReport
where
    P: RecordProcessor + ?Sized,
{
    let mut report = BatchReport::default();

    loop {
        match queue.dequeue().await {
            Ok(Some(record)) => {
                if let Some(batch) = accumulator.push(record) {
                    process_batch(&*processor, batch, &mut report).await;
                }
            }
            Ok(None) => break,
            Err(e) if e.is_cancelled() => {
                report.consumer.cancelled = true;
                break;
            }
            Err(e) => {
                error!(error = %e, "Queue fault while batching");
                report.consumer.failures.push(ItemFailure::new("batch-accumulator", e));
                break;
            }
        }
    }

    // Records already taken off the queue are processed even after cancellation.
    if let Some(batch) = accumulator.finish() {
        process_batch(&*processor, batch, &mut report).await;
    }

    report
}

async fn process_batch<P>(processor: &P, batch: Batch, report: &mut BatchReport)
where
    P: RecordProcessor + ?Sized,
{
    info!(batch = batch.number, size = batch.len(), "Processing batch");
    report.batch_sizes.push(batch.len());

    let results = join_all(batch.records.iter().map(|record| processor.process(record))).await;

    for (record, result) in batch.records.iter().zip(results) {
        match result {
            Ok(_) => {
                report.consumer.processed += 1;
                debug!(symbol = %record.symbol, "Completed processing");
            }
            Err(e) => {
                warn!(symbol = %record.symbol, error = %e, "Batch item failed");
                report
                    .consumer
                    .failures
                    .push(ItemFailure::new(record.symbol.clone(), e));
            }
        }
    }

    info!(batch = batch.number, "Completed batch");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_stock;

    fn sizes(policy: FlushPolicy, items: usize, batch_size: usize) -> Vec<usize> {
        let mut acc = BatchAccumulator::new(batch_size, policy).unwrap();
        let mut out = Vec::new();
        for i in 0..items {
            if let Some(batch) = acc.push(sample_stock(&format!("S{}", i))) {
                out.push(batch.len());
            }
        }
        if let Some(batch) = acc.finish() {
            out.push(batch.len());
        }
        out
    }

    #[test]
    fn test_at_size_partition() {
        assert_eq!(sizes(FlushPolicy::AtSize, 25, 10), vec![10, 10, 5]);
        assert_eq!(sizes(FlushPolicy::AtSize, 20, 10), vec![10, 10]);
    }

    #[test]
    fn test_exceed_size_partition() {
        assert_eq!(sizes(FlushPolicy::ExceedSize, 25, 10), vec![11, 11, 3]);
        assert_eq!(sizes(FlushPolicy::ExceedSize, 22, 10), vec![11, 11]);
    }

    #[test]
    fn test_batches_numbered_from_one() {
        let mut acc = BatchAccumulator::new(1, FlushPolicy::AtSize).unwrap();
        let first = acc.push(sample_stock("A")).unwrap();
        let second = acc.push(sample_stock("B")).unwrap();
        assert_eq!((first.number, second.number), (1, 2));
        assert!(acc.finish().is_none());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(BatchAccumulator::new(0, FlushPolicy::AtSize).is_err());
    }
}
