//! Capability traits implemented by pipeline collaborators.

use crate::analysis::StockAnalysis;
use crate::error::Result;
use crate::types::{ProgressEvent, StockData};
use async_trait::async_trait;
use std::sync::Arc;

/// Loads one record from an input source.
#[async_trait]
pub trait RecordLoader: Send + Sync {
    /// Load and decode the record behind `identifier`.
    ///
    /// Fails with `NotFound`, `Decode`, `Timeout` or a wrapped I/O error.
    async fn load_one(&self, identifier: &str) -> Result<StockData>;
}

/// Per-item processing step applied by consumers.
#[async_trait]
pub trait RecordProcessor: Send + Sync {
    async fn process(&self, record: &StockData) -> Result<StockAnalysis>;
}

/// Sink for progress events.
///
/// Called concurrently from producer tasks; implementations keep the
/// critical section short and never block on unbounded work.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

impl<F> ProgressReporter for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn report(&self, event: &ProgressEvent) {
        self(event)
    }
}

#[async_trait]
impl<T: RecordLoader + ?Sized> RecordLoader for Arc<T> {
    async fn load_one(&self, identifier: &str) -> Result<StockData> {
        (**self).load_one(identifier).await
    }
}

#[async_trait]
impl<T: RecordProcessor + ?Sized> RecordProcessor for Arc<T> {
    async fn process(&self, record: &StockData) -> Result<StockAnalysis> {
        (**self).process(record).await
    }
}
