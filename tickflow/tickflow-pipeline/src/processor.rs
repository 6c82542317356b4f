//! Default processing step: compute indicators for each record.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tickflow_core::{PipelineError, RecordProcessor, Result, StockAnalysis, StockData};
use tracing::trace;

/// Computes a [`StockAnalysis`] per record and keeps the results.
#[derive(Debug, Default)]
pub struct AnalysisProcessor {
    delay: Duration,
    reporter: Option<String>,
    analyses: Mutex<Vec<StockAnalysis>>,
}

impl AnalysisProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated I/O time spent per record (saving, notifying, ...).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Name stamped on every analysis
    pub fn with_reporter(mut self, reporter: impl Into<String>) -> Self {
        self.reporter = Some(reporter.into());
        self
    }

    /// Analyses produced so far, in completion order
    pub fn analyses(&self) -> Vec<StockAnalysis> {
        self.analyses.lock().clone()
    }

    pub fn take_analyses(&self) -> Vec<StockAnalysis> {
        std::mem::take(&mut *self.analyses.lock())
    }
}

#[async_trait]
impl RecordProcessor for AnalysisProcessor {
    async fn process(&self, record: &StockData) -> Result<StockAnalysis> {
        let mut analysis = StockAnalysis::from_record(record)
            .ok_or_else(|| PipelineError::processing(&record.symbol, "record has no daily data"))?;

        if let Some(reporter) = &self.reporter {
            analysis = analysis.with_reporter(reporter.clone());
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        trace!(symbol = %analysis.symbol, target_high = analysis.target_high, "Computed analysis");
        self.analyses.lock().push(analysis.clone());
        Ok(analysis)
    }
}
