//! Tickflow Pipeline - concurrency-controlled bulk loading
//!
//! Loads a list of record identifiers with a bounded number of in-flight
//! loads, hands the records to processors through a bounded queue, and
//! reports progress as it goes:
//! - Producer/consumer runs with backpressure and several consumers
//! - Batched processing with an explicit flush policy
//! - Completion-ordered streaming of loads
//! - Ordered bulk loads with progress reporting
//! - A two-stage load/analyse pipeline
//! - Price and volume alerting over record streams
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tickflow_core::PipelineConfig;
//! use tickflow_pipeline::{discover_inputs, AnalysisProcessor, JsonFileLoader, Pipeline};
//!
//! # async fn run() -> tickflow_core::Result<()> {
//! let config = PipelineConfig::default();
//! let ids = discover_inputs(&config.data_dir)?;
//! let pipeline = Pipeline::new(
//!     config.clone(),
//!     Arc::new(JsonFileLoader::new(&config.data_dir)),
//!     Arc::new(AnalysisProcessor::new()),
//! );
//!
//! let report = pipeline.run_producer_consumer(ids, 5, 3).await?;
//! println!("{} of {} processed", report.processed, report.total);
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `progress` - console progress bar reporter (indicatif)

pub mod alerts;
pub mod concurrent;
pub mod fixtures;
pub mod loader;
pub mod orchestrator;
pub mod processor;
pub mod testing;

pub use concurrent::{
    AsCompleted, BoundedQueue, CollectingReporter, ConcurrencyLimiter, NoopReporter,
    ProgressTracker, QueueOptions, TracingReporter,
};
pub use fixtures::generate_fixtures;
pub use loader::{discover_inputs, JsonFileLoader};
pub use orchestrator::{Pipeline, RunReport};
pub use processor::AnalysisProcessor;

#[cfg(feature = "progress")]
pub use concurrent::ConsoleProgressBar;
