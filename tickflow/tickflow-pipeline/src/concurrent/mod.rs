//! Concurrency building blocks
//!
//! This module provides the pieces the orchestrator wires together:
//! - A permit-based concurrency limiter with in-flight instrumentation
//! - A bounded multi-producer/multi-consumer queue with one-shot completion
//! - Progress tracking with pluggable reporters
//! - A limiter-gated producer feeding the queue
//! - Queue-draining consumers, one record or one batch at a time
//! - Completion-ordered streaming of loads
//!
//! # Data Flow
//!
//! ```text
//! ┌──────────┐  permit  ┌──────────────┐ enqueue ┌──────────────┐ dequeue ┌──────────┐
//! │ Producer │ ───────▶ │ load (N max) │ ──────▶ │ BoundedQueue │ ──────▶ │ Consumer │
//! └──────────┘          └──────────────┘         │  capacity C  │         └──────────┘
//!                              │                 └──────────────┘
//!                              ▼
//!                       ProgressTracker
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use tickflow_pipeline::concurrent::{
//!     BoundedQueue, ConcurrencyLimiter, Consumer, Producer, ProgressTracker, QueueOptions,
//! };
//! use tickflow_pipeline::processor::AnalysisProcessor;
//! use tickflow_pipeline::testing::ScriptedLoader;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> tickflow_core::Result<()> {
//! let ids: Vec<String> = vec!["AAPL".into(), "MSFT".into()];
//! let queue = Arc::new(BoundedQueue::new(QueueOptions::bounded(5))?);
//! let producer = Producer::new(Arc::new(ScriptedLoader::new()), ConcurrencyLimiter::new(3)?);
//! let consumer = Consumer::new("consumer-0", Arc::new(AnalysisProcessor::new()));
//!
//! let progress = Arc::new(ProgressTracker::silent(ids.len()));
//! let (produced, consumed) = tokio::join!(
//!     producer.produce(ids, Arc::clone(&queue), progress, CancellationToken::new()),
//!     consumer.consume(&queue),
//! );
//! assert_eq!(produced?.loaded, consumed.processed);
//! # Ok(())
//! # }
//! ```

pub mod as_completed;
pub mod batch;
pub mod consumer;
pub mod limiter;
pub mod producer;
pub mod progress;
pub mod queue;

pub use as_completed::AsCompleted;
pub use batch::{consume_in_batches, Batch, BatchAccumulator, BatchReport};
pub use consumer::{Consumer, ConsumerReport};
pub use limiter::{ConcurrencyLimiter, LimiterPermit};
pub use producer::{guarded_load, Producer, ProducerReport};
pub use progress::{CollectingReporter, NoopReporter, ProgressTracker, TracingReporter};

#[cfg(feature = "progress")]
pub use progress::ConsoleProgressBar;

pub use queue::{BoundedQueue, QueueOptions};
