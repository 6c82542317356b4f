//! Core types and abstractions for the tickflow loading pipeline.
//!
//! This crate provides the record model, derived analytics, the error
//! taxonomy, configuration, and the capability traits implemented by
//! loaders, processors and progress sinks.

pub mod analysis;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use analysis::{simple_moving_average, StockAnalysis};
pub use config::{FlushPolicy, PipelineConfig};
pub use error::{ItemFailure, PipelineError, Result};
pub use traits::*;
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::analysis::StockAnalysis;
    pub use crate::config::{FlushPolicy, PipelineConfig};
    pub use crate::error::{ItemFailure, PipelineError, Result};
    pub use crate::traits::*;
    pub use crate::types::*;
}
