//! Error types for the tickflow pipeline.

use std::time::Duration;

/// Result type alias for tickflow operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the tickflow pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input source does not exist
    #[error("Not found: {identifier}")]
    NotFound { identifier: String },

    /// The input source exists but its payload is malformed
    #[error("Decode error in {identifier}: {detail}")]
    Decode { identifier: String, detail: String },

    /// A single load exceeded its per-call deadline
    #[error("Load of {identifier} timed out after {after:?}")]
    Timeout { identifier: String, after: Duration },

    /// The pipeline-wide cancellation scope was triggered
    #[error("Pipeline cancelled")]
    Cancelled,

    /// Consumer-side failure after a successful load
    #[error("Processing error for {symbol}: {detail}")]
    Processing { symbol: String, detail: String },

    /// Misuse of a bounded queue (double completion, write after completion, ...)
    #[error("Queue fault: {0}")]
    QueueFault(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped anyhow errors for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Create a new not found error
    pub fn not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            identifier: identifier.into(),
        }
    }

    /// Create a new decode error
    pub fn decode(identifier: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Decode {
            identifier: identifier.into(),
            detail: detail.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout(identifier: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            identifier: identifier.into(),
            after,
        }
    }

    /// Create a new processing error
    pub fn processing(symbol: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Processing {
            symbol: symbol.into(),
            detail: detail.into(),
        }
    }

    /// Create a new queue fault
    pub fn queue_fault(msg: impl Into<String>) -> Self {
        Self::QueueFault(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, Self::Processing { .. })
    }

    pub fn is_queue_fault(&self) -> bool {
        matches!(self, Self::QueueFault(_))
    }
}

/// A per-item failure, tagged with the identifier it came from.
#[derive(Debug)]
pub struct ItemFailure {
    pub identifier: String,
    pub error: PipelineError,
}

impl ItemFailure {
    pub fn new(identifier: impl Into<String>, error: PipelineError) -> Self {
        Self {
            identifier: identifier.into(),
            error,
        }
    }
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.identifier, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::not_found("data/MSFT.json");
        assert_eq!(err.to_string(), "Not found: data/MSFT.json");

        let err = PipelineError::decode("data/BAD.json", "expected value at line 1");
        assert_eq!(
            err.to_string(),
            "Decode error in data/BAD.json: expected value at line 1"
        );

        assert_eq!(PipelineError::Cancelled.to_string(), "Pipeline cancelled");
    }

    #[test]
    fn test_predicates() {
        assert!(PipelineError::not_found("x").is_not_found());
        assert!(PipelineError::timeout("x", Duration::from_millis(5)).is_timeout());
        assert!(!PipelineError::timeout("x", Duration::from_millis(5)).is_cancelled());
        assert!(PipelineError::Cancelled.is_cancelled());
        assert!(PipelineError::processing("MSFT", "empty").is_processing());
        assert!(PipelineError::queue_fault("twice").is_queue_fault());
    }

    #[test]
    fn test_item_failure_display() {
        let failure = ItemFailure::new("a.json", PipelineError::not_found("a.json"));
        assert_eq!(failure.to_string(), "a.json: Not found: a.json");
    }
}
