//! Pipeline configuration.
//!
//! Values are resolved in three layers:
//! 1. built-in defaults,
//! 2. an optional TOML file,
//! 3. `TICKFLOW_*` environment variable overrides.
//!
//! # Example
//!
//! ```toml
//! concurrency = 4
//! queue_capacity = 8
//! batch_size = 10
//! flush_policy = "exceed_size"
//! load_timeout_ms = 2000
//! data_dir = "data"
//! ```

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const ENV_CONCURRENCY: &str = "TICKFLOW_CONCURRENCY";
pub const ENV_QUEUE_CAPACITY: &str = "TICKFLOW_QUEUE_CAPACITY";
pub const ENV_BATCH_SIZE: &str = "TICKFLOW_BATCH_SIZE";
pub const ENV_LOAD_TIMEOUT_MS: &str = "TICKFLOW_LOAD_TIMEOUT_MS";
pub const ENV_DATA_DIR: &str = "TICKFLOW_DATA_DIR";

/// When an accumulating batch is flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Flush once the batch holds exactly `batch_size` records.
    #[default]
    AtSize,
    /// Flush once the batch holds more than `batch_size` records, so full
    /// batches carry `batch_size + 1` records.
    ExceedSize,
}

impl FlushPolicy {
    /// Whether a batch currently holding `len` records must be flushed.
    pub fn should_flush(self, len: usize, batch_size: usize) -> bool {
        match self {
            Self::AtSize => len >= batch_size,
            Self::ExceedSize => len > batch_size,
        }
    }
}

impl std::str::FromStr for FlushPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "at_size" => Ok(Self::AtSize),
            "exceed_size" => Ok(Self::ExceedSize),
            _ => Err(PipelineError::config(format!(
                "Invalid flush policy '{}'. Must be one of: at_size, exceed_size",
                s
            ))),
        }
    }
}

/// Tunables for every execution mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum simultaneous in-flight loads
    pub concurrency: usize,
    /// Capacity of the producer/consumer queue
    pub queue_capacity: usize,
    /// Nominal batch size for batch mode
    pub batch_size: usize,
    pub flush_policy: FlushPolicy,
    /// Number of consumers draining the queue
    pub consumers: usize,
    /// Per-call load deadline in milliseconds (0 disables it)
    pub load_timeout_ms: u64,
    /// Simulated I/O time of the processing step
    pub processing_delay_ms: u64,
    pub stage_load_capacity: usize,
    pub stage_analysis_capacity: usize,
    /// Absolute close-to-close change (percent) that raises a price alert
    pub price_change_threshold_pct: f64,
    /// Directory scanned for `*.json` inputs
    pub data_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            queue_capacity: 5,
            batch_size: 10,
            flush_policy: FlushPolicy::AtSize,
            consumers: 1,
            load_timeout_ms: 5_000,
            processing_delay_ms: 0,
            stage_load_capacity: 50,
            stage_analysis_capacity: 30,
            price_change_threshold_pct: 5.0,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;

        info!(path = %path.display(), "Loaded pipeline configuration");
        Ok(config)
    }

    /// Defaults plus environment overrides, used when no file is given.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PipelineError::config(format!("Failed to parse config: {}", e)))
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_parse::<usize>(ENV_CONCURRENCY)? {
            debug!(concurrency = v, "Overriding concurrency from environment");
            self.concurrency = v;
        }
        if let Some(v) = env_parse::<usize>(ENV_QUEUE_CAPACITY)? {
            self.queue_capacity = v;
        }
        if let Some(v) = env_parse::<usize>(ENV_BATCH_SIZE)? {
            self.batch_size = v;
        }
        if let Some(v) = env_parse::<u64>(ENV_LOAD_TIMEOUT_MS)? {
            self.load_timeout_ms = v;
        }
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(PipelineError::config("concurrency must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(PipelineError::config("queue_capacity must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::config("batch_size must be at least 1"));
        }
        if self.consumers == 0 {
            return Err(PipelineError::config("consumers must be at least 1"));
        }
        if self.stage_load_capacity == 0 || self.stage_analysis_capacity == 0 {
            return Err(PipelineError::config("stage capacities must be at least 1"));
        }
        if !self.price_change_threshold_pct.is_finite() || self.price_change_threshold_pct < 0.0 {
            return Err(PipelineError::config(
                "price_change_threshold_pct must be a non-negative number",
            ));
        }
        Ok(())
    }

    /// Per-call load deadline, `None` when disabled.
    pub fn load_timeout(&self) -> Option<Duration> {
        (self.load_timeout_ms > 0).then(|| Duration::from_millis(self.load_timeout_ms))
    }

    pub fn processing_delay(&self) -> Duration {
        Duration::from_millis(self.processing_delay_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PipelineError::config(format!("{} has an invalid value '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.flush_policy, FlushPolicy::AtSize);
        assert_eq!(config.load_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            concurrency = 3
            flush_policy = "exceed_size"
            "#,
        )
        .unwrap();

        assert_eq!(config.concurrency, 3);
        assert_eq!(config.flush_policy, FlushPolicy::ExceedSize);
        assert_eq!(config.queue_capacity, 5);
        assert_eq!(config.stage_load_capacity, 50);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = PipelineConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_timeout_disabled() {
        let config = PipelineConfig {
            load_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.load_timeout(), None);
    }

    #[test]
    fn test_flush_policy_boundaries() {
        assert!(!FlushPolicy::AtSize.should_flush(9, 10));
        assert!(FlushPolicy::AtSize.should_flush(10, 10));
        assert!(!FlushPolicy::ExceedSize.should_flush(10, 10));
        assert!(FlushPolicy::ExceedSize.should_flush(11, 10));
    }

    #[test]
    fn test_flush_policy_from_str() {
        assert_eq!("at-size".parse::<FlushPolicy>().unwrap(), FlushPolicy::AtSize);
        assert_eq!("EXCEED_SIZE".parse::<FlushPolicy>().unwrap(), FlushPolicy::ExceedSize);
        assert!("sometimes".parse::<FlushPolicy>().is_err());
    }
}
