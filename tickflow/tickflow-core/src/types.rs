//! Record model and the events that flow between pipeline stages.

use crate::error::ItemFailure;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One trading day of a symbol's price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPrice {
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: u64,
    pub adj_close: f64,
}

/// Time series for a single symbol, decoded from one input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockData {
    pub symbol: String,
    pub company_name: String,
    #[serde(default)]
    pub sector: Option<String>,
    pub currency: String,
    pub last_updated: DateTime<Utc>,
    pub daily_data: Vec<DailyPrice>,
}

impl StockData {
    /// Most recent trading day, if any
    pub fn latest(&self) -> Option<&DailyPrice> {
        self.daily_data.last()
    }

    pub fn is_empty(&self) -> bool {
        self.daily_data.is_empty()
    }
}

/// Outcome of loading one request: the record, or the tagged failure.
pub type LoadResult = std::result::Result<StockData, ItemFailure>;

/// Discrete progress notification.
///
/// `completed` counts requests that have resolved (success or failure);
/// an event with `error` set describes a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
    pub current: String,
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn new(completed: usize, total: usize, current: impl Into<String>) -> Self {
        Self {
            completed,
            total,
            current: current.into(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }

    pub fn is_final(&self) -> bool {
        self.completed == self.total
    }
}
