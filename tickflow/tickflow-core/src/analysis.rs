//! Derived analytics computed from a symbol's price history.

use crate::types::StockData;
use serde::{Deserialize, Serialize};

/// Summary indicators for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAnalysis {
    pub symbol: String,
    /// Mean of the daily highs
    pub target_high: f64,
    /// Mean of the daily lows
    pub target_low: f64,
    pub average_close: f64,
    pub average_volume: f64,
    pub last_close: f64,
    pub reporter: Option<String>,
}

impl StockAnalysis {
    /// Compute the analysis, or `None` when the record has no trading days.
    pub fn from_record(stock: &StockData) -> Option<Self> {
        let last = stock.latest()?;
        let days = &stock.daily_data;

        Some(Self {
            symbol: stock.symbol.clone(),
            target_high: mean(days.iter().map(|d| d.high)),
            target_low: mean(days.iter().map(|d| d.low)),
            average_close: mean(days.iter().map(|d| d.close)),
            average_volume: mean(days.iter().map(|d| d.volume as f64)),
            last_close: last.close,
            reporter: None,
        })
    }

    pub fn with_reporter(mut self, reporter: impl Into<String>) -> Self {
        self.reporter = Some(reporter.into());
        self
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// Trailing simple moving average. The output has `values.len() - window + 1`
/// entries; it is empty when `window` is zero or exceeds the input.
pub fn simple_moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || window > values.len() {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(values.len() - window + 1);
    let mut sum: f64 = values[..window].iter().sum();
    out.push(sum / window as f64);

    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out.push(sum / window as f64);
    }

    out
}
