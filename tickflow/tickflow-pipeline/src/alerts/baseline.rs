//! Reference prices for price-change alerts.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Supplies the price a record's latest close is compared against.
pub trait BaselineProvider: Send + Sync {
    /// Baseline for `symbol`, given the price about to be evaluated.
    fn baseline(&self, symbol: &str, current: f64) -> Option<f64>;

    /// Remember `price` as the last evaluated price of `symbol`.
    fn record(&self, symbol: &str, price: f64);
}

/// Compares against the previously evaluated price; no baseline on first sight.
#[derive(Debug, Default)]
pub struct LastSeenBaseline {
    last: Mutex<HashMap<String, f64>>,
}

impl LastSeenBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices(prices: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self {
            last: Mutex::new(prices.into_iter().collect()),
        }
    }
}

impl BaselineProvider for LastSeenBaseline {
    fn baseline(&self, symbol: &str, _current: f64) -> Option<f64> {
        self.last.lock().get(symbol).copied()
    }

    fn record(&self, symbol: &str, price: f64) {
        self.last.lock().insert(symbol.to_string(), price);
    }
}

/// Demo baseline: on first sight invents a previous price within
/// `±spread / 2` of the current one, from a seeded generator.
#[derive(Debug)]
pub struct JitterBaseline {
    spread: f64,
    rng: Mutex<StdRng>,
    seen: LastSeenBaseline,
}

impl JitterBaseline {
    pub fn new(seed: u64, spread: f64) -> Self {
        Self {
            spread,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            seen: LastSeenBaseline::new(),
        }
    }
}

impl BaselineProvider for JitterBaseline {
    fn baseline(&self, symbol: &str, current: f64) -> Option<f64> {
        if let Some(previous) = self.seen.baseline(symbol, current) {
            return Some(previous);
        }

        let offset: f64 = self.rng.lock().random::<f64>() - 0.5;
        let invented = current * (1.0 + offset * self.spread);
        self.seen.record(symbol, invented);
        Some(invented)
    }

    fn record(&self, symbol: &str, price: f64) {
        self.seen.record(symbol, price);
    }
}
