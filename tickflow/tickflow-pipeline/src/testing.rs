//! In-memory collaborators for tests and demos.
//!
//! [`ScriptedLoader`] serves synthetic records without touching the disk and
//! can be told to fail, stall or panic for particular identifiers. It also
//! tracks how many loads run at once, independently of any limiter.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tickflow_core::{DailyPrice, PipelineError, RecordLoader, Result, StockData};

/// Deterministic five-day record for `symbol`.
pub fn sample_stock(symbol: &str) -> StockData {
    let daily_data = (0..5u32)
        .map(|i| {
            let base = 100.0 + i as f64;
            DailyPrice {
                date: NaiveDate::from_ymd_opt(2025, 3, 3 + i).unwrap_or_default(),
                open: base,
                close: base + 0.5,
                high: base + 2.0,
                low: base - 2.0,
                volume: 1_000_000 + u64::from(i) * 10_000,
                adj_close: base + 0.5,
            }
        })
        .collect();

    StockData {
        symbol: symbol.to_string(),
        company_name: format!("{} Corporation", symbol),
        sector: Some("Technology".to_string()),
        currency: "USD".to_string(),
        last_updated: Utc
            .with_ymd_and_hms(2025, 3, 7, 21, 0, 0)
            .single()
            .unwrap_or_default(),
        daily_data,
    }
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    NotFound,
    Decode,
    Panic,
}

/// Scriptable [`RecordLoader`].
#[derive(Debug, Default)]
pub struct ScriptedLoader {
    failures: HashMap<String, Failure>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    empty: HashSet<String>,
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<String>>,
}

impl ScriptedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_not_found(mut self, identifier: &str) -> Self {
        self.failures.insert(identifier.to_string(), Failure::NotFound);
        self
    }

    pub fn fail_decode(mut self, identifier: &str) -> Self {
        self.failures.insert(identifier.to_string(), Failure::Decode);
        self
    }

    pub fn panic_on(mut self, identifier: &str) -> Self {
        self.failures.insert(identifier.to_string(), Failure::Panic);
        self
    }

    /// Serve a record with no trading days for `identifier`.
    pub fn empty_record(mut self, identifier: &str) -> Self {
        self.empty.insert(identifier.to_string());
        self
    }

    pub fn with_delay(mut self, identifier: &str, delay: Duration) -> Self {
        self.delays.insert(identifier.to_string(), delay);
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Loads started so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most loads observed running at the same time
    pub fn peak_concurrent(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Identifiers in the order their loads started
    pub fn started(&self) -> Vec<String> {
        self.started.lock().clone()
    }
}

struct Running<'a>(&'a AtomicUsize);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordLoader for ScriptedLoader {
    async fn load_one(&self, identifier: &str) -> Result<StockData> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.lock().push(identifier.to_string());

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _running = Running(&self.running);

        let delay = self.delays.get(identifier).copied().unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.failures.get(identifier) {
            Some(Failure::NotFound) => Err(PipelineError::not_found(identifier)),
            Some(Failure::Decode) => Err(PipelineError::decode(identifier, "unexpected end of input")),
            Some(Failure::Panic) => panic!("scripted panic for {}", identifier),
            None => {
                let mut record = sample_stock(identifier);
                if self.empty.contains(identifier) {
                    record.daily_data.clear();
                }
                Ok(record)
            }
        }
    }
}
