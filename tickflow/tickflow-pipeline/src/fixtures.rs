//! Synthetic input files.

use chrono::{Days, NaiveDate, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use tickflow_core::{DailyPrice, PipelineError, Result, StockData};
use tracing::info;

/// Build `days` of synthetic prices for `symbol`, ending on `last_day`.
pub fn synthetic_record(symbol: &str, days: usize, last_day: NaiveDate, rng: &mut StdRng) -> StockData {
    let first_day = last_day
        .checked_sub_days(Days::new(days.saturating_sub(1) as u64))
        .unwrap_or(last_day);

    let daily_data = (0..days)
        .map(|offset| {
            let base = 100.0 + f64::from(rng.random_range(1..300u32));
            DailyPrice {
                date: first_day
                    .checked_add_days(Days::new(offset as u64))
                    .unwrap_or(last_day),
                open: base + rng.random_range(-5.0..5.0),
                close: base + rng.random_range(-5.0..5.0),
                high: base + rng.random_range(0.0..15.0),
                low: base - rng.random_range(0.0..10.0),
                volume: rng.random_range(1_000_000..50_000_000),
                adj_close: base,
            }
        })
        .collect();

    StockData {
        symbol: symbol.to_string(),
        company_name: format!("{} Corporation", symbol),
        sector: Some("Technology".to_string()),
        currency: "USD".to_string(),
        last_updated: Utc.from_utc_datetime(&last_day.and_hms_opt(21, 0, 0).unwrap_or_default()),
        daily_data,
    }
}

/// Write one `<SYMBOL>.json` per symbol into `dir`, creating it if needed.
///
/// The same seed always produces the same files.
pub fn generate_fixtures(dir: &Path, symbols: &[String], days: usize, seed: u64) -> Result<Vec<PathBuf>> {
    if days == 0 {
        return Err(PipelineError::invalid_input("fixtures need at least one day"));
    }

    std::fs::create_dir_all(dir)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let last_day = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap_or_default();

    let mut written = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let record = synthetic_record(symbol, days, last_day, &mut rng);
        let path = dir.join(format!("{}.json", symbol));
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| PipelineError::Other(anyhow::Error::new(e)))?;
        std::fs::write(&path, json)?;
        written.push(path);
    }

    info!(dir = %dir.display(), files = written.len(), days, seed, "Generated fixtures");
    Ok(written)
}
