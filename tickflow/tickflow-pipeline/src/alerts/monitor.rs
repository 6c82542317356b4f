//! Record stream monitoring.

use super::baseline::BaselineProvider;
use super::dispatcher::AlertDispatcher;
use super::{AlertEvent, StockAlert};
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tickflow_core::{Result, StockData};
use tracing::{debug, info};

/// Days averaged for the volume reference
const VOLUME_REFERENCE_DAYS: usize = 5;

/// Counts from one monitoring pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorSummary {
    pub records: usize,
    pub price_alerts: usize,
    pub volume_alerts: usize,
    /// Records without any trading day
    pub skipped: usize,
    /// Subscriber failures tolerated under the isolate policy
    pub delivery_failures: usize,
}

/// Raises price and volume alerts for each record of a stream.
pub struct StockMonitor {
    dispatcher: AlertDispatcher,
    baseline: Arc<dyn BaselineProvider>,
    threshold_pct: f64,
}

impl StockMonitor {
    pub fn new(
        dispatcher: AlertDispatcher,
        baseline: Arc<dyn BaselineProvider>,
        threshold_pct: f64,
    ) -> Self {
        Self {
            dispatcher,
            baseline,
            threshold_pct,
        }
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    /// Evaluate every record of `records`, bracketed by status events.
    pub async fn monitor<S>(&self, records: S) -> Result<MonitorSummary>
    where
        S: Stream<Item = StockData>,
    {
        let mut summary = MonitorSummary::default();
        let mut records = std::pin::pin!(records);

        self.emit(&AlertEvent::status("Starting stock monitoring"), &mut summary)?;

        while let Some(record) = records.next().await {
            self.evaluate(&record, &mut summary)?;
        }

        self.emit(&AlertEvent::status("Stock monitoring completed"), &mut summary)?;

        info!(
            records = summary.records,
            price_alerts = summary.price_alerts,
            volume_alerts = summary.volume_alerts,
            "Monitoring finished"
        );
        Ok(summary)
    }

    /// Evaluate a single record.
    pub fn evaluate(&self, record: &StockData, summary: &mut MonitorSummary) -> Result<()> {
        summary.records += 1;
        let Some(latest) = record.latest() else {
            debug!(symbol = %record.symbol, "No trading days, skipping");
            summary.skipped += 1;
            return Ok(());
        };

        let current = latest.close;
        let alert = |previous_price: Option<f64>, reason: &str| StockAlert {
            symbol: record.symbol.clone(),
            current_price: current,
            previous_price,
            volume: latest.volume,
            reason: reason.to_string(),
            raised_at: Utc::now(),
        };

        if let Some(previous) = self.baseline.baseline(&record.symbol, current) {
            let price_alert = alert(Some(previous), "Significant price movement");
            if price_alert.change_pct().is_some_and(|c| c > self.threshold_pct) {
                summary.price_alerts += 1;
                self.emit(&AlertEvent::Price(price_alert), summary)?;
            }
        }

        let reference: Vec<f64> = record
            .daily_data
            .iter()
            .take(VOLUME_REFERENCE_DAYS)
            .map(|day| day.volume as f64)
            .collect();
        let average = reference.iter().sum::<f64>() / reference.len() as f64;
        if latest.volume as f64 > average {
            summary.volume_alerts += 1;
            self.emit(&AlertEvent::Volume(alert(None, "High volume")), summary)?;
        }

        self.baseline.record(&record.symbol, current);
        Ok(())
    }

    fn emit(&self, event: &AlertEvent, summary: &mut MonitorSummary) -> Result<()> {
        summary.delivery_failures += self.dispatcher.dispatch(event)?;
        Ok(())
    }
}
