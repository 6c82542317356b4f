//! Alerting over a stream of records.
//!
//! [`StockMonitor`] compares each record against a [`BaselineProvider`] and
//! raises [`AlertEvent`]s, which an [`AlertDispatcher`] delivers to its
//! subscribers in registration order.

pub mod baseline;
pub mod dispatcher;
pub mod monitor;
pub mod subscribers;

pub use baseline::{BaselineProvider, JitterBaseline, LastSeenBaseline};
pub use dispatcher::{AlertDispatcher, AlertSubscriber, DispatchPolicy};
pub use monitor::{MonitorSummary, StockMonitor};
pub use subscribers::{NotificationService, RiskManager, TradeAction, TradeSignal, TradingBot};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which subscribers an event is delivered to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertTopic {
    Price,
    Volume,
    Status,
}

/// A price or volume condition raised for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAlert {
    pub symbol: String,
    pub current_price: f64,
    /// Baseline the change was measured against; `None` for volume alerts
    pub previous_price: Option<f64>,
    pub volume: u64,
    pub reason: String,
    pub raised_at: DateTime<Utc>,
}

impl StockAlert {
    /// Absolute change against the baseline, in percent.
    pub fn change_pct(&self) -> Option<f64> {
        self.previous_price
            .filter(|previous| *previous != 0.0)
            .map(|previous| ((self.current_price - previous) / previous * 100.0).abs())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertEvent {
    Price(StockAlert),
    Volume(StockAlert),
    Status { message: String },
}

impl AlertEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    pub fn topic(&self) -> AlertTopic {
        match self {
            Self::Price(_) => AlertTopic::Price,
            Self::Volume(_) => AlertTopic::Volume,
            Self::Status { .. } => AlertTopic::Status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(current: f64, previous: Option<f64>) -> StockAlert {
        StockAlert {
            symbol: "AMD".to_string(),
            current_price: current,
            previous_price: previous,
            volume: 0,
            reason: "test".to_string(),
            raised_at: Utc::now(),
        }
    }

    #[test]
    fn test_change_pct() {
        assert_eq!(alert(110.0, Some(100.0)).change_pct(), Some(10.0));
        assert_eq!(alert(90.0, Some(100.0)).change_pct(), Some(10.0));
        assert_eq!(alert(90.0, None).change_pct(), None);
        assert_eq!(alert(90.0, Some(0.0)).change_pct(), None);
    }

    #[test]
    fn test_event_topics_and_serialization() {
        let event = AlertEvent::status("Starting stock monitoring");
        assert_eq!(event.topic(), AlertTopic::Status);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(AlertEvent::Volume(alert(1.0, None)).topic(), AlertTopic::Volume);
    }
}
