//! Built-in alert subscribers.

use super::dispatcher::AlertSubscriber;
use super::{AlertEvent, StockAlert};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tickflow_core::Result;
use tracing::{info, warn};

/// Change (percent) above which [`RiskManager`] flags a move as high risk
pub const HIGH_RISK_CHANGE_PCT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Buy,
    Sell,
    Investigate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub action: TradeAction,
}

/// Turns price moves into buy/sell signals and volume spikes into investigations.
#[derive(Debug)]
pub struct TradingBot {
    name: String,
    signals: Mutex<Vec<TradeSignal>>,
}

impl TradingBot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signals: Mutex::new(Vec::new()),
        }
    }

    pub fn signals(&self) -> Vec<TradeSignal> {
        self.signals.lock().clone()
    }

    fn signal(&self, alert: &StockAlert, action: TradeAction) {
        self.signals.lock().push(TradeSignal {
            symbol: alert.symbol.clone(),
            action,
        });
    }
}

impl AlertSubscriber for TradingBot {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &AlertEvent) -> Result<()> {
        match event {
            AlertEvent::Price(alert) => {
                let previous = alert.previous_price.unwrap_or(alert.current_price);
                let action = if alert.current_price > previous {
                    TradeAction::Buy
                } else {
                    TradeAction::Sell
                };
                info!(
                    bot = %self.name,
                    symbol = %alert.symbol,
                    from = previous,
                    to = alert.current_price,
                    ?action,
                    "Price alert"
                );
                self.signal(alert, action);
            }
            AlertEvent::Volume(alert) => {
                info!(bot = %self.name, symbol = %alert.symbol, volume = alert.volume, "Volume spike, investigating");
                self.signal(alert, TradeAction::Investigate);
            }
            AlertEvent::Status { .. } => {}
        }
        Ok(())
    }
}

/// Evaluates price moves and flags the large ones.
#[derive(Debug, Default)]
pub struct RiskManager {
    evaluated: Mutex<usize>,
    high_risk: Mutex<Vec<String>>,
}

impl RiskManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluated(&self) -> usize {
        *self.evaluated.lock()
    }

    /// Symbols whose move exceeded [`HIGH_RISK_CHANGE_PCT`]
    pub fn high_risk(&self) -> Vec<String> {
        self.high_risk.lock().clone()
    }
}

impl AlertSubscriber for RiskManager {
    fn name(&self) -> &str {
        "risk-manager"
    }

    fn handle(&self, event: &AlertEvent) -> Result<()> {
        let AlertEvent::Price(alert) = event else {
            return Ok(());
        };

        *self.evaluated.lock() += 1;
        if let Some(change) = alert.change_pct().filter(|c| *c > HIGH_RISK_CHANGE_PCT) {
            warn!(symbol = %alert.symbol, change_pct = change, "High risk move");
            self.high_risk.lock().push(alert.symbol.clone());
        }
        Ok(())
    }
}

/// Relays status messages.
#[derive(Debug, Default)]
pub struct NotificationService {
    messages: Mutex<Vec<String>>,
}

impl NotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl AlertSubscriber for NotificationService {
    fn name(&self) -> &str {
        "notifications"
    }

    fn handle(&self, event: &AlertEvent) -> Result<()> {
        if let AlertEvent::Status { message } = event {
            info!(message = %message, "System status");
            self.messages.lock().push(message.clone());
        }
        Ok(())
    }
}
