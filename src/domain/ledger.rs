//! Position ledger: per-symbol exposure plus realized capital.

use std::collections::HashMap;

use super::error::SsbtError;
use super::position::{Position, Trade};

pub const DEFAULT_SYMBOL: &str = "default";
pub const DEFAULT_RISK_PER_TRADE: f64 = 0.02;

#[derive(Debug, Clone, PartialEq)]
pub struct PositionLedger {
    pub initial_capital: f64,
    pub current_capital: f64,
    positions: HashMap<String, Position>,
}

impl PositionLedger {
    pub fn new(initial_capital: f64) -> Self {
        PositionLedger {
            initial_capital,
            current_capital: initial_capital,
            positions: HashMap::new(),
        }
    }

    /// (current_capital * risk_per_trade) / price
    pub fn get_position_size(&self, price: f64, risk_per_trade: f64) -> Result<f64, SsbtError> {
        if price == 0.0 || !price.is_finite() {
            return Err(SsbtError::ZeroDenominator {
                operation: "ledger position sizing",
            });
        }
        Ok(self.current_capital * risk_per_trade / price)
    }

    /// Adds the trade's realized profit. Open trades contribute nothing.
    pub fn update_capital(&mut self, trade: &Trade) {
        self.current_capital += trade.profit();
    }

    pub fn get_current_position(&self, symbol: &str) -> Position {
        self.positions.get(symbol).copied().unwrap_or(Position::Flat)
    }

    pub fn set_position(&mut self, position: Position, symbol: &str) {
        self.positions.insert(symbol.to_string(), position);
    }

    pub fn total_positions(&self) -> usize {
        self.positions.values().filter(|p| !p.is_flat()).count()
    }

    /// Symbols the ledger has seen, in no particular order.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(String::as_str)
    }

    pub fn realized_profit(&self) -> f64 {
        self.current_capital - self.initial_capital
    }
}

impl Default for PositionLedger {
    fn default() -> Self {
        PositionLedger::new(100_000.0)
    }
}
