//! Pre-trade risk gate.
//!
//! `validate_trade` runs immediately before an entry is applied and enforces,
//! in order: the drawdown limit, the open-position count limit and the
//! position-size limit. Stop-loss and stop-based sizing are advisory helpers
//! that the gate itself never enforces.

use std::fmt;

use super::error::SsbtError;
use super::ledger::{DEFAULT_RISK_PER_TRADE, PositionLedger};
use super::signal::{Signal, SignalType};

pub const DEFAULT_ATR_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RiskParams {
    /// Largest tolerated fractional decline from peak capital.
    pub max_drawdown: f64,
    /// Largest position size as a fraction of current capital.
    pub max_position_size: f64,
    pub max_positions: usize,
}

impl Default for RiskParams {
    fn default() -> Self {
        RiskParams {
            max_drawdown: 0.2,
            max_position_size: 0.1,
            max_positions: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    Drawdown { current: f64, limit: f64 },
    PositionLimit { open: usize, limit: usize },
    PositionSize { fraction: f64, limit: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Drawdown { current, limit } => {
                write!(f, "drawdown {:.4} exceeds limit {:.4}", current, limit)
            }
            RejectReason::PositionLimit { open, limit } => {
                write!(f, "{} open positions, limit {}", open, limit)
            }
            RejectReason::PositionSize { fraction, limit } => {
                write!(f, "position size {:.4} of capital exceeds {:.4}", fraction, limit)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Approved,
    Rejected(RejectReason),
}

impl RiskDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, RiskDecision::Approved)
    }
}

/// Owns the running peak of capital; build a new gate per run.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskGate {
    pub params: RiskParams,
    peak_capital: f64,
}

impl RiskGate {
    pub fn new(params: RiskParams) -> Self {
        RiskGate {
            params,
            peak_capital: 0.0,
        }
    }

    pub fn peak_capital(&self) -> f64 {
        self.peak_capital
    }

    /// Fractional decline of current capital from the recorded peak.
    /// Zero until a positive peak has been seen.
    pub fn current_drawdown(&self, ledger: &PositionLedger) -> f64 {
        if self.peak_capital <= 0.0 {
            return 0.0;
        }
        1.0 - ledger.current_capital / self.peak_capital
    }

    pub fn validate_trade(
        &mut self,
        signal: &Signal,
        ledger: &PositionLedger,
    ) -> Result<RiskDecision, SsbtError> {
        self.peak_capital = self.peak_capital.max(ledger.current_capital);

        let drawdown = self.current_drawdown(ledger);
        if drawdown > self.params.max_drawdown {
            return Ok(RiskDecision::Rejected(RejectReason::Drawdown {
                current: drawdown,
                limit: self.params.max_drawdown,
            }));
        }

        let open = ledger.total_positions();
        if open >= self.params.max_positions {
            return Ok(RiskDecision::Rejected(RejectReason::PositionLimit {
                open,
                limit: self.params.max_positions,
            }));
        }

        // Always the default risk budget, whatever the caller sizes with.
        let position_size = ledger.get_position_size(signal.price, DEFAULT_RISK_PER_TRADE)?;
        if ledger.current_capital == 0.0 {
            return Err(SsbtError::ZeroDenominator {
                operation: "position size fraction",
            });
        }
        let fraction = position_size / ledger.current_capital;
        if fraction > self.params.max_position_size {
            return Ok(RiskDecision::Rejected(RejectReason::PositionSize {
                fraction,
                limit: self.params.max_position_size,
            }));
        }

        Ok(RiskDecision::Approved)
    }

    /// ATR stop: below the price for a long entry, above it for anything
    /// else (exits included).
    pub fn calculate_stop_loss(&self, signal: &Signal, atr: f64, multiplier: f64) -> f64 {
        let offset = atr * multiplier;
        if signal.signal_type == SignalType::EntryLong {
            signal.price - offset
        } else {
            signal.price + offset
        }
    }

    /// Sizes so that hitting `stop_loss` loses `risk_per_trade` of capital.
    /// Without a stop (a stop of 0.0 counts as none) the ledger's generic
    /// sizing applies.
    pub fn calculate_position_size(
        &self,
        signal: &Signal,
        ledger: &PositionLedger,
        stop_loss: Option<f64>,
        risk_per_trade: f64,
    ) -> Result<f64, SsbtError> {
        match stop_loss {
            Some(stop) if stop != 0.0 => {
                let price_risk = (signal.price - stop).abs();
                if price_risk == 0.0 || !price_risk.is_finite() {
                    return Err(SsbtError::ZeroDenominator {
                        operation: "stop-loss position sizing",
                    });
                }
                Ok(ledger.current_capital * risk_per_trade / price_risk)
            }
            _ => ledger.get_position_size(signal.price, risk_per_trade),
        }
    }
}

impl Default for RiskGate {
    fn default() -> Self {
        RiskGate::new(RiskParams::default())
    }
}
