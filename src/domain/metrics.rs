//! Trade statistics and drawdown over a finished backtest.
//!
//! Only closed trades count; an open trade has no realized profit yet.

use chrono::Duration;

use super::backtest::EquityPoint;
use super::position::Trade;

#[derive(Debug, Clone, PartialEq)]
pub struct TradeSummary {
    pub total_trades: usize,
    pub winning_trades: usize,
    /// Break-even trades count as losing.
    pub losing_trades: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    /// Mean profit of losing trades (zero or negative).
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64,
    pub avg_duration: Duration,
    pub total_profit: f64,
    pub final_capital: f64,
}

impl TradeSummary {
    pub fn compute<'a>(trades: impl IntoIterator<Item = &'a Trade>, initial_capital: f64) -> Self {
        let mut total_trades = 0usize;
        let mut winning_trades = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = f64::NEG_INFINITY;
        let mut largest_loss = f64::INFINITY;
        let mut total_duration = Duration::zero();

        for trade in trades.into_iter().filter(|t| !t.is_open()) {
            let profit = trade.profit();
            total_trades += 1;
            if profit > 0.0 {
                winning_trades += 1;
                total_wins += profit;
            } else {
                total_losses += profit;
            }
            largest_win = largest_win.max(profit);
            largest_loss = largest_loss.min(profit);
            total_duration += trade.duration();
        }

        let losing_trades = total_trades - winning_trades;
        let total_profit = total_wins + total_losses;

        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64
        } else {
            0.0
        };

        let avg_win = if winning_trades > 0 {
            total_wins / winning_trades as f64
        } else {
            0.0
        };

        let avg_loss = if losing_trades > 0 {
            total_losses / losing_trades as f64
        } else {
            0.0
        };

        let profit_factor = if total_losses < 0.0 {
            total_wins / total_losses.abs()
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_duration = if total_trades > 0 {
            total_duration / total_trades as i32
        } else {
            Duration::zero()
        };

        TradeSummary {
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            avg_win,
            avg_loss,
            largest_win: if total_trades > 0 { largest_win } else { 0.0 },
            largest_loss: if total_trades > 0 { largest_loss } else { 0.0 },
            profit_factor,
            avg_duration,
            total_profit,
            final_capital: initial_capital + total_profit,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawdownPoint {
    pub timestamp: chrono::NaiveDateTime,
    /// Fractional decline from the running peak, 0.0 at a new high.
    pub drawdown: f64,
}

pub fn drawdown_curve(equity_curve: &[EquityPoint]) -> Vec<DrawdownPoint> {
    let mut peak = f64::NEG_INFINITY;
    equity_curve
        .iter()
        .map(|point| {
            peak = peak.max(point.equity);
            let drawdown = if peak > 0.0 {
                (peak - point.equity) / peak
            } else {
                0.0
            };
            DrawdownPoint {
                timestamp: point.timestamp,
                drawdown,
            }
        })
        .collect()
}

pub fn max_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    drawdown_curve(equity_curve)
        .iter()
        .map(|p| p.drawdown)
        .fold(0.0, f64::max)
}

/// Last point of the curve relative to the starting capital. An empty curve
/// has not moved.
pub fn total_return(initial_capital: f64, equity_curve: &[EquityPoint]) -> f64 {
    match equity_curve.last() {
        Some(last) if initial_capital > 0.0 => (last.equity - initial_capital) / initial_capital,
        _ => 0.0,
    }
}
