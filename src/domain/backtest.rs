//! Backtest engine and event loop.
//!
//! The [`Backtester`] turns an ordered signal sequence into trades and an
//! equity curve. Per symbol the only legal transitions are
//! Flat -> Long -> Flat and Flat -> Short -> Flat; anything else is skipped
//! and recorded, never applied. Entries must additionally pass the
//! [`RiskGate`]. Exits are not gated.
//!
//! Equity is sampled once per bar of the price series: realized capital plus
//! open trades marked at that bar's close. A signal is applied after every
//! bar strictly earlier than its timestamp has been sampled, so a bar sharing
//! the signal's timestamp reflects the signal.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::error::SsbtError;
use super::ledger::{DEFAULT_RISK_PER_TRADE, DEFAULT_SYMBOL, PositionLedger};
use super::position::{DEFAULT_TRADE_SIZE, Position, Trade};
use super::price_series::{CLOSE, PriceSeries};
use super::risk::{DEFAULT_ATR_MULTIPLIER, RejectReason, RiskDecision, RiskGate, RiskParams};
use super::signal::{Signal, SignalType};
use super::strategy::{ATR_METADATA_KEY, Strategy};

/// How an approved entry is sized.
#[derive(Debug, Clone, PartialEq)]
pub enum SizingPolicy {
    Fixed(f64),
    /// Ledger risk budget: capital * risk / price.
    Ledger { risk_per_trade: f64 },
    /// ATR stop from the signal's `atr` metadata; falls back to ledger
    /// sizing when the signal carries none.
    StopLoss {
        risk_per_trade: f64,
        atr_multiplier: f64,
    },
}

impl Default for SizingPolicy {
    fn default() -> Self {
        SizingPolicy::Fixed(DEFAULT_TRADE_SIZE)
    }
}

impl SizingPolicy {
    pub fn ledger() -> Self {
        SizingPolicy::Ledger {
            risk_per_trade: DEFAULT_RISK_PER_TRADE,
        }
    }

    pub fn stop_loss() -> Self {
        SizingPolicy::StopLoss {
            risk_per_trade: DEFAULT_RISK_PER_TRADE,
            atr_multiplier: DEFAULT_ATR_MULTIPLIER,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub symbol: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub sizing: SizingPolicy,
    pub slippage_pct: f64,
    /// Percent of traded value charged on every fill.
    pub commission_pct: f64,
    /// Flat fee charged on every fill.
    pub commission_per_trade: f64,
    /// Force-close trades still open after the last signal at the final bar.
    pub close_open_at_end: bool,
    pub risk: RiskParams,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 100_000.0,
            symbol: DEFAULT_SYMBOL.to_string(),
            start_date: None,
            end_date: None,
            sizing: SizingPolicy::default(),
            slippage_pct: 0.0,
            commission_pct: 0.0,
            commission_per_trade: 0.0,
            close_open_at_end: false,
            risk: RiskParams::default(),
        }
    }
}

/// Long entry and short exit buy, so they fill above the signal price;
/// short entry and long exit sell below it.
pub fn apply_slippage(signal_type: SignalType, price: f64, slippage_pct: f64) -> f64 {
    match signal_type {
        SignalType::EntryLong | SignalType::ExitShort => price * (1.0 + slippage_pct / 100.0),
        SignalType::EntryShort | SignalType::ExitLong => price * (1.0 - slippage_pct / 100.0),
    }
}

/// Flat fee plus a percentage of the traded value.
pub fn calculate_commission(trade_value: f64, commission_per_trade: f64, commission_pct: f64) -> f64 {
    commission_per_trade + trade_value * commission_pct / 100.0
}

/// Price recorded on a trade for one fill of `size` units. Slippage moves the
/// price against the trader and commission is spread over the units, so
/// profit on recorded prices is already net of costs.
pub fn fill_price(config: &BacktestConfig, signal_type: SignalType, price: f64, size: f64) -> f64 {
    let slipped = apply_slippage(signal_type, price, config.slippage_pct);
    let commission = calculate_commission(
        slipped * size,
        config.commission_per_trade,
        config.commission_pct,
    );
    match signal_type {
        SignalType::EntryLong | SignalType::ExitShort => slipped + commission / size,
        SignalType::EntryShort | SignalType::ExitLong => slipped - commission / size,
    }
}

fn check_fill(price: f64) -> Result<f64, SkipReason> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(SkipReason::Fault(format!(
            "fill price {} is not a positive number",
            price
        )))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The risk gate said no.
    Rejected(RejectReason),
    /// The signal does not match a legal transition from the ledger state.
    InvalidTransition { from: Position },
    /// Arithmetic or input fault isolated to this signal.
    Fault(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSignal {
    /// Position of the signal in the strategy's output.
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub signal_type: SignalType,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub symbol: String,
    /// Every trade in entry order, closed and still open.
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub ledger: PositionLedger,
    pub skipped: Vec<SkippedSignal>,
    pub signals_received: usize,
    pub signals_applied: usize,
}

impl BacktestResult {
    pub fn closed_trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| !t.is_open())
    }

    pub fn open_trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| t.is_open())
    }

    pub fn has_open_position(&self) -> bool {
        self.trades.iter().any(Trade::is_open)
    }

    pub fn realized_profit(&self) -> f64 {
        self.closed_trades().map(Trade::profit).sum()
    }

    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.ledger.current_capital)
    }

    pub fn rejected_count(&self) -> usize {
        self.count_skipped(|r| matches!(r, SkipReason::Rejected(_)))
    }

    pub fn ignored_count(&self) -> usize {
        self.count_skipped(|r| matches!(r, SkipReason::InvalidTransition { .. }))
    }

    pub fn fault_count(&self) -> usize {
        self.count_skipped(|r| matches!(r, SkipReason::Fault(_)))
    }

    fn count_skipped(&self, pred: impl Fn(&SkipReason) -> bool) -> usize {
        self.skipped.iter().filter(|s| pred(&s.reason)).count()
    }
}

pub struct Backtester<'a> {
    pub config: BacktestConfig,
    strategy: &'a dyn Strategy,
}

impl<'a> Backtester<'a> {
    pub fn new(config: BacktestConfig, strategy: &'a dyn Strategy) -> Self {
        Backtester { config, strategy }
    }

    /// Runs against a fresh ledger and risk gate, so repeated runs over the
    /// same series are identical.
    pub fn run(&self, series: &PriceSeries) -> Result<BacktestResult, SsbtError> {
        let ledger = PositionLedger::new(self.config.initial_capital);
        let gate = RiskGate::new(self.config.risk.clone());
        self.run_with(series, ledger, gate)
    }

    /// Runs against caller-supplied ledger and gate state.
    pub fn run_with(
        &self,
        series: &PriceSeries,
        ledger: PositionLedger,
        gate: RiskGate,
    ) -> Result<BacktestResult, SsbtError> {
        let windowed;
        let series = if self.config.start_date.is_some() || self.config.end_date.is_some() {
            windowed = series.between(
                self.config.start_date.and_then(|d| d.and_hms_opt(0, 0, 0)),
                self.config.end_date.and_then(|d| d.and_hms_opt(23, 59, 59)),
            );
            &windowed
        } else {
            series
        };

        series.validate()?;
        series.require_columns(&self.strategy.required_columns())?;

        let prepared = self.strategy.calculate_indicators(series)?;
        let signals = self.strategy.generate_signals(&prepared)?;

        info!(
            strategy = self.strategy.name(),
            symbol = %self.config.symbol,
            bars = prepared.len(),
            signals = signals.len(),
            "running backtest"
        );

        self.execute(&prepared, &signals, ledger, gate)
    }

    /// The execution loop proper: consumes `signals` in the order given.
    pub fn execute(
        &self,
        series: &PriceSeries,
        signals: &[Signal],
        ledger: PositionLedger,
        gate: RiskGate,
    ) -> Result<BacktestResult, SsbtError> {
        series.validate()?;
        series.require_columns(&[CLOSE])?;
        let closes = series.close().unwrap_or_default();

        let mut run = RunState {
            config: &self.config,
            timestamps: series.timestamps(),
            closes,
            ledger,
            gate,
            trades: Vec::new(),
            open: HashMap::new(),
            equity_curve: Vec::with_capacity(series.len()),
            skipped: Vec::new(),
            applied: 0,
            next_bar: 0,
        };

        for (index, signal) in signals.iter().enumerate() {
            run.sample_before(signal.timestamp);
            if let Err(reason) = run.apply(signal) {
                run.skip(index, signal, reason);
            } else {
                run.applied += 1;
            }
        }
        run.sample_remaining();

        if self.config.close_open_at_end {
            run.close_all_at_last_bar();
        }

        let result = BacktestResult {
            symbol: self.config.symbol.clone(),
            trades: run.trades,
            equity_curve: run.equity_curve,
            ledger: run.ledger,
            skipped: run.skipped,
            signals_received: signals.len(),
            signals_applied: run.applied,
        };

        info!(
            trades = result.trades.len(),
            applied = result.signals_applied,
            rejected = result.rejected_count(),
            ignored = result.ignored_count(),
            faults = result.fault_count(),
            final_capital = result.ledger.current_capital,
            "backtest finished"
        );
        if result.has_open_position() {
            warn!(symbol = %result.symbol, "run ended with an open position");
        }

        Ok(result)
    }
}

struct RunState<'r> {
    config: &'r BacktestConfig,
    timestamps: &'r [NaiveDateTime],
    closes: &'r [f64],
    ledger: PositionLedger,
    gate: RiskGate,
    trades: Vec<Trade>,
    /// symbol -> index into `trades` of its open trade
    open: HashMap<String, usize>,
    equity_curve: Vec<EquityPoint>,
    skipped: Vec<SkippedSignal>,
    applied: usize,
    next_bar: usize,
}

impl RunState<'_> {
    fn symbol(&self) -> &str {
        &self.config.symbol
    }

    fn mark_to_market(&self, close: f64) -> f64 {
        let unrealized: f64 = self
            .open
            .values()
            .map(|&i| self.trades[i].unrealized_profit(close))
            .sum();
        self.ledger.current_capital + unrealized
    }

    fn sample_bar(&mut self) {
        let i = self.next_bar;
        let equity = self.mark_to_market(self.closes[i]);
        self.equity_curve.push(EquityPoint {
            timestamp: self.timestamps[i],
            equity,
        });
        self.next_bar += 1;
    }

    fn sample_before(&mut self, timestamp: NaiveDateTime) {
        while self.next_bar < self.timestamps.len() && self.timestamps[self.next_bar] < timestamp {
            self.sample_bar();
        }
    }

    fn sample_remaining(&mut self) {
        while self.next_bar < self.timestamps.len() {
            self.sample_bar();
        }
    }

    fn skip(&mut self, index: usize, signal: &Signal, reason: SkipReason) {
        match &reason {
            SkipReason::Rejected(why) => {
                debug!(index, signal = %signal.signal_type, %why, "risk gate rejected signal")
            }
            SkipReason::InvalidTransition { from } => {
                warn!(index, signal = %signal.signal_type, from = %from, "ignoring signal with no legal transition")
            }
            SkipReason::Fault(why) => {
                warn!(index, signal = %signal.signal_type, %why, "signal skipped after fault")
            }
        }
        self.skipped.push(SkippedSignal {
            index,
            timestamp: signal.timestamp,
            signal_type: signal.signal_type,
            reason,
        });
    }

    fn apply(&mut self, signal: &Signal) -> Result<(), SkipReason> {
        if !signal.price.is_finite() || signal.price <= 0.0 {
            return Err(SkipReason::Fault(format!(
                "signal price {} is not a positive number",
                signal.price
            )));
        }
        if signal.signal_type.is_entry() {
            self.enter(signal)
        } else {
            self.exit(signal)
        }
    }

    fn enter(&mut self, signal: &Signal) -> Result<(), SkipReason> {
        let current = self.ledger.get_current_position(self.symbol());
        if !current.is_flat() || self.open.contains_key(self.symbol()) {
            return Err(SkipReason::InvalidTransition { from: current });
        }

        match self.gate.validate_trade(signal, &self.ledger) {
            Ok(RiskDecision::Approved) => {}
            Ok(RiskDecision::Rejected(reason)) => return Err(SkipReason::Rejected(reason)),
            Err(e) => return Err(SkipReason::Fault(e.to_string())),
        }

        let (size, stop_loss) = self
            .entry_size(signal)
            .map_err(|e| SkipReason::Fault(e.to_string()))?;
        if !size.is_finite() || size <= 0.0 {
            return Err(SkipReason::Fault(format!(
                "position size {} is not a positive number",
                size
            )));
        }

        let position = signal.signal_type.position();
        let price = check_fill(fill_price(
            self.config,
            signal.signal_type,
            signal.price,
            size,
        ))?;
        let mut trade = Trade::open(price, signal.timestamp, position, size);
        trade.stop_loss = stop_loss;
        trade.metadata = signal.metadata.clone();

        debug!(position = %position, price, size, "opened trade");

        let symbol = self.config.symbol.clone();
        self.ledger.set_position(position, &symbol);
        self.open.insert(symbol, self.trades.len());
        self.trades.push(trade);
        Ok(())
    }

    fn entry_size(&self, signal: &Signal) -> Result<(f64, Option<f64>), SsbtError> {
        match self.config.sizing {
            SizingPolicy::Fixed(size) => Ok((size, None)),
            SizingPolicy::Ledger { risk_per_trade } => {
                Ok((self.ledger.get_position_size(signal.price, risk_per_trade)?, None))
            }
            SizingPolicy::StopLoss {
                risk_per_trade,
                atr_multiplier,
            } => match signal.metadata_number(ATR_METADATA_KEY) {
                Some(atr) => {
                    let stop = self.gate.calculate_stop_loss(signal, atr, atr_multiplier);
                    let size = self.gate.calculate_position_size(
                        signal,
                        &self.ledger,
                        Some(stop),
                        risk_per_trade,
                    )?;
                    // A stop at exactly zero sizes like no stop at all.
                    Ok((size, (stop != 0.0).then_some(stop)))
                }
                None => Ok((self.ledger.get_position_size(signal.price, risk_per_trade)?, None)),
            },
        }
    }

    fn exit(&mut self, signal: &Signal) -> Result<(), SkipReason> {
        let current = self.ledger.get_current_position(self.symbol());
        let Some(&index) = self.open.get(self.symbol()) else {
            return Err(SkipReason::InvalidTransition { from: current });
        };
        if self.trades[index].position != signal.signal_type.position() {
            return Err(SkipReason::InvalidTransition { from: current });
        }

        let size = self.trades[index].size;
        let price = check_fill(fill_price(
            self.config,
            signal.signal_type,
            signal.price,
            size,
        ))?;
        self.close_trade(index, price, signal.timestamp);
        Ok(())
    }

    fn close_trade(&mut self, index: usize, price: f64, timestamp: NaiveDateTime) {
        let trade = &mut self.trades[index];
        trade.close(price, timestamp);
        debug!(position = %trade.position, price, profit = trade.profit(), "closed trade");
        self.ledger.update_capital(&self.trades[index]);

        let symbol = self.config.symbol.clone();
        self.ledger.set_position(Position::Flat, &symbol);
        self.open.remove(&symbol);
    }

    fn close_all_at_last_bar(&mut self) {
        let (Some(&timestamp), Some(&close)) = (self.timestamps.last(), self.closes.last()) else {
            return;
        };
        let mut open: Vec<usize> = self.open.values().copied().collect();
        open.sort_unstable();
        for index in open {
            let exit_type = match self.trades[index].position {
                Position::Short => SignalType::ExitShort,
                _ => SignalType::ExitLong,
            };
            let fill = fill_price(self.config, exit_type, close, self.trades[index].size);
            match check_fill(fill) {
                Ok(price) => {
                    info!(price, "force-closing open trade at final bar");
                    self.close_trade(index, price, timestamp);
                }
                Err(_) => warn!(fill, "cannot force-close open trade, fill price is not positive"),
            }
        }
        if let Some(last) = self.equity_curve.last_mut() {
            last.equity = self.ledger.current_capital;
        }
    }
}
