#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use ssbt::domain::backtest::BacktestConfig;
use ssbt::domain::error::SsbtError;
use ssbt::domain::price_series::PriceSeries;
use ssbt::domain::signal::{Signal, SignalType};
use ssbt::domain::strategy::Strategy;
use ssbt::ports::data_port::DataPort;
use std::collections::{BTreeMap, HashMap};
use std::process::ExitCode;

/// Replays a fixed signal list regardless of the series it is given.
pub struct ScriptedStrategy {
    pub signals: Vec<Signal>,
}

impl ScriptedStrategy {
    pub fn new(signals: Vec<Signal>) -> Self {
        Self { signals }
    }
}

impl Strategy for ScriptedStrategy {
    fn name(&self) -> &str {
        "scripted"
    }

    fn calculate_indicators(&self, series: &PriceSeries) -> Result<PriceSeries, SsbtError> {
        Ok(series.clone())
    }

    fn generate_signals(&self, _series: &PriceSeries) -> Result<Vec<Signal>, SsbtError> {
        Ok(self.signals.clone())
    }
}

pub struct MockDataPort {
    pub data: HashMap<String, PriceSeries>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_series(mut self, series: PriceSeries) -> Self {
        self.data.insert(series.symbol.clone(), series);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_series(&self, symbol: &str) -> Result<PriceSeries, SsbtError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(SsbtError::Data {
                reason: reason.clone(),
            });
        }
        self.data.get(symbol).cloned().ok_or_else(|| SsbtError::Data {
            reason: format!("no data for {}", symbol),
        })
    }

    fn list_symbols(&self) -> Result<Vec<String>, SsbtError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Midnight of 2024-01-01 plus `day` days.
pub fn at(day: i64) -> NaiveDateTime {
    date(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap() + Duration::days(day)
}

pub fn daily_series(symbol: &str, closes: &[f64]) -> PriceSeries {
    let timestamps = (0..closes.len() as i64).map(at).collect();
    PriceSeries::from_closes(symbol, timestamps, closes.to_vec()).unwrap()
}

pub fn ohlc_series(symbol: &str, closes: &[f64]) -> PriceSeries {
    let timestamps = (0..closes.len() as i64).map(at).collect();
    let mut columns = BTreeMap::new();
    columns.insert("close".to_string(), closes.to_vec());
    columns.insert("high".to_string(), closes.iter().map(|c| c + 1.0).collect());
    columns.insert("low".to_string(), closes.iter().map(|c| c - 1.0).collect());
    PriceSeries::new(symbol, timestamps, columns).unwrap()
}

/// Flat prices for `n` days.
pub fn flat_series(symbol: &str, n: usize, price: f64) -> PriceSeries {
    daily_series(symbol, &vec![price; n])
}

pub fn signal(kind: SignalType, price: f64, day: i64) -> Signal {
    Signal::new(kind, price, at(day))
}

pub fn sample_config() -> BacktestConfig {
    BacktestConfig {
        initial_capital: 100_000.0,
        symbol: "TEST".to_string(),
        ..BacktestConfig::default()
    }
}

/// `ExitCode` has no `PartialEq`; compare through its debug form.
pub fn same_exit_code(actual: ExitCode, expected: ExitCode) -> bool {
    format!("{actual:?}") == format!("{expected:?}")
}

/// V-shaped then inverted-V closes: one long round trip, then one short.
pub fn crossover_closes() -> Vec<f64> {
    vec![10.0, 9.0, 8.0, 7.0, 12.0, 13.0, 14.0, 5.0, 4.0]
}
