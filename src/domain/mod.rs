//! Core domain types and logic: series, signals, ledger, risk and the execution loop.

pub mod price_series;
pub mod indicator;
pub mod signal;
pub mod position;
pub mod ledger;
pub mod risk;
pub mod strategy;
pub mod backtest;
pub mod metrics;
pub mod config_validation;
pub mod error;
