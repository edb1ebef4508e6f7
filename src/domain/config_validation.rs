//! Configuration validation.
//!
//! Every field is checked before a run starts. A key that is present but not
//! parseable is an error rather than a silent fallback to the default.

use crate::domain::error::SsbtError;
use crate::ports::config_port::{ConfigPort, parse_bool};
use chrono::NaiveDate;

pub const SIZING_MODES: [&str; 3] = ["fixed", "ledger", "stop_loss"];
pub const STRATEGY_NAMES: [&str; 1] = ["ma_crossover"];

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), SsbtError> {
    validate_initial_capital(config)?;
    validate_symbol(config)?;
    validate_dates(config)?;
    validate_sizing(config)?;
    validate_slippage(config)?;
    validate_commission(config)?;
    validate_flag(config, "backtest", "close_open_at_end")?;
    Ok(())
}

pub fn validate_risk_config(config: &dyn ConfigPort) -> Result<(), SsbtError> {
    let max_drawdown = read_double(config, "risk", "max_drawdown")?;
    if max_drawdown.is_some_and(|v| !(0.0..=1.0).contains(&v)) {
        return Err(invalid("risk", "max_drawdown", "max_drawdown must be between 0 and 1"));
    }

    let max_position_size = read_double(config, "risk", "max_position_size")?;
    if max_position_size.is_some_and(|v| v <= 0.0) {
        return Err(invalid(
            "risk",
            "max_position_size",
            "max_position_size must be positive",
        ));
    }

    let max_positions = read_int(config, "risk", "max_positions")?;
    if max_positions.is_some_and(|v| v < 1) {
        return Err(invalid("risk", "max_positions", "max_positions must be at least 1"));
    }
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), SsbtError> {
    if let Some(name) = config.get_string("strategy", "name") {
        let name = name.trim().to_lowercase();
        if !STRATEGY_NAMES.contains(&name.as_str()) {
            return Err(SsbtError::UnknownStrategy { name });
        }
    }

    let fast = read_int(config, "strategy", "fast_period")?.unwrap_or(10);
    if fast < 1 {
        return Err(invalid("strategy", "fast_period", "fast_period must be at least 1"));
    }

    let slow = read_int(config, "strategy", "slow_period")?.unwrap_or(30);
    if slow <= fast {
        return Err(invalid(
            "strategy",
            "slow_period",
            "slow_period must be greater than fast_period",
        ));
    }

    let atr = read_int(config, "strategy", "atr_period")?;
    if atr.is_some_and(|v| v < 0) {
        return Err(invalid("strategy", "atr_period", "atr_period must be non-negative"));
    }
    Ok(())
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), SsbtError> {
    let value = read_double(config, "backtest", "initial_capital")?;
    if value.is_some_and(|v| v <= 0.0 || !v.is_finite()) {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_symbol(config: &dyn ConfigPort) -> Result<(), SsbtError> {
    match config.get_string("backtest", "symbol") {
        Some(s) if s.trim().is_empty() => Err(invalid("backtest", "symbol", "symbol must not be empty")),
        _ => Ok(()),
    }
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), SsbtError> {
    let start_date = parse_date(config, "start_date")?;
    let end_date = parse_date(config, "end_date")?;

    if let (Some(start), Some(end)) = (start_date, end_date) {
        if start > end {
            return Err(invalid(
                "backtest",
                "start_date",
                "start_date must not be after end_date",
            ));
        }
    }
    Ok(())
}

/// Optional `YYYY-MM-DD` date from `[backtest]`.
pub fn parse_date(config: &dyn ConfigPort, field: &str) -> Result<Option<NaiveDate>, SsbtError> {
    match config.get_string("backtest", field) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                invalid(
                    "backtest",
                    field,
                    &format!("invalid {} format, expected YYYY-MM-DD", field),
                )
            }),
    }
}

fn validate_sizing(config: &dyn ConfigPort) -> Result<(), SsbtError> {
    if let Some(mode) = config.get_string("backtest", "sizing") {
        if !SIZING_MODES.contains(&mode.trim().to_lowercase().as_str()) {
            return Err(invalid(
                "backtest",
                "sizing",
                "sizing must be one of fixed, ledger, stop_loss",
            ));
        }
    }

    let fixed_size = read_double(config, "backtest", "fixed_size")?;
    if fixed_size.is_some_and(|v| v <= 0.0 || !v.is_finite()) {
        return Err(invalid("backtest", "fixed_size", "fixed_size must be positive"));
    }

    let risk = read_double(config, "backtest", "risk_per_trade")?;
    if risk.is_some_and(|v| v <= 0.0 || v > 1.0) {
        return Err(invalid(
            "backtest",
            "risk_per_trade",
            "risk_per_trade must be in (0, 1]",
        ));
    }

    let multiplier = read_double(config, "backtest", "atr_multiplier")?;
    if multiplier.is_some_and(|v| v <= 0.0) {
        return Err(invalid(
            "backtest",
            "atr_multiplier",
            "atr_multiplier must be positive",
        ));
    }
    Ok(())
}

fn validate_slippage(config: &dyn ConfigPort) -> Result<(), SsbtError> {
    let value = read_double(config, "backtest", "slippage_pct")?;
    if value.is_some_and(|v| v < 0.0 || v >= 100.0) {
        return Err(invalid(
            "backtest",
            "slippage_pct",
            "slippage_pct must be in [0, 100)",
        ));
    }
    Ok(())
}

fn validate_commission(config: &dyn ConfigPort) -> Result<(), SsbtError> {
    let pct = read_double(config, "backtest", "commission_pct")?;
    if pct.is_some_and(|v| v < 0.0 || v >= 100.0) {
        return Err(invalid(
            "backtest",
            "commission_pct",
            "commission_pct must be in [0, 100)",
        ));
    }

    let fee = read_double(config, "backtest", "commission_per_trade")?;
    if fee.is_some_and(|v| v < 0.0) {
        return Err(invalid(
            "backtest",
            "commission_per_trade",
            "commission_per_trade must be non-negative",
        ));
    }
    Ok(())
}

fn validate_flag(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), SsbtError> {
    match config.get_string(section, key) {
        Some(v) if parse_bool(&v).is_none() => {
            Err(invalid(section, key, &format!("{} must be true or false", key)))
        }
        _ => Ok(()),
    }
}

/// `nan` and `inf` parse as floats but are never valid settings.
fn read_double(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, SsbtError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(invalid(section, key, &format!("{} must be a finite number", key))),
        },
    }
}

fn read_int(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<i64>, SsbtError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| invalid(section, key, &format!("{} must be an integer", key))),
    }
}

fn invalid(section: &str, key: &str, reason: &str) -> SsbtError {
    SsbtError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
