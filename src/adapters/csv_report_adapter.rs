//! CSV report writer.
//!
//! Writes three files into the output directory:
//! `trades.csv` (one row per trade, open trades with empty exit fields),
//! `equity.csv` (the equity curve with its drawdown) and `summary.csv`
//! (metric/value pairs).

use std::fs;
use std::path::Path;

use tracing::info;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::SsbtError;
use crate::domain::metrics::{TradeSummary, drawdown_curve, max_drawdown, total_return};
use crate::ports::report_port::ReportPort;

pub const TRADES_FILE: &str = "trades.csv";
pub const EQUITY_FILE: &str = "equity.csv";
pub const SUMMARY_FILE: &str = "summary.csv";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn csv_err(e: csv::Error) -> SsbtError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => SsbtError::Io(io),
        other => SsbtError::Data {
            reason: format!("CSV write error: {:?}", other),
        },
    }
}

fn opt_num(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn write_trades(result: &BacktestResult, path: &Path) -> Result<(), SsbtError> {
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    wtr.write_record([
        "symbol",
        "position",
        "size",
        "entry_time",
        "entry_price",
        "exit_time",
        "exit_price",
        "stop_loss",
        "profit",
    ])
    .map_err(csv_err)?;

    for trade in &result.trades {
        wtr.write_record([
            result.symbol.clone(),
            trade.position.to_string(),
            trade.size.to_string(),
            trade.entry_time.format(TIME_FORMAT).to_string(),
            trade.entry_price.to_string(),
            trade
                .exit_time
                .map(|t| t.format(TIME_FORMAT).to_string())
                .unwrap_or_default(),
            opt_num(trade.exit_price),
            opt_num(trade.stop_loss),
            if trade.is_open() {
                String::new()
            } else {
                trade.profit().to_string()
            },
        ])
        .map_err(csv_err)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_equity(result: &BacktestResult, path: &Path) -> Result<(), SsbtError> {
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    wtr.write_record(["timestamp", "equity", "drawdown"])
        .map_err(csv_err)?;

    let drawdowns = drawdown_curve(&result.equity_curve);
    for (point, dd) in result.equity_curve.iter().zip(&drawdowns) {
        wtr.write_record([
            point.timestamp.format(TIME_FORMAT).to_string(),
            point.equity.to_string(),
            dd.drawdown.to_string(),
        ])
        .map_err(csv_err)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_summary(
    result: &BacktestResult,
    summary: &TradeSummary,
    path: &Path,
) -> Result<(), SsbtError> {
    let rows: Vec<(&str, String)> = vec![
        ("symbol", result.symbol.clone()),
        ("initial_capital", result.ledger.initial_capital.to_string()),
        ("final_capital", summary.final_capital.to_string()),
        ("final_equity", result.final_equity().to_string()),
        ("total_profit", summary.total_profit.to_string()),
        (
            "total_return",
            total_return(result.ledger.initial_capital, &result.equity_curve).to_string(),
        ),
        ("total_trades", summary.total_trades.to_string()),
        ("winning_trades", summary.winning_trades.to_string()),
        ("losing_trades", summary.losing_trades.to_string()),
        ("win_rate", summary.win_rate.to_string()),
        ("avg_win", summary.avg_win.to_string()),
        ("avg_loss", summary.avg_loss.to_string()),
        ("largest_win", summary.largest_win.to_string()),
        ("largest_loss", summary.largest_loss.to_string()),
        ("profit_factor", summary.profit_factor.to_string()),
        (
            "avg_duration_secs",
            summary.avg_duration.num_seconds().to_string(),
        ),
        ("max_drawdown", max_drawdown(&result.equity_curve).to_string()),
        ("open_trades", result.open_trades().count().to_string()),
        ("signals_received", result.signals_received.to_string()),
        ("signals_applied", result.signals_applied.to_string()),
        ("signals_rejected", result.rejected_count().to_string()),
        ("signals_ignored", result.ignored_count().to_string()),
        ("signal_faults", result.fault_count().to_string()),
    ];

    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    wtr.write_record(["metric", "value"]).map_err(csv_err)?;
    for (name, value) in rows {
        wtr.write_record([name, value.as_str()]).map_err(csv_err)?;
    }
    wtr.flush()?;
    Ok(())
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        summary: &TradeSummary,
        output_dir: &Path,
    ) -> Result<(), SsbtError> {
        fs::create_dir_all(output_dir)?;
        write_trades(result, &output_dir.join(TRADES_FILE))?;
        write_equity(result, &output_dir.join(EQUITY_FILE))?;
        write_summary(result, summary, &output_dir.join(SUMMARY_FILE))?;
        info!(dir = %output_dir.display(), "reports written");
        Ok(())
    }
}
