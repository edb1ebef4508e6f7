//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestConfig, BacktestResult, Backtester, SizingPolicy};
use crate::domain::config_validation::{
    parse_date, validate_backtest_config, validate_risk_config, validate_strategy_config,
};
use crate::domain::error::SsbtError;
use crate::domain::ledger::{DEFAULT_RISK_PER_TRADE, DEFAULT_SYMBOL};
use crate::domain::metrics::{TradeSummary, max_drawdown, total_return};
use crate::domain::position::DEFAULT_TRADE_SIZE;
use crate::domain::risk::{DEFAULT_ATR_MULTIPLIER, RiskParams};
use crate::domain::strategy::{MovingAverageCrossover, Strategy};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "ssbt", about = "Signal-driven strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory holding <SYMBOL>.csv files (overrides [backtest] data_dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long)]
        symbol: Option<String>,
        /// Directory for trades.csv, equity.csv and summary.csv
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file and print the resolved settings
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List symbols with a CSV file in a data directory
    ListSymbols {
        #[arg(long)]
        data_dir: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            data_dir,
            symbol,
            output,
        } => run_backtest(
            &config,
            data_dir.as_deref(),
            symbol.as_deref(),
            output.as_deref(),
        ),
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { data_dir } => run_list_symbols(&data_dir),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = SsbtError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Runs every section validator in order.
pub fn validate_config(config: &dyn ConfigPort) -> Result<(), SsbtError> {
    validate_backtest_config(config)?;
    validate_risk_config(config)?;
    validate_strategy_config(config)?;
    Ok(())
}

fn run_backtest(
    config_path: &Path,
    data_dir_override: Option<&Path>,
    symbol_override: Option<&str>,
    output_dir: Option<&Path>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let mut bt_config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    if let Some(symbol) = symbol_override {
        bt_config.symbol = symbol.to_string();
    }

    let strategy = match build_strategy(&adapter) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    eprintln!("Strategy: {}", strategy.name());

    let data_dir = resolve_data_dir(data_dir_override, &adapter);
    let data_port = CsvAdapter::new(data_dir);
    let report_port = CsvReportAdapter::new();

    run_backtest_pipeline(
        &data_port,
        &report_port,
        strategy.as_ref(),
        &bt_config,
        output_dir,
    )
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, SsbtError> {
    let risk_per_trade = adapter.get_double("backtest", "risk_per_trade", DEFAULT_RISK_PER_TRADE);
    let sizing_mode = adapter
        .get_string("backtest", "sizing")
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_else(|| "fixed".to_string());

    let sizing = match sizing_mode.as_str() {
        "fixed" => SizingPolicy::Fixed(adapter.get_double(
            "backtest",
            "fixed_size",
            DEFAULT_TRADE_SIZE,
        )),
        "ledger" => SizingPolicy::Ledger { risk_per_trade },
        "stop_loss" => SizingPolicy::StopLoss {
            risk_per_trade,
            atr_multiplier: adapter.get_double(
                "backtest",
                "atr_multiplier",
                DEFAULT_ATR_MULTIPLIER,
            ),
        },
        other => {
            return Err(SsbtError::ConfigInvalid {
                section: "backtest".into(),
                key: "sizing".into(),
                reason: format!("unknown sizing mode '{}'", other),
            });
        }
    };

    let defaults = RiskParams::default();
    let risk = RiskParams {
        max_drawdown: adapter.get_double("risk", "max_drawdown", defaults.max_drawdown),
        max_position_size: adapter.get_double(
            "risk",
            "max_position_size",
            defaults.max_position_size,
        ),
        max_positions: adapter
            .get_int("risk", "max_positions", defaults.max_positions as i64)
            .max(0) as usize,
    };

    Ok(BacktestConfig {
        initial_capital: adapter.get_double("backtest", "initial_capital", 100_000.0),
        symbol: adapter
            .get_string("backtest", "symbol")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SYMBOL.to_string()),
        start_date: parse_date(adapter, "start_date")?,
        end_date: parse_date(adapter, "end_date")?,
        sizing,
        slippage_pct: adapter.get_double("backtest", "slippage_pct", 0.0),
        commission_pct: adapter.get_double("backtest", "commission_pct", 0.0),
        commission_per_trade: adapter.get_double("backtest", "commission_per_trade", 0.0),
        close_open_at_end: adapter.get_bool("backtest", "close_open_at_end", false),
        risk,
    })
}

pub fn build_strategy(adapter: &dyn ConfigPort) -> Result<Box<dyn Strategy>, SsbtError> {
    let name = adapter
        .get_string("strategy", "name")
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_else(|| "ma_crossover".to_string());

    match name.as_str() {
        "ma_crossover" => {
            let fast = adapter.get_int("strategy", "fast_period", 10).max(1) as usize;
            let slow = adapter.get_int("strategy", "slow_period", 30).max(1) as usize;
            let atr = adapter.get_int("strategy", "atr_period", 0);

            let strategy = MovingAverageCrossover::new(fast, slow);
            Ok(if atr > 0 {
                Box::new(strategy.with_atr(atr as usize))
            } else {
                Box::new(strategy)
            })
        }
        _ => Err(SsbtError::UnknownStrategy { name }),
    }
}

pub fn resolve_data_dir(override_dir: Option<&Path>, config: &dyn ConfigPort) -> PathBuf {
    match override_dir {
        Some(dir) => dir.to_path_buf(),
        None => config
            .get_string("backtest", "data_dir")
            .filter(|s| !s.trim().is_empty())
            .map(|s| PathBuf::from(s.trim()))
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    report_port: &dyn ReportPort,
    strategy: &dyn Strategy,
    bt_config: &BacktestConfig,
    output_dir: Option<&Path>,
) -> ExitCode {
    let series = match data_port.fetch_series(&bt_config.symbol) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!(
        "Running backtest: {} ({} bars)",
        bt_config.symbol,
        series.len()
    );

    let backtester = Backtester::new(bt_config.clone(), strategy);
    let result = match backtester.run(&series) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let summary = TradeSummary::compute(&result.trades, bt_config.initial_capital);
    print_summary(&result, &summary);

    if let Some(dir) = output_dir {
        if let Err(e) = report_port.write(&result, &summary, dir) {
            eprintln!("error: failed to write report: {e}");
            return (&e).into();
        }
        eprintln!("\nReports written to: {}", dir.display());
    }

    ExitCode::SUCCESS
}

fn print_summary(result: &BacktestResult, summary: &TradeSummary) {
    eprintln!("\n=== Results: {} ===", result.symbol);
    eprintln!("Final Capital:    {:.2}", summary.final_capital);
    eprintln!("Final Equity:     {:.2}", result.final_equity());
    eprintln!(
        "Total Return:     {:.2}%",
        total_return(result.ledger.initial_capital, &result.equity_curve) * 100.0
    );
    eprintln!(
        "Max Drawdown:     -{:.1}%",
        max_drawdown(&result.equity_curve) * 100.0
    );
    eprintln!("Total Trades:     {}", summary.total_trades);
    eprintln!("Win Rate:         {:.1}%", summary.win_rate * 100.0);
    eprintln!("Avg Win:          {:.2}", summary.avg_win);
    eprintln!("Avg Loss:         {:.2}", summary.avg_loss);
    eprintln!("Largest Win:      {:.2}", summary.largest_win);
    eprintln!("Largest Loss:     {:.2}", summary.largest_loss);
    eprintln!("Profit Factor:    {:.2}", summary.profit_factor);
    eprintln!("Avg Duration:     {}", summary.avg_duration);

    let open = result.open_trades().count();
    if open > 0 {
        eprintln!("Open Trades:      {}", open);
    }
    eprintln!(
        "Signals:          {} received, {} applied, {} rejected, {} ignored, {} faults",
        result.signals_received,
        result.signals_applied,
        result.rejected_count(),
        result.ignored_count(),
        result.fault_count(),
    );
}

fn run_validate(config_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let bt_config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let strategy = match build_strategy(&adapter) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let date_or_open = |d: Option<chrono::NaiveDate>| {
        d.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
    };

    eprintln!("Backtest:");
    eprintln!("  symbol:            {}", bt_config.symbol);
    eprintln!("  initial_capital:   {:.2}", bt_config.initial_capital);
    eprintln!("  data_dir:          {}", resolve_data_dir(None, &adapter).display());
    eprintln!("  start_date:        {}", date_or_open(bt_config.start_date));
    eprintln!("  end_date:          {}", date_or_open(bt_config.end_date));
    eprintln!("  sizing:            {:?}", bt_config.sizing);
    eprintln!("  slippage_pct:      {}", bt_config.slippage_pct);
    eprintln!("  commission_pct:    {}", bt_config.commission_pct);
    eprintln!("  commission_fee:    {}", bt_config.commission_per_trade);
    eprintln!("  close_open_at_end: {}", bt_config.close_open_at_end);
    eprintln!("\nRisk:");
    eprintln!("  max_drawdown:      {}", bt_config.risk.max_drawdown);
    eprintln!("  max_position_size: {}", bt_config.risk.max_position_size);
    eprintln!("  max_positions:     {}", bt_config.risk.max_positions);
    eprintln!("\nStrategy:");
    eprintln!("  name:              {}", strategy.name());
    eprintln!("  columns:           {}", strategy.required_columns().join(", "));

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_list_symbols(data_dir: &Path) -> ExitCode {
    let adapter = CsvAdapter::new(data_dir.to_path_buf());
    match adapter.list_symbols() {
        Ok(symbols) => {
            for symbol in &symbols {
                println!("{}", symbol);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}
