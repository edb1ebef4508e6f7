//! Report output port.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::SsbtError;
use crate::domain::metrics::TradeSummary;
use std::path::Path;

/// Port for persisting a finished backtest.
pub trait ReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        summary: &TradeSummary,
        output_dir: &Path,
    ) -> Result<(), SsbtError>;
}
