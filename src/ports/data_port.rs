//! Price data access port.

use crate::domain::error::SsbtError;
use crate::domain::price_series::PriceSeries;

pub trait DataPort {
    /// Full history for `symbol`, oldest bar first.
    fn fetch_series(&self, symbol: &str) -> Result<PriceSeries, SsbtError>;

    fn list_symbols(&self) -> Result<Vec<String>, SsbtError>;
}
