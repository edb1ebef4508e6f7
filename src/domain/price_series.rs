//! Time-indexed price table consumed by strategies and the execution loop.
//!
//! Columns are named f64 vectors (names lower-cased) sharing one timestamp
//! index. Only `close` is required by the core; strategies declare anything
//! else they need. Indicator output is kept beside the raw columns, keyed by
//! [`IndicatorType`].

use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap};

use super::error::SsbtError;
use super::indicator::{IndicatorSeries, IndicatorType};

pub const CLOSE: &str = "close";
pub const HIGH: &str = "high";
pub const LOW: &str = "low";

#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    pub symbol: String,
    timestamps: Vec<NaiveDateTime>,
    columns: BTreeMap<String, Vec<f64>>,
    indicators: HashMap<IndicatorType, IndicatorSeries>,
}

impl PriceSeries {
    pub fn new(
        symbol: &str,
        timestamps: Vec<NaiveDateTime>,
        columns: BTreeMap<String, Vec<f64>>,
    ) -> Result<Self, SsbtError> {
        let expected = timestamps.len();
        let mut normalized = BTreeMap::new();
        for (name, values) in columns {
            if values.len() != expected {
                return Err(SsbtError::ColumnLength {
                    column: name,
                    expected,
                    actual: values.len(),
                });
            }
            normalized.insert(name.trim().to_lowercase(), values);
        }
        Ok(PriceSeries {
            symbol: symbol.to_string(),
            timestamps,
            columns: normalized,
            indicators: HashMap::new(),
        })
    }

    /// Convenience constructor for a close-only series.
    pub fn from_closes(
        symbol: &str,
        timestamps: Vec<NaiveDateTime>,
        closes: Vec<f64>,
    ) -> Result<Self, SsbtError> {
        let mut columns = BTreeMap::new();
        columns.insert(CLOSE.to_string(), closes);
        PriceSeries::new(symbol, timestamps, columns)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn close(&self) -> Option<&[f64]> {
        self.column(CLOSE)
    }

    pub fn close_at(&self, index: usize) -> Option<f64> {
        self.close().and_then(|c| c.get(index).copied())
    }

    pub fn indicator(&self, indicator_type: &IndicatorType) -> Option<&IndicatorSeries> {
        self.indicators.get(indicator_type)
    }

    pub fn has_indicator(&self, indicator_type: &IndicatorType) -> bool {
        self.indicators.contains_key(indicator_type)
    }

    pub fn insert_indicator(&mut self, series: IndicatorSeries) {
        self.indicators.insert(series.indicator_type.clone(), series);
    }

    /// Structural checks run before a backtest: non-empty, strictly
    /// increasing timestamps, and finite values in every column.
    pub fn validate(&self) -> Result<(), SsbtError> {
        if self.is_empty() {
            return Err(SsbtError::EmptySeries);
        }
        for (i, pair) in self.timestamps.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(SsbtError::NonMonotonicTimestamps {
                    index: i + 1,
                    previous: pair[0],
                    current: pair[1],
                });
            }
        }
        for (name, values) in &self.columns {
            if let Some((index, &value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
                return Err(SsbtError::NonFiniteValue {
                    column: name.clone(),
                    index,
                    value,
                });
            }
        }
        Ok(())
    }

    pub fn require_columns(&self, required: &[&str]) -> Result<(), SsbtError> {
        match required.iter().find(|c| !self.has_column(c)) {
            Some(missing) => Err(SsbtError::MissingColumn {
                column: missing.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Rows with `start <= timestamp <= end`; either bound may be open.
    /// Indicators are dropped since their warmup no longer lines up.
    pub fn between(&self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> PriceSeries {
        let keep: Vec<usize> = self
            .timestamps
            .iter()
            .enumerate()
            .filter(|(_, t)| start.is_none_or(|s| **t >= s) && end.is_none_or(|e| **t <= e))
            .map(|(i, _)| i)
            .collect();

        let timestamps = keep.iter().map(|&i| self.timestamps[i]).collect();
        let columns = self
            .columns
            .iter()
            .map(|(name, values)| (name.clone(), keep.iter().map(|&i| values[i]).collect()))
            .collect();

        PriceSeries {
            symbol: self.symbol.clone(),
            timestamps,
            columns,
            indicators: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn sample() -> PriceSeries {
        let mut columns = BTreeMap::new();
        columns.insert("Close".to_string(), vec![100.0, 101.0, 102.0]);
        columns.insert("high".to_string(), vec![101.0, 102.0, 103.0]);
        PriceSeries::new("BHP", vec![at(1), at(2), at(3)], columns).unwrap()
    }

    #[test]
    fn column_names_are_lowercased() {
        let s = sample();
        assert!(s.has_column("close"));
        assert!(!s.has_column("Close"));
        assert_eq!(s.close_at(1), Some(101.0));
    }

    #[test]
    fn mismatched_column_length_is_rejected() {
        let mut columns = BTreeMap::new();
        columns.insert("close".to_string(), vec![1.0, 2.0]);
        let err = PriceSeries::new("X", vec![at(1)], columns).unwrap_err();
        assert!(matches!(
            err,
            SsbtError::ColumnLength {
                expected: 1,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn validate_accepts_increasing_timestamps() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty() {
        let s = PriceSeries::from_closes("X", vec![], vec![]).unwrap();
        assert!(matches!(s.validate(), Err(SsbtError::EmptySeries)));
    }

    #[test]
    fn validate_rejects_duplicate_timestamp() {
        let s = PriceSeries::from_closes("X", vec![at(1), at(2), at(2)], vec![1.0, 2.0, 3.0])
            .unwrap();
        match s.validate() {
            Err(SsbtError::NonMonotonicTimestamps { index, .. }) => assert_eq!(index, 2),
            other => panic!("expected NonMonotonicTimestamps, got {:?}", other),
        }
    }

    #[test]
    fn validate_rejects_nan_close() {
        let s = PriceSeries::from_closes("X", vec![at(1), at(2), at(3)], vec![100.0, f64::NAN, 110.0])
            .unwrap();
        match s.validate() {
            Err(SsbtError::NonFiniteValue { column, index, .. }) => {
                assert_eq!(column, "close");
                assert_eq!(index, 1);
            }
            other => panic!("expected NonFiniteValue, got {:?}", other),
        }
    }

    #[test]
    fn validate_rejects_infinite_value_in_any_column() {
        let mut columns = BTreeMap::new();
        columns.insert("close".to_string(), vec![100.0, 101.0]);
        columns.insert("high".to_string(), vec![f64::INFINITY, 102.0]);
        let s = PriceSeries::new("X", vec![at(1), at(2)], columns).unwrap();
        assert!(matches!(
            s.validate(),
            Err(SsbtError::NonFiniteValue { column, index: 0, .. }) if column == "high"
        ));
    }

    #[test]
    fn require_columns_reports_first_missing() {
        let s = sample();
        assert!(s.require_columns(&["close", "high"]).is_ok());
        match s.require_columns(&["close", "low"]) {
            Err(SsbtError::MissingColumn { column }) => assert_eq!(column, "low"),
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn between_filters_inclusive() {
        let s = sample().between(Some(at(2)), None);
        assert_eq!(s.len(), 2);
        assert_eq!(s.timestamps()[0], at(2));
        assert_eq!(s.column("high"), Some(&[102.0, 103.0][..]));

        let s = sample().between(Some(at(2)), Some(at(2)));
        assert_eq!(s.len(), 1);
    }
}
