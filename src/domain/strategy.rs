//! Strategy capability and the shipped moving-average crossover.

use super::error::SsbtError;
use super::indicator::atr::calculate_atr;
use super::indicator::sma::calculate_sma;
use super::indicator::{IndicatorSeries, IndicatorType};
use super::position::Position;
use super::price_series::{CLOSE, HIGH, LOW, PriceSeries};
use super::signal::{Signal, SignalType};

/// Metadata key carrying the ATR value on entry signals.
pub const ATR_METADATA_KEY: &str = "atr";

/// A signal generator driven by a price series.
///
/// The backtester calls `calculate_indicators` once and hands the returned
/// series to `generate_signals`. Signals must come back in the order they
/// are meant to be executed.
pub trait Strategy {
    fn name(&self) -> &str;

    fn required_columns(&self) -> Vec<&'static str> {
        vec![CLOSE]
    }

    fn calculate_indicators(&self, series: &PriceSeries) -> Result<PriceSeries, SsbtError>;

    fn generate_signals(&self, series: &PriceSeries) -> Result<Vec<Signal>, SsbtError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverageCrossover {
    pub fast_period: usize,
    pub slow_period: usize,
    /// When set, entries carry an `atr` metadata value for stop-loss sizing.
    pub atr_period: Option<usize>,
}

impl Default for MovingAverageCrossover {
    fn default() -> Self {
        MovingAverageCrossover {
            fast_period: 10,
            slow_period: 30,
            atr_period: None,
        }
    }
}

impl MovingAverageCrossover {
    pub fn new(fast_period: usize, slow_period: usize) -> Self {
        MovingAverageCrossover {
            fast_period,
            slow_period,
            atr_period: None,
        }
    }

    pub fn with_atr(mut self, period: usize) -> Self {
        self.atr_period = Some(period);
        self
    }
}

fn require_indicator<'a>(
    series: &'a PriceSeries,
    indicator_type: &IndicatorType,
) -> Result<&'a IndicatorSeries, SsbtError> {
    series
        .indicator(indicator_type)
        .ok_or_else(|| SsbtError::MissingColumn {
            column: indicator_type.to_string(),
        })
}

fn require_column<'a>(series: &'a PriceSeries, name: &str) -> Result<&'a [f64], SsbtError> {
    series.column(name).ok_or_else(|| SsbtError::MissingColumn {
        column: name.to_string(),
    })
}

impl Strategy for MovingAverageCrossover {
    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn required_columns(&self) -> Vec<&'static str> {
        if self.atr_period.is_some() {
            vec![CLOSE, HIGH, LOW]
        } else {
            vec![CLOSE]
        }
    }

    fn calculate_indicators(&self, series: &PriceSeries) -> Result<PriceSeries, SsbtError> {
        let mut out = series.clone();
        let close = require_column(series, CLOSE)?;

        for period in [self.fast_period, self.slow_period] {
            // Precomputed indicators are left alone.
            if !out.has_indicator(&IndicatorType::Sma(period)) {
                out.insert_indicator(calculate_sma(series.timestamps(), close, period));
            }
        }

        if let Some(period) = self.atr_period {
            if !out.has_indicator(&IndicatorType::Atr(period)) {
                let high = require_column(series, HIGH)?;
                let low = require_column(series, LOW)?;
                out.insert_indicator(calculate_atr(series.timestamps(), high, low, close, period));
            }
        }

        Ok(out)
    }

    fn generate_signals(&self, series: &PriceSeries) -> Result<Vec<Signal>, SsbtError> {
        let fast = require_indicator(series, &IndicatorType::Sma(self.fast_period))?;
        let slow = require_indicator(series, &IndicatorType::Sma(self.slow_period))?;
        let atr = match self.atr_period {
            Some(period) => Some(require_indicator(series, &IndicatorType::Atr(period))?),
            None => None,
        };
        let close = require_column(series, CLOSE)?;
        let timestamps = series.timestamps();

        let mut signals = Vec::new();
        let mut current = Position::Flat;

        let entry = |kind: SignalType, i: usize| {
            let signal = Signal::new(kind, close[i], timestamps[i]);
            match atr.and_then(|a| a.value_at(i)) {
                Some(value) => signal.with_metadata(ATR_METADATA_KEY, value),
                None => signal,
            }
        };

        for i in 1..series.len() {
            let (Some(fast_prev), Some(fast_curr), Some(slow_prev), Some(slow_curr)) = (
                fast.value_at(i - 1),
                fast.value_at(i),
                slow.value_at(i - 1),
                slow.value_at(i),
            ) else {
                continue;
            };

            if fast_prev <= slow_prev && fast_curr > slow_curr {
                if current == Position::Short {
                    signals.push(Signal::new(SignalType::ExitShort, close[i], timestamps[i]));
                }
                signals.push(entry(SignalType::EntryLong, i));
                current = Position::Long;
            } else if fast_prev >= slow_prev && fast_curr < slow_curr {
                if current == Position::Long {
                    signals.push(Signal::new(SignalType::ExitLong, close[i], timestamps[i]));
                }
                signals.push(entry(SignalType::EntryShort, i));
                current = Position::Short;
            }
        }

        // Flatten whatever is left at the final bar.
        if let (Some(&last_close), Some(&last_time)) = (close.last(), timestamps.last()) {
            match current {
                Position::Long => {
                    signals.push(Signal::new(SignalType::ExitLong, last_close, last_time))
                }
                Position::Short => {
                    signals.push(Signal::new(SignalType::ExitShort, last_close, last_time))
                }
                Position::Flat => {}
            }
        }

        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::collections::BTreeMap;

    fn timestamps(n: usize) -> Vec<NaiveDateTime> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect()
    }

    fn series(closes: &[f64]) -> PriceSeries {
        PriceSeries::from_closes("TEST", timestamps(closes.len()), closes.to_vec()).unwrap()
    }

    fn ohlc_series(closes: &[f64]) -> PriceSeries {
        let mut columns = BTreeMap::new();
        columns.insert("close".to_string(), closes.to_vec());
        columns.insert("high".to_string(), closes.iter().map(|c| c + 1.0).collect());
        columns.insert("low".to_string(), closes.iter().map(|c| c - 1.0).collect());
        PriceSeries::new("TEST", timestamps(closes.len()), columns).unwrap()
    }

    fn signal_types(signals: &[Signal]) -> Vec<SignalType> {
        signals.iter().map(|s| s.signal_type).collect()
    }

    #[test]
    fn indicators_added_for_both_periods() {
        let strategy = MovingAverageCrossover::new(2, 3);
        let out = strategy.calculate_indicators(&series(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        assert!(out.has_indicator(&IndicatorType::Sma(2)));
        assert!(out.has_indicator(&IndicatorType::Sma(3)));
    }

    #[test]
    fn calculate_indicators_leaves_input_untouched() {
        let strategy = MovingAverageCrossover::new(2, 3);
        let input = series(&[1.0, 2.0, 3.0, 4.0]);
        let _ = strategy.calculate_indicators(&input).unwrap();
        assert!(!input.has_indicator(&IndicatorType::Sma(2)));
    }

    #[test]
    fn generate_without_indicators_is_an_error() {
        let strategy = MovingAverageCrossover::new(2, 3);
        let result = strategy.generate_signals(&series(&[1.0, 2.0, 3.0]));
        assert!(matches!(result, Err(SsbtError::MissingColumn { .. })));
    }

    #[test]
    fn bullish_cross_enters_long_and_flushes_at_end() {
        let strategy = MovingAverageCrossover::new(1, 3);
        let data = strategy
            .calculate_indicators(&series(&[10.0, 9.0, 8.0, 7.0, 12.0, 13.0]))
            .unwrap();
        let signals = strategy.generate_signals(&data).unwrap();

        assert_eq!(
            signal_types(&signals),
            vec![SignalType::EntryLong, SignalType::ExitLong]
        );
        assert!((signals[0].price - 12.0).abs() < f64::EPSILON);
        assert!((signals[1].price - 13.0).abs() < f64::EPSILON);
        assert_eq!(signals[1].timestamp, *data.timestamps().last().unwrap());
    }

    #[test]
    fn reversal_exits_before_entering_opposite() {
        let strategy = MovingAverageCrossover::new(1, 3);
        let closes = [10.0, 9.0, 8.0, 7.0, 12.0, 13.0, 14.0, 5.0, 4.0];
        let data = strategy.calculate_indicators(&series(&closes)).unwrap();
        let signals = strategy.generate_signals(&data).unwrap();

        assert_eq!(
            signal_types(&signals),
            vec![
                SignalType::EntryLong,
                SignalType::ExitLong,
                SignalType::EntryShort,
                SignalType::ExitShort,
            ]
        );
        assert_eq!(signals[1].timestamp, signals[2].timestamp);
    }

    #[test]
    fn no_signals_during_warmup() {
        let strategy = MovingAverageCrossover::new(2, 5);
        let data = strategy
            .calculate_indicators(&series(&[1.0, 5.0, 1.0, 5.0]))
            .unwrap();
        assert!(strategy.generate_signals(&data).unwrap().is_empty());
    }

    #[test]
    fn atr_requires_high_low() {
        let strategy = MovingAverageCrossover::new(1, 3).with_atr(2);
        assert_eq!(strategy.required_columns(), vec!["close", "high", "low"]);
        let result = strategy.calculate_indicators(&series(&[1.0, 2.0, 3.0]));
        assert!(matches!(result, Err(SsbtError::MissingColumn { .. })));
    }

    #[test]
    fn entries_carry_atr_metadata() {
        let strategy = MovingAverageCrossover::new(1, 3).with_atr(2);
        let data = strategy
            .calculate_indicators(&ohlc_series(&[10.0, 9.0, 8.0, 7.0, 12.0, 13.0]))
            .unwrap();
        let signals = strategy.generate_signals(&data).unwrap();

        assert_eq!(signals[0].signal_type, SignalType::EntryLong);
        assert!(signals[0].metadata_number(ATR_METADATA_KEY).is_some());
        assert!(signals[1].metadata.is_empty());
    }
}
