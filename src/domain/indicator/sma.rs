//! Simple Moving Average.
//!
//! SMA(n)[i] = mean(C[i-n+1..=i]), maintained as a running window sum.
//! Warmup: first (n-1) bars are invalid.

use chrono::NaiveDateTime;

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};

pub fn calculate_sma(timestamps: &[NaiveDateTime], closes: &[f64], period: usize) -> IndicatorSeries {
    if period == 0 || closes.is_empty() {
        return IndicatorSeries {
            indicator_type: IndicatorType::Sma(period),
            values: Vec::new(),
        };
    }

    let mut values = Vec::with_capacity(closes.len());
    let mut sum = 0.0;

    for (i, (&timestamp, &close)) in timestamps.iter().zip(closes).enumerate() {
        sum += close;
        if i >= period {
            sum -= closes[i - period];
        }
        let valid = i + 1 >= period;
        values.push(IndicatorPoint {
            timestamp,
            valid,
            value: if valid { sum / period as f64 } else { 0.0 },
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Sma(period),
        values,
    }
}
