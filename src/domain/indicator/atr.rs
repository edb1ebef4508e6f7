//! Average True Range, Wilder smoothing.
//!
//! TR[0] = H - L; TR[i] = max(H - L, |H - C[i-1]|, |L - C[i-1]|).
//! Seed with the mean of the first n TRs, then
//! ATR[i] = (ATR[i-1] * (n-1) + TR[i]) / n.

use chrono::NaiveDateTime;

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};

/// max(high - low, |high - prev_close|, |low - prev_close|)
pub fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    let hl = high - low;
    let hc = (high - prev_close).abs();
    let lc = (low - prev_close).abs();
    hl.max(hc).max(lc)
}

pub fn calculate_atr(
    timestamps: &[NaiveDateTime],
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
) -> IndicatorSeries {
    let len = timestamps.len().min(high.len()).min(low.len()).min(close.len());
    if len < period || period == 0 {
        return IndicatorSeries {
            indicator_type: IndicatorType::Atr(period),
            values: vec![],
        };
    }

    let tr_values: Vec<f64> = (0..len)
        .map(|i| {
            if i == 0 {
                high[i] - low[i]
            } else {
                true_range(high[i], low[i], close[i - 1])
            }
        })
        .collect();

    let mut results: Vec<IndicatorPoint> = Vec::with_capacity(len);
    let mut atr = 0.0;

    for i in 0..len {
        let valid = i + 1 >= period;
        if i + 1 == period {
            atr = tr_values[0..=i].iter().sum::<f64>() / period as f64;
        } else if i + 1 > period {
            atr = (atr * (period - 1) as f64 + tr_values[i]) / period as f64;
        }
        results.push(IndicatorPoint {
            timestamp: timestamps[i],
            valid,
            value: if valid { atr } else { 0.0 },
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Atr(period),
        values: results,
    }
}
