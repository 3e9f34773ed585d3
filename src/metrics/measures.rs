//! Per-entity scalar measures over a bucketed bar series
//!
//! Every measure takes the entity's bars in ascending date order and
//! returns `None` only when the measure is undefined for that entity
//! (e.g. `absolute_change` with fewer than two bars). NaN results are
//! coerced to 0 where noted.

use super::period::Bar;
use crate::pipeline::normalizer::round_to;

/// Trading days per year used for annualization
pub const TRADING_DAYS: f64 = 252.0;

/// Mean of `(close − open) / open` over all bars, 2 decimals, NaN → 0
pub fn relative_change(bars: &[Bar]) -> Option<f64> {
    if bars.is_empty() {
        return None;
    }
    let changes: Vec<f64> = bars
        .iter()
        .filter(|b| b.open != 0.0)
        .map(|b| (b.close - b.open) / b.open)
        .collect();
    Some(round_to(nan_to_zero(mean(&changes)), 2))
}

/// Last close minus the previous close, 4 decimals
pub fn absolute_change(bars: &[Bar]) -> Option<f64> {
    match bars {
        [.., prev, last] => Some(round_to(last.close - prev.close, 4)),
        _ => None,
    }
}

/// Up moves over down moves, denominator floored at 1, 2 decimals
///
/// A flat move (`close[t] == close[t-1]`) counts as neither.
pub fn updown_ratio(bars: &[Bar]) -> Option<f64> {
    if bars.is_empty() {
        return None;
    }
    let (up, down) = bars.windows(2).fold((0u32, 0u32), |(up, down), w| {
        if w[1].close > w[0].close {
            (up + 1, down)
        } else if w[1].close < w[0].close {
            (up, down + 1)
        } else {
            (up, down)
        }
    });
    Some(round_to(f64::from(up) / f64::from(down.max(1)), 2))
}

/// Annualized sample standard deviation of log returns, 2 decimals, NaN → 0
pub fn volatility(bars: &[Bar]) -> Option<f64> {
    if bars.is_empty() {
        return None;
    }
    let returns = log_returns(bars);
    Some(round_to(nan_to_zero(sample_std(&returns) * TRADING_DAYS.sqrt()), 2))
}

/// Annualized mean log return, 2 decimals, NaN → 0
pub fn expected_return(bars: &[Bar]) -> Option<f64> {
    if bars.is_empty() {
        return None;
    }
    let returns = log_returns(bars);
    Some(round_to(nan_to_zero(mean(&returns) * TRADING_DAYS), 2))
}

/// `ln(close[t] / close[t-1])` for consecutive bars; non-finite pairs skipped
pub fn log_returns(bars: &[Bar]) -> Vec<f64> {
    bars.windows(2)
        .map(|w| (w[1].close / w[0].close).ln())
        .filter(|r| r.is_finite())
        .collect()
}

/// Running sum of consecutive percentage changes, 2 decimals
///
/// The first point is 0; a point whose change is undefined (missing value
/// or zero base) reads 0 and leaves the running sum untouched.
pub fn cumulative_change(values: &[Option<f64>]) -> Vec<f64> {
    let mut running = 0.0;
    let mut out = Vec::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
        let prev = if i == 0 { None } else { values[i - 1] };
        match (prev, value) {
            (Some(p), Some(v)) if p != 0.0 => {
                running += (v - p) / p * 100.0;
                out.push(round_to(running, 2));
            }
            _ => out.push(0.0),
        }
    }
    out
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample (n − 1) standard deviation; NaN below two values
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn nan_to_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}
