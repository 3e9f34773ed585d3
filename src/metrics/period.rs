//! Bucketing periods and higher-timeframe bars

use crate::pipeline::error::{PipelineError, PipelineResult};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;

/// Bucketing period for metric computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Period {
    /// No bucketing, raw daily rows
    #[serde(rename = "d")]
    Day,
    #[serde(rename = "w")]
    Week,
    #[serde(rename = "m")]
    Month,
    #[serde(rename = "y")]
    Year,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "d",
            Period::Week => "w",
            Period::Month => "m",
            Period::Year => "y",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "d" => Some(Period::Day),
            "w" => Some(Period::Week),
            "m" => Some(Period::Month),
            "y" => Some(Period::Year),
            _ => None,
        }
    }

    /// Parse or fail with `ConfigError`
    pub fn parse(s: &str) -> PipelineResult<Self> {
        Self::from_str(s)
            .ok_or_else(|| PipelineError::config(format!("unknown period '{}'", s)))
    }

    pub fn all() -> [Period; 4] {
        [Period::Day, Period::Week, Period::Month, Period::Year]
    }

    /// Bucket label (year, sub-period) for a date; `None` for daily rows
    ///
    /// Weeks are keyed by ISO year and ISO week, so the days around New
    /// Year that share an ISO week share a bucket. Keys increase with the
    /// date for every period.
    pub fn bucket_key(&self, date: NaiveDate) -> Option<(i32, u32)> {
        match self {
            Period::Day => None,
            Period::Week => {
                let week = date.iso_week();
                Some((week.year(), week.week()))
            }
            Period::Month => Some((date.year(), date.month())),
            Period::Year => Some((date.year(), 0)),
        }
    }
}

/// OHLC bar: a daily row, or a bucket collapsed from daily rows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Collapse ascending daily bars into one bar per bucket
///
/// `open` = first open, `close` = last close, `high`/`low` = extremes,
/// `date` = last date. Input must be sorted by date; a bar whose key
/// differs from the previous one opens a new bucket.
pub fn bucketize(bars: &[Bar], period: Period) -> Vec<Bar> {
    if period == Period::Day {
        return bars.to_vec();
    }

    let mut last_key: Option<(i32, u32)> = None;
    let mut buckets: Vec<Bar> = Vec::new();

    for bar in bars {
        let key = period.bucket_key(bar.date);
        match buckets.last_mut() {
            Some(bucket) if key == last_key => {
                bucket.high = bucket.high.max(bar.high);
                bucket.low = bucket.low.min(bar.low);
                bucket.close = bar.close;
                bucket.date = bar.date;
            }
            _ => {
                last_key = key;
                buckets.push(*bar);
            }
        }
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(y: i32, m: u32, d: u32, open: f64, close: f64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            open,
            high: open.max(close) + 1.0,
            low: open.min(close) - 1.0,
            close,
        }
    }

    #[test]
    fn test_period_parsing() {
        assert_eq!(Period::from_str("W"), Some(Period::Week));
        assert_eq!(Period::parse("y").unwrap(), Period::Year);
        assert!(matches!(Period::parse("q"), Err(PipelineError::Config(_))));
        for p in Period::all() {
            assert_eq!(Period::from_str(p.as_str()), Some(p));
        }
    }

    #[test]
    fn test_daily_is_passthrough() {
        let bars = vec![bar(2024, 1, 1, 1.0, 2.0), bar(2024, 1, 2, 2.0, 3.0)];
        assert_eq!(bucketize(&bars, Period::Day), bars);
    }

    #[test]
    fn test_monthly_bucket_is_ohlc_of_days() {
        let bars = vec![
            bar(2024, 1, 30, 10.0, 11.0),
            bar(2024, 1, 31, 11.0, 9.0),
            bar(2024, 2, 1, 9.0, 12.0),
        ];
        let months = bucketize(&bars, Period::Month);
        assert_eq!(months.len(), 2);

        let jan = months[0];
        assert_eq!(jan.open, 10.0);
        assert_eq!(jan.close, 9.0);
        assert_eq!(jan.high, 12.0);
        assert_eq!(jan.low, 8.0);
        assert_eq!(jan.date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert_eq!(months[1].close, 12.0);
    }

    #[test]
    fn test_weeks_split_on_iso_week() {
        // Fri 5 Jan and Mon 8 Jan 2024 fall in ISO weeks 1 and 2
        let bars = vec![
            bar(2024, 1, 4, 1.0, 2.0),
            bar(2024, 1, 5, 2.0, 3.0),
            bar(2024, 1, 8, 3.0, 4.0),
        ];
        let weeks = bucketize(&bars, Period::Week);
        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[0].close, 3.0);
        assert_eq!(weeks[1].open, 3.0);

        let years = bucketize(&bars, Period::Year);
        assert_eq!(years.len(), 1);
        assert_eq!(years[0].open, 1.0);
        assert_eq!(years[0].close, 4.0);
    }

    #[test]
    fn test_weeks_keyed_by_iso_year() {
        // Mon 30 Dec 2024 opens ISO week 1 of 2025
        let bars = vec![
            bar(2024, 1, 2, 10.0, 11.0),
            bar(2024, 12, 30, 98.0, 99.0),
            bar(2025, 1, 2, 99.0, 100.0),
        ];
        assert_eq!(Period::Week.bucket_key(bars[1].date), Some((2025, 1)));

        let weeks = bucketize(&bars, Period::Week);
        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[0].close, 11.0);
        assert_eq!(weeks[1].open, 98.0);
        assert_eq!(weeks[1].close, 100.0);
        assert_eq!(weeks[1].date, NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
    }
}
