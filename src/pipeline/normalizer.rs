//! Batch normalization: raw strings → clean, dated, numeric rows
//!
//! Stages run in a fixed order, each taking a batch by value and
//! returning a new one:
//!
//! 1. column restriction (canonical set, required columns enforced)
//! 2. date parsing (format sniffed from the first row, time dropped)
//! 3. floor-date filter
//! 4. ascending sort (stable, arrival order kept within a date)
//! 5. numeric cleaning (separators, unit markers, vote outcomes)
//! 6. adaptive rounding per column
//! 7. date de-duplication (first arrival wins)
//! 8. completeness filter
//!
//! Sorting must precede de-duplication and the loader's high-water-mark
//! diff; both assume ascending dates.

use super::batch::{CleanBatch, CleanRow, RawBatch};
use super::error::{PipelineError, PipelineResult};
use super::table_kind::{NumericMode, TableKind};
use chrono::{Datelike, NaiveDate};
use std::collections::HashSet;

/// Smallest rounding precision ever applied
pub const MIN_PRECISION: u32 = 2;

/// Cap for adaptive rounding (sub-1e-8 magnitudes are not real quotes)
pub const MAX_PRECISION: u32 = 10;

const YEAR_FIRST_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d"];

const DAY_FIRST_FORMATS: &[&str] = &[
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d/%m/%y",
    "%d-%m-%y",
    "%d %b %Y",
    "%d %B %Y",
    "%d-%b-%Y",
    "%d-%b-%y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
];

/// Default floor: nothing older than 2010-01-01 is stored
pub fn default_floor_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Batch after column restriction: date strings plus canonical value cells
#[derive(Debug, Clone, PartialEq)]
pub struct RestrictedBatch {
    pub kind: TableKind,
    pub name: String,
    pub rows: Vec<(String, Vec<String>)>,
}

/// Batch after date parsing: typed dates, value cells still raw
#[derive(Debug, Clone, PartialEq)]
pub struct DatedBatch {
    pub kind: TableKind,
    pub name: String,
    pub rows: Vec<(NaiveDate, Vec<String>)>,
}

/// Date parsing mode chosen by probing the first row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    YearFirst,
    DayFirst,
}

/// Normalizer for one observation table
#[derive(Debug, Clone)]
pub struct Normalizer {
    kind: TableKind,
    floor_date: NaiveDate,
}

impl Normalizer {
    pub fn new(kind: TableKind, floor_date: NaiveDate) -> Self {
        Self { kind, floor_date }
    }

    pub fn with_default_floor(kind: TableKind) -> Self {
        Self::new(kind, default_floor_date())
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn floor_date(&self) -> NaiveDate {
        self.floor_date
    }

    /// Run every stage over `raw`
    ///
    /// Fails with `SchemaError` on a missing required column or an
    /// unparseable date; nothing of the batch survives in that case.
    pub fn normalize(&self, raw: &RawBatch) -> PipelineResult<CleanBatch> {
        let restricted = restrict_columns(self.kind, raw)?;
        let dated = parse_dates(restricted)?;
        let dated = filter_floor(dated, self.floor_date);
        let dated = sort_by_date(dated);
        let clean = clean_numeric(dated);
        let clean = round_adaptive(clean);
        let clean = dedup_dates(clean);
        let clean = drop_incomplete(clean);

        log::debug!(
            "🧹 Normalized '{}' ({}): {} raw rows → {} clean rows",
            raw.name,
            self.kind.as_str(),
            raw.len(),
            clean.len()
        );

        Ok(clean)
    }
}

/// Stage 1: keep the date column and the table's value columns
pub fn restrict_columns(kind: TableKind, raw: &RawBatch) -> PipelineResult<RestrictedBatch> {
    let mut date_idx = None;
    let mut value_idx: Vec<Option<usize>> = vec![None; kind.value_columns().len()];

    for (idx, header) in raw.columns.iter().enumerate() {
        match kind.canonical_column(header) {
            Some("date") => {
                date_idx.get_or_insert(idx);
            }
            Some(col) => {
                if let Some(pos) = kind.value_columns().iter().position(|c| *c == col) {
                    value_idx[pos].get_or_insert(idx);
                }
            }
            None => {}
        }
    }

    let date_idx = date_idx.ok_or_else(|| {
        PipelineError::schema(format!("batch '{}' is missing required column 'date'", raw.name))
    })?;

    for required in kind.required_columns() {
        let present = kind
            .value_columns()
            .iter()
            .position(|c| c == required)
            .and_then(|pos| value_idx[pos]);
        if present.is_none() {
            return Err(PipelineError::schema(format!(
                "batch '{}' is missing required column '{}'",
                raw.name, required
            )));
        }
    }

    let rows = (0..raw.len())
        .map(|r| {
            let date = raw.cell(r, date_idx).to_string();
            let cells = value_idx
                .iter()
                .map(|idx| idx.map(|c| raw.cell(r, c).to_string()).unwrap_or_default())
                .collect();
            (date, cells)
        })
        .collect();

    Ok(RestrictedBatch {
        kind,
        name: raw.name.clone(),
        rows,
    })
}

/// Drop any time-of-day component from a date string
pub fn date_portion(value: &str) -> String {
    let value = value.trim();
    if value.len() > 10 && value.is_char_boundary(10) && value.as_bytes()[10] == b'T' {
        return value[..10].to_string();
    }
    value
        .split_whitespace()
        .take_while(|token| !token.contains(':'))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strict `YYYY-MM-DD`
pub fn is_strict_iso(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit())
        && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

/// Parse one date, trying the sniffed order first, then the other one
///
/// `%Y` also matches a two-digit year; such matches are rejected so the
/// `%y` formats read `05/03/24` as 2024.
pub fn parse_date(value: &str, order: DateOrder) -> Option<NaiveDate> {
    let value = date_portion(value);
    let (primary, fallback) = match order {
        DateOrder::YearFirst => (YEAR_FIRST_FORMATS, DAY_FIRST_FORMATS),
        DateOrder::DayFirst => (DAY_FIRST_FORMATS, YEAR_FIRST_FORMATS),
    };
    primary
        .iter()
        .chain(fallback.iter())
        .find_map(|fmt| {
            NaiveDate::parse_from_str(&value, fmt)
                .ok()
                .filter(|date| !fmt.contains("%Y") || date.year() >= 1000)
        })
}

/// Stage 2: sniff the date order on the first row, parse every row
pub fn parse_dates(batch: RestrictedBatch) -> PipelineResult<DatedBatch> {
    let order = match batch.rows.first() {
        Some((first, _)) if is_strict_iso(&date_portion(first)) => DateOrder::YearFirst,
        _ => DateOrder::DayFirst,
    };

    let mut rows = Vec::with_capacity(batch.rows.len());
    for (idx, (raw_date, cells)) in batch.rows.into_iter().enumerate() {
        let date = parse_date(&raw_date, order).ok_or_else(|| {
            PipelineError::schema(format!(
                "batch '{}' row {}: unparseable date '{}'",
                batch.name, idx, raw_date
            ))
        })?;
        rows.push((date, cells));
    }

    Ok(DatedBatch {
        kind: batch.kind,
        name: batch.name,
        rows,
    })
}

/// Stage 3: drop rows dated strictly before `floor`
pub fn filter_floor(mut batch: DatedBatch, floor: NaiveDate) -> DatedBatch {
    batch.rows.retain(|(date, _)| *date >= floor);
    batch
}

/// Stage 4: stable ascending sort by date
pub fn sort_by_date(mut batch: DatedBatch) -> DatedBatch {
    batch.rows.sort_by_key(|(date, _)| *date);
    batch
}

/// Coerce one numeric-looking string; `None` when it is not a finite number
pub fn coerce_numeric(raw: &str, mode: NumericMode) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let cleaned = match mode {
        NumericMode::Plain => cleaned,
        NumericMode::Annotated => {
            match cleaned.to_lowercase().as_str() {
                "pass" | "yes" | "stay" => return Some(1.0),
                "reject" | "no" | "leave" => return Some(0.0),
                _ => {}
            }
            cleaned
                .trim_end_matches(|c| matches!(c, '%' | 'K' | 'M' | 'B' | 'T'))
                .to_string()
        }
    };

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Stage 5: numeric coercion of every value cell
pub fn clean_numeric(batch: DatedBatch) -> CleanBatch {
    let mode = batch.kind.numeric_mode();
    let zero_is_missing = batch.kind.zero_is_missing();
    let mut clean = CleanBatch::new(batch.kind, batch.name);

    clean.rows = batch
        .rows
        .into_iter()
        .map(|(date, cells)| {
            let values = cells
                .iter()
                .map(|cell| {
                    let value = coerce_numeric(cell, mode);
                    if value.is_none() && !cell.trim().is_empty() {
                        log::debug!("   ├─ {} {}: '{}' is not numeric", clean.name, date, cell);
                    }
                    value.filter(|v| !(zero_is_missing && *v == 0.0))
                })
                .collect();
            CleanRow { date, values }
        })
        .collect();

    clean
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Smallest precision (≥ 2) at which the smallest non-zero magnitude keeps
/// two significant figures
pub fn adaptive_precision<I>(values: I) -> u32
where
    I: IntoIterator<Item = f64>,
{
    let min_abs = values
        .into_iter()
        .map(f64::abs)
        .filter(|v| *v > 0.0)
        .fold(f64::INFINITY, f64::min);

    if !min_abs.is_finite() {
        return MIN_PRECISION;
    }

    (MIN_PRECISION..=MAX_PRECISION)
        .find(|p| (min_abs * 10f64.powi(*p as i32)).round() >= 10.0)
        .unwrap_or(MAX_PRECISION)
}

/// Stage 6: per-column adaptive rounding
pub fn round_adaptive(mut batch: CleanBatch) -> CleanBatch {
    for col in 0..batch.columns.len() {
        let precision = adaptive_precision(batch.rows.iter().filter_map(|r| r.values[col]));
        for row in batch.rows.iter_mut() {
            if let Some(v) = row.values[col] {
                row.values[col] = Some(round_to(v, precision));
            }
        }
    }
    batch
}

/// Stage 7: one row per date, first arrival wins
pub fn dedup_dates(mut batch: CleanBatch) -> CleanBatch {
    let mut seen = HashSet::new();
    let before = batch.rows.len();
    batch.rows.retain(|row| seen.insert(row.date));
    if batch.rows.len() < before {
        log::debug!(
            "   ├─ {}: dropped {} duplicate-date rows",
            batch.name,
            before - batch.rows.len()
        );
    }
    batch
}

/// Stage 8: drop rows missing a required value (price tables only)
pub fn drop_incomplete(mut batch: CleanBatch) -> CleanBatch {
    if batch.kind.requires_complete_rows() {
        batch.rows.retain(|row| row.values.iter().all(|v| v.is_some()));
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, columns: &[&str], rows: &[&[&str]]) -> RawBatch {
        RawBatch::new(
            name,
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_missing_required_column_is_schema_error() {
        let batch = raw("GOLD", &["Date", "Open", "High", "Low"], &[&["2024-01-01", "1", "2", "1"]]);
        let err = Normalizer::with_default_floor(TableKind::PriceRecord)
            .normalize(&batch)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Schema(ref msg) if msg.contains("close")));

        let no_date = raw("GOLD", &["Open", "High", "Low", "Close"], &[]);
        let err = Normalizer::with_default_floor(TableKind::PriceRecord)
            .normalize(&no_date)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_unknown_columns_dropped() {
        let batch = raw(
            "GOLD",
            &["Date", "Open", "High", "Low", "Close", "Volume"],
            &[&["2024-01-01", "10", "12", "9", "11", "5000"]],
        );
        let clean = Normalizer::with_default_floor(TableKind::PriceRecord)
            .normalize(&batch)
            .unwrap();
        assert_eq!(clean.columns, vec!["open", "high", "low", "close"]);
        assert_eq!(clean.rows[0].values.len(), 4);
    }

    #[test]
    fn test_date_sniffing_and_time_stripping() {
        assert_eq!(date_portion("2024-03-05 00:00:00"), "2024-03-05");
        assert_eq!(date_portion("2024-03-05T10:00:00Z"), "2024-03-05");
        assert_eq!(date_portion("Mar 05, 2024 10:00"), "Mar 05, 2024");

        assert!(is_strict_iso("2024-03-05"));
        assert!(!is_strict_iso("05/03/2024"));
        assert!(!is_strict_iso("2024-13-05"));

        // day first: 05/03 is the 5th of March
        let batch = raw("X", &["date", "value"], &[&["05/03/2024", "1"], &["06/03/2024", "2"]]);
        let clean = Normalizer::with_default_floor(TableKind::ReleaseData)
            .normalize(&batch)
            .unwrap();
        assert_eq!(clean.first_date(), Some(ymd(2024, 3, 5)));

        let iso = raw("X", &["date", "value"], &[&["2024-03-05 00:00:00", "1"]]);
        let clean = Normalizer::with_default_floor(TableKind::ReleaseData)
            .normalize(&iso)
            .unwrap();
        assert_eq!(clean.first_date(), Some(ymd(2024, 3, 5)));
    }

    #[test]
    fn test_two_digit_year_day_first() {
        let batch = raw("X", &["date", "value"], &[&["05/03/24", "1"], &["06/03/24", "2"]]);
        let clean = Normalizer::with_default_floor(TableKind::ReleaseData)
            .normalize(&batch)
            .unwrap();
        assert_eq!(clean.len(), 2);
        assert_eq!(clean.first_date(), Some(ymd(2024, 3, 5)));
        assert_eq!(clean.rows[1].date, ymd(2024, 3, 6));

        assert_eq!(parse_date("05-03-24", DateOrder::DayFirst), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date("05/03/2024", DateOrder::DayFirst), Some(ymd(2024, 3, 5)));
    }

    #[test]
    fn test_unparseable_date_aborts_batch() {
        let batch = raw("X", &["date", "value"], &[&["2024-03-05", "1"], &["not a date", "2"]]);
        let err = Normalizer::with_default_floor(TableKind::ReleaseData)
            .normalize(&batch)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Schema(ref msg) if msg.contains("row 1")));
    }

    #[test]
    fn test_floor_filter_and_ordering() {
        let batch = raw(
            "X",
            &["date", "open", "high", "low", "close"],
            &[
                &["2024-01-03", "3", "3", "3", "3"],
                &["2009-12-31", "1", "1", "1", "1"],
                &["2024-01-01", "2", "2", "2", "2"],
            ],
        );
        let clean = Normalizer::with_default_floor(TableKind::PriceRecord)
            .normalize(&batch)
            .unwrap();
        let dates: Vec<_> = clean.dates().collect();
        assert_eq!(dates, vec![ymd(2024, 1, 1), ymd(2024, 1, 3)]);
    }

    #[test]
    fn test_dedup_keeps_first_arrival() {
        let batch = raw(
            "X",
            &["date", "open", "high", "low", "close"],
            &[
                &["2024-01-02", "5", "5", "5", "5"],
                &["2024-01-01", "1", "1", "1", "1"],
                &["2024-01-02", "9", "9", "9", "9"],
            ],
        );
        let clean = Normalizer::with_default_floor(TableKind::PriceRecord)
            .normalize(&batch)
            .unwrap();
        assert_eq!(clean.len(), 2);
        assert_eq!(clean.value(1, "close"), Some(5.0));
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(coerce_numeric("1,234.50", NumericMode::Plain), Some(1234.5));
        assert_eq!(coerce_numeric(" 12 ", NumericMode::Plain), Some(12.0));
        assert_eq!(coerce_numeric("0.3%", NumericMode::Plain), None);
        assert_eq!(coerce_numeric("0.3%", NumericMode::Annotated), Some(0.3));
        assert_eq!(coerce_numeric("-45K", NumericMode::Annotated), Some(-45.0));
        assert_eq!(coerce_numeric("1.2B", NumericMode::Annotated), Some(1.2));
        assert_eq!(coerce_numeric("Pass", NumericMode::Annotated), Some(1.0));
        assert_eq!(coerce_numeric("Leave", NumericMode::Annotated), Some(0.0));
        assert_eq!(coerce_numeric("", NumericMode::Annotated), None);
        assert_eq!(coerce_numeric("n/a", NumericMode::Plain), None);
    }

    #[test]
    fn test_zero_is_missing_for_prices_only() {
        let prices = raw(
            "X",
            &["date", "open", "high", "low", "close"],
            &[&["2024-01-01", "0", "1", "1", "1"], &["2024-01-02", "1", "1", "1", "1"]],
        );
        let clean = Normalizer::with_default_floor(TableKind::PriceRecord)
            .normalize(&prices)
            .unwrap();
        // zero open → missing → incomplete row dropped
        assert_eq!(clean.len(), 1);

        let votes = raw("X", &["date", "actual"], &[&["2024-01-01", "Reject"]]);
        let clean = Normalizer::with_default_floor(TableKind::ReleaseData)
            .normalize(&votes)
            .unwrap();
        assert_eq!(clean.value(0, "actual"), Some(0.0));
    }

    #[test]
    fn test_release_rows_tolerate_missing_values() {
        let batch = raw(
            "X",
            &["date", "actual", "forecast"],
            &[&["2024-01-01", "1.5%", ""], &["2024-02-01", "", "2%"]],
        );
        let clean = Normalizer::with_default_floor(TableKind::ReleaseData)
            .normalize(&batch)
            .unwrap();
        assert_eq!(clean.len(), 2);
        assert_eq!(clean.value(0, "forecast"), None);
        // previous column absent from the source entirely
        assert_eq!(clean.value(1, "previous"), None);
        assert_eq!(clean.value(1, "forecast"), Some(2.0));
    }

    #[test]
    fn test_adaptive_precision() {
        assert_eq!(adaptive_precision(vec![10.0, 1000.0]), 2);
        assert_eq!(adaptive_precision(vec![0.5, 2.0]), 2);
        assert!(adaptive_precision(vec![0.001, 0.01]) >= 3);
        assert_eq!(adaptive_precision(vec![0.0012, 0.009]), 4);
        assert_eq!(adaptive_precision(Vec::<f64>::new()), MIN_PRECISION);
        assert_eq!(adaptive_precision(vec![1e-15]), MAX_PRECISION);
    }

    #[test]
    fn test_rounding_adapts_to_magnitude() {
        let cheap = raw(
            "SHIB",
            &["date", "open", "high", "low", "close"],
            &[&["2024-01-01", "0.0012345", "0.0098765", "0.001", "0.0054321"]],
        );
        let clean = Normalizer::with_default_floor(TableKind::PriceRecord)
            .normalize(&cheap)
            .unwrap();
        assert_eq!(clean.value(0, "low"), Some(0.001));
        assert_eq!(clean.value(0, "open"), Some(0.0012));
        assert_ne!(clean.value(0, "close"), Some(0.01));

        let dear = raw(
            "GOLD",
            &["date", "open", "high", "low", "close"],
            &[&["2024-01-01", "2034.567", "2040.1234", "10.005", "999.999"]],
        );
        let clean = Normalizer::with_default_floor(TableKind::PriceRecord)
            .normalize(&dear)
            .unwrap();
        assert_eq!(clean.value(0, "open"), Some(2034.57));
        assert_eq!(clean.value(0, "close"), Some(1000.0));
    }
}
