//! Tabular batch types passed between pipeline stages
//!
//! `RawBatch` is the only shape extractors may hand to the normalizer.
//! `CleanBatch` is the only shape the loader accepts.

use super::table_kind::TableKind;
use chrono::NaiveDate;

/// Flat table of strings as produced by CSV / HTML extraction
///
/// Column names are lower-cased and trimmed on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBatch {
    /// Source label (file stem, headline key, ticker)
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawBatch {
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.trim().to_lowercase()).collect(),
            rows,
        }
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Cell by row and column index; short rows read as empty
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One cleaned observation row
#[derive(Debug, Clone, PartialEq)]
pub struct CleanRow {
    pub date: NaiveDate,
    /// Values aligned with `CleanBatch::columns`
    pub values: Vec<Option<f64>>,
}

/// Normalized batch: canonical columns, ascending unique dates, numeric cells
#[derive(Debug, Clone, PartialEq)]
pub struct CleanBatch {
    pub kind: TableKind,
    pub name: String,
    pub columns: Vec<&'static str>,
    pub rows: Vec<CleanRow>,
}

impl CleanBatch {
    pub fn new(kind: TableKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            columns: kind.value_columns().to_vec(),
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == column)
    }

    /// Value of `column` in `row`, `None` when missing or unknown
    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.values.get(col).copied().flatten())
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.rows.iter().map(|r| r.date)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// New batch keeping only rows matching `keep`
    pub fn filtered<F>(&self, keep: F) -> Self
    where
        F: Fn(&CleanRow) -> bool,
    {
        Self {
            kind: self.kind,
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }
}
