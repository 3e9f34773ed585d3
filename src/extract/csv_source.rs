//! CSV → `RawBatch`
//!
//! Two shapes are read:
//! - header-driven (price exports: `Date,Open,High,Low,Close,...`)
//! - positional (release exports: the header row is skipped and columns
//!   are named by the caller, e.g. `["date", "value"]`)

use crate::pipeline::batch::RawBatch;
use crate::pipeline::error::{PipelineError, PipelineResult};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::io::Read;
use std::path::Path;

/// Batch label for a file: its stem (`EURUSD.csv` → `EURUSD`)
pub fn file_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().trim().to_string())
        .unwrap_or_default()
}

fn reader<R: Read>(input: R, has_headers: bool) -> csv::Reader<R> {
    ReaderBuilder::new()
        .has_headers(has_headers)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(input)
}

fn collect_rows<R: Read>(rdr: &mut csv::Reader<R>) -> PipelineResult<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record: StringRecord = record?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        rows.push(record.iter().map(|f| f.to_string()).collect());
    }
    Ok(rows)
}

/// Read CSV text whose first row names the columns
pub fn read_with_headers<R: Read>(name: &str, input: R) -> PipelineResult<RawBatch> {
    let mut rdr = reader(input, true);
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(PipelineError::schema(format!("csv '{}' has no header row", name)));
    }
    let rows = collect_rows(&mut rdr)?;
    Ok(RawBatch::new(name, headers, rows))
}

/// Read CSV text, skip its header row, and name columns by position
pub fn read_positional<R: Read>(name: &str, input: R, columns: &[&str]) -> PipelineResult<RawBatch> {
    let mut rdr = reader(input, true);
    let rows = collect_rows(&mut rdr)?
        .into_iter()
        .map(|mut row| {
            row.resize(columns.len(), String::new());
            row
        })
        .collect();
    Ok(RawBatch::new(
        name,
        columns.iter().map(|c| c.to_string()).collect(),
        rows,
    ))
}
