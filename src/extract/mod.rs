//! Raw record extraction: source bytes → `RawBatch`
//!
//! No business normalization happens here. Extractors only turn a source
//! format into named string columns; the normalizer owns everything else.

pub mod calendar;
pub mod csv_source;
pub mod html_table;

pub use calendar::{group_by_headline, parse_calendar, CalendarEvent};
pub use csv_source::{file_label, read_positional, read_with_headers};
pub use html_table::extract_table;

use crate::pipeline::batch::RawBatch;
use crate::pipeline::error::{PipelineError, PipelineResult};
use std::fs;
use std::path::Path;

/// Pluggable source format
pub trait RawRecordExtractor {
    /// Short format name for logs
    fn format(&self) -> &'static str;

    /// Parse `input` into one or more raw batches
    fn extract(&self, name: &str, input: &[u8]) -> PipelineResult<Vec<RawBatch>>;
}

/// Read `path` and extract it, naming batches after the file stem
pub fn extract_file(extractor: &dyn RawRecordExtractor, path: &Path) -> PipelineResult<Vec<RawBatch>> {
    let bytes = fs::read(path)?;
    log::debug!("📄 {} ({})", path.display(), extractor.format());
    extractor.extract(&file_label(path), &bytes)
}

/// CSV with a header row, or positional columns when `columns` is set
#[derive(Debug, Clone, Default)]
pub struct CsvExtractor {
    pub columns: Option<Vec<&'static str>>,
}

impl CsvExtractor {
    pub fn with_headers() -> Self {
        Self { columns: None }
    }

    pub fn positional(columns: &[&'static str]) -> Self {
        Self {
            columns: Some(columns.to_vec()),
        }
    }
}

impl RawRecordExtractor for CsvExtractor {
    fn format(&self) -> &'static str {
        "csv"
    }

    fn extract(&self, name: &str, input: &[u8]) -> PipelineResult<Vec<RawBatch>> {
        let batch = match &self.columns {
            Some(columns) => csv_source::read_positional(name, input, columns)?,
            None => csv_source::read_with_headers(name, input)?,
        };
        Ok(vec![batch])
    }
}

/// First HTML table matching a CSS selector
#[derive(Debug, Clone)]
pub struct HtmlTableExtractor {
    pub table_css: String,
}

impl HtmlTableExtractor {
    pub fn first_table() -> Self {
        Self {
            table_css: "table".to_string(),
        }
    }
}

impl RawRecordExtractor for HtmlTableExtractor {
    fn format(&self) -> &'static str {
        "html-table"
    }

    fn extract(&self, name: &str, input: &[u8]) -> PipelineResult<Vec<RawBatch>> {
        let html = decode_utf8(name, input)?;
        Ok(vec![extract_table(name, html, &self.table_css)?])
    }
}

/// Economic calendar page, one batch per headline named
/// `Title - Currency - Measurement`
#[derive(Debug, Clone)]
pub struct CalendarExtractor {
    /// Year of the first day on the page
    pub year: i32,
}

impl RawRecordExtractor for CalendarExtractor {
    fn format(&self) -> &'static str {
        "calendar"
    }

    fn extract(&self, name: &str, input: &[u8]) -> PipelineResult<Vec<RawBatch>> {
        let html = decode_utf8(name, input)?;
        let events = parse_calendar(html, self.year)?;
        Ok(group_by_headline(&events))
    }
}

fn decode_utf8<'a>(name: &str, input: &'a [u8]) -> PipelineResult<&'a str> {
    std::str::from_utf8(input)
        .map_err(|e| PipelineError::schema(format!("'{}' is not valid UTF-8: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractors_share_one_batch_shape() {
        let csv = CsvExtractor::with_headers()
            .extract("GOLD", b"Date,Close\n2024-01-02,2050.1\n")
            .unwrap();
        let positional = CsvExtractor::positional(&["date", "value"])
            .extract("CPI - USD - %", b"when,what\n2024-01-02,3.1%\n")
            .unwrap();
        let html = HtmlTableExtractor { table_css: "table".into() }
            .extract("t", b"<table><tr><th>Date</th><th>Close</th></tr><tr><td>2024-01-02</td><td>1</td></tr></table>")
            .unwrap();

        assert_eq!(csv[0].columns, vec!["date", "close"]);
        assert_eq!(positional[0].columns, vec!["date", "value"]);
        assert_eq!(html[0].columns, csv[0].columns);
    }

    #[test]
    fn test_extract_file_names_batches_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("EURUSD.html");
        fs::write(&path, "<table><tr><th>Date</th><th>Close</th></tr><tr><td>2024-01-02</td><td>1.1</td></tr></table>").unwrap();

        let batches = extract_file(&HtmlTableExtractor::first_table(), &path).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].name, "EURUSD");
        assert_eq!(batches[0].rows, vec![vec!["2024-01-02".to_string(), "1.1".to_string()]]);

        let missing = extract_file(&CsvExtractor::with_headers(), &dir.path().join("nope.csv"));
        assert!(matches!(missing, Err(PipelineError::Io(_))));
    }

    #[test]
    fn test_calendar_extractor_names_headlines() {
        let page = br#"<table class="calendar__table">
          <tr><td class="calendar__date">Thu Jan 4</td><td class="calendar__currency">USD</td>
              <td class="calendar__event">Unemployment Claims</td><td class="calendar__actual">202K</td>
              <td class="calendar__forecast">216K</td><td class="calendar__previous">220K</td></tr>
        </table>"#;
        let batches = CalendarExtractor { year: 2024 }.extract("calendar", page).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].name, "Unemployment Claims - USD - K");
        assert_eq!(batches[0].rows[0][0], "2024-01-04");
    }

    #[test]
    fn test_invalid_utf8_html() {
        let err = HtmlTableExtractor { table_css: "table".into() }
            .extract("bad", &[0xff, 0xfe])
            .unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }
}
