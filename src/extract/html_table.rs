//! HTML table → `RawBatch`

use crate::pipeline::batch::RawBatch;
use crate::pipeline::error::{PipelineError, PipelineResult};
use scraper::{ElementRef, Html, Selector};

/// Compile a CSS selector, mapping parse failures to `ConfigError`
pub fn selector(css: &str) -> PipelineResult<Selector> {
    Selector::parse(css)
        .map_err(|e| PipelineError::config(format!("invalid selector '{}': {:?}", css, e)))
}

/// Visible text of an element, whitespace collapsed
pub fn cell_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract the first table matching `table_css`
///
/// Header names come from the first row holding `th` cells; without one,
/// the first row is used as the header. Remaining rows become data rows.
pub fn extract_table(name: &str, html: &str, table_css: &str) -> PipelineResult<RawBatch> {
    let document = Html::parse_document(html);
    let table_sel = selector(table_css)?;
    let row_sel = selector("tr")?;
    let th_sel = selector("th")?;
    let td_sel = selector("td")?;

    let table = document.select(&table_sel).next().ok_or_else(|| {
        PipelineError::schema(format!("'{}': no table matches '{}'", name, table_css))
    })?;

    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for tr in table.select(&row_sel) {
        let th: Vec<String> = tr.select(&th_sel).map(cell_text).collect();
        if headers.is_none() && !th.is_empty() {
            headers = Some(th);
            continue;
        }

        let td: Vec<String> = tr.select(&td_sel).map(cell_text).collect();
        if td.is_empty() {
            continue;
        }
        if headers.is_none() {
            headers = Some(td);
            continue;
        }
        rows.push(td);
    }

    let headers = headers
        .ok_or_else(|| PipelineError::schema(format!("'{}': table has no rows", name)))?;

    Ok(RawBatch::new(name, headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <table class="history">
            <thead><tr><th>Date</th><th>Actual</th><th>Forecast</th></tr></thead>
            <tbody>
              <tr><td>Jan 05, 2024</td><td> 216K </td><td>170K</td></tr>
              <tr><td>Feb 02, 2024</td><td>353K</td><td><span>180</span>K</td></tr>
            </tbody>
          </table>
        </body></html>"#;

    #[test]
    fn test_extract_table_with_header_row() {
        let batch = extract_table("NFP - USD", PAGE, "table.history").unwrap();
        assert_eq!(batch.columns, vec!["date", "actual", "forecast"]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.cell(0, 1), "216K");
        // text split across inline elements
        assert_eq!(batch.cell(1, 2), "180 K");
    }

    #[test]
    fn test_missing_table() {
        let err = extract_table("x", PAGE, "table.calendar__table").unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_table_without_th_uses_first_row() {
        let html = "<table><tr><td>date</td><td>value</td></tr><tr><td>2024-01-01</td><td>1</td></tr></table>";
        let batch = extract_table("x", html, "table").unwrap();
        assert_eq!(batch.columns, vec!["date", "value"]);
        assert_eq!(batch.rows, vec![vec!["2024-01-01".to_string(), "1".to_string()]]);
    }
}
