//! Economic calendar page → one release batch per headline
//!
//! The calendar table (`table.calendar__table`) lists events day by day.
//! Only the first event of a day carries the date cell; later rows inherit
//! it. Dates show month and day only, so the caller supplies the year the
//! page starts in; a month going backwards (Dec → Jan) rolls the year.
//!
//! Events without an actual value (future releases, speeches, holidays)
//! are skipped: storing them would set a high-water mark before the
//! number is known.

use super::html_table::{cell_text, selector};
use crate::pipeline::batch::RawBatch;
use crate::pipeline::error::{PipelineError, PipelineResult};
use chrono::{Datelike, NaiveDate};
use scraper::{Html, Selector};

const WEEKDAYS: &[&str] = &["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// One released event row
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub date: NaiveDate,
    /// Currency code, used as the headline region
    pub currency: String,
    pub title: String,
    pub impact: Option<String>,
    pub actual: String,
    pub forecast: String,
    pub previous: String,
}

/// Parse a calendar day cell ("Mon Jan 1", "MonJan 1", "Jan 1")
pub fn parse_calendar_day(text: &str, year: i32) -> Option<NaiveDate> {
    let compact: String = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();

    let mut rest = compact.as_str();
    if rest.len() > 6 && WEEKDAYS.iter().any(|w| rest.starts_with(w)) {
        let after = &rest[3..];
        if after.chars().next().map_or(false, |c| c.is_ascii_alphabetic()) {
            rest = after;
        }
    }

    let month: String = rest.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let day: String = rest[month.len()..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if month.len() < 3 || day.is_empty() {
        return None;
    }

    NaiveDate::parse_from_str(&format!("{} {} {}", &month[..3], day, year), "%b %d %Y").ok()
}

/// Unit marker on a release value, used as the headline measurement
pub fn measurement_of(value: &str) -> Option<String> {
    value
        .trim()
        .chars()
        .last()
        .filter(|c| matches!(c, '%' | 'K' | 'M' | 'B' | 'T'))
        .map(|c| c.to_string())
}

/// Parse every released event on a calendar page
pub fn parse_calendar(html: &str, start_year: i32) -> PipelineResult<Vec<CalendarEvent>> {
    let document = Html::parse_document(html);
    let table_sel = selector("table.calendar__table")?;
    let row_sel = selector("tr")?;
    let date_sel = selector("td.calendar__date")?;
    let currency_sel = selector("td.calendar__currency")?;
    let impact_sel = selector("td.calendar__impact span")?;
    let event_sel = selector("td.calendar__event")?;
    let actual_sel = selector("td.calendar__actual")?;
    let forecast_sel = selector("td.calendar__forecast")?;
    let previous_sel = selector("td.calendar__previous")?;

    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| PipelineError::schema("page has no calendar table"))?;

    let mut year = start_year;
    let mut current: Option<NaiveDate> = None;
    let mut events = Vec::new();

    for tr in table.select(&row_sel) {
        let first_text = |sel: &Selector| tr.select(sel).next().map(cell_text).unwrap_or_default();

        let date_text = first_text(&date_sel);
        if !date_text.is_empty() {
            match parse_calendar_day(&date_text, year) {
                Some(mut date) => {
                    if let Some(prev) = current {
                        if date.month() < prev.month() {
                            year += 1;
                            date = date.with_year(year).unwrap_or(date);
                        }
                    }
                    current = Some(date);
                }
                None => log::warn!("⚠️  Unrecognized calendar date cell '{}'", date_text),
            }
        }

        let title = first_text(&event_sel);
        if title.is_empty() {
            continue;
        }
        let actual = first_text(&actual_sel);
        if actual.is_empty() {
            continue;
        }
        let Some(date) = current else {
            log::warn!("⚠️  Event '{}' appears before any date row, skipped", title);
            continue;
        };

        let impact = tr
            .select(&impact_sel)
            .next()
            .and_then(|span| span.value().attr("title"))
            .map(|t| t.to_string());

        events.push(CalendarEvent {
            date,
            currency: first_text(&currency_sel),
            title,
            impact,
            actual,
            forecast: first_text(&forecast_sel),
            previous: first_text(&previous_sel),
        });
    }

    Ok(events)
}

/// Group events into one release batch per (title, currency)
///
/// Batches keep first-seen order and are named like news files,
/// `Title - Currency - Measurement`, with ISO dates and the columns
/// `date, actual, forecast, previous`.
pub fn group_by_headline(events: &[CalendarEvent]) -> Vec<RawBatch> {
    let mut keys: Vec<(&str, &str)> = Vec::new();
    let mut batches: Vec<RawBatch> = Vec::new();
    let columns: Vec<String> = ["date", "actual", "forecast", "previous"]
        .iter()
        .map(|c| c.to_string())
        .collect();

    for event in events {
        let row = vec![
            event.date.format("%Y-%m-%d").to_string(),
            event.actual.clone(),
            event.forecast.clone(),
            event.previous.clone(),
        ];

        let key = (event.title.as_str(), event.currency.as_str());
        match keys.iter().position(|k| *k == key) {
            Some(idx) => batches[idx].rows.push(row),
            None => {
                let name = format!(
                    "{} - {} - {}",
                    event.title,
                    event.currency,
                    measurement_of(&event.actual).unwrap_or_default()
                );
                keys.push(key);
                batches.push(RawBatch::new(name, columns.clone(), vec![row]));
            }
        }
    }

    batches
}
