//! Yahoo Finance chart API
//!
//! Endpoint: `{base}/v8/finance/chart/{symbol}?period1=..&period2=..&interval=1d`
//!
//! Returns parallel arrays: `timestamp[]` and
//! `indicators.quote[0].{open,high,low,close}[]`, with `null` for
//! sessions the exchange did not publish.

use super::source::{FetchError, QuoteSource};
use crate::config::QuoteConfig;
use crate::pipeline::batch::RawBatch;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate};
use serde::Deserialize;
use std::time::Duration as StdDuration;

#[derive(Debug, Clone, Deserialize)]
pub struct ChartResponse {
    pub chart: Chart,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chart {
    pub result: Option<Vec<ChartResult>>,
    pub error: Option<ChartError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartError {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartResult {
    pub meta: Option<ChartMeta>,
    #[serde(default)]
    pub timestamp: Vec<i64>,
    pub indicators: Indicators,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartMeta {
    #[serde(rename = "gmtoffset")]
    pub gmt_offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Indicators {
    #[serde(default)]
    pub quote: Vec<QuoteArrays>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteArrays {
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(default)]
    pub high: Vec<Option<f64>>,
    #[serde(default)]
    pub low: Vec<Option<f64>>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
}

/// Seconds since epoch at midnight UTC of `date`
fn epoch_seconds(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

fn cell(values: &[Option<f64>], i: usize) -> String {
    values
        .get(i)
        .copied()
        .flatten()
        .map(|v| v.to_string())
        .unwrap_or_default()
}

/// Chart response → raw price batch named after `symbol`
pub fn chart_to_batch(
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
    response: ChartResponse,
) -> Result<RawBatch, FetchError> {
    if let Some(err) = response.chart.error {
        return Err(FetchError::Decode(format!("{}: {}", err.code, err.description)));
    }

    let result = response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| FetchError::Empty {
            symbol: symbol.to_string(),
            start,
            end,
        })?;

    let offset = result.meta.as_ref().and_then(|m| m.gmt_offset).unwrap_or(0);
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let rows: Vec<Vec<String>> = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let date = DateTime::from_timestamp(ts + offset, 0)?.date_naive();
            Some(vec![
                date.format("%Y-%m-%d").to_string(),
                cell(&quote.open, i),
                cell(&quote.high, i),
                cell(&quote.low, i),
                cell(&quote.close, i),
            ])
        })
        .collect();

    if rows.is_empty() {
        return Err(FetchError::Empty {
            symbol: symbol.to_string(),
            start,
            end,
        });
    }

    let columns = ["date", "open", "high", "low", "close"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    Ok(RawBatch::new(symbol, columns, rows))
}

pub struct YahooQuoteSource {
    client: reqwest::Client,
    base_url: String,
}

impl YahooQuoteSource {
    pub fn new(config: &QuoteConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(config.timeout_secs))
            .user_agent("Mozilla/5.0 (compatible; rankboard)")
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d",
            self.base_url,
            symbol,
            epoch_seconds(start),
            epoch_seconds(end + Duration::days(1)),
        )
    }
}

#[async_trait]
impl QuoteSource for YahooQuoteSource {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn fetch_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawBatch, FetchError> {
        let url = self.chart_url(symbol, start, end);
        log::debug!("🔧 GET {}", url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                source_name: self.name().to_string(),
                status: response.status().as_u16(),
            });
        }

        let body: ChartResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        chart_to_batch(symbol, start, end, body)
    }
}
