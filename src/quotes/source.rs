//! Remote daily-bar source boundary

use crate::pipeline::batch::RawBatch;
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{source_name} returned status {status}")]
    Status { source_name: String, status: u16 },

    #[error("cannot decode response: {0}")]
    Decode(String),

    #[error("no bars for '{symbol}' between {start} and {end}")]
    Empty {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl FetchError {
    /// Worth retrying: transport failures, throttling and server errors
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Source of daily OHLC bars
///
/// Returned batches carry ISO dates and `date, open, high, low, close`
/// columns, ready for the price normalizer.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn name(&self) -> &str;

    /// Daily bars for `symbol` in `[start, end]`
    async fn fetch_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawBatch, FetchError>;
}
