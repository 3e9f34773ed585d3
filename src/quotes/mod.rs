//! Remote quote acquisition

pub mod retry;
pub mod source;
pub mod updater;
pub mod yahoo;

pub use retry::{ExponentialBackoff, MaxRetriesExceeded};
pub use source::{FetchError, QuoteSource};
pub use updater::{is_up_to_date, last_trading_day, QuoteUpdater, SkippedFetch, UpdateReport};
pub use yahoo::YahooQuoteSource;
