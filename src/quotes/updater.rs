//! Remote quote update: bring every product up to the last trading day
//!
//! Per product:
//! 1. expected last trading day = yesterday, rolled back over the weekend
//!    unless the asset class trades every day
//! 2. skip when the latest stored bar already reaches it
//! 3. fetch `[latest + 1, last trading day]` with bounded retry; bars
//!    past the last trading day are dropped
//! 4. normalize and append like any price batch
//!
//! A fetch failure is recorded as a [`SkippedFetch`] and the run moves on.
//! Batch errors (schema / reference) are recorded as failures; store
//! errors abort the run.

use super::retry::ExponentialBackoff;
use super::source::{FetchError, QuoteSource};
use crate::config::QuoteConfig;
use crate::pipeline::batch::RawBatch;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::loader::{IncrementalLoader, LoadReport};
use crate::pipeline::normalizer::Normalizer;
use crate::pipeline::table_kind::TableKind;
use crate::store::{NaturalKey, ProductInfo, RecordStore};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Asset classes quoted seven days a week
const ALWAYS_OPEN: &[&str] = &["cryptocurrency"];

pub fn trades_every_day(asset_class: &str) -> bool {
    ALWAYS_OPEN.contains(&asset_class.trim().to_lowercase().as_str())
}

/// Latest session expected to be published as of `today`
pub fn last_trading_day(today: NaiveDate, asset_class: &str) -> NaiveDate {
    let yesterday = today - Duration::days(1);
    if trades_every_day(asset_class) {
        return yesterday;
    }
    match yesterday.weekday() {
        Weekday::Sat => yesterday - Duration::days(1),
        Weekday::Sun => yesterday - Duration::days(2),
        _ => yesterday,
    }
}

pub fn is_up_to_date(latest: Option<NaiveDate>, today: NaiveDate, asset_class: &str) -> bool {
    latest.map_or(false, |d| d >= last_trading_day(today, asset_class))
}

/// Fetch that was given up on, with the range it covered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFetch {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateReport {
    pub up_to_date: Vec<String>,
    pub updated: Vec<LoadReport>,
    pub skipped: Vec<SkippedFetch>,
    /// (symbol, error) for batches rejected by the normalizer or loader
    pub failed: Vec<(String, String)>,
}

impl UpdateReport {
    pub fn rows_appended(&self) -> usize {
        self.updated.iter().map(|r| r.appended).sum()
    }

    /// Write the skipped fetches as pretty JSON
    pub fn save_skip_log(&self, path: &Path) -> PipelineResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.skipped)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

pub struct QuoteUpdater<Q: QuoteSource> {
    source: Q,
    normalizer: Normalizer,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    max_retries: u32,
}

impl<Q: QuoteSource> QuoteUpdater<Q> {
    pub fn new(source: Q, config: &QuoteConfig, floor_date: NaiveDate) -> Self {
        Self {
            source,
            normalizer: Normalizer::new(TableKind::PriceRecord, floor_date),
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            max_retries: config.max_retries,
        }
    }

    /// Fetch with retry on transient failures
    pub async fn fetch_with_retry(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawBatch, FetchError> {
        let mut backoff =
            ExponentialBackoff::new(self.initial_backoff_ms, self.max_backoff_ms, self.max_retries);

        loop {
            match self.source.fetch_daily(ticker, start, end).await {
                Ok(batch) => return Ok(batch),
                Err(e) if e.is_transient() => {
                    log::warn!("⚠️  {} fetch for {} failed: {}", self.source.name(), ticker, e);
                    if backoff.sleep().await.is_err() {
                        return Err(FetchError::RetriesExhausted {
                            attempts: backoff.attempts() + 1,
                            last: e.to_string(),
                        });
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn run<S: RecordStore>(
        &self,
        store: &mut S,
        today: NaiveDate,
    ) -> PipelineResult<UpdateReport> {
        let products = store.fetch_products(None)?;
        log::info!("🚀 Updating {} products from {}", products.len(), self.source.name());

        let mut report = UpdateReport::default();
        for product in &products {
            self.update_product(store, product, today, &mut report).await?;
        }

        log::info!("📊 Update complete:");
        log::info!("   ├─ Up to date: {}", report.up_to_date.len());
        log::info!("   ├─ Updated: {} ({} rows)", report.updated.len(), report.rows_appended());
        log::info!("   ├─ Skipped fetches: {}", report.skipped.len());
        log::info!("   └─ Failed batches: {}", report.failed.len());
        Ok(report)
    }

    async fn update_product<S: RecordStore>(
        &self,
        store: &mut S,
        product: &ProductInfo,
        today: NaiveDate,
        report: &mut UpdateReport,
    ) -> PipelineResult<()> {
        if is_up_to_date(product.latest_date, today, &product.asset_class) {
            report.up_to_date.push(product.symbol.clone());
            return Ok(());
        }

        // Sessions after the last trading day are still open; a partial bar
        // stored now would never be replaced.
        let ticker = product.alias.as_deref().unwrap_or(&product.symbol);
        let end = last_trading_day(today, &product.asset_class);
        let start = product
            .latest_date
            .map(|d| d + Duration::days(1))
            .unwrap_or_else(|| self.normalizer.floor_date());

        let raw = match self.fetch_with_retry(ticker, start, end).await {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("⚠️  Skipping {} ({} → {}): {}", product.symbol, start, end, e);
                report.skipped.push(SkippedFetch {
                    symbol: product.symbol.clone(),
                    start,
                    end,
                    error: e.to_string(),
                });
                return Ok(());
            }
        };

        let loaded = self.normalizer.normalize(&raw).and_then(|mut clean| {
            clean.rows.retain(|row| row.date <= end);
            IncrementalLoader::new(store).load_observations(&NaturalKey::single(&product.symbol), &clean)
        });

        match loaded {
            Ok(load) => {
                log::info!("✅ {}: +{} bars", product.symbol, load.appended);
                report.updated.push(load);
            }
            Err(e) if e.is_batch_error() => {
                log::error!("❌ {}: {}", product.symbol, e);
                report.failed.push((product.symbol.clone(), e.to_string()));
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::loader::{AssetClassRow, ProductRow};
    use crate::store::{SqliteStore, Table};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Serves fixed bars, including a still-open Monday session; fails
    /// `failures` times first
    struct MockSource {
        failures: u32,
        calls: AtomicU32,
        status: u16,
        ranges: Mutex<Vec<(NaiveDate, NaiveDate)>>,
    }

    impl MockSource {
        fn new(failures: u32, status: u16) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                status,
                ranges: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl QuoteSource for MockSource {
        fn name(&self) -> &str {
            "mock"
        }

        async fn fetch_daily(
            &self,
            symbol: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<RawBatch, FetchError> {
            self.ranges.lock().unwrap().push((start, end));
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(FetchError::Status {
                    source_name: "mock".into(),
                    status: self.status,
                });
            }
            let columns = ["date", "open", "high", "low", "close"]
                .iter()
                .map(|c| c.to_string())
                .collect();
            let rows = vec![
                vec!["2024-01-04".into(), "10".into(), "12".into(), "9".into(), "11".into()],
                vec!["2024-01-05".into(), "11".into(), "11".into(), "8".into(), "9".into()],
                vec!["2024-01-08".into(), "9".into(), "10".into(), "9".into(), "10".into()],
            ];
            Ok(RawBatch::new(symbol, columns, rows))
        }
    }

    fn quote_config(retries: u32) -> QuoteConfig {
        QuoteConfig {
            max_retries: retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            ..QuoteConfig::default()
        }
    }

    fn seeded_store() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.migrate(concat!(env!("CARGO_MANIFEST_DIR"), "/sql")).unwrap();
        let mut loader = IncrementalLoader::new(&mut store);
        loader
            .load_asset_classes(&[AssetClassRow { name: "Commodity".into() }])
            .unwrap();
        loader
            .load_products(&[ProductRow {
                symbol: "GOLD".into(),
                name: Some("Gold".into()),
                alias: Some("GC=F".into()),
                asset_class: "Commodity".into(),
            }])
            .unwrap();
        store
    }

    #[test]
    fn test_last_trading_day() {
        // Mon 8 Jan 2024 → Fri 5 Jan
        assert_eq!(last_trading_day(ymd(2024, 1, 8), "Stock"), ymd(2024, 1, 5));
        // Sun 7 Jan → Fri 5 Jan
        assert_eq!(last_trading_day(ymd(2024, 1, 7), "Forex"), ymd(2024, 1, 5));
        // Wed 10 Jan → Tue 9 Jan
        assert_eq!(last_trading_day(ymd(2024, 1, 10), "Stock"), ymd(2024, 1, 9));
        // crypto trades on weekends
        assert_eq!(last_trading_day(ymd(2024, 1, 8), "Cryptocurrency"), ymd(2024, 1, 7));

        assert!(is_up_to_date(Some(ymd(2024, 1, 5)), ymd(2024, 1, 8), "Stock"));
        assert!(!is_up_to_date(Some(ymd(2024, 1, 5)), ymd(2024, 1, 8), "Cryptocurrency"));
        assert!(!is_up_to_date(None, ymd(2024, 1, 8), "Stock"));
    }

    #[tokio::test]
    async fn test_update_fetches_and_loads() {
        let mut store = seeded_store();
        let updater = QuoteUpdater::new(MockSource::new(1, 503), &quote_config(2), ymd(2024, 1, 1));

        let report = updater.run(&mut store, ymd(2024, 1, 8)).await.unwrap();
        assert_eq!(report.updated.len(), 1);
        assert_eq!(report.rows_appended(), 2);
        assert!(report.skipped.is_empty());

        // now up to date (latest Fri 5 Jan on Mon 8 Jan)
        let again = updater.run(&mut store, ymd(2024, 1, 8)).await.unwrap();
        assert_eq!(again.up_to_date, vec!["GOLD"]);
        assert_eq!(again.rows_appended(), 0);
    }

    #[tokio::test]
    async fn test_update_stops_at_last_trading_day() {
        let mut store = seeded_store();
        let updater = QuoteUpdater::new(MockSource::new(0, 200), &quote_config(0), ymd(2024, 1, 1));

        // Mon 8 Jan: the session is still open, Fri 5 Jan is the newest close
        let report = updater.run(&mut store, ymd(2024, 1, 8)).await.unwrap();
        let ranges = updater.source.ranges.lock().unwrap().clone();
        assert_eq!(ranges, vec![(ymd(2024, 1, 1), ymd(2024, 1, 5))]);
        assert_eq!(report.rows_appended(), 2);

        let gold = store.entity_id(Table::Product, &NaturalKey::single("GOLD")).unwrap().unwrap();
        assert_eq!(store.max_date(Table::PriceRecord, gold).unwrap(), Some(ymd(2024, 1, 5)));
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_skipped_and_logged() {
        let mut store = seeded_store();
        let updater = QuoteUpdater::new(MockSource::new(10, 500), &quote_config(2), ymd(2024, 1, 1));

        let report = updater.run(&mut store, ymd(2024, 1, 8)).await.unwrap();
        assert!(report.updated.is_empty());
        assert_eq!(report.skipped.len(), 1);
        let skipped = &report.skipped[0];
        assert_eq!(skipped.symbol, "GOLD");
        assert_eq!(skipped.start, ymd(2024, 1, 1));
        assert_eq!(skipped.end, ymd(2024, 1, 5));
        assert!(skipped.error.contains("3 attempts"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("skipped.json");
        report.save_skip_log(&path).unwrap();
        let saved: Vec<SkippedFetch> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved, report.skipped);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let mut store = seeded_store();
        let source = MockSource::new(1, 404);
        let updater = QuoteUpdater::new(source, &quote_config(3), ymd(2024, 1, 1));

        let report = updater.run(&mut store, ymd(2024, 1, 8)).await.unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(updater.source.calls.load(Ordering::SeqCst), 1);
    }
}
