//! Update prices - fetch missing daily bars for every stored product
//!
//! Products already holding the last trading day are skipped. Fetches that
//! fail after retries are written to the skip log and do not stop the run.
//!
//! Usage:
//!   cargo run --release --bin rankboard-update
//!
//! Environment variables:
//!   RANKBOARD_DB_PATH - SQLite database path (default: data/rankboard.db)
//!   RANKBOARD_SCHEMA_DIR - Schema directory (default: sql)
//!   RANKBOARD_FLOOR_DATE - Start date for products with no bars (default: 2010-01-01)
//!   RANKBOARD_QUOTE_URL - Chart API base URL (default: https://query1.finance.yahoo.com)
//!   RANKBOARD_QUOTE_TIMEOUT_SECS - Request timeout (default: 10)
//!   RANKBOARD_QUOTE_RETRIES - Retries per product (default: 3)
//!   RANKBOARD_QUOTE_BACKOFF_MS / RANKBOARD_QUOTE_MAX_BACKOFF_MS - Backoff bounds (default: 500 / 8000)
//!   RANKBOARD_SKIP_LOG - Skip log path (default: data/skipped_fetches.json)

use chrono::Local;
use dotenv::dotenv;
use env_logger::{Env, Target};
use log::info;
use rankboard::quotes::{QuoteUpdater, YahooQuoteSource};
use rankboard::store::SqliteStore;
use rankboard::{IngestConfig, QuoteConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stderr)
        .init();

    let ingest = IngestConfig::from_env()?;
    let quotes = QuoteConfig::from_env();
    let today = Local::now().date_naive();

    info!("🚀 rankboard update");
    info!("   ├─ Database: {}", ingest.db_path);
    info!("   ├─ Source: {}", quotes.base_url);
    info!("   ├─ Retries: {}", quotes.max_retries);
    info!("   └─ Today: {}", today);

    let mut store = SqliteStore::open(&ingest.db_path)?;
    store.migrate(&ingest.schema_dir)?;

    let source = YahooQuoteSource::new(&quotes)?;
    let updater = QuoteUpdater::new(source, &quotes, ingest.floor_date);
    let report = updater.run(&mut store, today).await?;

    if !report.skipped.is_empty() {
        report.save_skip_log(&quotes.skip_log_path)?;
        info!("📝 Skip log written to {}", quotes.skip_log_path.display());
    }

    Ok(())
}
