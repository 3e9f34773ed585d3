//! Ingest - directory and calendar import
//!
//! Loads the price tree, the news tree and (optionally) one economic
//! calendar page into the SQLite store. Safe to re-run: rows already
//! stored are never appended twice.
//!
//! Usage:
//!   cargo run --release --bin rankboard-ingest
//!
//! Environment variables:
//!   RANKBOARD_DB_PATH - SQLite database path (default: data/rankboard.db)
//!   RANKBOARD_SCHEMA_DIR - Schema directory (default: sql)
//!   RANKBOARD_PRICE_DIR - Price tree root (default: data/prices)
//!   RANKBOARD_NEWS_DIR - News tree root (default: data/news)
//!   RANKBOARD_FLOOR_DATE - Oldest date kept (default: 2010-01-01)
//!   RANKBOARD_CALENDAR_FILE - Calendar HTML page (optional)
//!   RANKBOARD_CALENDAR_YEAR - Year of the page's first day (required with the file)
//!   RANKBOARD_CALENDAR_SECTOR - Sector for calendar headlines (optional)

use dotenv::dotenv;
use env_logger::{Env, Target};
use log::{info, warn};
use rankboard::pipeline::{IngestReport, Ingestor};
use rankboard::store::SqliteStore;
use rankboard::IngestConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stderr)
        .init();

    let config = IngestConfig::from_env()?;

    info!("🚀 rankboard ingest");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Price tree: {}", config.price_dir.display());
    info!("   ├─ News tree: {}", config.news_dir.display());
    info!("   └─ Floor date: {}", config.floor_date);

    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut store = SqliteStore::open(&config.db_path)?;
    store.migrate(&config.schema_dir)?;
    info!("✅ Schema ready");

    let mut report = IngestReport::default();
    let mut ingestor = Ingestor::new(&mut store, config.floor_date);

    if config.price_dir.is_dir() {
        report.merge(ingestor.import_price_tree(&config.price_dir)?);
    } else {
        warn!("⚠️  Price tree {} not found, skipped", config.price_dir.display());
    }

    if config.news_dir.is_dir() {
        report.merge(ingestor.import_news_tree(&config.news_dir)?);
    } else {
        warn!("⚠️  News tree {} not found, skipped", config.news_dir.display());
    }

    if let Some(calendar) = &config.calendar_file {
        match config.calendar_year {
            Some(year) => report.merge(ingestor.import_calendar(
                calendar,
                year,
                config.calendar_sector.as_deref(),
            )?),
            None => warn!("⚠️  RANKBOARD_CALENDAR_YEAR not set, calendar skipped"),
        }
    }

    info!("📊 Ingest complete:");
    info!("   ├─ Files seen: {}", report.files_seen);
    info!("   ├─ Files loaded: {}", report.files_loaded);
    info!("   ├─ Files failed: {}", report.files_failed);
    info!("   └─ Rows appended: {}", report.rows_appended);

    for (table, count) in store.table_counts()? {
        info!("   {} rows: {}", table, count);
    }

    Ok(())
}
