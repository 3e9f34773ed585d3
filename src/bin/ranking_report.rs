//! Ranking report - per-product metrics as JSON on stdout
//!
//! Usage:
//!   cargo run --release --bin rankboard-report [-- --asset-class Forex]
//!
//! Environment variables:
//!   RANKBOARD_DB_PATH - SQLite database path (default: data/rankboard.db)
//!   RANKBOARD_START_DATE / RANKBOARD_END_DATE - Range (default: 2024-01-01 / yesterday)
//!   RANKBOARD_METRICS - Daily metric set (default: expected_return,volatility,updown_ratio)
//!   RANKBOARD_PERIODS - Periods for relative change (default: d,w,m,y)

use dotenv::dotenv;
use env_logger::{Env, Target};
use rankboard::ranking::RankingService;
use rankboard::store::SqliteStore;
use rankboard::AnalyticsConfig;
use std::env;

fn parse_asset_class_from_args() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    args.iter()
        .position(|x| x == "--asset-class")
        .and_then(|idx| args.get(idx + 1).cloned())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stderr)
        .init();

    let config = AnalyticsConfig::from_env()?;
    let asset_class = parse_asset_class_from_args();

    let store = SqliteStore::open(&config.db_path)?;
    let report = RankingService::standard().report(&store, &config, asset_class.as_deref())?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
