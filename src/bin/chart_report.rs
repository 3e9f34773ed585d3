//! Chart report - mixed price/news datasets as JSON on stdout
//!
//! Usage:
//!   cargo run --release --bin rankboard-chart -- <SYMBOL> <SECTOR> [--metric correlation] [--table]
//!
//! `--metric` may repeat (`cumulative_change`, `correlation`). With
//! `--table`, the first metric is rendered as a `{header, body}` table over
//! the product's price-mixed set instead.
//!
//! Environment variables:
//!   RANKBOARD_DB_PATH - SQLite database path (default: data/rankboard.db)
//!   RANKBOARD_START_DATE / RANKBOARD_END_DATE - Range (default: 2024-01-01 / yesterday)
//!   RANKBOARD_SECTOR_MAPPING - Sector mapping JSON file (required)

use dotenv::dotenv;
use env_logger::{Env, Target};
use log::info;
use rankboard::chart::{chart_data, table_data};
use rankboard::store::SqliteStore;
use rankboard::AnalyticsConfig;
use std::env;

struct ChartArgs {
    symbol: String,
    sector: String,
    metrics: Vec<String>,
    table: bool,
}

fn parse_args() -> Result<ChartArgs, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut positional = Vec::new();
    let mut metrics = Vec::new();
    let mut table = false;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--metric" => metrics.extend(iter.next()),
            "--table" => table = true,
            _ => positional.push(arg),
        }
    }

    match positional.as_slice() {
        [symbol, sector] => Ok(ChartArgs {
            symbol: symbol.clone(),
            sector: sector.clone(),
            metrics,
            table,
        }),
        _ => Err("usage: rankboard-chart <SYMBOL> <SECTOR> [--metric NAME]... [--table]".into()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stderr)
        .init();

    let args = parse_args()?;
    let config = AnalyticsConfig::from_env()?;
    let store = SqliteStore::open(&config.db_path)?;

    info!("📊 Chart {} / {} ({} → {})", args.symbol, args.sector, config.start_date, config.end_date);

    let output = if args.table {
        let metric = args
            .metrics
            .first()
            .ok_or("--table needs a --metric")?;
        table_data(&store, &config, &args.symbol, &args.sector, metric)?
    } else {
        serde_json::to_value(chart_data(
            &store,
            &config,
            &args.symbol,
            &args.sector,
            &args.metrics,
        )?)?
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
