//! Durable record store shared by the write and read paths
//!
//! The pipeline talks to storage only through [`RecordStore`]:
//!
//! - `max_id(table)` → 0 when empty
//! - `max_date(table, entity_id)` → `None` when the entity has no rows
//! - `natural_keys_existing(table)` → set of business keys
//! - `append(rows)` → atomic per call
//! - typed fetches for products, headlines, price and release series
//!
//! Tables (see `/sql/`):
//! - `asset_class`, `product`, `news_headline`: entities, created once
//! - `price_record`, `news_release`: append-only observations
//!
//! Observations reference their entity with `ON DELETE RESTRICT`.

pub mod migrations;
pub mod records;
pub mod sqlite;

pub use migrations::run_schema_migrations;
pub use records::{
    HeadlineInfo, NewAssetClass, NewHeadline, NewPriceRecord, NewProduct, NewRelease,
    PriceObservation, ProductInfo, ReleaseObservation, RowSet, SeriesFilter,
};
pub use sqlite::SqliteStore;

use crate::pipeline::error::PipelineResult;
use crate::pipeline::table_kind::TableKind;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::fmt;

/// Store tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    AssetClass,
    Product,
    PriceRecord,
    NewsHeadline,
    NewsRelease,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::AssetClass => "asset_class",
            Table::Product => "product",
            Table::PriceRecord => "price_record",
            Table::NewsHeadline => "news_headline",
            Table::NewsRelease => "news_release",
        }
    }

    pub fn all() -> [Table; 5] {
        [
            Table::AssetClass,
            Table::Product,
            Table::PriceRecord,
            Table::NewsHeadline,
            Table::NewsRelease,
        ]
    }

    /// Columns forming the natural key
    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            Table::AssetClass => &["name"],
            Table::Product => &["symbol"],
            Table::NewsHeadline => &["title", "region"],
            Table::PriceRecord => &["product_id", "date"],
            Table::NewsRelease => &["headline_id", "date"],
        }
    }

    /// Owning-entity column for observation tables
    pub fn owner_column(&self) -> Option<&'static str> {
        match self {
            Table::PriceRecord => Some("product_id"),
            Table::NewsRelease => Some("headline_id"),
            _ => None,
        }
    }

    /// Entity table owning this observation table
    pub fn owner_table(&self) -> Option<Table> {
        match self {
            Table::PriceRecord => Some(Table::Product),
            Table::NewsRelease => Some(Table::NewsHeadline),
            _ => None,
        }
    }
}

impl From<TableKind> for Table {
    fn from(kind: TableKind) -> Self {
        match kind {
            TableKind::PriceRecord => Table::PriceRecord,
            TableKind::ReleaseData => Table::NewsRelease,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business key of a row (symbol, name, or title + region)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey(Vec<String>);

impl NaturalKey {
    pub fn new(parts: Vec<String>) -> Self {
        Self(parts)
    }

    pub fn single(value: impl Into<String>) -> Self {
        Self(vec![value.into()])
    }

    pub fn pair(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self(vec![first.into(), second.into()])
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" - "))
    }
}

/// Read/append interface over the persistence engine
///
/// Single writer per run: the read-then-append diff in the loader is not
/// guarded against concurrent external writers.
pub trait RecordStore {
    /// Largest id in `table`, 0 when empty
    fn max_id(&self, table: Table) -> PipelineResult<i64>;

    /// Latest observation date stored for `entity_id`
    fn max_date(&self, table: Table, entity_id: i64) -> PipelineResult<Option<NaiveDate>>;

    fn natural_keys_existing(&self, table: Table) -> PipelineResult<HashSet<NaturalKey>>;

    /// Surrogate id of the row with natural key `key`
    fn entity_id(&self, table: Table, key: &NaturalKey) -> PipelineResult<Option<i64>>;

    /// Append all rows or none; returns the number of rows written
    fn append(&mut self, rows: &RowSet) -> PipelineResult<usize>;

    /// Products, optionally restricted to one asset class
    fn fetch_products(&self, asset_class: Option<&str>) -> PipelineResult<Vec<ProductInfo>>;

    fn fetch_headlines(&self, sector: Option<&str>) -> PipelineResult<Vec<HeadlineInfo>>;

    /// Price bars ascending by date, then id
    fn fetch_price_series(&self, filter: &SeriesFilter) -> PipelineResult<Vec<PriceObservation>>;

    /// Release rows ascending by date, then id
    fn fetch_release_series(
        &self,
        filter: &SeriesFilter,
    ) -> PipelineResult<Vec<ReleaseObservation>>;
}
