//! Row types crossing the store boundary

use chrono::NaiveDate;
use serde::Serialize;

/// New asset class row with its assigned id
#[derive(Debug, Clone, PartialEq)]
pub struct NewAssetClass {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub id: i64,
    pub symbol: String,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub asset_class_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewHeadline {
    pub id: i64,
    pub title: String,
    pub region: String,
    pub measurement: Option<String>,
    pub sector: Option<String>,
    pub abbreviation: Option<String>,
    pub definition: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPriceRecord {
    pub id: i64,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub product_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRelease {
    pub id: i64,
    pub date: NaiveDate,
    pub actual: Option<f64>,
    pub forecast: Option<f64>,
    pub previous: Option<f64>,
    pub headline_id: i64,
}

/// Rows for one atomic `append` call, all targeting the same table
#[derive(Debug, Clone, PartialEq)]
pub enum RowSet {
    AssetClasses(Vec<NewAssetClass>),
    Products(Vec<NewProduct>),
    Headlines(Vec<NewHeadline>),
    Prices(Vec<NewPriceRecord>),
    Releases(Vec<NewRelease>),
}

impl RowSet {
    pub fn table(&self) -> super::Table {
        use super::Table;
        match self {
            RowSet::AssetClasses(_) => Table::AssetClass,
            RowSet::Products(_) => Table::Product,
            RowSet::Headlines(_) => Table::NewsHeadline,
            RowSet::Prices(_) => Table::PriceRecord,
            RowSet::Releases(_) => Table::NewsRelease,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RowSet::AssetClasses(rows) => rows.len(),
            RowSet::Products(rows) => rows.len(),
            RowSet::Headlines(rows) => rows.len(),
            RowSet::Prices(rows) => rows.len(),
            RowSet::Releases(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids carried by the set, in insertion order
    pub fn ids(&self) -> Vec<i64> {
        match self {
            RowSet::AssetClasses(rows) => rows.iter().map(|r| r.id).collect(),
            RowSet::Products(rows) => rows.iter().map(|r| r.id).collect(),
            RowSet::Headlines(rows) => rows.iter().map(|r| r.id).collect(),
            RowSet::Prices(rows) => rows.iter().map(|r| r.id).collect(),
            RowSet::Releases(rows) => rows.iter().map(|r| r.id).collect(),
        }
    }
}

/// Product with its asset class and latest stored bar date
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductInfo {
    pub id: i64,
    pub symbol: String,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub asset_class: String,
    pub latest_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadlineInfo {
    pub id: i64,
    pub title: String,
    pub region: String,
    pub measurement: Option<String>,
    pub sector: Option<String>,
    pub abbreviation: Option<String>,
    pub definition: Option<String>,
}

/// Stored OHLC bar tagged with (category, entity)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceObservation {
    pub id: i64,
    /// Asset class name
    pub category: String,
    /// Product symbol
    pub entity: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReleaseObservation {
    pub id: i64,
    pub title: String,
    pub region: String,
    pub date: NaiveDate,
    pub actual: Option<f64>,
    pub forecast: Option<f64>,
    pub previous: Option<f64>,
}

/// Filter for series fetches; `None` fields do not restrict
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesFilter {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Product symbol, or headline title / abbreviation
    pub entity: Option<String>,
    /// Asset class name, or headline sector
    pub category: Option<String>,
    /// Headline region; ignored by price fetches
    pub region: Option<String>,
}

impl SeriesFilter {
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}
