//! Incremental loader: set-difference against the store, id assignment, append
//!
//! Entities are admitted when their natural key is new. Observations are
//! admitted when they are newer than the entity's high-water mark
//! (`date > max_date`). Ids continue from the table's current maximum in
//! batch arrival order. An empty retained set performs zero writes, which
//! makes re-running an import a no-op.

use super::batch::CleanBatch;
use super::error::{PipelineError, PipelineResult};
use super::table_kind::TableKind;
use crate::store::{
    NaturalKey, NewAssetClass, NewHeadline, NewPriceRecord, NewProduct, NewRelease, RecordStore,
    RowSet, Table,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;

/// Asset class entity as read from a source
#[derive(Debug, Clone, PartialEq)]
pub struct AssetClassRow {
    pub name: String,
}

/// Product entity as read from a source
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRow {
    pub symbol: String,
    pub name: Option<String>,
    /// Ticker used by the remote quote source, when it differs from `symbol`
    pub alias: Option<String>,
    /// Owning asset class name; must already be stored
    pub asset_class: String,
}

/// News headline entity as read from a source
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeadlineRow {
    pub title: String,
    pub region: String,
    pub measurement: Option<String>,
    pub sector: Option<String>,
    pub abbreviation: Option<String>,
    pub definition: Option<String>,
}

impl HeadlineRow {
    pub fn key(&self) -> NaturalKey {
        NaturalKey::pair(&self.title, &self.region)
    }
}

/// Outcome of one load call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub table: &'static str,
    /// Batch label (entity key or source name)
    pub label: String,
    pub received: usize,
    pub appended: usize,
    /// Id of the first appended row
    pub first_id: Option<i64>,
    /// Entity high-water mark after the load
    pub max_date: Option<NaiveDate>,
}

impl LoadReport {
    fn empty(table: Table, label: impl Into<String>, received: usize) -> Self {
        Self {
            table: table.as_str(),
            label: label.into(),
            received,
            appended: 0,
            first_id: None,
            max_date: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.appended == 0
    }
}

/// Keep rows whose key is absent from `existing`, first occurrence only,
/// in arrival order
pub fn retain_new<'r, T, F>(rows: &'r [T], existing: &HashSet<NaturalKey>, key: F) -> Vec<&'r T>
where
    F: Fn(&T) -> NaturalKey,
{
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|row| {
            let k = key(row);
            !existing.contains(&k) && seen.insert(k)
        })
        .collect()
}

/// Loader bound to one store for the duration of a run
pub struct IncrementalLoader<'s, S: RecordStore> {
    store: &'s mut S,
}

impl<'s, S: RecordStore> IncrementalLoader<'s, S> {
    pub fn new(store: &'s mut S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &*self.store
    }

    pub fn load_asset_classes(&mut self, rows: &[AssetClassRow]) -> PipelineResult<LoadReport> {
        let table = Table::AssetClass;
        let existing = self.store.natural_keys_existing(table)?;
        let retained = retain_new(rows, &existing, |r| NaturalKey::single(&r.name));

        let mut report = LoadReport::empty(table, "asset classes", rows.len());
        if retained.is_empty() {
            return Ok(report);
        }

        let next = self.store.max_id(table)? + 1;
        let new_rows: Vec<_> = retained
            .into_iter()
            .zip(next..)
            .map(|(r, id)| NewAssetClass {
                id,
                name: r.name.clone(),
            })
            .collect();

        report.appended = self.store.append(&RowSet::AssetClasses(new_rows))?;
        report.first_id = Some(next);
        Ok(report)
    }

    /// Load products; every retained product's asset class must be stored
    pub fn load_products(&mut self, rows: &[ProductRow]) -> PipelineResult<LoadReport> {
        let table = Table::Product;
        let existing = self.store.natural_keys_existing(table)?;
        let retained = retain_new(rows, &existing, |r| NaturalKey::single(&r.symbol));

        let mut report = LoadReport::empty(table, "products", rows.len());
        if retained.is_empty() {
            return Ok(report);
        }

        // resolve every owner before writing anything
        let mut owners = Vec::with_capacity(retained.len());
        for r in &retained {
            let owner = self
                .store
                .entity_id(Table::AssetClass, &NaturalKey::single(&r.asset_class))?
                .ok_or_else(|| {
                    PipelineError::reference(format!(
                        "product '{}' references unknown asset class '{}'",
                        r.symbol, r.asset_class
                    ))
                })?;
            owners.push(owner);
        }

        let next = self.store.max_id(table)? + 1;
        let new_rows: Vec<_> = retained
            .into_iter()
            .zip(owners)
            .zip(next..)
            .map(|((r, asset_class_id), id)| NewProduct {
                id,
                symbol: r.symbol.clone(),
                name: r.name.clone(),
                alias: r.alias.clone(),
                asset_class_id,
            })
            .collect();

        report.appended = self.store.append(&RowSet::Products(new_rows))?;
        report.first_id = Some(next);
        Ok(report)
    }

    pub fn load_headlines(&mut self, rows: &[HeadlineRow]) -> PipelineResult<LoadReport> {
        let table = Table::NewsHeadline;
        let existing = self.store.natural_keys_existing(table)?;
        let retained = retain_new(rows, &existing, HeadlineRow::key);

        let mut report = LoadReport::empty(table, "headlines", rows.len());
        if retained.is_empty() {
            return Ok(report);
        }

        let next = self.store.max_id(table)? + 1;
        let new_rows: Vec<_> = retained
            .into_iter()
            .zip(next..)
            .map(|(r, id)| NewHeadline {
                id,
                title: r.title.clone(),
                region: r.region.clone(),
                measurement: r.measurement.clone(),
                sector: r.sector.clone(),
                abbreviation: r.abbreviation.clone(),
                definition: r.definition.clone(),
            })
            .collect();

        report.appended = self.store.append(&RowSet::Headlines(new_rows))?;
        report.first_id = Some(next);
        Ok(report)
    }

    /// High-water-mark append of a cleaned batch for the entity `owner`
    ///
    /// `owner` is a product symbol for price batches and (title, region)
    /// for release batches. Fails with `ReferenceError` when the entity is
    /// not stored yet.
    pub fn load_observations(
        &mut self,
        owner: &NaturalKey,
        batch: &CleanBatch,
    ) -> PipelineResult<LoadReport> {
        let table = Table::from(batch.kind);
        let owner_table = table.owner_table().unwrap_or(Table::Product);

        let entity_id = self.store.entity_id(owner_table, owner)?.ok_or_else(|| {
            PipelineError::reference(format!(
                "batch '{}' references unknown {} '{}'",
                batch.name, owner_table, owner
            ))
        })?;

        let high_water = self.store.max_date(table, entity_id)?;
        let retained = match high_water {
            Some(max) => batch.filtered(|row| row.date > max),
            None => batch.clone(),
        };

        let mut report = LoadReport::empty(table, owner.to_string(), batch.len());
        report.max_date = high_water;
        if retained.is_empty() {
            log::debug!("   ├─ {}: nothing newer than {:?}", owner, high_water);
            return Ok(report);
        }

        let next = self.store.max_id(table)? + 1;
        let rows = match batch.kind {
            TableKind::PriceRecord => RowSet::Prices(price_rows(&retained, entity_id, next)?),
            TableKind::ReleaseData => RowSet::Releases(release_rows(&retained, entity_id, next)),
        };

        report.appended = self.store.append(&rows)?;
        report.first_id = Some(next);
        report.max_date = retained.last_date();
        Ok(report)
    }
}

fn price_rows(batch: &CleanBatch, product_id: i64, next: i64) -> PipelineResult<Vec<NewPriceRecord>> {
    let field = |row: usize, column: &str| {
        batch.value(row, column).ok_or_else(|| {
            PipelineError::schema(format!(
                "batch '{}' row {}: missing '{}' in a price bar",
                batch.name, row, column
            ))
        })
    };

    (0..batch.len())
        .zip(next..)
        .map(|(i, id)| {
            Ok(NewPriceRecord {
                id,
                date: batch.rows[i].date,
                open: field(i, "open")?,
                high: field(i, "high")?,
                low: field(i, "low")?,
                close: field(i, "close")?,
                product_id,
            })
        })
        .collect()
}

fn release_rows(batch: &CleanBatch, headline_id: i64, next: i64) -> Vec<NewRelease> {
    (0..batch.len())
        .zip(next..)
        .map(|(i, id)| NewRelease {
            id,
            date: batch.rows[i].date,
            actual: batch.value(i, "actual"),
            forecast: batch.value(i, "forecast"),
            previous: batch.value(i, "previous"),
            headline_id,
        })
        .collect()
}
