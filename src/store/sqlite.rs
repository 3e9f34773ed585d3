//! SQLite implementation of the record store

use super::records::{
    HeadlineInfo, PriceObservation, ProductInfo, ReleaseObservation, RowSet, SeriesFilter,
};
use super::{run_schema_migrations, NaturalKey, RecordStore, Table};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::sqlite_pragma::apply_optimized_pragmas;
use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;

/// Record store backed by one SQLite connection
///
/// Connections are scoped to a run: open at the start, drop at the end.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file and apply connection pragmas
    ///
    /// Does not create the schema; call [`SqliteStore::migrate`].
    pub fn open<P: AsRef<Path>>(db_path: P) -> PipelineResult<Self> {
        let conn = Connection::open(db_path.as_ref())?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> PipelineResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> PipelineResult<Self> {
        apply_optimized_pragmas(&conn)?;
        Ok(Self { conn })
    }

    /// Apply `/sql/*.sql` from `schema_dir`
    pub fn migrate(&mut self, schema_dir: &str) -> PipelineResult<()> {
        run_schema_migrations(&mut self.conn, schema_dir)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn row_count(&self, table: Table) -> PipelineResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.as_str());
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// Row counts for every table, for run summaries
    pub fn table_counts(&self) -> PipelineResult<Vec<(Table, i64)>> {
        Table::all()
            .into_iter()
            .map(|t| self.row_count(t).map(|n| (t, n)))
            .collect()
    }
}

impl RecordStore for SqliteStore {
    fn max_id(&self, table: Table) -> PipelineResult<i64> {
        let sql = format!("SELECT COALESCE(MAX(id), 0) FROM {}", table.as_str());
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    fn max_date(&self, table: Table, entity_id: i64) -> PipelineResult<Option<NaiveDate>> {
        let owner = table.owner_column().ok_or_else(|| {
            PipelineError::schema(format!("table '{}' holds no dated observations", table))
        })?;
        let sql = format!(
            "SELECT MAX(date) FROM {} WHERE {} = ?1",
            table.as_str(),
            owner
        );
        Ok(self
            .conn
            .query_row(&sql, [entity_id], |row| row.get::<_, Option<NaiveDate>>(0))?)
    }

    fn natural_keys_existing(&self, table: Table) -> PipelineResult<HashSet<NaturalKey>> {
        let columns = table.key_columns();
        let select = columns
            .iter()
            .map(|c| format!("CAST({} AS TEXT)", c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {} FROM {}", select, table.as_str());

        let mut stmt = self.conn.prepare(&sql)?;
        let keys = stmt
            .query_map([], |row| {
                (0..columns.len())
                    .map(|i| row.get::<_, String>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map(NaturalKey::new)
            })?
            .collect::<rusqlite::Result<HashSet<_>>>()?;

        Ok(keys)
    }

    fn entity_id(&self, table: Table, key: &NaturalKey) -> PipelineResult<Option<i64>> {
        let columns = table.key_columns();
        if columns.len() != key.parts().len() {
            return Err(PipelineError::schema(format!(
                "key '{}' does not match the {} key columns of '{}'",
                key,
                columns.len(),
                table
            )));
        }

        let filter = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", c, i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!("SELECT id FROM {} WHERE {}", table.as_str(), filter);

        Ok(self
            .conn
            .query_row(&sql, params_from_iter(key.parts()), |row| row.get(0))
            .optional()?)
    }

    fn append(&mut self, rows: &RowSet) -> PipelineResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        {
            match rows {
                RowSet::AssetClasses(items) => {
                    let mut stmt = tx.prepare("INSERT INTO asset_class (id, name) VALUES (?1, ?2)")?;
                    for r in items {
                        stmt.execute(params![r.id, r.name])?;
                    }
                }
                RowSet::Products(items) => {
                    let mut stmt = tx.prepare(
                        "INSERT INTO product (id, symbol, name, alias, asset_class_id)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )?;
                    for r in items {
                        stmt.execute(params![r.id, r.symbol, r.name, r.alias, r.asset_class_id])?;
                    }
                }
                RowSet::Headlines(items) => {
                    let mut stmt = tx.prepare(
                        "INSERT INTO news_headline
                            (id, title, region, measurement, sector, abbreviation, definition)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    )?;
                    for r in items {
                        stmt.execute(params![
                            r.id,
                            r.title,
                            r.region,
                            r.measurement,
                            r.sector,
                            r.abbreviation,
                            r.definition
                        ])?;
                    }
                }
                RowSet::Prices(items) => {
                    let mut stmt = tx.prepare(
                        "INSERT INTO price_record (id, date, open, high, low, close, product_id)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    )?;
                    for r in items {
                        stmt.execute(params![
                            r.id,
                            r.date,
                            r.open,
                            r.high,
                            r.low,
                            r.close,
                            r.product_id
                        ])?;
                    }
                }
                RowSet::Releases(items) => {
                    let mut stmt = tx.prepare(
                        "INSERT INTO news_release (id, date, actual, forecast, previous, headline_id)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )?;
                    for r in items {
                        stmt.execute(params![
                            r.id,
                            r.date,
                            r.actual,
                            r.forecast,
                            r.previous,
                            r.headline_id
                        ])?;
                    }
                }
            }
        }
        tx.commit()?;

        log::debug!("💾 Appended {} rows to {}", rows.len(), rows.table());
        Ok(rows.len())
    }

    fn fetch_products(&self, asset_class: Option<&str>) -> PipelineResult<Vec<ProductInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.symbol, p.name, p.alias, a.name,
                    (SELECT MAX(r.date) FROM price_record r WHERE r.product_id = p.id)
             FROM product p
             JOIN asset_class a ON p.asset_class_id = a.id
             WHERE (?1 IS NULL OR a.name = ?1)
             ORDER BY p.id ASC",
        )?;

        let products = stmt
            .query_map([asset_class], |row| {
                Ok(ProductInfo {
                    id: row.get(0)?,
                    symbol: row.get(1)?,
                    name: row.get(2)?,
                    alias: row.get(3)?,
                    asset_class: row.get(4)?,
                    latest_date: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(products)
    }

    fn fetch_headlines(&self, sector: Option<&str>) -> PipelineResult<Vec<HeadlineInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, region, measurement, sector, abbreviation, definition
             FROM news_headline
             WHERE (?1 IS NULL OR sector = ?1)
             ORDER BY id ASC",
        )?;

        let headlines = stmt
            .query_map([sector], |row| {
                Ok(HeadlineInfo {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    region: row.get(2)?,
                    measurement: row.get(3)?,
                    sector: row.get(4)?,
                    abbreviation: row.get(5)?,
                    definition: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(headlines)
    }

    fn fetch_price_series(&self, filter: &SeriesFilter) -> PipelineResult<Vec<PriceObservation>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, a.name, p.symbol, r.date, r.open, r.high, r.low, r.close
             FROM price_record r
             JOIN product p ON r.product_id = p.id
             JOIN asset_class a ON p.asset_class_id = a.id
             WHERE (?1 IS NULL OR r.date >= ?1)
               AND (?2 IS NULL OR r.date <= ?2)
               AND (?3 IS NULL OR p.symbol = ?3)
               AND (?4 IS NULL OR a.name = ?4)
             ORDER BY r.date ASC, r.id ASC",
        )?;

        let series = stmt
            .query_map(
                params![filter.start, filter.end, filter.entity, filter.category],
                |row| {
                    Ok(PriceObservation {
                        id: row.get(0)?,
                        category: row.get(1)?,
                        entity: row.get(2)?,
                        date: row.get(3)?,
                        open: row.get(4)?,
                        high: row.get(5)?,
                        low: row.get(6)?,
                        close: row.get(7)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(series)
    }

    fn fetch_release_series(
        &self,
        filter: &SeriesFilter,
    ) -> PipelineResult<Vec<ReleaseObservation>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, h.title, h.region, r.date, r.actual, r.forecast, r.previous
             FROM news_release r
             JOIN news_headline h ON r.headline_id = h.id
             WHERE (?1 IS NULL OR r.date >= ?1)
               AND (?2 IS NULL OR r.date <= ?2)
               AND (?3 IS NULL OR h.title = ?3 OR h.abbreviation = ?3)
               AND (?4 IS NULL OR h.sector = ?4)
               AND (?5 IS NULL OR h.region = ?5)
             ORDER BY r.date ASC, r.id ASC",
        )?;

        let series = stmt
            .query_map(
                params![filter.start, filter.end, filter.entity, filter.category, filter.region],
                |row| {
                    Ok(ReleaseObservation {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        region: row.get(2)?,
                        date: row.get(3)?,
                        actual: row.get(4)?,
                        forecast: row.get(5)?,
                        previous: row.get(6)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(series)
    }
}
