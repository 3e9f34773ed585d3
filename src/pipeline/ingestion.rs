//! Ingestion driver: directory trees and calendar pages into the store
//!
//! Layouts:
//! - price tree: `<price_dir>/<AssetClass>/<SYMBOL>.csv`
//! - news tree: `<news_dir>/<Sector>/<Title - Region - Measurement>.csv`
//!
//! Files are read through a [`RawRecordExtractor`] picked by extension
//! (`.csv`, or `.html` / `.htm` for a saved table). Calendar pages yield
//! batches named like news files.
//!
//! Order is always categories → entities → observations. Each observation
//! file is isolated: a failing file is logged and counted, the run
//! continues with the next one.

use super::batch::RawBatch;
use super::error::{PipelineError, PipelineResult};
use super::loader::{AssetClassRow, HeadlineRow, IncrementalLoader, LoadReport, ProductRow};
use super::normalizer::Normalizer;
use super::table_kind::TableKind;
use crate::extract::{
    extract_file, file_label, CalendarExtractor, CsvExtractor, HtmlTableExtractor,
    RawRecordExtractor,
};
use crate::store::{NaturalKey, RecordStore};
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Positional columns of a release export
pub const RELEASE_FILE_COLUMNS: &[&str] = &["date", "value"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub files_seen: usize,
    pub files_loaded: usize,
    pub files_failed: usize,
    pub rows_appended: usize,
    pub failures: Vec<FileFailure>,
}

impl IngestReport {
    fn record(&mut self, path: &Path, outcome: PipelineResult<LoadReport>) {
        self.files_seen += 1;
        match outcome {
            Ok(load) => {
                self.files_loaded += 1;
                self.rows_appended += load.appended;
                log::info!("✅ {} → +{} rows", path.display(), load.appended);
            }
            Err(e) => {
                self.files_failed += 1;
                log::error!("❌ {}: {}", path.display(), e);
                self.failures.push(FileFailure {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                });
            }
        }
    }

    pub fn merge(&mut self, other: IngestReport) {
        self.files_seen += other.files_seen;
        self.files_loaded += other.files_loaded;
        self.files_failed += other.files_failed;
        self.rows_appended += other.rows_appended;
        self.failures.extend(other.failures);
    }
}

/// Sub-directories of `dir`, sorted by name
fn sorted_dirs(dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Directory tree shape, deciding how each file is extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeLayout {
    /// Header-driven price exports
    Prices,
    /// Release exports; CSV columns are positional
    News,
}

impl TreeLayout {
    /// Extractor for `path`, `None` for unknown formats
    pub fn extractor(&self, path: &Path) -> Option<Box<dyn RawRecordExtractor>> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let extractor: Box<dyn RawRecordExtractor> = match (ext.as_str(), self) {
            ("csv", TreeLayout::Prices) => Box::new(CsvExtractor::with_headers()),
            ("csv", TreeLayout::News) => Box::new(CsvExtractor::positional(RELEASE_FILE_COLUMNS)),
            ("html" | "htm", _) => Box::new(HtmlTableExtractor::first_table()),
            _ => return None,
        };
        Some(extractor)
    }
}

/// Extractable files of `dir`, sorted by name; anything else is skipped
/// with a warning
fn sorted_source_files(dir: &Path, layout: TreeLayout) -> PipelineResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if layout.extractor(&path).is_some() {
            files.push(path);
        } else {
            log::warn!("⚠️  Skipping {} (no extractor for this format)", path.display());
        }
    }
    files.sort();
    Ok(files)
}

/// The single batch of a one-table file
fn extract_single(layout: TreeLayout, path: &Path) -> PipelineResult<RawBatch> {
    let extractor = layout.extractor(path).ok_or_else(|| {
        PipelineError::schema(format!("no extractor for {}", path.display()))
    })?;
    extract_file(extractor.as_ref(), path)?
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::schema(format!("{} holds no table", path.display())))
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().trim().to_string())
        .unwrap_or_default()
}

/// `"Title - Region - Measurement"` → headline; titles may contain `-`
pub fn headline_from_label(label: &str, sector: &str) -> PipelineResult<HeadlineRow> {
    let parts: Vec<&str> = label.rsplitn(3, '-').map(str::trim).collect();
    match parts.as_slice() {
        [measurement, region, title] if !title.is_empty() && !region.is_empty() => {
            Ok(HeadlineRow {
                title: title.to_string(),
                region: region.to_string(),
                measurement: (!measurement.is_empty()).then(|| measurement.to_string()),
                sector: Some(sector.to_string()),
                ..Default::default()
            })
        }
        _ => Err(PipelineError::schema(format!(
            "'{}' is not named 'Title - Region - Measurement'",
            label
        ))),
    }
}

pub struct Ingestor<'s, S: RecordStore> {
    store: &'s mut S,
    floor_date: NaiveDate,
}

impl<'s, S: RecordStore> Ingestor<'s, S> {
    pub fn new(store: &'s mut S, floor_date: NaiveDate) -> Self {
        Self { store, floor_date }
    }

    /// Normalize and append one raw batch for an existing entity
    pub fn load_batch(
        &mut self,
        kind: TableKind,
        owner: &NaturalKey,
        raw: &RawBatch,
    ) -> PipelineResult<LoadReport> {
        let clean = Normalizer::new(kind, self.floor_date).normalize(raw)?;
        IncrementalLoader::new(self.store).load_observations(owner, &clean)
    }

    pub fn import_price_tree(&mut self, price_dir: &Path) -> PipelineResult<IngestReport> {
        log::info!("🚀 Importing price tree {}", price_dir.display());
        let class_dirs = sorted_dirs(price_dir)?;

        let classes: Vec<AssetClassRow> = class_dirs
            .iter()
            .map(|d| AssetClassRow { name: dir_name(d) })
            .collect();
        let mut loader = IncrementalLoader::new(self.store);
        let class_load = loader.load_asset_classes(&classes)?;
        log::info!("   ├─ Asset classes: +{}", class_load.appended);

        let mut files: Vec<(String, PathBuf)> = Vec::new();
        let mut products = Vec::new();
        for dir in &class_dirs {
            let asset_class = dir_name(dir);
            for path in sorted_source_files(dir, TreeLayout::Prices)? {
                products.push(ProductRow {
                    symbol: file_label(&path),
                    name: None,
                    alias: None,
                    asset_class: asset_class.clone(),
                });
                files.push((file_label(&path), path));
            }
        }
        let product_load = loader.load_products(&products)?;
        log::info!("   └─ Products: +{}", product_load.appended);

        let mut report = IngestReport::default();
        for (symbol, path) in &files {
            let outcome = extract_single(TreeLayout::Prices, path).and_then(|raw| {
                self.load_batch(TableKind::PriceRecord, &NaturalKey::single(symbol.as_str()), &raw)
            });
            report.record(path, outcome);
        }
        Ok(report)
    }

    pub fn import_news_tree(&mut self, news_dir: &Path) -> PipelineResult<IngestReport> {
        log::info!("🚀 Importing news tree {}", news_dir.display());
        let mut report = IngestReport::default();

        let mut files: Vec<(HeadlineRow, PathBuf)> = Vec::new();
        for dir in sorted_dirs(news_dir)? {
            let sector = dir_name(&dir);
            for path in sorted_source_files(&dir, TreeLayout::News)? {
                match headline_from_label(&file_label(&path), &sector) {
                    Ok(headline) => files.push((headline, path)),
                    Err(e) => report.record(&path, Err(e)),
                }
            }
        }

        let headlines: Vec<HeadlineRow> = files.iter().map(|(h, _)| h.clone()).collect();
        let headline_load = IncrementalLoader::new(self.store).load_headlines(&headlines)?;
        log::info!("   └─ Headlines: +{}", headline_load.appended);

        for (headline, path) in &files {
            let outcome = extract_single(TreeLayout::News, path)
                .and_then(|raw| self.load_batch(TableKind::ReleaseData, &headline.key(), &raw));
            report.record(path, outcome);
        }
        Ok(report)
    }

    /// Import a calendar page; headlines are created under `sector`
    pub fn import_calendar(
        &mut self,
        path: &Path,
        year: i32,
        sector: Option<&str>,
    ) -> PipelineResult<IngestReport> {
        log::info!("🚀 Importing calendar {} ({})", path.display(), year);
        let batches = extract_file(&CalendarExtractor { year }, path)?;

        let mut grouped: Vec<(HeadlineRow, RawBatch)> = Vec::with_capacity(batches.len());
        for raw in batches {
            let mut headline = headline_from_label(&raw.name, "")?;
            headline.sector = sector.map(str::to_string);
            grouped.push((headline, raw));
        }

        let headlines: Vec<HeadlineRow> = grouped.iter().map(|(h, _)| h.clone()).collect();
        let headline_load = IncrementalLoader::new(self.store).load_headlines(&headlines)?;
        log::info!(
            "   ├─ {} events, {} headlines (+{} new)",
            grouped.iter().map(|(_, raw)| raw.len()).sum::<usize>(),
            grouped.len(),
            headline_load.appended
        );

        let mut report = IngestReport::default();
        for (headline, raw) in &grouped {
            let outcome = self.load_batch(TableKind::ReleaseData, &headline.key(), raw);
            report.files_seen += 1;
            match outcome {
                Ok(load) => {
                    report.files_loaded += 1;
                    report.rows_appended += load.appended;
                }
                Err(e) => {
                    log::error!("❌ {}: {}", raw.name, e);
                    report.files_failed += 1;
                    report.failures.push(FileFailure {
                        path: path.join(&raw.name),
                        error: e.to_string(),
                    });
                }
            }
        }
        log::info!("   └─ Releases: +{}", report.rows_appended);
        Ok(report)
    }
}
