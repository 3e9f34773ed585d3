//! # Write path: raw batch → clean batch → store
//!
//! ```text
//! extract (CSV / HTML / calendar)
//!        │  RawBatch
//!        ▼
//! Normalizer ── restrict → dates → floor → sort → numeric → round → dedup → complete
//!        │  CleanBatch
//!        ▼
//! IncrementalLoader ── set-difference vs store, id assignment, atomic append
//! ```
//!
//! `ingestion` drives whole directory trees through these stages with
//! per-file isolation.

pub mod batch;
pub mod error;
pub mod ingestion;
pub mod loader;
pub mod normalizer;
pub mod table_kind;

pub use batch::{CleanBatch, CleanRow, RawBatch};
pub use error::{PipelineError, PipelineResult};
pub use ingestion::{headline_from_label, IngestReport, Ingestor};
pub use loader::{AssetClassRow, HeadlineRow, IncrementalLoader, LoadReport, ProductRow};
pub use normalizer::Normalizer;
pub use table_kind::{NumericMode, TableKind};
