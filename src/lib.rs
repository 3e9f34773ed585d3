//! rankboard - market price and economic release analytics
//!
//! Write path: extract (CSV / HTML / remote quotes) → normalize → incremental load.
//! Read path: store → metrics engine → ranking / chart responses.
//!
//! The SQLite store sits between the two paths. Every ingestion run is a
//! batch job: one process owns the store for the duration of the run.

pub mod chart;
pub mod config;
pub mod extract;
pub mod metrics;
pub mod pipeline;
pub mod quotes;
pub mod ranking;
pub mod response;
pub mod sqlite_pragma;
pub mod store;

pub use config::{AnalyticsConfig, IngestConfig, QuoteConfig, SectorMapping};
pub use pipeline::error::{PipelineError, PipelineResult};
