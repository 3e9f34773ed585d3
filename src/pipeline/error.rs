//! Error taxonomy for the ingestion and analytics pipeline

use thiserror::Error;

/// Errors raised by extraction, normalization, loading and metrics.
///
/// - `Schema`: malformed batch (missing required column, unparseable date).
///   Aborts the current batch.
/// - `Reference`: an observation or entity points at an unknown owner.
///   Aborts the current batch.
/// - `Config`: unknown metric / period / sector, or an invalid setting.
///   Raised before any computation starts.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("reference error: {0}")]
    Reference(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn schema(msg: impl Into<String>) -> Self {
        PipelineError::Schema(msg.into())
    }

    pub fn reference(msg: impl Into<String>) -> Self {
        PipelineError::Reference(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        PipelineError::Config(msg.into())
    }

    /// True for errors that only invalidate the batch at hand
    pub fn is_batch_error(&self) -> bool {
        matches!(self, PipelineError::Schema(_) | PipelineError::Reference(_))
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        assert_eq!(
            PipelineError::schema("missing column 'close'").to_string(),
            "schema error: missing column 'close'"
        );
        assert_eq!(
            PipelineError::config("unknown metric 'x'").to_string(),
            "config error: unknown metric 'x'"
        );
    }

    #[test]
    fn test_batch_error_classification() {
        assert!(PipelineError::schema("x").is_batch_error());
        assert!(PipelineError::reference("x").is_batch_error());
        assert!(!PipelineError::config("x").is_batch_error());

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(!PipelineError::from(io).is_batch_error());
    }
}
