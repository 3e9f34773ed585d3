//! Read-path analytics: bucketing, per-entity measures, correlation

pub mod correlation;
pub mod engine;
pub mod measures;
pub mod period;
pub mod registry;

pub use correlation::{correlation_matrix, pearson, CorrelationMatrix};
pub use engine::{group_by_entity, MetricRequest, MetricsEngine, MetricsResult};
pub use period::{bucketize, Bar, Period};
pub use registry::MetricRegistry;
