//! Named metric registry
//!
//! Metric names from configuration are resolved here before any compute
//! begins; an unknown name fails the whole request with `ConfigError`.

use super::measures;
use super::period::Bar;
use crate::pipeline::error::{PipelineError, PipelineResult};
use std::collections::BTreeMap;

/// Per-entity scalar measure over ascending bars
pub type MeasureFn = Box<dyn Fn(&[Bar]) -> Option<f64> + Send + Sync>;

pub struct MetricRegistry {
    measures: BTreeMap<String, MeasureFn>,
}

impl MetricRegistry {
    pub fn empty() -> Self {
        Self {
            measures: BTreeMap::new(),
        }
    }

    /// Registry with the built-in measures
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register("relative_change", measures::relative_change);
        registry.register("absolute_change", measures::absolute_change);
        registry.register("updown_ratio", measures::updown_ratio);
        registry.register("volatility", measures::volatility);
        registry.register("expected_return", measures::expected_return);
        registry
    }

    /// Add or replace a measure
    pub fn register<F>(&mut self, name: impl Into<String>, measure: F)
    where
        F: Fn(&[Bar]) -> Option<f64> + Send + Sync + 'static,
    {
        self.measures.insert(name.into(), Box::new(measure));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.measures.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.measures.keys().map(String::as_str).collect()
    }

    pub fn resolve(&self, name: &str) -> PipelineResult<&MeasureFn> {
        self.measures.get(name).ok_or_else(|| {
            PipelineError::config(format!(
                "unknown metric '{}' (known: {})",
                name,
                self.names().join(", ")
            ))
        })
    }

    /// Fail on the first unknown name
    pub fn validate<I, S>(&self, names: I) -> PipelineResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.resolve(name.as_ref())?;
        }
        Ok(())
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
