//! Metrics engine: long-format price series → per-(period, metric, entity)
//! scalars
//!
//! The engine is a pure function of its input. Requests are validated as a
//! whole before any series is touched, then the series is grouped by
//! (category, entity), bucketed per period, and every requested measure is
//! applied. An entity with no bars in range does not appear in the output;
//! an entity for which a measure is undefined is simply absent under that
//! metric.

use super::period::{bucketize, Bar, Period};
use super::registry::MetricRegistry;
use crate::pipeline::error::PipelineResult;
use crate::store::PriceObservation;
use serde::Serialize;
use std::collections::BTreeMap;

/// Metrics to compute for one period
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRequest {
    pub period: Period,
    pub metrics: Vec<String>,
}

impl MetricRequest {
    pub fn new<S: AsRef<str>>(period: Period, metrics: &[S]) -> Self {
        Self {
            period,
            metrics: metrics.iter().map(|m| m.as_ref().to_string()).collect(),
        }
    }
}

/// entity symbol → value
pub type EntityValues = BTreeMap<String, f64>;

/// period → metric → entity → value
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsResult {
    values: BTreeMap<Period, BTreeMap<String, EntityValues>>,
}

impl MetricsResult {
    pub fn get(&self, period: Period, metric: &str, entity: &str) -> Option<f64> {
        self.values.get(&period)?.get(metric)?.get(entity).copied()
    }

    pub fn metric(&self, period: Period, metric: &str) -> Option<&EntityValues> {
        self.values.get(&period)?.get(metric)
    }

    /// Every (period, metric) pair present, in key order
    pub fn keys(&self) -> impl Iterator<Item = (Period, &str)> {
        self.values
            .iter()
            .flat_map(|(p, metrics)| metrics.keys().map(move |m| (*p, m.as_str())))
    }

    fn insert(&mut self, period: Period, metric: &str, entity: &str, value: f64) {
        self.values
            .entry(period)
            .or_default()
            .entry(metric.to_string())
            .or_default()
            .insert(entity.to_string(), value);
    }
}

/// (category, entity) → ascending daily bars
pub type GroupedBars = BTreeMap<(String, String), Vec<Bar>>;

/// Group a long-format series by (category, entity), dates ascending
pub fn group_by_entity(series: &[PriceObservation]) -> GroupedBars {
    let mut grouped: GroupedBars = BTreeMap::new();
    for obs in series {
        grouped
            .entry((obs.category.clone(), obs.entity.clone()))
            .or_default()
            .push(Bar {
                date: obs.date,
                open: obs.open,
                high: obs.high,
                low: obs.low,
                close: obs.close,
            });
    }
    for bars in grouped.values_mut() {
        bars.sort_by_key(|b| b.date);
    }
    grouped
}

pub struct MetricsEngine {
    registry: MetricRegistry,
}

impl MetricsEngine {
    pub fn new(registry: MetricRegistry) -> Self {
        Self { registry }
    }

    pub fn standard() -> Self {
        Self::new(MetricRegistry::standard())
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Resolve every requested metric name, failing on the first unknown one
    pub fn validate(&self, requests: &[MetricRequest]) -> PipelineResult<()> {
        for request in requests {
            self.registry.validate(&request.metrics)?;
        }
        Ok(())
    }

    pub fn compute(
        &self,
        series: &[PriceObservation],
        requests: &[MetricRequest],
    ) -> PipelineResult<MetricsResult> {
        self.validate(requests)?;

        let grouped = group_by_entity(series);
        let mut result = MetricsResult::default();

        for request in requests {
            for ((_, entity), bars) in &grouped {
                let bucketed = bucketize(bars, request.period);
                for metric in &request.metrics {
                    let measure = self.registry.resolve(metric)?;
                    if let Some(value) = measure(&bucketed) {
                        result.insert(request.period, metric, entity, value);
                    }
                }
            }
        }

        log::debug!(
            "📊 Computed {} metric sets over {} entities",
            result.keys().count(),
            grouped.len()
        );
        Ok(result)
    }
}

impl Default for MetricsEngine {
    fn default() -> Self {
        Self::standard()
    }
}
