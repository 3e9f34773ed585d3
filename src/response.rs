//! Response assembly: latest bar + metrics + recent closes per entity
//!
//! Output shape per entity:
//!
//! ```json
//! {
//!   "symbol": "GOLD", "name": "Gold", "alias": "GC=F", "asset_class": "Commodity",
//!   "date": "2024-03-01", "open": 2050.1, "high": 2061.0, "low": 2040.5, "value": 2055.3,
//!   "d_relative_change": 0.01, "w_relative_change": 0.02, "absolute_change": 5.2,
//!   "volatility": 0.14,
//!   "graphing_data": [{"time": "2024-02-01", "value": 2030.0}, ...]
//! }
//! ```
//!
//! Entities without bars in range are omitted. A metric undefined for an
//! entity leaves its key out; the entity keeps its other fields.

use crate::metrics::{group_by_entity, Bar, MetricsResult, Period};
use crate::store::{PriceObservation, ProductInfo};
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

/// Trailing window of daily closes exposed as `graphing_data`
pub const GRAPH_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphPoint {
    pub time: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityReport {
    pub symbol: String,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub asset_class: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    /// Latest close
    pub value: f64,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, f64>,
    pub graphing_data: Vec<GraphPoint>,
}

/// Response key for a (period, metric) pair
///
/// `relative_change` is always period-prefixed; other daily metrics keep
/// their plain name.
pub fn metric_key(period: Period, metric: &str) -> String {
    if period == Period::Day && metric != "relative_change" {
        metric.to_string()
    } else {
        format!("{}_{}", period.as_str(), metric)
    }
}

pub struct ResponseAssembler {
    end_date: NaiveDate,
}

impl ResponseAssembler {
    pub fn new(end_date: NaiveDate) -> Self {
        Self { end_date }
    }

    /// First date included in `graphing_data`
    pub fn graph_start(&self) -> NaiveDate {
        self.end_date - Duration::days(GRAPH_WINDOW_DAYS - 1)
    }

    /// One report per product that has bars in `series`, keyed by symbol
    pub fn assemble(
        &self,
        products: &[ProductInfo],
        series: &[PriceObservation],
        metrics: &MetricsResult,
    ) -> BTreeMap<String, EntityReport> {
        let bars_by_symbol: BTreeMap<String, Vec<Bar>> = group_by_entity(series)
            .into_iter()
            .map(|((_, entity), bars)| (entity, bars))
            .collect();
        let metric_keys: Vec<(Period, &str)> = metrics.keys().collect();
        let graph_start = self.graph_start();

        let mut reports = BTreeMap::new();
        for product in products {
            let Some(bars) = bars_by_symbol.get(&product.symbol) else {
                continue;
            };
            let Some(latest) = bars.last() else {
                continue;
            };

            let entity_metrics = metric_keys
                .iter()
                .filter_map(|(period, metric)| {
                    metrics
                        .get(*period, metric, &product.symbol)
                        .map(|v| (metric_key(*period, metric), v))
                })
                .collect();

            let graphing_data = bars
                .iter()
                .filter(|b| b.date >= graph_start && b.date <= self.end_date)
                .map(|b| GraphPoint {
                    time: b.date,
                    value: b.close,
                })
                .collect();

            reports.insert(
                product.symbol.clone(),
                EntityReport {
                    symbol: product.symbol.clone(),
                    name: product.name.clone(),
                    alias: product.alias.clone(),
                    asset_class: product.asset_class.clone(),
                    date: latest.date,
                    open: latest.open,
                    high: latest.high,
                    low: latest.low,
                    value: latest.close,
                    metrics: entity_metrics,
                    graphing_data,
                },
            );
        }
        reports
    }
}
