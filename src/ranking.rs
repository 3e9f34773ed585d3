//! Ranking report: read path from store to per-product response

use crate::config::AnalyticsConfig;
use crate::metrics::{MetricRequest, MetricsEngine, Period};
use crate::pipeline::error::PipelineResult;
use crate::response::{EntityReport, ResponseAssembler};
use crate::store::{RecordStore, SeriesFilter};
use std::collections::BTreeMap;

pub type RankingReport = BTreeMap<String, EntityReport>;

pub struct RankingService {
    engine: MetricsEngine,
}

impl RankingService {
    pub fn new(engine: MetricsEngine) -> Self {
        Self { engine }
    }

    pub fn standard() -> Self {
        Self::new(MetricsEngine::standard())
    }

    pub fn engine(&self) -> &MetricsEngine {
        &self.engine
    }

    /// `relative_change` on every configured period; `absolute_change` and
    /// the configured metric set on daily data
    pub fn requests(&self, config: &AnalyticsConfig) -> PipelineResult<Vec<MetricRequest>> {
        let periods = config.periods()?;

        let mut daily = vec!["absolute_change".to_string()];
        for metric in &config.metric_set {
            if !daily.contains(metric) {
                daily.push(metric.clone());
            }
        }

        let mut requests: Vec<MetricRequest> = periods
            .iter()
            .filter(|p| **p != Period::Day)
            .map(|p| MetricRequest::new(*p, &["relative_change"]))
            .collect();
        if periods.contains(&Period::Day) && !daily.iter().any(|m| m == "relative_change") {
            daily.insert(0, "relative_change".to_string());
        }
        requests.insert(
            0,
            MetricRequest {
                period: Period::Day,
                metrics: daily,
            },
        );

        Ok(requests)
    }

    pub fn report<S: RecordStore>(
        &self,
        store: &S,
        config: &AnalyticsConfig,
        asset_class: Option<&str>,
    ) -> PipelineResult<RankingReport> {
        config.validate(self.engine.registry())?;
        let requests = self.requests(config)?;
        self.engine.validate(&requests)?;

        let mut filter = SeriesFilter::between(config.start_date, config.end_date);
        if let Some(class) = asset_class {
            filter = filter.category(class);
        }

        log::info!(
            "📊 Ranking {} → {} ({})",
            config.start_date,
            config.end_date,
            asset_class.unwrap_or("all asset classes")
        );

        let series = store.fetch_price_series(&filter)?;
        let metrics = self.engine.compute(&series, &requests)?;
        let products = store.fetch_products(asset_class)?;

        let report = ResponseAssembler::new(config.end_date).assemble(&products, &series, &metrics);
        log::info!(
            "   └─ {} bars, {} of {} products reported",
            series.len(),
            report.len(),
            products.len()
        );
        Ok(report)
    }
}

impl Default for RankingService {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn config() -> AnalyticsConfig {
        AnalyticsConfig::new(
            "unused.db",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        )
    }

    #[test]
    fn test_requests_cover_periods_and_daily_metrics() {
        let requests = RankingService::standard().requests(&config()).unwrap();
        assert_eq!(requests.len(), 4);

        let daily = &requests[0];
        assert_eq!(daily.period, Period::Day);
        assert_eq!(
            daily.metrics,
            vec!["relative_change", "absolute_change", "expected_return", "volatility", "updown_ratio"]
        );
        for request in &requests[1..] {
            assert_eq!(request.metrics, vec!["relative_change"]);
        }
    }

    #[test]
    fn test_requests_without_daily_period() {
        let mut cfg = config();
        cfg.period_set = vec!["m".into()];
        cfg.metric_set = vec!["volatility".into(), "absolute_change".into()];
        let requests = RankingService::standard().requests(&cfg).unwrap();

        assert_eq!(requests[0].period, Period::Day);
        assert_eq!(requests[0].metrics, vec!["absolute_change", "volatility"]);
        assert_eq!(requests[1].period, Period::Month);
    }
}
