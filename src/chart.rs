//! Mixed price/news datasets for charting, with optional analysis
//!
//! Each series is labelled by month (`Jan-24`), keeping the last value seen
//! for a label, then all series of a set are inner-joined on the label in
//! the first series' order. The set named `price_mixed_set` in a sector
//! mapping is led by the product's closes; other sets hold headlines only.

use crate::config::{AnalyticsConfig, PRICE_MIXED_SET};
use crate::metrics::measures::cumulative_change;
use crate::metrics::{correlation_matrix, CorrelationMatrix};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::store::{HeadlineInfo, NaturalKey, RecordStore, SeriesFilter, Table};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub const MONTH_LABEL_FORMAT: &str = "%b-%y";

pub fn month_label(date: NaiveDate) -> String {
    date.format(MONTH_LABEL_FORMAT).to_string()
}

/// Analysis applied over a wide batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisMetric {
    CumulativeChange,
    Correlation,
}

impl AnalysisMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMetric::CumulativeChange => "cumulative_change",
            AnalysisMetric::Correlation => "correlation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim() {
            "cumulative_change" => Some(AnalysisMetric::CumulativeChange),
            "correlation" => Some(AnalysisMetric::Correlation),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> PipelineResult<Self> {
        Self::from_str(s)
            .ok_or_else(|| PipelineError::config(format!("unknown analysis metric '{}'", s)))
    }

    pub fn all() -> [AnalysisMetric; 2] {
        [AnalysisMetric::CumulativeChange, AnalysisMetric::Correlation]
    }
}

/// One named series reduced to one value per month label
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSeries {
    pub name: String,
    pub points: Vec<(String, Option<f64>)>,
}

impl LabeledSeries {
    /// Build from ascending dated values; a later value replaces an earlier
    /// one under the same label
    pub fn monthly<I>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, Option<f64>)>,
    {
        let mut points: Vec<(String, Option<f64>)> = Vec::new();
        for (date, value) in values {
            let label = month_label(date);
            match points.last_mut() {
                Some(point) if point.0 == label => point.1 = value,
                _ => points.push((label, value)),
            }
        }
        Self {
            name: name.into(),
            points,
        }
    }

    fn value_at(&self, label: &str) -> Option<Option<f64>> {
        self.points.iter().find(|(l, _)| l == label).map(|(_, v)| *v)
    }
}

/// Column-per-series table sharing one label column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WideBatch {
    pub labels: Vec<String>,
    pub columns: Vec<(String, Vec<Option<f64>>)>,
}

impl WideBatch {
    /// Inner join on the label, in the first series' order
    pub fn inner_join(series: &[LabeledSeries]) -> Self {
        let Some(first) = series.first() else {
            return Self::default();
        };

        let labels: Vec<String> = first
            .points
            .iter()
            .map(|(label, _)| label.clone())
            .filter(|label| series[1..].iter().all(|s| s.value_at(label).is_some()))
            .collect();

        let columns = series
            .iter()
            .map(|s| {
                let values = labels.iter().map(|l| s.value_at(l).flatten()).collect();
                (s.name.clone(), values)
            })
            .collect();

        Self { labels, columns }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Running percentage change per column
    pub fn cumulative_change(&self) -> Self {
        Self {
            labels: self.labels.clone(),
            columns: self
                .columns
                .iter()
                .map(|(name, values)| {
                    let changes = cumulative_change(values).into_iter().map(Some).collect();
                    (name.clone(), changes)
                })
                .collect(),
        }
    }

    pub fn correlation(&self) -> CorrelationMatrix {
        correlation_matrix(&self.columns)
    }

    /// `{"date": [labels], "<series>": [values], ...}`
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("date".to_string(), json!(self.labels));
        for (name, values) in &self.columns {
            obj.insert(name.clone(), json!(values));
        }
        Value::Object(obj)
    }
}

/// One chart set with the analyses requested for it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSet {
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cumulative_change: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<Value>,
}

pub struct DataMixer<'s, S: RecordStore> {
    store: &'s S,
    start: NaiveDate,
    end: NaiveDate,
}

impl<'s, S: RecordStore> DataMixer<'s, S> {
    pub fn new(store: &'s S, start: NaiveDate, end: NaiveDate) -> Self {
        Self { store, start, end }
    }

    /// Monthly closes of a stored product
    pub fn price_series(&self, symbol: &str) -> PipelineResult<LabeledSeries> {
        if self
            .store
            .entity_id(Table::Product, &NaturalKey::single(symbol))?
            .is_none()
        {
            return Err(PipelineError::reference(format!("unknown product '{}'", symbol)));
        }

        let bars = self
            .store
            .fetch_price_series(&SeriesFilter::between(self.start, self.end).entity(symbol))?;
        Ok(LabeledSeries::monthly(
            symbol,
            bars.iter().map(|b| (b.date, Some(b.close))),
        ))
    }

    /// Resolve a sector-mapping entry to a stored (title, region)
    ///
    /// An entry is a title or abbreviation, optionally followed by
    /// ` - Region`. A bare title stored under several regions is a
    /// `ConfigError`; `None` when nothing matches.
    pub fn resolve_headline(&self, headline: &str) -> PipelineResult<Option<(String, String)>> {
        let stored = self.store.fetch_headlines(None)?;
        let matches_name = |h: &HeadlineInfo, name: &str| {
            h.title == name || h.abbreviation.as_deref() == Some(name)
        };

        if let Some((name, region)) = headline.rsplit_once(" - ") {
            let (name, region) = (name.trim(), region.trim());
            if let Some(h) = stored.iter().find(|h| matches_name(*h, name) && h.region == region) {
                return Ok(Some((h.title.clone(), h.region.clone())));
            }
        }

        let candidates: Vec<&HeadlineInfo> =
            stored.iter().filter(|h| matches_name(*h, headline)).collect();
        match candidates.as_slice() {
            [] => Ok(None),
            [h] => Ok(Some((h.title.clone(), h.region.clone()))),
            many => {
                let regions: Vec<&str> = many.iter().map(|h| h.region.as_str()).collect();
                Err(PipelineError::config(format!(
                    "headline '{}' is stored for several regions ({}); name it as '{} - <region>'",
                    headline,
                    regions.join(", "),
                    headline
                )))
            }
        }
    }

    /// Monthly actual values of one headline in one region
    pub fn headline_series(&self, headline: &str) -> PipelineResult<LabeledSeries> {
        let releases = match self.resolve_headline(headline)? {
            Some((title, region)) => self.store.fetch_release_series(
                &SeriesFilter::between(self.start, self.end)
                    .entity(title)
                    .region(region),
            )?,
            None => Vec::new(),
        };
        if releases.is_empty() {
            log::warn!("⚠️  No releases for '{}' in {} → {}", headline, self.start, self.end);
        }
        Ok(LabeledSeries::monthly(
            headline,
            releases.iter().map(|r| (r.date, r.actual)),
        ))
    }

    pub fn mix_prices_and_news(&self, symbol: &str, headlines: &[String]) -> PipelineResult<WideBatch> {
        let mut series = vec![self.price_series(symbol)?];
        for headline in headlines {
            series.push(self.headline_series(headline)?);
        }
        Ok(WideBatch::inner_join(&series))
    }

    pub fn mix_news(&self, headlines: &[String]) -> PipelineResult<WideBatch> {
        let series = headlines
            .iter()
            .map(|h| self.headline_series(h))
            .collect::<PipelineResult<Vec<_>>>()?;
        Ok(WideBatch::inner_join(&series))
    }
}

fn parse_analyses(names: &[String]) -> PipelineResult<Vec<AnalysisMetric>> {
    names.iter().map(|n| AnalysisMetric::parse(n)).collect()
}

/// Every headline set of `sector`, keyed by set name
///
/// Analysis names are resolved before the store is read.
pub fn chart_data<S: RecordStore>(
    store: &S,
    config: &AnalyticsConfig,
    symbol: &str,
    sector: &str,
    analyses: &[String],
) -> PipelineResult<BTreeMap<String, ChartSet>> {
    let analyses = parse_analyses(analyses)?;
    let sets = config.sector_mapping.sector(sector)?;
    let mixer = DataMixer::new(store, config.start_date, config.end_date);

    let mut chart = BTreeMap::new();
    for (set_name, headlines) in sets {
        let wide = if set_name == PRICE_MIXED_SET {
            mixer.mix_prices_and_news(symbol, headlines)?
        } else {
            mixer.mix_news(headlines)?
        };
        log::debug!("   ├─ {}: {} months × {} series", set_name, wide.len(), wide.columns.len());

        let mut set = ChartSet {
            data: wide.to_json(),
            cumulative_change: None,
            correlation: None,
        };
        for analysis in &analyses {
            match analysis {
                AnalysisMetric::CumulativeChange => {
                    set.cumulative_change = Some(wide.cumulative_change().to_json())
                }
                AnalysisMetric::Correlation => set.correlation = Some(wide.correlation().to_table()),
            }
        }
        chart.insert(set_name.clone(), set);
    }
    Ok(chart)
}

/// `{header, body}` table of one analysis over the product's price-mixed set
pub fn table_data<S: RecordStore>(
    store: &S,
    config: &AnalyticsConfig,
    symbol: &str,
    sector: &str,
    analysis: &str,
) -> PipelineResult<Value> {
    let analysis = AnalysisMetric::parse(analysis)?;
    let sets = config.sector_mapping.sector(sector)?;
    let headlines = sets.get(PRICE_MIXED_SET).ok_or_else(|| {
        PipelineError::config(format!("sector '{}' has no {}", sector, PRICE_MIXED_SET))
    })?;

    let wide = DataMixer::new(store, config.start_date, config.end_date)
        .mix_prices_and_news(symbol, headlines)?;

    Ok(match analysis {
        AnalysisMetric::Correlation => wide.correlation().to_table(),
        AnalysisMetric::CumulativeChange => {
            let changes = wide.cumulative_change();
            let mut header = vec![String::new()];
            header.extend(changes.columns.iter().map(|(name, _)| name.clone()));
            let body: Vec<Value> = changes
                .labels
                .iter()
                .enumerate()
                .map(|(i, label)| {
                    let mut row = Map::new();
                    row.insert(String::new(), json!(label));
                    for (name, values) in &changes.columns {
                        row.insert(name.clone(), json!(values[i]));
                    }
                    Value::Object(row)
                })
                .collect();
            json!({ "header": header, "body": body })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewHeadline, NewRelease, RowSet, SqliteStore};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_labels_keep_last_value() {
        let series = LabeledSeries::monthly(
            "GOLD",
            vec![
                (ymd(2024, 1, 2), Some(1.0)),
                (ymd(2024, 1, 31), Some(2.0)),
                (ymd(2024, 2, 1), Some(3.0)),
            ],
        );
        assert_eq!(
            series.points,
            vec![("Jan-24".to_string(), Some(2.0)), ("Feb-24".to_string(), Some(3.0))]
        );
    }

    #[test]
    fn test_inner_join_on_labels() {
        let gold = LabeledSeries::monthly(
            "GOLD",
            vec![
                (ymd(2024, 1, 31), Some(2000.0)),
                (ymd(2024, 2, 29), Some(2050.0)),
                (ymd(2024, 3, 28), Some(2200.0)),
            ],
        );
        let cpi = LabeledSeries::monthly(
            "CPI m/m",
            vec![(ymd(2024, 2, 13), Some(0.3)), (ymd(2024, 3, 12), None)],
        );

        let wide = WideBatch::inner_join(&[gold, cpi]);
        assert_eq!(wide.labels, vec!["Feb-24", "Mar-24"]);
        assert_eq!(wide.column("GOLD").unwrap(), &[Some(2050.0), Some(2200.0)]);
        assert_eq!(wide.column("CPI m/m").unwrap(), &[Some(0.3), None]);

        let json = wide.to_json();
        assert_eq!(json["date"], json!(["Feb-24", "Mar-24"]));
        assert_eq!(json["CPI m/m"], json!([0.3, null]));
    }

    #[test]
    fn test_cumulative_change_over_wide_batch() {
        let wide = WideBatch {
            labels: vec!["Jan-24".into(), "Feb-24".into(), "Mar-24".into()],
            columns: vec![("GOLD".into(), vec![Some(100.0), Some(110.0), Some(121.0)])],
        };
        let changes = wide.cumulative_change();
        assert_eq!(changes.column("GOLD").unwrap(), &[Some(0.0), Some(10.0), Some(20.0)]);
    }

    #[test]
    fn test_unknown_analysis_metric() {
        assert_eq!(AnalysisMetric::parse("correlation").unwrap(), AnalysisMetric::Correlation);
        assert!(matches!(
            AnalysisMetric::parse("autocorrelation"),
            Err(PipelineError::Config(_))
        ));
        for m in AnalysisMetric::all() {
            assert_eq!(AnalysisMetric::from_str(m.as_str()), Some(m));
        }
    }

    fn store_with_two_regions() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.migrate(concat!(env!("CARGO_MANIFEST_DIR"), "/sql")).unwrap();
        let headline = |id: i64, region: &str| NewHeadline {
            id,
            title: "CPI m/m".into(),
            region: region.into(),
            measurement: Some("%".into()),
            sector: Some("Inflation".into()),
            abbreviation: None,
            definition: None,
        };
        let release = |id: i64, actual: f64, headline_id: i64| NewRelease {
            id,
            date: ymd(2024, 2, 13),
            actual: Some(actual),
            forecast: None,
            previous: None,
            headline_id,
        };
        store
            .append(&RowSet::Headlines(vec![headline(1, "USD"), headline(2, "EUR")]))
            .unwrap();
        store
            .append(&RowSet::Releases(vec![release(1, 0.3, 1), release(2, 9.9, 2)]))
            .unwrap();
        store
    }

    #[test]
    fn test_headline_series_keeps_regions_apart() {
        let store = store_with_two_regions();
        let mixer = DataMixer::new(&store, ymd(2024, 1, 1), ymd(2024, 3, 31));

        let usd = mixer.headline_series("CPI m/m - USD").unwrap();
        assert_eq!(usd.name, "CPI m/m - USD");
        assert_eq!(usd.points, vec![("Feb-24".to_string(), Some(0.3))]);

        let eur = mixer.headline_series("CPI m/m - EUR").unwrap();
        assert_eq!(eur.points, vec![("Feb-24".to_string(), Some(9.9))]);

        let err = mixer.headline_series("CPI m/m").unwrap_err();
        assert!(matches!(err, PipelineError::Config(ref msg) if msg.contains("EUR")));

        assert!(mixer.headline_series("PPI m/m").unwrap().points.is_empty());
    }
}
