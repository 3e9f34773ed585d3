use crate::metrics::{MetricRegistry, Period};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::normalizer::default_floor_date;
use chrono::{Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Name of the headline set that is mixed with the product's price
pub const PRICE_MIXED_SET: &str = "price_mixed_set";

/// `{ sector: { set_name: [headline titles] } }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectorMapping(BTreeMap<String, BTreeMap<String, Vec<String>>>);

impl SectorMapping {
    pub fn new(sectors: BTreeMap<String, BTreeMap<String, Vec<String>>>) -> Self {
        Self(sectors)
    }

    pub fn from_json_str(json: &str) -> PipelineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!("cannot read sector mapping {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Headline sets of one sector; unknown sector → `ConfigError`
    pub fn sector(&self, name: &str) -> PipelineResult<&BTreeMap<String, Vec<String>>> {
        self.0
            .get(name)
            .ok_or_else(|| PipelineError::config(format!("unknown sector '{}'", name)))
    }

    pub fn sectors(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Read-path configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsConfig {
    pub db_path: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub metric_set: Vec<String>,
    pub period_set: Vec<String>,
    pub sector_mapping: SectorMapping,
}

impl AnalyticsConfig {
    pub fn default_metric_set() -> Vec<String> {
        vec![
            "expected_return".to_string(),
            "volatility".to_string(),
            "updown_ratio".to_string(),
        ]
    }

    pub fn default_period_set() -> Vec<String> {
        Period::all().iter().map(|p| p.as_str().to_string()).collect()
    }

    /// Config over a date range with the default metric and period sets
    pub fn new(db_path: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            db_path: db_path.into(),
            start_date,
            end_date,
            metric_set: Self::default_metric_set(),
            period_set: Self::default_period_set(),
            sector_mapping: SectorMapping::default(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// `RANKBOARD_SECTOR_MAPPING`, when set, names a JSON file that must
    /// be readable.
    pub fn from_env() -> PipelineResult<Self> {
        let yesterday = Local::now().date_naive() - Duration::days(1);

        let sector_mapping = match env::var("RANKBOARD_SECTOR_MAPPING") {
            Ok(path) if !path.trim().is_empty() => SectorMapping::from_file(path.trim())?,
            _ => SectorMapping::default(),
        };

        Ok(Self {
            db_path: env_or("RANKBOARD_DB_PATH", "data/rankboard.db"),
            start_date: env_date("RANKBOARD_START_DATE", default_start_date())?,
            end_date: env_date("RANKBOARD_END_DATE", yesterday)?,
            metric_set: env_list("RANKBOARD_METRICS").unwrap_or_else(Self::default_metric_set),
            period_set: env_list("RANKBOARD_PERIODS").unwrap_or_else(Self::default_period_set),
            sector_mapping,
        })
    }

    /// Parsed period set
    pub fn periods(&self) -> PipelineResult<Vec<Period>> {
        self.period_set.iter().map(|p| Period::parse(p)).collect()
    }

    /// Resolve every metric and period name and check the date range
    pub fn validate(&self, registry: &MetricRegistry) -> PipelineResult<()> {
        registry.validate(&self.metric_set)?;
        self.periods()?;
        if self.start_date > self.end_date {
            return Err(PipelineError::config(format!(
                "start_date {} is after end_date {}",
                self.start_date, self.end_date
            )));
        }
        Ok(())
    }
}

/// Write-path configuration
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub db_path: String,
    pub price_dir: PathBuf,
    pub news_dir: PathBuf,
    pub schema_dir: String,
    /// Rows dated before this never reach storage
    pub floor_date: NaiveDate,
    /// Optional economic calendar page to import
    pub calendar_file: Option<PathBuf>,
    /// Year of the first day on the calendar page
    pub calendar_year: Option<i32>,
    /// Sector assigned to headlines created from the calendar
    pub calendar_sector: Option<String>,
}

impl IngestConfig {
    pub fn from_env() -> PipelineResult<Self> {
        Ok(Self {
            db_path: env_or("RANKBOARD_DB_PATH", "data/rankboard.db"),
            price_dir: env_or("RANKBOARD_PRICE_DIR", "data/prices").into(),
            news_dir: env_or("RANKBOARD_NEWS_DIR", "data/news").into(),
            schema_dir: env_or("RANKBOARD_SCHEMA_DIR", "sql"),
            floor_date: env_date("RANKBOARD_FLOOR_DATE", default_floor_date())?,
            calendar_file: env_opt("RANKBOARD_CALENDAR_FILE").map(PathBuf::from),
            calendar_year: env_opt("RANKBOARD_CALENDAR_YEAR").and_then(|s| s.parse().ok()),
            calendar_sector: env_opt("RANKBOARD_CALENDAR_SECTOR"),
        })
    }
}

/// Remote quote source configuration
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub skip_log_path: PathBuf,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            timeout_secs: 10,
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            skip_log_path: PathBuf::from("data/skipped_fetches.json"),
        }
    }
}

impl QuoteConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_or("RANKBOARD_QUOTE_URL", &defaults.base_url),
            timeout_secs: env_parse("RANKBOARD_QUOTE_TIMEOUT_SECS", defaults.timeout_secs),
            max_retries: env_parse("RANKBOARD_QUOTE_RETRIES", defaults.max_retries),
            initial_backoff_ms: env_parse("RANKBOARD_QUOTE_BACKOFF_MS", defaults.initial_backoff_ms),
            max_backoff_ms: env_parse("RANKBOARD_QUOTE_MAX_BACKOFF_MS", defaults.max_backoff_ms),
            skip_log_path: env_opt("RANKBOARD_SKIP_LOG")
                .map(PathBuf::from)
                .unwrap_or(defaults.skip_log_path),
        }
    }
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env_opt(key).and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// Comma-separated list; `None` when unset or empty
fn env_list(key: &str) -> Option<Vec<String>> {
    let items: Vec<String> = env_opt(key)?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

fn env_date(key: &str, default: NaiveDate) -> PipelineResult<NaiveDate> {
    match env_opt(key) {
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|_| {
            PipelineError::config(format!("{} must be YYYY-MM-DD, got '{}'", key, s))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // env vars are process-wide
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_analytics_config_from_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("RANKBOARD_DB_PATH", "/tmp/test.db");
        env::set_var("RANKBOARD_START_DATE", "2024-02-01");
        env::set_var("RANKBOARD_END_DATE", "2024-03-01");
        env::set_var("RANKBOARD_METRICS", "volatility, absolute_change");
        env::set_var("RANKBOARD_PERIODS", "d,m");
        env::remove_var("RANKBOARD_SECTOR_MAPPING");

        let config = AnalyticsConfig::from_env().unwrap();
        assert_eq!(config.db_path, "/tmp/test.db");
        assert_eq!(config.start_date, ymd(2024, 2, 1));
        assert_eq!(config.metric_set, vec!["volatility", "absolute_change"]);
        assert_eq!(config.periods().unwrap(), vec![Period::Day, Period::Month]);
        assert!(config.validate(&MetricRegistry::standard()).is_ok());

        env::set_var("RANKBOARD_START_DATE", "02/01/2024");
        assert!(matches!(AnalyticsConfig::from_env(), Err(PipelineError::Config(_))));

        for key in [
            "RANKBOARD_DB_PATH",
            "RANKBOARD_START_DATE",
            "RANKBOARD_END_DATE",
            "RANKBOARD_METRICS",
            "RANKBOARD_PERIODS",
        ] {
            env::remove_var(key);
        }
        let defaults = AnalyticsConfig::from_env().unwrap();
        assert_eq!(defaults.db_path, "data/rankboard.db");
        assert_eq!(defaults.start_date, ymd(2024, 1, 1));
        assert_eq!(defaults.metric_set, AnalyticsConfig::default_metric_set());
        assert_eq!(defaults.period_set, vec!["d", "w", "m", "y"]);
    }

    #[test]
    fn test_validate_rejects_unknown_names_and_inverted_range() {
        let registry = MetricRegistry::standard();
        let mut config = AnalyticsConfig::new("x.db", ymd(2024, 1, 1), ymd(2024, 2, 1));
        assert!(config.validate(&registry).is_ok());

        config.metric_set.push("made_up_metric".into());
        assert!(matches!(config.validate(&registry), Err(PipelineError::Config(_))));

        config.metric_set.pop();
        config.period_set.push("q".into());
        assert!(matches!(config.validate(&registry), Err(PipelineError::Config(_))));

        config.period_set.pop();
        config.end_date = ymd(2023, 12, 31);
        assert!(matches!(config.validate(&registry), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_sector_mapping_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sectors.json");
        std::fs::write(
            &path,
            r#"{"Inflation": {"price_mixed_set": ["CPI m/m"], "core": ["Core CPI m/m", "PPI m/m"]}}"#,
        )
        .unwrap();

        let mapping = SectorMapping::from_file(&path).unwrap();
        let inflation = mapping.sector("Inflation").unwrap();
        assert_eq!(inflation[PRICE_MIXED_SET], vec!["CPI m/m"]);
        assert_eq!(inflation["core"].len(), 2);
        assert!(matches!(mapping.sector("Labor"), Err(PipelineError::Config(_))));
        assert!(matches!(
            SectorMapping::from_file(dir.path().join("missing.json")),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_quote_config_from_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("RANKBOARD_QUOTE_RETRIES", "5");
        env::set_var("RANKBOARD_QUOTE_TIMEOUT_SECS", "not-a-number");

        let config = QuoteConfig::from_env();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.timeout_secs, 10);

        env::remove_var("RANKBOARD_QUOTE_RETRIES");
        env::remove_var("RANKBOARD_QUOTE_TIMEOUT_SECS");
    }

    #[test]
    fn test_ingest_config_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("RANKBOARD_FLOOR_DATE");
        env::remove_var("RANKBOARD_SCHEMA_DIR");
        env::set_var("RANKBOARD_CALENDAR_YEAR", "2025");

        let config = IngestConfig::from_env().unwrap();
        assert_eq!(config.floor_date, ymd(2010, 1, 1));
        assert_eq!(config.schema_dir, "sql");
        assert_eq!(config.calendar_year, Some(2025));

        env::remove_var("RANKBOARD_CALENDAR_YEAR");
    }
}
