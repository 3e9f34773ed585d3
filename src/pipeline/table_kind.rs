//! Observation tables and their canonical column contracts

/// How numeric-looking strings are coerced for a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericMode {
    /// Thousands separators and whitespace only (prices)
    Plain,
    /// Also unit markers (`%`, `K`, `M`, `B`, `T`) and vote outcomes (release data)
    Annotated,
}

/// Observation table targeted by a batch
///
/// Closed set: each variant fixes the canonical columns, the required
/// subset, and the cleaning policy applied by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// Daily OHLC bar for a product
    PriceRecord,
    /// Released value (actual / forecast / previous) for a news headline
    ReleaseData,
}

const PRICE_COLUMNS: &[&str] = &["open", "high", "low", "close"];
const RELEASE_COLUMNS: &[&str] = &["actual", "forecast", "previous"];

const PRICE_ALIASES: &[(&str, &str)] = &[
    ("adj close", "close"),
    ("price", "close"),
];

const RELEASE_ALIASES: &[(&str, &str)] = &[
    ("value", "actual"),
    ("value_actual", "actual"),
    ("value_forecast", "forecast"),
    ("value_previous", "previous"),
];

impl TableKind {
    /// Store table name
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::PriceRecord => "price_record",
            TableKind::ReleaseData => "news_release",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "price_record" | "price record" => Some(TableKind::PriceRecord),
            "news_release" | "release data" => Some(TableKind::ReleaseData),
            _ => None,
        }
    }

    pub fn all() -> [TableKind; 2] {
        [TableKind::PriceRecord, TableKind::ReleaseData]
    }

    /// Numeric columns kept after restriction, in storage order
    pub fn value_columns(&self) -> &'static [&'static str] {
        match self {
            TableKind::PriceRecord => PRICE_COLUMNS,
            TableKind::ReleaseData => RELEASE_COLUMNS,
        }
    }

    /// Numeric columns that must be present in the raw batch header
    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            TableKind::PriceRecord => PRICE_COLUMNS,
            TableKind::ReleaseData => &RELEASE_COLUMNS[..1],
        }
    }

    /// Source header spellings folded onto canonical names
    pub fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            TableKind::PriceRecord => PRICE_ALIASES,
            TableKind::ReleaseData => RELEASE_ALIASES,
        }
    }

    /// Map a lower-cased header to its canonical column, if it has one
    pub fn canonical_column(&self, header: &str) -> Option<&'static str> {
        if header == "date" {
            return Some("date");
        }
        if let Some(col) = self.value_columns().iter().find(|c| **c == header) {
            return Some(col);
        }
        self.aliases()
            .iter()
            .find(|(alias, _)| *alias == header)
            .map(|(_, col)| *col)
    }

    pub fn numeric_mode(&self) -> NumericMode {
        match self {
            TableKind::PriceRecord => NumericMode::Plain,
            TableKind::ReleaseData => NumericMode::Annotated,
        }
    }

    /// Zero is a "missing" sentinel for prices; a release value of 0 is data
    pub fn zero_is_missing(&self) -> bool {
        matches!(self, TableKind::PriceRecord)
    }

    /// Rows with a missing value column are dropped
    pub fn requires_complete_rows(&self) -> bool {
        matches!(self, TableKind::PriceRecord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_kind_round_trip_names() {
        for kind in TableKind::all() {
            assert_eq!(TableKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(TableKind::from_str("release data"), Some(TableKind::ReleaseData));
        assert_eq!(TableKind::from_str("headline"), None);
    }

    #[test]
    fn test_canonical_column_aliases() {
        let price = TableKind::PriceRecord;
        assert_eq!(price.canonical_column("date"), Some("date"));
        assert_eq!(price.canonical_column("close"), Some("close"));
        assert_eq!(price.canonical_column("adj close"), Some("close"));
        assert_eq!(price.canonical_column("volume"), None);

        let release = TableKind::ReleaseData;
        assert_eq!(release.canonical_column("value"), Some("actual"));
        assert_eq!(release.canonical_column("forecast"), Some("forecast"));
        assert_eq!(release.canonical_column("impact"), None);
    }

    #[test]
    fn test_release_requires_only_actual() {
        assert_eq!(TableKind::ReleaseData.required_columns(), &["actual"]);
        assert_eq!(TableKind::PriceRecord.required_columns().len(), 4);
    }
}
