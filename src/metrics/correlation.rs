//! Pairwise Pearson correlation over wide (column-per-series) data

use crate::pipeline::normalizer::round_to;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Square correlation matrix, 3 decimals; `None` where undefined
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        self.values[i][j]
    }

    /// Table form: header `["", col...]`, one body row per column
    pub fn to_table(&self) -> Value {
        let mut header = vec![String::new()];
        header.extend(self.columns.iter().cloned());

        let body: Vec<Value> = self
            .columns
            .iter()
            .zip(&self.values)
            .map(|(name, row)| {
                let mut obj = Map::new();
                obj.insert(String::new(), Value::String(name.clone()));
                for (col, v) in self.columns.iter().zip(row) {
                    obj.insert(col.clone(), json!(v));
                }
                Value::Object(obj)
            })
            .collect();

        json!({ "header": header, "body": body })
    }
}

/// Pearson correlation over pairwise-complete observations
///
/// `None` with fewer than two complete pairs or zero variance on either side.
pub fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        cov += (a - mean_x) * (b - mean_y);
        var_x += (a - mean_x).powi(2);
        var_y += (b - mean_y).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }

    let r = cov / (var_x.sqrt() * var_y.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Correlation matrix across named columns, rounded to 3 decimals
pub fn correlation_matrix(columns: &[(String, Vec<Option<f64>>)]) -> CorrelationMatrix {
    let values = columns
        .iter()
        .map(|(_, x)| {
            columns
                .iter()
                .map(|(_, y)| pearson(x, y).map(|r| round_to(r, 3)))
                .collect()
        })
        .collect();

    CorrelationMatrix {
        columns: columns.iter().map(|(name, _)| name.clone()).collect(),
        values,
    }
}
