//! Weighted statistics over arbitrary CSV columns (`occwalk stats`).

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use occwalk_crosswalk::stats::{weighted_qcut, weighted_summary, WeightedSample, WeightedSummary};

#[derive(Debug, Error)]
pub enum TableError {
    #[error("column '{0}' not found")]
    MissingColumn(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Columns pulled out of a CSV file. Unparsable cells are `None`.
#[derive(Debug, Clone, Default)]
pub struct ColumnData {
    pub values: Vec<Option<f64>>,
    pub weights: Vec<Option<f64>>,
    pub groups: Option<Vec<String>>,
}

/// Parse a numeric cell. Blank, `NA`, `NaN` and infinities read as missing.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn read_columns(
    csv_data: &str,
    value: &str,
    weight: &str,
    group: Option<&str>,
) -> Result<ColumnData, TableError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(csv_data.as_bytes());
    let headers = reader.headers()?.clone();
    let idx = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    };

    let value_idx = idx(value)?;
    let weight_idx = idx(weight)?;
    let group_idx = group.map(idx).transpose()?;

    let mut data = ColumnData {
        groups: group_idx.map(|_| Vec::new()),
        ..ColumnData::default()
    };
    for record in reader.records() {
        let record = record?;
        data.values.push(record.get(value_idx).and_then(parse_number));
        data.weights.push(record.get(weight_idx).and_then(parse_number));
        if let (Some(gi), Some(groups)) = (group_idx, data.groups.as_mut()) {
            groups.push(record.get(gi).unwrap_or("").trim().to_string());
        }
    }
    Ok(data)
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupStats {
    #[serde(flatten)]
    pub summary: WeightedSummary,
    pub gini: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuantileBin {
    pub label: String,
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub rows: usize,
    pub overall: GroupStats,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, GroupStats>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub quantiles: Vec<QuantileBin>,
}

fn nan_filled(column: &[Option<f64>]) -> Vec<f64> {
    column.iter().map(|v| v.unwrap_or(f64::NAN)).collect()
}

fn group_stats(values: &[Option<f64>], weights: &[Option<f64>]) -> GroupStats {
    let summary = weighted_summary(&nan_filled(values), &nan_filled(weights));
    let gini = WeightedSample::from_options(values.iter().copied(), weights.iter().copied()).gini();
    GroupStats { summary, gini }
}

pub fn compute(data: &ColumnData, quantiles: Option<usize>) -> StatsReport {
    let overall = group_stats(&data.values, &data.weights);

    let mut groups = BTreeMap::new();
    if let Some(ref keys) = data.groups {
        let mut members: BTreeMap<&str, (Vec<Option<f64>>, Vec<Option<f64>>)> = BTreeMap::new();
        for (i, key) in keys.iter().enumerate() {
            let entry = members.entry(key.as_str()).or_default();
            entry.0.push(data.values[i]);
            entry.1.push(data.weights[i]);
        }
        for (key, (values, weights)) in members {
            groups.insert(key.to_string(), group_stats(&values, &weights));
        }
    }

    let quantiles = match quantiles {
        Some(q) => quantile_table(data, q),
        None => Vec::new(),
    };

    StatsReport {
        rows: data.values.len(),
        overall,
        groups,
        quantiles,
    }
}

fn quantile_table(data: &ColumnData, q: usize) -> Vec<QuantileBin> {
    let values = nan_filled(&data.values);
    let weights = nan_filled(&data.weights);
    let bins = weighted_qcut(&values, &weights, q, None);

    let mut out: Vec<QuantileBin> = bins
        .labels
        .iter()
        .enumerate()
        .map(|(i, label)| QuantileBin {
            label: label.clone(),
            lower: bins.breakpoints[i],
            upper: bins.breakpoints[i + 1],
            count: 0,
            weight: 0.0,
        })
        .collect();

    for (row, assignment) in bins.assignments.iter().enumerate() {
        if let Some(bin) = assignment {
            out[*bin].count += 1;
            if let Some(w) = data.weights[row] {
                out[*bin].weight += w;
            }
        }
    }
    out
}
