//! Agreement between two crosswalk runs over the same codes, e.g. a run
//! against a 2-digit dictionary versus one against the 4-digit dictionary.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::AnnotatedRecord;

pub const DEFAULT_DIFF_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcordanceReport {
    /// Distinct codes scored in both runs.
    pub codes: usize,
    /// `None` with fewer than two codes or zero variance on either side.
    pub pearson: Option<f64>,
    pub mean_abs_diff: Option<f64>,
    pub max_abs_diff: Option<f64>,
    pub threshold: f64,
    /// Codes with `|left - right| > threshold`.
    pub above_threshold: usize,
}

/// Observed (measured or inferred) score per distinct code.
pub fn scores_by_code(records: &[AnnotatedRecord]) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    for r in records.iter().filter(|r| r.provenance().is_observed()) {
        if let Some(score) = r.score() {
            out.entry(r.record.code.clone()).or_insert(score);
        }
    }
    out
}

pub fn compare_runs(
    left: &[AnnotatedRecord],
    right: &[AnnotatedRecord],
    threshold: f64,
) -> ConcordanceReport {
    compare_scores(&scores_by_code(left), &scores_by_code(right), threshold)
}

pub fn compare_scores(
    left: &BTreeMap<String, f64>,
    right: &BTreeMap<String, f64>,
    threshold: f64,
) -> ConcordanceReport {
    let pairs: Vec<(f64, f64)> = left
        .iter()
        .filter_map(|(code, l)| right.get(code).map(|r| (*l, *r)))
        .collect();

    let n = pairs.len();
    let diffs: Vec<f64> = pairs.iter().map(|(l, r)| (l - r).abs()).collect();
    let mean_abs_diff = (n > 0).then(|| diffs.iter().sum::<f64>() / n as f64);
    let max_abs_diff = diffs.iter().copied().reduce(f64::max);
    let above_threshold = diffs.iter().filter(|d| **d > threshold).count();

    let report = ConcordanceReport {
        codes: n,
        pearson: pearson(&pairs),
        mean_abs_diff,
        max_abs_diff,
        threshold,
        above_threshold,
    };

    log::info!(
        "concordance over {} codes: r={} mean|d|={} above {threshold}: {}",
        report.codes,
        fmt_opt(report.pearson),
        fmt_opt(report.mean_abs_diff),
        report.above_threshold
    );
    report
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
}

fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scores(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(c, s)| (c.to_string(), *s)).collect()
    }

    #[test]
    fn known_pair_of_runs() {
        let fine = scores(&[("1111", 0.9), ("1112", 0.1), ("2111", 0.5), ("3111", 0.3)]);
        let coarse = scores(&[("1111", 0.5), ("1112", 0.5), ("2111", 0.5), ("9999", 0.2)]);
        let report = compare_scores(&fine, &coarse, DEFAULT_DIFF_THRESHOLD);

        assert_eq!(report.codes, 3);
        // Coarse side is constant: correlation undefined.
        assert_eq!(report.pearson, None);
        assert_relative_eq!(report.mean_abs_diff.unwrap(), 0.8 / 3.0);
        assert_relative_eq!(report.max_abs_diff.unwrap(), 0.4);
        assert_eq!(report.above_threshold, 2);
    }

    #[test]
    fn perfectly_linear_runs_correlate() {
        let a = scores(&[("1", 0.1), ("2", 0.2), ("3", 0.3)]);
        let b = scores(&[("1", 0.2), ("2", 0.4), ("3", 0.6)]);
        let report = compare_scores(&a, &b, 0.5);
        assert_relative_eq!(report.pearson.unwrap(), 1.0, epsilon = 1e-12);
        assert_eq!(report.above_threshold, 0);
    }

    #[test]
    fn disjoint_runs_are_empty() {
        let report = compare_scores(&scores(&[("1", 0.1)]), &scores(&[("2", 0.1)]), 0.05);
        assert_eq!(report.codes, 0);
        assert_eq!(report.mean_abs_diff, None);
        assert_eq!(report.max_abs_diff, None);
    }
}
