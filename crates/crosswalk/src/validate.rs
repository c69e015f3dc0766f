//! Post-run sanity checks. Failures are reported, never raised.

use serde::{Deserialize, Serialize};

use crate::model::{CoverageReport, ScoredReference};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub check: &'static str,
    pub message: String,
}

impl ValidationIssue {
    fn warning(check: &'static str, message: String) -> Self {
        Self {
            severity: Severity::Warning,
            check,
            message,
        }
    }

    fn error(check: &'static str, message: String) -> Self {
        Self {
            severity: Severity::Error,
            check,
            message,
        }
    }
}

/// `[validation]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationRules {
    /// Minimum resolved weighted share.
    #[serde(default = "default_min_coverage")]
    pub min_coverage: f64,
    #[serde(default)]
    pub score_min: f64,
    #[serde(default = "default_score_max")]
    pub score_max: f64,
    #[serde(default = "default_min_reference_entries")]
    pub min_reference_entries: usize,
}

fn default_min_coverage() -> f64 {
    0.90
}

fn default_score_max() -> f64 {
    1.0
}

fn default_min_reference_entries() -> usize {
    1
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            min_coverage: default_min_coverage(),
            score_min: 0.0,
            score_max: default_score_max(),
            min_reference_entries: default_min_reference_entries(),
        }
    }
}

/// Entry count and score range of the reference table.
pub fn check_reference(references: &[ScoredReference], rules: &ValidationRules) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if references.len() < rules.min_reference_entries {
        issues.push(ValidationIssue::error(
            "reference_size",
            format!(
                "reference has {} entries, expected at least {}",
                references.len(),
                rules.min_reference_entries
            ),
        ));
    }

    let scores = references.iter().map(|r| r.score).filter(|s| s.is_finite());
    let (lo, hi) = scores.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
        (lo.min(s), hi.max(s))
    });
    if lo < rules.score_min || hi > rules.score_max {
        let outside = references
            .iter()
            .filter(|r| r.score < rules.score_min || r.score > rules.score_max)
            .count();
        issues.push(ValidationIssue::warning(
            "score_range",
            format!(
                "{outside} reference scores outside [{}, {}] (observed [{lo}, {hi}])",
                rules.score_min, rules.score_max
            ),
        ));
    }

    issues
}

pub fn check_coverage(report: &CoverageReport, rules: &ValidationRules) -> Vec<ValidationIssue> {
    let share = report.resolved_share();
    if share < rules.min_coverage {
        vec![ValidationIssue::warning(
            "coverage",
            format!(
                "resolved {:.1}% of weight, below the {:.0}% minimum",
                share * 100.0,
                rules.min_coverage * 100.0
            ),
        )]
    } else {
        Vec::new()
    }
}
