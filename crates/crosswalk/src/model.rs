use std::collections::BTreeMap;

use serde::Serialize;

use crate::bridge::CorrespondenceMap;
use crate::cascade::{MatchState, Tier};
use crate::code::MalformedCode;
use crate::concordance::ConcordanceReport;
use crate::stats::WeightedSummary;
use crate::validate::ValidationIssue;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One row of the scored reference table, keyed at the finest resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredReference {
    pub code: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ScoredReference {
    pub fn new(code: impl Into<String>, score: f64) -> Self {
        Self {
            code: code.into(),
            score,
            label: None,
        }
    }
}

/// One many-to-many link between two vocabularies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Correspondence {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_type: Option<String>,
}

/// A survey row to be scored.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRecord {
    /// Normalized code at the finest resolution.
    pub code: String,
    /// Positive sampling weight.
    pub weight: f64,
    /// Passthrough columns (region, sex, quarter, ...).
    pub attributes: BTreeMap<String, String>,
    /// Raw cells as read, in source column order. Empty for records built
    /// in memory.
    pub source_row: Vec<String>,
}

impl TargetRecord {
    pub fn new(code: impl Into<String>, weight: f64) -> Self {
        Self {
            code: code.into(),
            weight,
            attributes: BTreeMap::new(),
            source_row: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Everything a run needs, already parsed.
#[derive(Debug, Clone, Default)]
pub struct CrosswalkInput {
    pub reference: Vec<ScoredReference>,
    pub correspondence: Option<CorrespondenceMap>,
    pub targets: Vec<TargetRecord>,
    /// Target rows rejected while loading.
    pub rejected: Vec<RowIssue>,
    /// Target table header in file order. Empty when targets were built in
    /// memory.
    pub columns: Vec<String>,
}

/// A target row that never entered the cascade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowIssue {
    /// 1-based data row number in the source table (header excluded).
    pub row: usize,
    pub raw_code: String,
    pub kind: RowIssueKind,
    pub detail: String,
    /// Weight as read, when it parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowIssueKind {
    MalformedCode,
    InvalidWeight,
}

impl RowIssue {
    pub fn malformed(row: usize, raw_code: &str, reason: &MalformedCode, weight: Option<f64>) -> Self {
        Self {
            row,
            raw_code: raw_code.to_string(),
            kind: RowIssueKind::MalformedCode,
            detail: reason.to_string(),
            weight,
        }
    }

    pub fn invalid_weight(row: usize, raw_code: &str, raw_weight: &str) -> Self {
        Self {
            row,
            raw_code: raw_code.to_string(),
            kind: RowIssueKind::InvalidWeight,
            detail: format!("weight '{raw_weight}' is not a positive number"),
            weight: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Annotation
// ---------------------------------------------------------------------------

/// Where a record's final score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Not yet decided (cascade has not run).
    Pending,
    /// Exact hit at the finest resolution.
    Measured,
    /// Bridged, or taken from a coarser group mean.
    Inferred,
    /// Unresolved, score set to 0 by the finalizer.
    ZeroFilled,
    /// Unresolved, score left missing by the finalizer.
    Missing,
}

impl Provenance {
    /// True for values backed by reference data (measured or inferred).
    pub fn is_observed(&self) -> bool {
        matches!(self, Self::Measured | Self::Inferred)
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Measured => write!(f, "measured"),
            Self::Inferred => write!(f, "inferred"),
            Self::ZeroFilled => write!(f, "zero_filled"),
            Self::Missing => write!(f, "missing"),
        }
    }
}

/// A target record plus its write-once crosswalk fields.
#[derive(Debug, Clone)]
pub struct AnnotatedRecord {
    pub record: TargetRecord,
    state: MatchState,
    score: Option<f64>,
    provenance: Provenance,
    /// Dictionary key (or bridged candidates) that produced the score.
    source_key: Option<String>,
    /// Reference label, kept for measured hits only.
    label: Option<String>,
}

impl AnnotatedRecord {
    pub fn new(record: TargetRecord) -> Self {
        Self {
            record,
            state: MatchState::Unmatched,
            score: None,
            provenance: Provenance::Pending,
            source_key: None,
            label: None,
        }
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn source_key(&self) -> Option<&str> {
        self.source_key.as_deref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn tier(&self) -> Option<Tier> {
        match self.state {
            MatchState::Matched(tier) => Some(tier),
            _ => None,
        }
    }

    /// Stamp a successful tier. Returns `false` (and changes nothing) when the
    /// record already left `Unmatched`. `label` is dropped unless the tier is
    /// an exact hit at `finest`.
    pub fn stamp_match(
        &mut self,
        tier: Tier,
        score: f64,
        source_key: String,
        label: Option<String>,
        finest: usize,
    ) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        let measured = tier.is_measured(finest);
        self.state = MatchState::Matched(tier);
        self.score = Some(score);
        self.provenance = if measured {
            Provenance::Measured
        } else {
            Provenance::Inferred
        };
        self.source_key = Some(source_key);
        self.label = label.filter(|_| measured);
        true
    }

    /// Close the cascade without a candidate. Same write-once rule as [`Self::stamp_match`].
    pub fn stamp_unresolved(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = MatchState::Unresolved;
        true
    }

    /// Apply the terminal imputation policy. Only unresolved records that
    /// have not been finalized yet are touched.
    pub(crate) fn finalize(&mut self, score: Option<f64>, provenance: Provenance) -> bool {
        if self.state != MatchState::Unresolved || self.provenance != Provenance::Pending {
            return false;
        }
        self.score = score;
        self.provenance = provenance;
        true
    }
}

// ---------------------------------------------------------------------------
// Coverage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TierCoverage {
    pub tier: String,
    pub count: usize,
    pub weight: f64,
    /// Share of the total sampling weight of matchable records.
    pub weighted_share: f64,
    /// Share resolved by this tier or any finer one before it.
    pub cumulative_share: f64,
    /// Distinct normalized codes resolved at this tier.
    pub distinct_codes: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Tally {
    pub count: usize,
    pub weight: f64,
    pub weighted_share: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub total_records: usize,
    pub total_weight: f64,
    pub tiers: Vec<TierCoverage>,
    pub unresolved: Tally,
    /// Rows excluded before matching. Share is relative to matchable weight.
    pub rejected: Tally,
}

impl CoverageReport {
    /// Weighted share resolved by any tier.
    pub fn resolved_share(&self) -> f64 {
        self.tiers.last().map(|t| t.cumulative_share).unwrap_or(0.0)
    }

    pub fn tier(&self, label: &str) -> Option<&TierCoverage> {
        self.tiers.iter().find(|t| t.tier == label)
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Serializable view of one annotated record.
#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedRow {
    pub code: String,
    pub weight: f64,
    pub matched_score: Option<f64>,
    pub match_tier: String,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub attributes: BTreeMap<String, String>,
    #[serde(skip)]
    pub source_row: Vec<String>,
}

impl From<&AnnotatedRecord> for AnnotatedRow {
    fn from(r: &AnnotatedRecord) -> Self {
        Self {
            code: r.record.code.clone(),
            weight: r.record.weight,
            matched_score: r.score(),
            match_tier: r.state().to_string(),
            provenance: r.provenance(),
            source_key: r.source_key().map(str::to_string),
            label: r.label().map(str::to_string),
            attributes: r.record.attributes.clone(),
            source_row: r.record.source_row.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CrosswalkMeta {
    pub config_name: String,
    pub vocabulary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
    pub width: usize,
    pub cascade: Vec<String>,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImputationSummary {
    pub policy: String,
    pub count: usize,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrosswalkResult {
    pub meta: CrosswalkMeta,
    pub coverage: CoverageReport,
    pub imputation: ImputationSummary,
    /// Weighted summary of the final scores (measured + inferred only).
    pub score_summary: WeightedSummary,
    pub rejected: Vec<RowIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concordance: Option<ConcordanceReport>,
    pub validation: Vec<ValidationIssue>,
    #[serde(skip)]
    pub records: Vec<AnnotatedRecord>,
    /// Target table header, carried through for annotated output.
    #[serde(skip)]
    pub columns: Vec<String>,
}

impl CrosswalkResult {
    pub fn rows(&self) -> Vec<AnnotatedRow> {
        self.records.iter().map(AnnotatedRow::from).collect()
    }

    pub fn has_warnings(&self) -> bool {
        !self.validation.is_empty()
    }
}
