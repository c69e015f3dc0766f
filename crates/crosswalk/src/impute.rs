use serde::{Deserialize, Serialize};

use crate::model::{AnnotatedRecord, ImputationSummary, Provenance};

/// What happens to records no tier could resolve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputationPolicy {
    /// Score stays missing, provenance `missing`.
    #[default]
    PropagateMissing,
    /// Score set to 0.0, provenance `zero_filled`.
    ZeroFill,
}

impl ImputationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PropagateMissing => "propagate_missing",
            Self::ZeroFill => "zero_fill",
        }
    }
}

impl std::fmt::Display for ImputationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Apply `policy` to every unresolved record. Matched records are untouched.
pub fn finalize(records: &mut [AnnotatedRecord], policy: ImputationPolicy) -> ImputationSummary {
    let (score, provenance) = match policy {
        ImputationPolicy::PropagateMissing => (None, Provenance::Missing),
        ImputationPolicy::ZeroFill => (Some(0.0), Provenance::ZeroFilled),
    };

    let mut count = 0;
    let mut weight = 0.0;
    for record in records.iter_mut() {
        if record.finalize(score, provenance) {
            count += 1;
            weight += record.record.weight;
        }
    }

    if count > 0 {
        log::info!("{policy}: finalized {count} unresolved records (weight {weight:.1})");
    }

    ImputationSummary {
        policy: policy.to_string(),
        count,
        weight,
    }
}
