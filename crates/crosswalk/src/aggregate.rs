use std::collections::BTreeMap;

use crate::model::{AnnotatedRecord, Provenance};
use crate::stats::{weighted_qcut, weighted_summary, WeightedSummary};

/// Score that enters the statistics for `record`, or NaN (missing).
fn statistic_value(record: &AnnotatedRecord, include_defaults: bool) -> f64 {
    let usable = match record.provenance() {
        Provenance::Measured | Provenance::Inferred => true,
        Provenance::ZeroFilled => include_defaults,
        Provenance::Missing | Provenance::Pending => false,
    };
    match record.score() {
        Some(score) if usable => score,
        _ => f64::NAN,
    }
}

fn columns(records: &[&AnnotatedRecord], include_defaults: bool) -> (Vec<f64>, Vec<f64>) {
    records
        .iter()
        .map(|r| (statistic_value(r, include_defaults), r.record.weight))
        .unzip()
}

/// Weighted summary of the scores over all records.
pub fn summarize(records: &[AnnotatedRecord], include_defaults: bool) -> WeightedSummary {
    let refs: Vec<&AnnotatedRecord> = records.iter().collect();
    let (values, weights) = columns(&refs, include_defaults);
    weighted_summary(&values, &weights)
}

/// Weighted summary per value of `attribute`. Records without the attribute
/// are left out.
pub fn summarize_by(
    records: &[AnnotatedRecord],
    attribute: &str,
    include_defaults: bool,
) -> BTreeMap<String, WeightedSummary> {
    let mut groups: BTreeMap<&str, Vec<&AnnotatedRecord>> = BTreeMap::new();
    let mut ungrouped = 0usize;
    for record in records {
        match record.record.attributes.get(attribute) {
            Some(group) => groups.entry(group.as_str()).or_default().push(record),
            None => ungrouped += 1,
        }
    }
    if ungrouped > 0 {
        log::debug!("{ungrouped} records have no '{attribute}' attribute");
    }

    groups
        .into_iter()
        .map(|(group, members)| {
            let (values, weights) = columns(&members, include_defaults);
            (group.to_string(), weighted_summary(&values, &weights))
        })
        .collect()
}

/// Weighted quantile group label per record, aligned with `records`.
/// Records without a usable score get `None`.
pub fn assign_quantile_groups(
    records: &[AnnotatedRecord],
    q: usize,
    labels: Option<&[String]>,
    include_defaults: bool,
) -> Vec<Option<String>> {
    let refs: Vec<&AnnotatedRecord> = records.iter().collect();
    let (values, weights) = columns(&refs, include_defaults);
    let bins = weighted_qcut(&values, &weights, q, labels);
    if bins.bin_count() < q {
        log::warn!(
            "requested {q} quantile groups, {} survived after merging tied breakpoints",
            bins.bin_count()
        );
    }
    (0..records.len())
        .map(|row| bins.label(row).map(str::to_string))
        .collect()
}
