//! Move a scored reference from one vocabulary into another.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::bridge::CorrespondenceMap;
use crate::model::ScoredReference;
use crate::stats::WeightedSample;

/// A reference row in the source vocabulary, with its usage volume.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeRow {
    pub code: String,
    pub score: f64,
    /// `None` when the source carries no volume for this row.
    pub volume: Option<f64>,
}

impl VolumeRow {
    pub fn new(code: impl Into<String>, score: f64, volume: Option<f64>) -> Self {
        Self {
            code: code.into(),
            score,
            volume,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatedScore {
    pub code: String,
    pub score: f64,
    /// Summed volume of the contributing rows (missing volumes count as 0).
    pub volume: f64,
    /// Number of joined source rows.
    pub sources: usize,
}

impl From<&TranslatedScore> for ScoredReference {
    fn from(t: &TranslatedScore) -> Self {
        ScoredReference::new(t.code.clone(), t.score)
    }
}

/// Join every row to all target codes `map` links it to, then combine per
/// target code with a volume-weighted mean. When the volumes of a target sum
/// to zero the plain mean of the scores is used. Targets with no usable score
/// are omitted. Output is ordered by target code.
pub fn translate_reference(rows: &[VolumeRow], map: &CorrespondenceMap) -> Vec<TranslatedScore> {
    let mut index: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for link in map.links() {
        index.entry(link.from.as_str()).or_default().push(link.to.as_str());
    }

    let mut joined: BTreeMap<&str, Vec<&VolumeRow>> = BTreeMap::new();
    let mut unlinked = 0usize;
    for row in rows {
        match index.get(row.code.as_str()) {
            Some(targets) => {
                for &target in targets {
                    joined.entry(target).or_default().push(row);
                }
            }
            None => unlinked += 1,
        }
    }

    if unlinked > 0 {
        log::warn!(
            "{} of {} {} rows have no {} link",
            unlinked,
            rows.len(),
            map.from_vocabulary(),
            map.to_vocabulary()
        );
    }

    let out: Vec<TranslatedScore> = joined
        .into_iter()
        .filter_map(|(code, group)| {
            let sample = WeightedSample::from_options(
                group.iter().map(|r| Some(r.score)),
                group.iter().map(|r| r.volume),
            );
            let score = match sample.mean() {
                Some(mean) => mean,
                None => {
                    let scores: Vec<f64> = group
                        .iter()
                        .map(|r| r.score)
                        .filter(|s| s.is_finite())
                        .collect();
                    if scores.is_empty() {
                        return None;
                    }
                    scores.iter().sum::<f64>() / scores.len() as f64
                }
            };
            Some(TranslatedScore {
                code: code.to_string(),
                score,
                volume: group
                    .iter()
                    .filter_map(|r| r.volume)
                    .filter(|v| v.is_finite())
                    .sum(),
                sources: group.len(),
            })
        })
        .collect();

    log::info!(
        "translated {} {} rows into {} {} codes",
        rows.len(),
        map.from_vocabulary(),
        out.len(),
        map.to_vocabulary()
    );
    out
}
