use std::collections::{BTreeMap, BTreeSet};

use crate::bridge::CrossSystemBridge;
use crate::cascade::{Cascade, MatchState, TierMethod};
use crate::code::truncate;
use crate::dictionary::ClassificationDictionary;
use crate::error::CrosswalkError;
use crate::model::{AnnotatedRecord, CoverageReport, RowIssue, Tally, TargetRecord, TierCoverage};

/// Outcome of running the cascade for one code.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub state: MatchState,
    pub score: Option<f64>,
    /// Dictionary prefix hit, or `vocab:code|code` for bridged hits.
    pub source_key: Option<String>,
    /// Reference label of the code. Set for exact finest-level hits only.
    pub label: Option<String>,
}

/// Annotates target records by walking a [`Cascade`] over a dictionary and
/// an optional bridge. Holds only shared references; safe to use from
/// several threads at once.
#[derive(Debug, Clone)]
pub struct HierarchicalMatcher<'a> {
    dictionary: &'a ClassificationDictionary,
    bridge: Option<&'a CrossSystemBridge>,
    cascade: Cascade,
}

impl<'a> HierarchicalMatcher<'a> {
    pub fn new(
        dictionary: &'a ClassificationDictionary,
        bridge: Option<&'a CrossSystemBridge>,
        cascade: Cascade,
    ) -> Result<Self, CrosswalkError> {
        if let Some(bridge) = bridge {
            bridge.check_target(dictionary)?;
        }
        if cascade.uses_bridge() && bridge.is_none() {
            return Err(CrosswalkError::ConfigValidation(
                "cascade has bridge tiers but no bridge was supplied".into(),
            ));
        }
        if let Some(tier) = cascade.tiers().iter().find(|t| t.level > dictionary.width()) {
            return Err(CrosswalkError::ConfigValidation(format!(
                "tier {tier} is finer than the {}-digit dictionary",
                dictionary.width()
            )));
        }
        Ok(Self {
            dictionary,
            bridge,
            cascade,
        })
    }

    /// Matcher with [`Cascade::standard`] for the dictionary's width.
    pub fn standard(
        dictionary: &'a ClassificationDictionary,
        bridge: Option<&'a CrossSystemBridge>,
    ) -> Result<Self, CrosswalkError> {
        let cascade = Cascade::standard(dictionary.width(), bridge.is_some());
        Self::new(dictionary, bridge, cascade)
    }

    pub fn cascade(&self) -> &Cascade {
        &self.cascade
    }

    /// Run the cascade for a single normalized code. First success wins.
    pub fn resolve(&self, code: &str) -> Resolution {
        let (state, hit) = self.cascade.run(|tier| match tier.method {
            TierMethod::Exact => self
                .dictionary
                .lookup(tier.level, code)
                .map(|score| (score, truncate(code, tier.level).to_string())),
            TierMethod::Bridge => {
                let bridge = self.bridge?;
                bridge.resolve(tier.level, code, self.dictionary).map(|hit| {
                    (
                        hit.score,
                        format!("{}:{}", bridge.to_vocabulary(), hit.candidates.join("|")),
                    )
                })
            }
        });

        let (score, source_key) = match hit {
            Some((score, key)) => (Some(score), Some(key)),
            None => (None, None),
        };
        let label = match state {
            MatchState::Matched(tier) if tier.is_measured(self.dictionary.width()) => {
                self.dictionary.label(code).map(str::to_string)
            }
            _ => None,
        };
        Resolution {
            state,
            score,
            source_key,
            label,
        }
    }

    /// Annotate every record. Each distinct code is resolved once.
    pub fn annotate(&self, records: Vec<TargetRecord>) -> Vec<AnnotatedRecord> {
        let mut cache: BTreeMap<String, Resolution> = BTreeMap::new();
        let finest = self.dictionary.width();

        let annotated: Vec<AnnotatedRecord> = records
            .into_iter()
            .map(|record| {
                let resolution = cache
                    .entry(record.code.clone())
                    .or_insert_with(|| self.resolve(&record.code))
                    .clone();

                let mut out = AnnotatedRecord::new(record);
                match (resolution.state, resolution.score, resolution.source_key) {
                    (MatchState::Matched(tier), Some(score), Some(key)) => {
                        out.stamp_match(tier, score, key, resolution.label, finest);
                    }
                    _ => {
                        out.stamp_unresolved();
                    }
                }
                out
            })
            .collect();

        log::debug!(
            "resolved {} distinct codes for {} records",
            cache.len(),
            annotated.len()
        );
        annotated
    }

    /// Per-tier counts and weighted population shares, in cascade order.
    pub fn coverage(&self, records: &[AnnotatedRecord], rejected: &[RowIssue]) -> CoverageReport {
        let total_weight: f64 = records.iter().map(|r| r.record.weight).sum();
        let share = |w: f64| if total_weight > 0.0 { w / total_weight } else { 0.0 };

        let mut tiers = Vec::with_capacity(self.cascade.len());
        let mut cumulative = 0.0;
        for &tier in self.cascade.tiers() {
            let mut count = 0;
            let mut weight = 0.0;
            let mut codes: BTreeSet<&str> = BTreeSet::new();
            for r in records.iter().filter(|r| r.state() == MatchState::Matched(tier)) {
                count += 1;
                weight += r.record.weight;
                codes.insert(&r.record.code);
            }
            cumulative += weight;
            tiers.push(TierCoverage {
                tier: tier.to_string(),
                count,
                weight,
                weighted_share: share(weight),
                cumulative_share: share(cumulative),
                distinct_codes: codes.len(),
            });
        }

        let mut unresolved = Tally::default();
        for r in records.iter().filter(|r| r.state() == MatchState::Unresolved) {
            unresolved.count += 1;
            unresolved.weight += r.record.weight;
        }
        unresolved.weighted_share = share(unresolved.weight);

        let mut rejected_tally = Tally {
            count: rejected.len(),
            ..Tally::default()
        };
        rejected_tally.weight = rejected.iter().filter_map(|r| r.weight).sum();
        rejected_tally.weighted_share = share(rejected_tally.weight);

        let report = CoverageReport {
            total_records: records.len(),
            total_weight,
            tiers,
            unresolved,
            rejected: rejected_tally,
        };
        log_coverage(&report);
        report
    }
}

fn log_coverage(report: &CoverageReport) {
    for t in &report.tiers {
        log::info!(
            "{:<10} {:>8} records  {:>6.1}% of weight  (cumulative {:>5.1}%)",
            t.tier,
            t.count,
            t.weighted_share * 100.0,
            t.cumulative_share * 100.0
        );
    }
    log::info!(
        "{:<10} {:>8} records  {:>6.1}% of weight",
        "unresolved",
        report.unresolved.count,
        report.unresolved.weighted_share * 100.0
    );
    if report.rejected.count > 0 {
        log::warn!("{} rows rejected before matching", report.rejected.count);
    }
}
