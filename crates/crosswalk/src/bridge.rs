//! Cross-vocabulary bridging through many-to-many correspondence tables
//! (ISCO-88 -> ISCO-08, SOC 2018 -> SOC 2010 -> ISCO-08, ...).

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::code::truncate;
use crate::dictionary::ClassificationDictionary;
use crate::error::CrosswalkError;
use crate::model::Correspondence;

// ---------------------------------------------------------------------------
// Correspondence map
// ---------------------------------------------------------------------------

/// Links from vocabulary `from` to vocabulary `to`. Read-only once loaded.
#[derive(Debug, Clone)]
pub struct CorrespondenceMap {
    from: String,
    to: String,
    links: Vec<Correspondence>,
}

impl CorrespondenceMap {
    pub fn new(from: impl Into<String>, to: impl Into<String>, links: Vec<Correspondence>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            links,
        }
    }

    pub fn from_vocabulary(&self) -> &str {
        &self.from
    }

    pub fn to_vocabulary(&self) -> &str {
        &self.to
    }

    pub fn links(&self) -> &[Correspondence] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Map projected to `level` digits: both sides truncated, duplicates merged.
    /// Codes shorter than `level` drop out.
    pub fn project(&self, level: usize) -> BTreeMap<String, BTreeSet<String>> {
        let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for link in &self.links {
            let from = truncate(&link.from, level);
            let to = truncate(&link.to, level);
            if from.len() != level || to.len() != level {
                continue;
            }
            out.entry(from.to_string()).or_default().insert(to.to_string());
        }
        out
    }

    /// Chain `self` (A -> B) with `next` (B -> C) into A -> C.
    ///
    /// Match-type tags are joined with `/` when both sides carry one.
    pub fn compose(&self, next: &CorrespondenceMap) -> Result<CorrespondenceMap, CrosswalkError> {
        if self.to != next.from {
            return Err(CrosswalkError::ConfigValidation(format!(
                "cannot chain {}->{} with {}->{}",
                self.from, self.to, next.from, next.to
            )));
        }

        let mut by_from: BTreeMap<&str, Vec<&Correspondence>> = BTreeMap::new();
        for link in &next.links {
            by_from.entry(link.from.as_str()).or_default().push(link);
        }

        let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
        let mut links = Vec::new();
        for first in &self.links {
            let Some(seconds) = by_from.get(first.to.as_str()) else {
                continue;
            };
            for second in seconds {
                if !seen.insert((first.from.clone(), second.to.clone())) {
                    continue;
                }
                let match_type = match (&first.match_type, &second.match_type) {
                    (Some(a), Some(b)) => Some(format!("{a}/{b}")),
                    (Some(t), None) | (None, Some(t)) => Some(t.clone()),
                    (None, None) => None,
                };
                links.push(Correspondence {
                    from: first.from.clone(),
                    to: second.to.clone(),
                    match_type,
                });
            }
        }

        log::info!(
            "chained {}->{}->{}: {} links",
            self.from,
            self.to,
            next.to,
            links.len()
        );

        Ok(CorrespondenceMap::new(self.from.clone(), next.to.clone(), links))
    }
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeHit {
    /// Unweighted mean over the linked codes found in the dictionary.
    pub score: f64,
    /// Linked codes that contributed, ordered.
    pub candidates: Vec<String>,
}

/// Resolves codes of one vocabulary against a dictionary keyed in another.
///
/// The correspondence carries no confidence weights, so every linked code
/// that exists in the dictionary counts once.
#[derive(Debug, Clone)]
pub struct CrossSystemBridge {
    from: String,
    to: String,
    width: usize,
    /// `levels[l - 1]` is the map projected to level `l`.
    levels: Vec<BTreeMap<String, BTreeSet<String>>>,
}

impl CrossSystemBridge {
    pub fn new(map: &CorrespondenceMap, width: usize) -> Self {
        let levels = (1..=width).map(|level| map.project(level)).collect();
        log::info!(
            "bridge {}->{}: {} links, {} source codes at {width} digits",
            map.from_vocabulary(),
            map.to_vocabulary(),
            map.len(),
            map.project(width).len()
        );
        Self {
            from: map.from_vocabulary().to_string(),
            to: map.to_vocabulary().to_string(),
            width,
            levels,
        }
    }

    pub fn from_vocabulary(&self) -> &str {
        &self.from
    }

    pub fn to_vocabulary(&self) -> &str {
        &self.to
    }

    pub fn name(&self) -> String {
        format!("{}->{}", self.from, self.to)
    }

    /// The bridge must land in the vocabulary the dictionary is keyed in.
    pub fn check_target(&self, dictionary: &ClassificationDictionary) -> Result<(), CrosswalkError> {
        if self.to != dictionary.vocabulary() {
            return Err(CrosswalkError::VocabularyMismatch {
                bridge: self.to.clone(),
                dictionary: dictionary.vocabulary().to_string(),
            });
        }
        Ok(())
    }

    /// Linked codes for `code` at `level`, before intersecting with any dictionary.
    pub fn linked(&self, level: usize, code: &str) -> Option<&BTreeSet<String>> {
        if level == 0 || level > self.width {
            return None;
        }
        let key = truncate(code, level);
        if key.len() != level {
            return None;
        }
        self.levels[level - 1].get(key)
    }

    pub fn resolve(
        &self,
        level: usize,
        code: &str,
        dictionary: &ClassificationDictionary,
    ) -> Option<BridgeHit> {
        let linked = self.linked(level, code)?;

        let mut sum = 0.0;
        let mut candidates = Vec::new();
        for target in linked {
            if let Some(score) = dictionary.lookup(level, target) {
                sum += score;
                candidates.push(target.clone());
            }
        }

        if candidates.is_empty() {
            return None;
        }
        Some(BridgeHit {
            score: sum / candidates.len() as f64,
            candidates,
        })
    }
}
