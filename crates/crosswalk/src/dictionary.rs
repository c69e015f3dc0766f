//! Multi-resolution score lookup built from a scored reference table.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::code::{truncate, MAX_WIDTH};
use crate::error::CrosswalkError;
use crate::model::ScoredReference;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DictionaryEntry {
    /// Unweighted mean over the finest-level entries under this prefix.
    pub score: f64,
    /// Number of finest-level entries averaged.
    pub members: usize,
}

/// Immutable `(level, prefix) -> score` table for one vocabulary.
///
/// Level `width` holds the reference scores with duplicates averaged; every
/// coarser level holds the unweighted mean of the finest entries sharing the
/// prefix. All levels are computed once in [`ClassificationDictionary::build`].
#[derive(Debug, Clone)]
pub struct ClassificationDictionary {
    vocabulary: String,
    width: usize,
    /// `levels[l - 1]` is the table for level `l`.
    levels: Vec<BTreeMap<String, DictionaryEntry>>,
    labels: BTreeMap<String, String>,
}

impl ClassificationDictionary {
    pub fn build(
        vocabulary: impl Into<String>,
        width: usize,
        references: &[ScoredReference],
    ) -> Result<Self, CrosswalkError> {
        let vocabulary = vocabulary.into();
        if width == 0 || width > MAX_WIDTH {
            return Err(CrosswalkError::ConfigValidation(format!(
                "code width must be between 1 and {MAX_WIDTH}, got {width}"
            )));
        }

        // Collapse duplicates at the finest resolution first.
        let mut finest: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        let mut labels: BTreeMap<String, String> = BTreeMap::new();
        let mut skipped = 0usize;

        for (i, r) in references.iter().enumerate() {
            if r.code.len() != width || !r.code.bytes().all(|b| b.is_ascii_digit()) {
                return Err(CrosswalkError::MalformedReferenceCode {
                    table: vocabulary.clone(),
                    row: i + 1,
                    value: r.code.clone(),
                    reason: format!("expected {width} digits"),
                });
            }
            if !r.score.is_finite() {
                skipped += 1;
                continue;
            }
            let entry = finest.entry(r.code.clone()).or_insert((0.0, 0));
            entry.0 += r.score;
            entry.1 += 1;

            if let Some(label) = r.label.as_ref().filter(|l| !l.is_empty()) {
                labels.entry(r.code.clone()).or_insert_with(|| label.clone());
            }
        }

        if skipped > 0 {
            log::debug!("{vocabulary}: skipped {skipped} reference rows without a score");
        }

        let finest: BTreeMap<String, f64> = finest
            .into_iter()
            .map(|(code, (sum, n))| (code, sum / n as f64))
            .collect();

        let mut levels = Vec::with_capacity(width);
        for level in 1..=width {
            let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
            for (code, score) in &finest {
                let entry = sums
                    .entry(truncate(code, level).to_string())
                    .or_insert((0.0, 0));
                entry.0 += score;
                entry.1 += 1;
            }
            let table: BTreeMap<String, DictionaryEntry> = sums
                .into_iter()
                .map(|(prefix, (sum, members))| {
                    (
                        prefix,
                        DictionaryEntry {
                            score: sum / members as f64,
                            members,
                        },
                    )
                })
                .collect();
            log::debug!("{vocabulary}: {} entries at {level} digit(s)", table.len());
            levels.push(table);
        }

        log::info!(
            "{vocabulary}: dictionary built from {} reference rows ({} distinct codes)",
            references.len(),
            finest.len()
        );

        Ok(Self {
            vocabulary,
            width,
            levels,
            labels,
        })
    }

    pub fn vocabulary(&self) -> &str {
        &self.vocabulary
    }

    /// Finest resolution, in digits.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn entry(&self, level: usize, code: &str) -> Option<&DictionaryEntry> {
        if level == 0 || level > self.width {
            return None;
        }
        let key = truncate(code, level);
        if key.len() != level {
            return None;
        }
        self.levels[level - 1].get(key)
    }

    /// Score for `code` truncated to `level` digits.
    pub fn lookup(&self, level: usize, code: &str) -> Option<f64> {
        self.entry(level, code).map(|e| e.score)
    }

    pub fn contains(&self, level: usize, code: &str) -> bool {
        self.entry(level, code).is_some()
    }

    /// Number of entries at `level` (0 when out of range).
    pub fn len(&self, level: usize) -> usize {
        if level == 0 || level > self.width {
            0
        } else {
            self.levels[level - 1].len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.levels.last().map_or(true, |t| t.is_empty())
    }

    /// Entries at `level`, ordered by code.
    pub fn entries(&self, level: usize) -> impl Iterator<Item = (&str, &DictionaryEntry)> {
        self.levels
            .get(level.wrapping_sub(1))
            .into_iter()
            .flat_map(|t| t.iter().map(|(k, v)| (k.as_str(), v)))
    }

    pub fn label(&self, code: &str) -> Option<&str> {
        self.labels.get(code).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn refs(pairs: &[(&str, f64)]) -> Vec<ScoredReference> {
        pairs.iter().map(|(c, s)| ScoredReference::new(*c, *s)).collect()
    }

    #[test]
    fn coarse_levels_average_fine_entries() {
        let dict = ClassificationDictionary::build(
            "isco08",
            4,
            &refs(&[("1111", 0.9), ("1112", 0.1), ("1211", 0.4), ("2111", 0.6)]),
        )
        .unwrap();

        assert_eq!(dict.lookup(4, "1111"), Some(0.9));
        assert_relative_eq!(dict.lookup(3, "1119").unwrap(), 0.5);
        assert_relative_eq!(dict.lookup(2, "1100").unwrap(), 0.5);
        assert_relative_eq!(dict.lookup(1, "1999").unwrap(), (0.9 + 0.1 + 0.4) / 3.0);
        assert_eq!(dict.entry(1, "1").unwrap().members, 3);
        assert_eq!(dict.lookup(2, "99"), None);
        assert_eq!(dict.len(4), 4);
        assert_eq!(dict.len(1), 2);
    }

    #[test]
    fn duplicates_collapse_before_aggregation() {
        // "1111" appears twice: finest = 0.5; level 3 averages 0.5 and 0.1,
        // not the three raw rows.
        let dict = ClassificationDictionary::build(
            "isco08",
            4,
            &refs(&[("1111", 0.2), ("1111", 0.8), ("1112", 0.1)]),
        )
        .unwrap();
        assert_relative_eq!(dict.lookup(4, "1111").unwrap(), 0.5);
        assert_relative_eq!(dict.lookup(3, "111").unwrap(), 0.3);
    }

    #[test]
    fn lookup_rejects_out_of_range_levels_and_short_codes() {
        let dict = ClassificationDictionary::build("isco08", 4, &refs(&[("1111", 0.9)])).unwrap();
        assert_eq!(dict.lookup(0, "1111"), None);
        assert_eq!(dict.lookup(5, "1111"), None);
        assert_eq!(dict.lookup(3, "11"), None);
    }

    #[test]
    fn missing_scores_are_skipped() {
        let dict = ClassificationDictionary::build(
            "isco08",
            4,
            &refs(&[("1111", f64::NAN), ("1112", 0.4)]),
        )
        .unwrap();
        assert_eq!(dict.lookup(4, "1111"), None);
        assert_eq!(dict.lookup(3, "111"), Some(0.4));
    }

    #[test]
    fn malformed_reference_code_is_fatal() {
        let err = ClassificationDictionary::build("isco08", 4, &refs(&[("1111", 0.1), ("111", 0.2)]))
            .unwrap_err();
        assert!(matches!(err, CrosswalkError::MalformedReferenceCode { row: 2, .. }));

        let err = ClassificationDictionary::build("isco08", 0, &[]).unwrap_err();
        assert!(err.to_string().contains("code width"));
    }

    #[test]
    fn keeps_first_label() {
        let mut rows = refs(&[("2512", 0.7), ("2512", 0.5)]);
        rows[0].label = Some("Software developers".into());
        rows[1].label = Some("Other".into());
        let dict = ClassificationDictionary::build("isco08", 4, &rows).unwrap();
        assert_eq!(dict.label("2512"), Some("Software developers"));
    }

    proptest! {
        #[test]
        fn finest_level_reproduces_averaged_reference(
            rows in proptest::collection::vec(("[0-9]{4}", 0.0f64..1.0), 1..40),
        ) {
            let references: Vec<ScoredReference> =
                rows.iter().map(|(c, s)| ScoredReference::new(c.clone(), *s)).collect();
            let dict = ClassificationDictionary::build("isco08", 4, &references).unwrap();

            let mut expected: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
            for (c, s) in &rows {
                expected.entry(c.as_str()).or_default().push(*s);
            }
            for (code, scores) in expected {
                let mean = scores.iter().sum::<f64>() / scores.len() as f64;
                let got = dict.lookup(4, code).unwrap();
                prop_assert!((got - mean).abs() < 1e-12);
            }
        }
    }
}
