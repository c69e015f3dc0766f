use crate::aggregate::summarize;
use crate::bridge::CrossSystemBridge;
use crate::code::CodeFormat;
use crate::concordance::compare_runs;
use crate::config::CrosswalkConfig;
use crate::dictionary::ClassificationDictionary;
use crate::error::CrosswalkError;
use crate::impute::finalize;
use crate::matcher::HierarchicalMatcher;
use crate::model::{CrosswalkInput, CrosswalkMeta, CrosswalkResult, RowIssue, TargetRecord};
use crate::validate::{check_coverage, check_reference};

/// Run the crosswalk per config. Returns annotated records plus the
/// coverage, imputation and validation reports.
pub fn run(config: &CrosswalkConfig, input: &CrosswalkInput) -> Result<CrosswalkResult, CrosswalkError> {
    let width = config.codes.width;
    let mut validation = check_reference(&input.reference, &config.validation);

    let dictionary =
        ClassificationDictionary::build(config.reference.vocabulary.clone(), width, &input.reference)?;

    let bridge = match (&config.bridge, &input.correspondence) {
        (Some(_), Some(map)) => Some(CrossSystemBridge::new(map, width)),
        (Some(b), None) => {
            return Err(CrosswalkError::ConfigValidation(format!(
                "bridge {}->{} configured but no correspondence table was loaded",
                b.from, b.to
            )))
        }
        (None, _) => None,
    };

    let cascade = config.cascade()?;
    let matcher = HierarchicalMatcher::new(&dictionary, bridge.as_ref(), cascade)?;

    let (targets, screened) = screen_targets(&input.targets, &config.codes);
    let mut rejected = input.rejected.clone();
    if !screened.is_empty() {
        log::warn!(
            "rejected {} of {} in-memory targets (malformed code or invalid weight)",
            screened.len(),
            input.targets.len()
        );
        rejected.extend(screened);
    }

    let mut records = matcher.annotate(targets.clone());
    let coverage = matcher.coverage(&records, &rejected);

    let concordance = match config.concordance {
        Some(ref c) => {
            let coarse = HierarchicalMatcher::new(&dictionary, None, config.coarse_cascade(c.coarse_level)?)?;
            let coarse_records = coarse.annotate(targets);
            Some(compare_runs(&coarse_records, &records, c.threshold))
        }
        None => None,
    };

    let imputation = finalize(&mut records, config.imputation.policy);
    let score_summary = summarize(&records, false);

    validation.extend(check_coverage(&coverage, &config.validation));
    for issue in &validation {
        log::warn!("{}: {}", issue.check, issue.message);
    }

    Ok(CrosswalkResult {
        meta: CrosswalkMeta {
            config_name: config.name.clone(),
            vocabulary: dictionary.vocabulary().to_string(),
            bridge: bridge.as_ref().map(CrossSystemBridge::name),
            width,
            cascade: matcher.cascade().labels(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        coverage,
        imputation,
        score_summary,
        rejected,
        concordance,
        validation,
        records,
        columns: input.columns.clone(),
    })
}

/// Re-check targets that did not come through the loader. Codes are brought
/// to `format`; rows with a malformed code or a weight that is not a finite
/// positive number are returned as issues. Issue rows are 1-based positions
/// in `targets`.
fn screen_targets(targets: &[TargetRecord], format: &CodeFormat) -> (Vec<TargetRecord>, Vec<RowIssue>) {
    let mut kept = Vec::with_capacity(targets.len());
    let mut issues = Vec::new();
    for (i, target) in targets.iter().enumerate() {
        let row = i + 1;
        let weight = Some(target.weight).filter(|w| w.is_finite() && *w > 0.0);
        let code = match format.normalize(&target.code) {
            Ok(code) => code,
            Err(reason) => {
                issues.push(RowIssue::malformed(row, &target.code, &reason, weight));
                continue;
            }
        };
        if weight.is_none() {
            issues.push(RowIssue::invalid_weight(row, &target.code, &target.weight.to_string()));
            continue;
        }
        kept.push(TargetRecord {
            code,
            ..target.clone()
        });
    }
    (kept, issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::CorrespondenceMap;
    use crate::model::{Correspondence, Provenance, RowIssueKind, ScoredReference};
    use approx::assert_relative_eq;

    const CONFIG: &str = r#"
name = "unit"

[reference]
vocabulary = "isco08"
file = "ref.csv"

[reference.columns]
code = "code"
score = "score"

[target]
file = "target.csv"

[target.columns]
code = "code"
weight = "weight"

[imputation]
policy = "zero_fill"
"#;

    fn input() -> CrosswalkInput {
        CrosswalkInput {
            reference: vec![ScoredReference::new("1111", 0.9), ScoredReference::new("1112", 0.1)],
            correspondence: None,
            targets: vec![
                TargetRecord::new("1111", 2.0),
                TargetRecord::new("1199", 1.0),
                TargetRecord::new("9999", 1.0),
            ],
            rejected: vec![RowIssue::invalid_weight(4, "1111", "")],
            columns: Vec::new(),
        }
    }

    #[test]
    fn end_to_end_in_memory() {
        let config = CrosswalkConfig::from_toml(CONFIG).unwrap();
        let result = run(&config, &input()).unwrap();

        assert_eq!(result.meta.cascade.len(), 4);
        assert_eq!(result.meta.bridge, None);
        assert_relative_eq!(result.coverage.resolved_share(), 0.75);
        assert_eq!(result.imputation.count, 1);
        assert_eq!(result.records[2].provenance(), Provenance::ZeroFilled);
        assert_eq!(result.rejected.len(), 1);

        // Summary ignores the zero-filled default.
        assert_eq!(result.score_summary.n, 2);
        assert_relative_eq!(result.score_summary.mean.unwrap(), (0.9 * 2.0 + 0.5) / 3.0);

        // 75% < 90% default threshold.
        assert!(result.validation.iter().any(|i| i.check == "coverage"));
        assert!(result.has_warnings());
    }

    #[test]
    fn bridge_configured_but_not_loaded() {
        let toml = format!(
            "{CONFIG}\n[bridge]\nfrom = \"isco88\"\nto = \"isco08\"\nfile = \"b.csv\"\n\n[bridge.columns]\nfrom = \"a\"\nto = \"b\"\n"
        );
        let config = CrosswalkConfig::from_toml(&toml).unwrap();
        assert!(run(&config, &input()).is_err());

        let mut with_map = input();
        with_map.correspondence = Some(CorrespondenceMap::new(
            "isco88",
            "isco08",
            vec![Correspondence {
                from: "9999".into(),
                to: "1112".into(),
                match_type: None,
            }],
        ));
        let result = run(&config, &with_map).unwrap();
        assert_eq!(result.meta.bridge.as_deref(), Some("isco88->isco08"));
        assert_eq!(result.records[2].score(), Some(0.1));
        assert_eq!(result.records[2].provenance(), Provenance::Inferred);
        assert_relative_eq!(result.coverage.resolved_share(), 1.0);
    }

    #[test]
    fn concordance_pass() {
        let toml = format!("{CONFIG}\n[concordance]\ncoarse_level = 2\n");
        let config = CrosswalkConfig::from_toml(&toml).unwrap();
        let result = run(&config, &input()).unwrap();
        let c = result.concordance.unwrap();
        // 1111: 0.9 vs 0.5; 1199: 0.5 vs 0.5.
        assert_eq!(c.codes, 2);
        assert_eq!(c.above_threshold, 1);
        assert_relative_eq!(c.max_abs_diff.unwrap(), 0.4, epsilon = 1e-12);
    }

    #[test]
    fn in_memory_targets_are_screened() {
        let toml = CONFIG.replacen("[target]", "[codes]\nzero_pad = false\n\n[target]", 1);
        let config = CrosswalkConfig::from_toml(&toml).unwrap();
        let mut data = input();
        data.rejected.clear();
        data.targets = vec![
            TargetRecord::new("12", 1.0),
            TargetRecord::new("1x99", 1.0),
            TargetRecord::new("1111", f64::NAN),
            TargetRecord::new("1112", -5.0),
            TargetRecord::new(" 1111.0", 3.0),
        ];
        let result = run(&config, &data).unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].record.code, "1111");
        assert_eq!(result.records[0].provenance(), Provenance::Measured);

        let kinds: Vec<(usize, RowIssueKind)> = result.rejected.iter().map(|r| (r.row, r.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (1, RowIssueKind::MalformedCode),
                (2, RowIssueKind::MalformedCode),
                (3, RowIssueKind::InvalidWeight),
                (4, RowIssueKind::InvalidWeight),
            ]
        );
        assert_eq!(result.rejected[0].detail, "2 digits, expected 4");
        assert_eq!(result.rejected[1].raw_code, "1x99");
        assert_eq!(result.rejected[3].detail, "weight '-5' is not a positive number");

        assert_relative_eq!(result.coverage.total_weight, 3.0);
        assert_relative_eq!(result.coverage.resolved_share(), 1.0);
        assert_eq!(result.coverage.rejected.count, 4);
        assert!(result.score_summary.mean.unwrap().is_finite());
    }

    #[test]
    fn screening_keeps_loaded_rejections_first() {
        let config = CrosswalkConfig::from_toml(CONFIG).unwrap();
        let mut data = input();
        data.targets.push(TargetRecord::new("1111", 0.0));
        let result = run(&config, &data).unwrap();
        assert_eq!(result.rejected.len(), 2);
        assert_eq!(result.rejected[0].row, 4);
        assert_eq!(result.rejected[1].row, 4);
        assert_eq!(result.rejected[1].kind, RowIssueKind::InvalidWeight);
        assert_eq!(result.records.len(), 3);
    }
}
