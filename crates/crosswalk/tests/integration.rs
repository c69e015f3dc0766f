use std::path::PathBuf;

use approx::assert_relative_eq;

use occwalk_crosswalk::aggregate::{assign_quantile_groups, summarize_by};
use occwalk_crosswalk::bridge::CorrespondenceMap;
use occwalk_crosswalk::dictionary::ClassificationDictionary;
use occwalk_crosswalk::load::load_input;
use occwalk_crosswalk::model::{Correspondence, RowIssueKind, ScoredReference};
use occwalk_crosswalk::translate::{translate_reference, VolumeRow};
use occwalk_crosswalk::{
    run, AnnotatedRecord, CrosswalkConfig, CrosswalkResult, HierarchicalMatcher, MatchState, Provenance, TargetRecord, Tier,
};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture_config() -> String {
    std::fs::read_to_string(fixtures_dir().join("crosswalk.toml")).unwrap()
}

fn load_and_run(config_toml: &str) -> CrosswalkResult {
    let config = CrosswalkConfig::from_toml(config_toml).unwrap();
    let input = load_input(&config, &fixtures_dir()).unwrap();
    run(&config, &input).unwrap()
}

fn record<'a>(result: &'a CrosswalkResult, code: &str) -> &'a AnnotatedRecord {
    result
        .records
        .iter()
        .find(|r| r.record.code == code)
        .unwrap_or_else(|| panic!("no record for {code}"))
}

// -------------------------------------------------------------------------
// Fixture run
// -------------------------------------------------------------------------

#[test]
fn fixture_tiers_and_provenance() {
    let result = load_and_run(&fixture_config());

    assert_eq!(result.meta.vocabulary, "isco08");
    assert_eq!(result.meta.bridge.as_deref(), Some("isco88->isco08"));
    assert_eq!(
        result.meta.cascade,
        vec!["exact-L4", "bridge-L4", "exact-L3", "bridge-L3", "exact-L2", "exact-L1"]
    );
    assert_eq!(result.records.len(), 9);

    let r = record(&result, "1111");
    assert_eq!(r.state(), MatchState::Matched(Tier::exact(4)));
    assert_eq!(r.provenance(), Provenance::Measured);

    let r = record(&result, "2131");
    assert_eq!(r.state(), MatchState::Matched(Tier::bridge(4)));
    assert_relative_eq!(r.score().unwrap(), 0.7);
    assert_eq!(r.provenance(), Provenance::Inferred);
    assert_eq!(r.source_key(), Some("isco08:2511|2512"));

    let r = record(&result, "2519");
    assert_eq!(r.tier(), Some(Tier::exact(3)));
    assert_relative_eq!(r.score().unwrap(), 0.7);

    let r = record(&result, "2149");
    assert_eq!(r.tier(), Some(Tier::exact(1)));
    assert_relative_eq!(r.score().unwrap(), 0.6);

    // "3111.0" came through a spreadsheet.
    assert_eq!(record(&result, "3111").score(), Some(0.2));

    let r = record(&result, "9999");
    assert_eq!(r.state(), MatchState::Unresolved);
    assert_eq!(r.provenance(), Provenance::Missing);
    assert_eq!(r.score(), None);
}

#[test]
fn fixture_coverage_is_weighted() {
    let result = load_and_run(&fixture_config());
    let cov = &result.coverage;

    assert_eq!(cov.total_records, 9);
    assert_relative_eq!(cov.total_weight, 370.0);

    let l4 = cov.tier("exact-L4").unwrap();
    assert_eq!(l4.count, 3);
    assert_relative_eq!(l4.weighted_share, 190.0 / 370.0);

    let b4 = cov.tier("bridge-L4").unwrap();
    assert_eq!(b4.count, 3);
    assert_relative_eq!(b4.cumulative_share, 310.0 / 370.0);

    assert_eq!(cov.tier("bridge-L3").unwrap().count, 0);
    assert_relative_eq!(cov.resolved_share(), 340.0 / 370.0);
    assert_relative_eq!(cov.unresolved.weight, 30.0);

    assert_eq!(cov.rejected.count, 2);
    assert_eq!(result.rejected[0].kind, RowIssueKind::MalformedCode);
    assert_eq!(result.rejected[0].row, 9);
    assert_eq!(result.rejected[1].kind, RowIssueKind::InvalidWeight);

    // 91.9% clears the 90% floor.
    assert!(result.validation.is_empty());
}

#[test]
fn fixture_summary_excludes_missing() {
    let result = load_and_run(&fixture_config());
    let s = &result.score_summary;
    assert_eq!(s.n, 8);
    assert_relative_eq!(s.population, 340.0);
    assert_relative_eq!(s.mean.unwrap(), 251.0 / 340.0, epsilon = 1e-12);
    assert_eq!(result.imputation.count, 1);
    assert_eq!(result.imputation.policy, "propagate_missing");
}

#[test]
fn fixture_zero_fill_and_stricter_threshold() {
    let toml = fixture_config()
        .replace("policy = \"propagate_missing\"", "policy = \"zero_fill\"")
        .replace("min_coverage = 0.90", "min_coverage = 0.95");
    let result = load_and_run(&toml);

    let r = record(&result, "9999");
    assert_eq!(r.provenance(), Provenance::ZeroFilled);
    assert_eq!(r.score(), Some(0.0));
    assert_relative_eq!(result.imputation.weight, 30.0);

    assert_eq!(result.validation.len(), 1);
    assert_eq!(result.validation[0].check, "coverage");
}

#[test]
fn fixture_without_bridge_falls_to_coarser_levels() {
    let toml = fixture_config();
    let start = toml.find("[bridge]").unwrap();
    let end = toml.find("[target]").unwrap();
    let no_bridge = format!("{}{}", &toml[..start], &toml[end..]);
    let result = load_and_run(&no_bridge);

    assert_eq!(result.meta.bridge, None);
    // No minor group 213 or sub-major group 21 in the reference.
    assert_eq!(record(&result, "2131").tier(), Some(Tier::exact(1)));
    // 4115 -> minor group 411.
    let r = record(&result, "4115");
    assert_eq!(r.tier(), Some(Tier::exact(3)));
    assert_relative_eq!(r.score().unwrap(), 0.7);
}

#[test]
fn fixture_grouped_summary() {
    let result = load_and_run(&fixture_config());
    let by_uf = summarize_by(&result.records, "uf", false);
    assert_eq!(by_uf.keys().collect::<Vec<_>>(), vec!["BA", "MG", "RJ", "SP"]);
    assert_eq!(by_uf["BA"].n, 0);
    assert_eq!(by_uf["BA"].mean, None);
    assert_relative_eq!(by_uf["SP"].mean.unwrap(), 133.0 / 170.0, epsilon = 1e-12);

    let groups = assign_quantile_groups(&result.records, 2, None, false);
    assert_eq!(groups.len(), result.records.len());
    assert_eq!(groups.iter().filter(|g| g.is_none()).count(), 1);
}

#[test]
fn fixture_concordance_against_two_digit_run() {
    let toml = format!("{}\n[concordance]\ncoarse_level = 2\n", fixture_config());
    let result = load_and_run(&toml);
    let c = result.concordance.unwrap();
    // Every observed code also resolves in the coarse pass.
    assert_eq!(c.codes, 8);
    assert!(c.pearson.is_some());
    // 1111, 2131, 2512, 2139, 2519 move by more than 0.05.
    assert_eq!(c.above_threshold, 5);
    assert_relative_eq!(c.max_abs_diff.unwrap(), 0.4, epsilon = 1e-12);
}

#[test]
fn report_serializes_without_records() {
    let result = load_and_run(&fixture_config());
    let json = serde_json::to_value(&result).unwrap();
    assert!(json.get("records").is_none());
    assert_eq!(json["meta"]["width"], 4);
    assert_eq!(json["coverage"]["tiers"][0]["tier"], "exact-L4");
    assert_eq!(json["rejected"][0]["kind"], "malformed_code");

    let rows = result.rows();
    let row = rows.iter().find(|r| r.code == "2131").unwrap();
    assert_eq!(row.match_tier, "bridge-L4");
    assert_eq!(row.attributes["uf"], "SP");
}

#[test]
fn fixture_labels_and_source_rows() {
    let result = load_and_run(&fixture_config());
    assert_eq!(result.columns, vec!["cod_ocupacao", "peso", "uf", "sexo"]);

    assert_eq!(record(&result, "1111").label(), Some("Legislators"));
    assert_eq!(record(&result, "2512").label(), Some("Software developers"));
    // Bridged and coarser hits carry no label.
    assert_eq!(record(&result, "2131").label(), None);
    assert_eq!(record(&result, "2139").label(), None);
    assert_eq!(record(&result, "9999").label(), None);

    let r = record(&result, "3111");
    assert_eq!(r.record.source_row, vec!["3111.0", "10", "SP", "M"]);
    assert_eq!(r.label(), Some("Chemical and physical science technicians"));

    let json = serde_json::to_value(result.rows()).unwrap();
    let labelled: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|row| row.get("label").and_then(|l| l.as_str()))
        .collect();
    assert_eq!(labelled.len(), 3);
    assert!(json[0].get("source_row").is_none());
}

// -------------------------------------------------------------------------
// In-memory scenarios
// -------------------------------------------------------------------------

#[test]
fn dictionary_fallback_scenario() {
    let dict = ClassificationDictionary::build(
        "isco08",
        4,
        &[
            ScoredReference::new("1111", 0.9),
            ScoredReference::new("1112", 0.1),
        ],
    )
    .unwrap();
    let matcher = HierarchicalMatcher::standard(&dict, None).unwrap();
    let annotated = matcher.annotate(vec![
        TargetRecord::new("1111", 1.0),
        TargetRecord::new("1199", 1.0),
        TargetRecord::new("9999", 1.0),
    ]);

    assert_eq!(annotated[0].tier(), Some(Tier::exact(4)));
    assert_eq!(annotated[0].score(), Some(0.9));
    assert_eq!(annotated[1].tier(), Some(Tier::exact(2)));
    assert_relative_eq!(annotated[1].score().unwrap(), 0.5);
    assert_eq!(annotated[2].state(), MatchState::Unresolved);
}

#[test]
fn translated_reference_feeds_the_dictionary() {
    let link = |from: &str, to: &str| Correspondence {
        from: from.into(),
        to: to.into(),
        match_type: None,
    };
    let soc18_10 = CorrespondenceMap::new("soc2018", "soc2010", vec![link("151252", "151132")]);
    let soc10_isco = CorrespondenceMap::new(
        "soc2010",
        "isco08",
        vec![link("151132", "2512"), link("151132", "2519")],
    );
    let chain = soc18_10.compose(&soc10_isco).unwrap();

    let translated = translate_reference(&[VolumeRow::new("151252", 0.8, Some(10.0))], &chain);
    let reference: Vec<ScoredReference> = translated.iter().map(Into::into).collect();
    let dict = ClassificationDictionary::build("isco08", 4, &reference).unwrap();

    assert_eq!(dict.lookup(4, "2519"), Some(0.8));
    assert_eq!(dict.len(4), 2);
}
