//! `occwalk run` and `occwalk validate`: config-driven crosswalk.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use occwalk_crosswalk::model::AnnotatedRow;
use occwalk_crosswalk::{CrosswalkConfig, CrosswalkError, CrosswalkResult};

use crate::exit_codes::{crosswalk_exit_code, EXIT_RUNTIME, EXIT_USAGE, EXIT_WARNINGS};
use crate::CliError;

fn crosswalk_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError {
        code,
        message: msg.into(),
        hint: None,
    }
}

fn engine_err(err: CrosswalkError) -> CliError {
    crosswalk_err(crosswalk_exit_code(&err), err.to_string())
}

fn read_config(config_path: &Path) -> Result<CrosswalkConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| crosswalk_err(EXIT_USAGE, format!("cannot read {}: {e}", config_path.display())))?;
    CrosswalkConfig::from_toml(&config_str).map_err(engine_err)
}

pub fn cmd_run(
    config_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
    annotated_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    tracing::debug!(config = %config_path.display(), "config loaded");

    // Resolve file paths relative to config file's directory
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let input = occwalk_crosswalk::load::load_input(&config, base_dir).map_err(engine_err)?;

    let result = occwalk_crosswalk::run(&config, &input).map_err(engine_err)?;

    let json_str = serde_json::to_string_pretty(&result)
        .map_err(|e| crosswalk_err(EXIT_RUNTIME, format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| crosswalk_err(EXIT_RUNTIME, format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if let Some(ref path) = annotated_file {
        write_annotated(path, &result.columns, &result.rows())
            .map_err(|e| crosswalk_err(EXIT_RUNTIME, format!("cannot write {}: {e}", path.display())))?;
        eprintln!("wrote {} ({} rows)", path.display(), result.records.len());
    }

    if json_output {
        println!("{json_str}");
    }

    print_summary(&result);

    if result.has_warnings() {
        return Err(crosswalk_err(
            EXIT_WARNINGS,
            format!("{} validation issue(s)", result.validation.len()),
        ));
    }
    Ok(())
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    let cascade = config.cascade().map_err(engine_err)?;
    eprintln!(
        "valid: '{}' ({} digits, vocabulary {}{}) cascade: {}",
        config.name,
        config.codes.width,
        config.reference.vocabulary,
        config
            .bridge
            .as_ref()
            .map(|b| format!(", bridge {}->{}", b.from, b.to))
            .unwrap_or_default(),
        cascade.labels().join(" > "),
    );
    Ok(())
}

/// Human summary to stderr.
fn print_summary(result: &CrosswalkResult) {
    let cov = &result.coverage;
    eprintln!(
        "{}: {} records, weight {:.1}",
        result.meta.config_name, cov.total_records, cov.total_weight
    );
    for t in &cov.tiers {
        eprintln!(
            "  {:<10} {:>8}  {:>6.1}%  (cumulative {:>5.1}%)",
            t.tier,
            t.count,
            t.weighted_share * 100.0,
            t.cumulative_share * 100.0
        );
    }
    eprintln!(
        "  {:<10} {:>8}  {:>6.1}%",
        "unresolved",
        cov.unresolved.count,
        cov.unresolved.weighted_share * 100.0
    );
    if cov.rejected.count > 0 {
        eprintln!("  {:<10} {:>8}", "rejected", cov.rejected.count);
    }
    if let Some(mean) = result.score_summary.mean {
        eprintln!("weighted mean score: {mean:.4}");
    }
    if let Some(ref c) = result.concordance {
        eprintln!(
            "concordance: {} codes, {} differ by more than {}",
            c.codes, c.above_threshold, c.threshold
        );
    }
    for issue in &result.validation {
        eprintln!("warning: {}", issue.message);
    }
}

const CROSSWALK_FIELDS: [&str; 5] = ["matched_score", "match_tier", "provenance", "source_key", "reference_label"];

/// Original row as read, then the crosswalk fields. `columns` is the target
/// header; when it is empty (targets built in memory) the row is rebuilt from
/// code, weight and sorted attributes.
fn write_annotated(path: &Path, columns: &[String], rows: &[AnnotatedRow]) -> Result<(), csv::Error> {
    let attribute_names: BTreeSet<&str> = rows
        .iter()
        .flat_map(|r| r.attributes.keys().map(String::as_str))
        .collect();

    let mut writer = csv::Writer::from_path(path)?;

    let mut header: Vec<&str> = if columns.is_empty() {
        let mut h = vec!["code", "weight"];
        h.extend(attribute_names.iter().copied());
        h
    } else {
        columns.iter().map(String::as_str).collect()
    };
    header.extend(CROSSWALK_FIELDS);
    writer.write_record(&header)?;

    for row in rows {
        let mut record: Vec<String> = if columns.is_empty() {
            let mut r = vec![row.code.clone(), row.weight.to_string()];
            for name in &attribute_names {
                r.push(row.attributes.get(*name).cloned().unwrap_or_default());
            }
            r
        } else {
            let mut r = row.source_row.clone();
            r.resize(columns.len(), String::new());
            r
        };
        record.push(row.matched_score.map(|s| s.to_string()).unwrap_or_default());
        record.push(row.match_tier.clone());
        record.push(row.provenance.to_string());
        record.push(row.source_key.clone().unwrap_or_default());
        record.push(row.label.clone().unwrap_or_default());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
