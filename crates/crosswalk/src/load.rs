//! CSV loaders driven by the configured column mappings.

use std::collections::BTreeMap;
use std::path::Path;

use crate::bridge::CorrespondenceMap;
use crate::code::CodeFormat;
use crate::config::{BridgeConfig, CrosswalkConfig, ReferenceConfig, TargetConfig};
use crate::error::CrosswalkError;
use crate::model::{Correspondence, CrosswalkInput, RowIssue, ScoredReference, TargetRecord};

/// Target rows split into matchable records and rejected rows.
#[derive(Debug, Clone, Default)]
pub struct TargetBatch {
    pub records: Vec<TargetRecord>,
    pub rejected: Vec<RowIssue>,
    /// Rows dropped by `target.filter`.
    pub filtered: usize,
    /// Header row, in file order.
    pub columns: Vec<String>,
}

struct Table<'a> {
    name: String,
    headers: Vec<String>,
    reader: csv::Reader<&'a [u8]>,
}

impl<'a> Table<'a> {
    fn open(name: &str, csv_data: &'a str) -> Result<Self, CrosswalkError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(csv_data.as_bytes());
        let headers = reader.headers()?.iter().map(|h| h.to_string()).collect();
        Ok(Self {
            name: name.to_string(),
            headers,
            reader,
        })
    }

    fn idx(&self, column: &str) -> Result<usize, CrosswalkError> {
        self.headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| CrosswalkError::MissingColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }
}

/// Reference scores. A malformed code aborts the load; an empty score is
/// read as missing, an unparsable one is an error.
pub fn load_reference(
    csv_data: &str,
    config: &ReferenceConfig,
    format: &CodeFormat,
) -> Result<Vec<ScoredReference>, CrosswalkError> {
    let mut table = Table::open(&config.vocabulary, csv_data)?;
    let code_idx = table.idx(&config.columns.code)?;
    let score_idx = table.idx(&config.columns.score)?;
    let label_idx = match config.columns.label {
        Some(ref label) => Some(table.idx(label)?),
        None => None,
    };

    let mut out = Vec::new();
    for (i, record) in table.reader.records().enumerate() {
        let record = record?;
        let row = i + 1;

        let raw = record.get(code_idx).unwrap_or("");
        let code = format
            .normalize(raw)
            .map_err(|reason| CrosswalkError::MalformedReferenceCode {
                table: table.name.clone(),
                row,
                value: raw.to_string(),
                reason: reason.to_string(),
            })?;

        let raw_score = record.get(score_idx).unwrap_or("").trim();
        let score = if raw_score.is_empty() {
            f64::NAN
        } else {
            raw_score
                .parse::<f64>()
                .map_err(|_| CrosswalkError::ScoreParse {
                    table: table.name.clone(),
                    row,
                    value: raw_score.to_string(),
                })?
        };

        let label = label_idx
            .and_then(|li| record.get(li))
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string);

        out.push(ScoredReference { code, score, label });
    }

    log::debug!("{}: loaded {} reference rows", table.name, out.len());
    Ok(out)
}

/// Correspondence links. Rows with either side blank are skipped.
pub fn load_correspondence(
    csv_data: &str,
    config: &BridgeConfig,
    format: &CodeFormat,
) -> Result<CorrespondenceMap, CrosswalkError> {
    let name = format!("{}->{}", config.from, config.to);
    let mut table = Table::open(&name, csv_data)?;
    let from_idx = table.idx(&config.columns.from)?;
    let to_idx = table.idx(&config.columns.to)?;
    let type_idx = match config.columns.match_type {
        Some(ref col) => Some(table.idx(col)?),
        None => None,
    };

    let mut links = Vec::new();
    let mut blank = 0usize;
    for (i, record) in table.reader.records().enumerate() {
        let record = record?;
        let row = i + 1;

        let raw_from = record.get(from_idx).unwrap_or("");
        let raw_to = record.get(to_idx).unwrap_or("");
        if raw_from.trim().is_empty() || raw_to.trim().is_empty() {
            blank += 1;
            continue;
        }

        let normalize = |raw: &str| {
            format
                .normalize(raw)
                .map_err(|reason| CrosswalkError::MalformedReferenceCode {
                    table: table.name.clone(),
                    row,
                    value: raw.to_string(),
                    reason: reason.to_string(),
                })
        };

        links.push(Correspondence {
            from: normalize(raw_from)?,
            to: normalize(raw_to)?,
            match_type: type_idx
                .and_then(|ti| record.get(ti))
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        });
    }

    if blank > 0 {
        log::warn!("{name}: skipped {blank} rows with a blank code");
    }
    Ok(CorrespondenceMap::new(config.from.clone(), config.to.clone(), links))
}

/// Target records. Bad codes and weights become [`RowIssue`]s; only a
/// missing column or unreadable CSV fails the load.
pub fn load_targets(
    csv_data: &str,
    config: &TargetConfig,
    format: &CodeFormat,
) -> Result<TargetBatch, CrosswalkError> {
    let mut table = Table::open("target", csv_data)?;
    let code_idx = table.idx(&config.columns.code)?;
    let weight_idx = table.idx(&config.columns.weight)?;

    let filter_idx = match config.filter {
        Some(ref filter) => Some(table.idx(&filter.column)?),
        None => None,
    };

    let attribute_cols: Vec<(String, usize)> = match config.attributes {
        Some(ref names) => names
            .iter()
            .map(|n| table.idx(n).map(|i| (n.clone(), i)))
            .collect::<Result<_, _>>()?,
        None => table
            .headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != code_idx && *i != weight_idx)
            .map(|(i, h)| (h.clone(), i))
            .collect(),
    };

    let mut batch = TargetBatch {
        columns: table.headers.clone(),
        ..TargetBatch::default()
    };
    for (i, record) in table.reader.records().enumerate() {
        let record = record?;
        let row = i + 1;

        if let (Some(filter), Some(fi)) = (&config.filter, filter_idx) {
            let val = record.get(fi).unwrap_or("").trim();
            if !filter.values.iter().any(|v| v == val) {
                batch.filtered += 1;
                continue;
            }
        }

        let raw_code = record.get(code_idx).unwrap_or("");
        let raw_weight = record.get(weight_idx).unwrap_or("").trim();
        let weight = raw_weight
            .parse::<f64>()
            .ok()
            .filter(|w| w.is_finite() && *w > 0.0);

        let code = match format.normalize(raw_code) {
            Ok(code) => code,
            Err(reason) => {
                batch.rejected.push(RowIssue::malformed(row, raw_code, &reason, weight));
                continue;
            }
        };
        let Some(weight) = weight else {
            batch.rejected.push(RowIssue::invalid_weight(row, raw_code, raw_weight));
            continue;
        };

        let attributes: BTreeMap<String, String> = attribute_cols
            .iter()
            .map(|(name, idx)| (name.clone(), record.get(*idx).unwrap_or("").to_string()))
            .collect();

        batch.records.push(TargetRecord {
            code,
            weight,
            attributes,
            source_row: record.iter().map(str::to_string).collect(),
        });
    }

    if !batch.rejected.is_empty() {
        log::warn!(
            "target: rejected {} of {} rows (malformed code or invalid weight)",
            batch.rejected.len(),
            batch.rejected.len() + batch.records.len()
        );
    }
    if batch.filtered > 0 {
        log::debug!("target: {} rows dropped by filter", batch.filtered);
    }
    Ok(batch)
}

/// Read every table `config` names, resolving paths against `base_dir`.
pub fn load_input(config: &CrosswalkConfig, base_dir: &Path) -> Result<CrosswalkInput, CrosswalkError> {
    let read = |file: &str| {
        let path = base_dir.join(file);
        std::fs::read_to_string(&path)
            .map_err(|e| CrosswalkError::Io(format!("{}: {e}", path.display())))
    };

    let reference = load_reference(&read(&config.reference.file)?, &config.reference, &config.codes)?;
    let correspondence = match config.bridge {
        Some(ref bridge) => Some(load_correspondence(&read(&bridge.file)?, bridge, &config.codes)?),
        None => None,
    };
    let targets = load_targets(&read(&config.target.file)?, &config.target, &config.codes)?;

    Ok(CrosswalkInput {
        reference,
        correspondence,
        targets: targets.records,
        rejected: targets.rejected,
        columns: targets.columns,
    })
}
