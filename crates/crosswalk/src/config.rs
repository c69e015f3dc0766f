use serde::Deserialize;

use crate::cascade::{Cascade, Tier};
use crate::code::{CodeFormat, MAX_WIDTH};
use crate::concordance::DEFAULT_DIFF_THRESHOLD;
use crate::error::CrosswalkError;
use crate::impute::ImputationPolicy;
use crate::validate::ValidationRules;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CrosswalkConfig {
    pub name: String,
    /// Custom tier order, e.g. `["exact:4", "bridge:4", "exact:2"]`.
    /// Defaults to the standard cascade for `codes.width`.
    #[serde(default)]
    pub cascade: Option<Vec<String>>,
    #[serde(default)]
    pub codes: CodeFormat,
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub bridge: Option<BridgeConfig>,
    pub target: TargetConfig,
    #[serde(default)]
    pub imputation: ImputationConfig,
    #[serde(default)]
    pub validation: ValidationRules,
    #[serde(default)]
    pub concordance: Option<ConcordanceConfig>,
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceConfig {
    /// Vocabulary the scores are keyed in (`isco08`).
    pub vocabulary: String,
    pub file: String,
    pub columns: ReferenceColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceColumns {
    pub code: String,
    pub score: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub from: String,
    pub to: String,
    pub file: String,
    pub columns: BridgeColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeColumns {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub match_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub file: String,
    pub columns: TargetColumns,
    /// Columns carried through to the output. All other columns when absent.
    #[serde(default)]
    pub attributes: Option<Vec<String>>,
    #[serde(default)]
    pub filter: Option<RowFilter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetColumns {
    pub code: String,
    pub weight: String,
}

/// Keep only rows whose `column` holds one of `values`.
#[derive(Debug, Clone, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImputationConfig {
    #[serde(default)]
    pub policy: ImputationPolicy,
}

/// Second pass against a coarser dictionary, compared code by code.
#[derive(Debug, Clone, Deserialize)]
pub struct ConcordanceConfig {
    pub coarse_level: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_DIFF_THRESHOLD
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl CrosswalkConfig {
    pub fn from_toml(input: &str) -> Result<Self, CrosswalkError> {
        let config: CrosswalkConfig =
            toml::from_str(input).map_err(|e| CrosswalkError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CrosswalkError> {
        let width = self.codes.width;
        if width == 0 || width > MAX_WIDTH {
            return Err(CrosswalkError::ConfigValidation(format!(
                "codes.width must be between 1 and {MAX_WIDTH}, got {width}"
            )));
        }

        if let Some(ref bridge) = self.bridge {
            if bridge.to != self.reference.vocabulary {
                return Err(CrosswalkError::VocabularyMismatch {
                    bridge: bridge.to.clone(),
                    dictionary: self.reference.vocabulary.clone(),
                });
            }
            if bridge.from == bridge.to {
                return Err(CrosswalkError::ConfigValidation(format!(
                    "bridge maps '{}' onto itself",
                    bridge.from
                )));
            }
        }

        // Parse errors surface here rather than mid-run.
        self.cascade()?;

        let rules = &self.validation;
        if !(0.0..=1.0).contains(&rules.min_coverage) {
            return Err(CrosswalkError::ConfigValidation(format!(
                "validation.min_coverage must be within [0, 1], got {}",
                rules.min_coverage
            )));
        }
        if rules.score_min > rules.score_max {
            return Err(CrosswalkError::ConfigValidation(format!(
                "validation.score_min ({}) exceeds score_max ({})",
                rules.score_min, rules.score_max
            )));
        }

        if let Some(ref c) = self.concordance {
            if c.coarse_level == 0 || c.coarse_level >= width {
                return Err(CrosswalkError::ConfigValidation(format!(
                    "concordance.coarse_level must be between 1 and {}, got {}",
                    width - 1,
                    c.coarse_level
                )));
            }
            if c.threshold.is_nan() || c.threshold < 0.0 {
                return Err(CrosswalkError::ConfigValidation(
                    "concordance.threshold must be non-negative".into(),
                ));
            }
        }

        if let Some(ref filter) = self.target.filter {
            if filter.values.is_empty() {
                return Err(CrosswalkError::ConfigValidation(format!(
                    "target.filter on '{}' lists no values",
                    filter.column
                )));
            }
        }

        Ok(())
    }

    /// Tier order for this config: the explicit list, or the standard cascade.
    pub fn cascade(&self) -> Result<Cascade, CrosswalkError> {
        let with_bridge = self.bridge.is_some();
        match self.cascade {
            Some(ref labels) => {
                let tiers = labels
                    .iter()
                    .map(|l| l.parse::<Tier>())
                    .collect::<Result<Vec<_>, _>>()?;
                Cascade::new(tiers, self.codes.width, with_bridge)
            }
            None => Ok(Cascade::standard(self.codes.width, with_bridge)),
        }
    }

    /// Exact-only cascade starting at `level`, for the concordance pass.
    pub fn coarse_cascade(&self, level: usize) -> Result<Cascade, CrosswalkError> {
        let tiers = (1..=level).rev().map(Tier::exact).collect();
        Cascade::new(tiers, self.codes.width, false)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"
name = "CBO 4d -> ISCO-08"

[codes]
width = 4

[reference]
vocabulary = "isco08"
file = "ilo_exposure.csv"

[reference.columns]
code  = "isco_08"
score = "exposure_score"
label = "title"

[target]
file = "panel.csv"

[target.columns]
code   = "cbo_4d"
weight = "peso"
"#;

    const BRIDGE: &str = r#"
[bridge]
from = "isco88"
to   = "isco08"
file = "isco_08_88.csv"

[bridge.columns]
from = "isco88_code"
to   = "isco08_code"
"#;

    #[test]
    fn parse_minimal() {
        let config = CrosswalkConfig::from_toml(BASIC).unwrap();
        assert_eq!(config.name, "CBO 4d -> ISCO-08");
        assert_eq!(config.codes.width, 4);
        assert!(config.codes.zero_pad);
        assert_eq!(config.reference.columns.label.as_deref(), Some("title"));
        assert!(config.bridge.is_none());
        assert_eq!(config.imputation.policy, ImputationPolicy::PropagateMissing);
        assert_eq!(config.validation.min_coverage, 0.90);
        assert_eq!(
            config.cascade().unwrap().labels(),
            vec!["exact-L4", "exact-L3", "exact-L2", "exact-L1"]
        );
    }

    #[test]
    fn parse_with_bridge_and_policy() {
        let input = format!(
            "{BASIC}{BRIDGE}\n[imputation]\npolicy = \"zero_fill\"\n\n[validation]\nmin_coverage = 0.95\n"
        );
        let config = CrosswalkConfig::from_toml(&input).unwrap();
        let bridge = config.bridge.as_ref().unwrap();
        assert_eq!(bridge.from, "isco88");
        assert_eq!(config.imputation.policy, ImputationPolicy::ZeroFill);
        assert_eq!(config.validation.min_coverage, 0.95);
        assert_eq!(config.validation.score_max, 1.0);
        assert_eq!(config.cascade().unwrap().len(), 6);
    }

    #[test]
    fn parse_custom_cascade() {
        let input = format!("cascade = [\"exact:4\", \"bridge:4\", \"exact:2\"]\n{BASIC}{BRIDGE}");
        let config = CrosswalkConfig::from_toml(&input).unwrap();
        assert_eq!(
            config.cascade().unwrap().labels(),
            vec!["exact-L4", "bridge-L4", "exact-L2"]
        );
    }

    #[test]
    fn reject_bridge_tier_without_bridge() {
        let input = format!("cascade = [\"exact:4\", \"bridge:4\"]\n{BASIC}");
        let err = CrosswalkConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("[bridge]"), "{err}");
    }

    #[test]
    fn reject_unknown_tier() {
        let input = format!("cascade = [\"fuzzy:4\"]\n{BASIC}");
        assert!(matches!(
            CrosswalkConfig::from_toml(&input),
            Err(CrosswalkError::ConfigValidation(_))
        ));
    }

    #[test]
    fn reject_bridge_into_other_vocabulary() {
        let input = format!("{BASIC}{}", BRIDGE.replace("to   = \"isco08\"", "to   = \"isco88b\""));
        assert!(matches!(
            CrosswalkConfig::from_toml(&input),
            Err(CrosswalkError::VocabularyMismatch { .. })
        ));
    }

    #[test]
    fn reject_bad_width() {
        let input = BASIC.replace("width = 4", "width = 12");
        let err = CrosswalkConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("codes.width"));
    }

    #[test]
    fn reject_bad_coverage_threshold() {
        let input = format!("{BASIC}\n[validation]\nmin_coverage = 1.5\n");
        assert!(CrosswalkConfig::from_toml(&input).is_err());
    }

    #[test]
    fn reject_unknown_policy() {
        let input = format!("{BASIC}\n[imputation]\npolicy = \"hot_deck\"\n");
        assert!(matches!(
            CrosswalkConfig::from_toml(&input),
            Err(CrosswalkError::ConfigParse(_))
        ));
    }

    #[test]
    fn concordance_level_must_be_coarser() {
        let ok = format!("{BASIC}\n[concordance]\ncoarse_level = 2\n");
        let config = CrosswalkConfig::from_toml(&ok).unwrap();
        let c = config.concordance.as_ref().unwrap();
        assert_eq!(c.threshold, 0.05);
        assert_eq!(
            config.coarse_cascade(c.coarse_level).unwrap().labels(),
            vec!["exact-L2", "exact-L1"]
        );

        let bad = format!("{BASIC}\n[concordance]\ncoarse_level = 4\n");
        assert!(CrosswalkConfig::from_toml(&bad).is_err());
    }

    #[test]
    fn parse_target_filter_and_attributes() {
        let input = BASIC.replace(
            "[target]\nfile = \"panel.csv\"\n",
            "[target]\nfile = \"panel.csv\"\nattributes = [\"uf\", \"sexo\"]\n\n[target.filter]\ncolumn = \"ocupado\"\nvalues = [\"1\"]\n",
        );
        let config = CrosswalkConfig::from_toml(&input).unwrap();
        assert_eq!(config.target.attributes.as_ref().unwrap().len(), 2);
        assert_eq!(config.target.filter.as_ref().unwrap().values, vec!["1"]);
    }

    #[test]
    fn reject_missing_required_table() {
        let input = "name = \"x\"\n[target]\nfile = \"a.csv\"\n[target.columns]\ncode = \"c\"\nweight = \"w\"\n";
        assert!(matches!(
            CrosswalkConfig::from_toml(input),
            Err(CrosswalkError::ConfigParse(_))
        ));
    }
}
