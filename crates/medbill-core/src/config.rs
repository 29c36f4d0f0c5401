//! Detection configuration
//!
//! Scoring weights and thresholds are tunable rather than fixed: they were
//! picked against a handful of real exports and should be revisited as more
//! sample files turn up.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. An explicit path (`--config`), or the override in the data dir
//!    (~/.local/share/medbill/config/detection.toml)
//! 2. Fall back to embedded defaults (compiled into binary)

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{CanonicalField, FormatId};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/detection.toml");

/// Upper bound for field weights
const MAX_WEIGHT: f64 = 1000.0;

/// Header aliases added to one field of one format
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraAliases {
    pub format_id: FormatId,
    pub field: CanonicalField,
    pub aliases: Vec<String>,
}

/// Detector tuning parameters
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionConfig {
    /// Minimum confidence (0-100) for a format to be accepted
    pub confidence_threshold: f64,
    /// Score of a matched required field
    pub required_weight: f64,
    /// Score of a matched optional field
    pub optional_weight: f64,
    /// Multiplier applied to the weight of a fuzzy match
    pub fuzzy_factor: f64,
    /// Minimum normalized Levenshtein similarity for a fuzzy match
    pub fuzzy_similarity: f64,
    /// Data rows used for value-shape refinement
    pub sample_rows: usize,
    /// Confidence removed when every checked column disagrees with its type
    pub shape_penalty: f64,
    pub extra_aliases: Vec<ExtraAliases>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 50.0,
            required_weight: 2.0,
            optional_weight: 1.0,
            fuzzy_factor: 0.5,
            fuzzy_similarity: 0.85,
            sample_rows: 5,
            shape_penalty: 10.0,
            extra_aliases: Vec::new(),
        }
    }
}

impl DetectionConfig {
    /// Load from `path`, else the data dir override, else the embedded defaults
    ///
    /// An explicit path that does not exist is an error; a missing data dir
    /// override is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let content = match path {
            Some(path) => read_config(path)?,
            None => match default_config_path() {
                Some(default_path) if default_path.exists() => read_config(&default_path)?,
                _ => DEFAULT_CONFIG.to_string(),
            },
        };

        parse_config(&content)
    }

    /// The embedded defaults
    pub fn embedded() -> Result<Self> {
        parse_config(DEFAULT_CONFIG)
    }

    /// Parse config from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }

    fn validate(&self) -> Result<()> {
        let floats = [
            ("confidence_threshold", self.confidence_threshold),
            ("required_weight", self.required_weight),
            ("optional_weight", self.optional_weight),
            ("fuzzy_factor", self.fuzzy_factor),
            ("fuzzy_similarity", self.fuzzy_similarity),
            ("shape_penalty", self.shape_penalty),
        ];
        if let Some((name, value)) = floats.iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::Config(format!(
                "{} must be a finite number, got {}",
                name, value
            )));
        }

        if !(0.0..=100.0).contains(&self.confidence_threshold) {
            return Err(Error::Config(format!(
                "confidence_threshold must be within 0-100, got {}",
                self.confidence_threshold
            )));
        }
        for (name, weight) in [
            ("required_weight", self.required_weight),
            ("optional_weight", self.optional_weight),
        ] {
            if weight <= 0.0 || weight > MAX_WEIGHT {
                return Err(Error::Config(format!(
                    "{} must be within (0, {}], got {}",
                    name, MAX_WEIGHT, weight
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.fuzzy_factor) {
            return Err(Error::Config(format!(
                "fuzzy_factor must be within 0-1, got {}",
                self.fuzzy_factor
            )));
        }
        if !(0.0..=1.0).contains(&self.fuzzy_similarity) {
            return Err(Error::Config(format!(
                "fuzzy_similarity must be within 0-1, got {}",
                self.fuzzy_similarity
            )));
        }
        if !(0.0..=100.0).contains(&self.shape_penalty) {
            return Err(Error::Config(format!(
                "shape_penalty must be within 0-100, got {}",
                self.shape_penalty
            )));
        }
        Ok(())
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("medbill").join("config").join("detection.toml"))
}

fn read_config(path: &Path) -> Result<String> {
    debug!("Reading detection config from {}", path.display());
    fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    detection: Option<RawDetection>,
    aliases: Option<BTreeMap<String, BTreeMap<String, Vec<String>>>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDetection {
    confidence_threshold: Option<f64>,
    required_weight: Option<f64>,
    optional_weight: Option<f64>,
    fuzzy_factor: Option<f64>,
    fuzzy_similarity: Option<f64>,
    sample_rows: Option<usize>,
    shape_penalty: Option<f64>,
}

fn parse_config(content: &str) -> Result<DetectionConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = DetectionConfig::default();

    if let Some(detection) = raw.detection {
        if let Some(threshold) = detection.confidence_threshold {
            config.confidence_threshold = threshold;
        }
        if let Some(weight) = detection.required_weight {
            config.required_weight = weight;
        }
        if let Some(weight) = detection.optional_weight {
            config.optional_weight = weight;
        }
        if let Some(factor) = detection.fuzzy_factor {
            config.fuzzy_factor = factor;
        }
        if let Some(similarity) = detection.fuzzy_similarity {
            config.fuzzy_similarity = similarity;
        }
        if let Some(rows) = detection.sample_rows {
            config.sample_rows = rows;
        }
        if let Some(penalty) = detection.shape_penalty {
            config.shape_penalty = penalty;
        }
    }

    if let Some(formats) = raw.aliases {
        for (format_name, fields) in formats {
            let format_id: FormatId = format_name.parse().map_err(Error::Config)?;
            for (field_name, aliases) in fields {
                let field: CanonicalField = field_name.parse().map_err(Error::Config)?;
                config.extra_aliases.push(ExtraAliases {
                    format_id,
                    field,
                    aliases,
                });
            }
        }
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_config() {
        let config = DetectionConfig::embedded().unwrap();
        assert_eq!(config, DetectionConfig::default());
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = DetectionConfig::from_toml(
            r#"
            [detection]
            confidence_threshold = 70.0
            sample_rows = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.confidence_threshold, 70.0);
        assert_eq!(config.sample_rows, 10);
        assert_eq!(config.required_weight, 2.0);
        assert_eq!(config.fuzzy_factor, 0.5);
    }

    #[test]
    fn test_extra_aliases() {
        let config = DetectionConfig::from_toml(
            r#"
            [aliases.insurance_claims]
            cash_applied = ["amount applied", "applied"]

            [aliases.practice_expenses]
            provider = ["clinic"]
            "#,
        )
        .unwrap();

        assert_eq!(config.extra_aliases.len(), 2);
        let insurance = config
            .extra_aliases
            .iter()
            .find(|a| a.format_id == FormatId::InsuranceClaims)
            .unwrap();
        assert_eq!(insurance.field, CanonicalField::CashApplied);
        assert_eq!(insurance.aliases, vec!["amount applied", "applied"]);
    }

    #[test]
    fn test_unknown_alias_targets_rejected() {
        let err = DetectionConfig::from_toml("[aliases.payroll]\namount = [\"x\"]").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err =
            DetectionConfig::from_toml("[aliases.insurance_claims]\nwhen = [\"x\"]").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        assert!(DetectionConfig::from_toml("[detection]\nconfidence_threshold = 150.0").is_err());
        assert!(DetectionConfig::from_toml("[detection]\nrequired_weight = 0.0").is_err());
        assert!(DetectionConfig::from_toml("[detection]\nfuzzy_factor = 2.0").is_err());
        assert!(DetectionConfig::from_toml("[detection]\nthreshold = 1.0").is_err());
        assert!(DetectionConfig::from_toml("[detection]\noptional_weight = 5000.0").is_err());
        assert!(DetectionConfig::from_toml("[detection]\nshape_penalty = 500.0").is_err());
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let keys = [
            "confidence_threshold",
            "required_weight",
            "optional_weight",
            "fuzzy_factor",
            "fuzzy_similarity",
            "shape_penalty",
        ];
        for key in keys {
            for value in ["nan", "inf", "-inf"] {
                let content = format!("[detection]\n{} = {}", key, value);
                let result = DetectionConfig::from_toml(&content);
                assert!(
                    matches!(result, Err(Error::Config(_))),
                    "{} = {} should be rejected",
                    key,
                    value
                );
            }
        }
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detection.toml");
        fs::write(&path, "[detection]\nshape_penalty = 25.0\n").unwrap();

        let config = DetectionConfig::load(Some(&path)).unwrap();
        assert_eq!(config.shape_penalty, 25.0);

        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            DetectionConfig::load(Some(&missing)),
            Err(Error::Config(_))
        ));
    }
}
