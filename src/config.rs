//! Engine configuration.
//!
//! Read from a TOML file; every section is optional and falls back to the
//! defaults below.
//!
//! ```toml
//! [scoring]
//! alpha = 0.01
//!
//! [measurements]
//! significance_threshold = 0.05
//!
//! [measurements.columns]
//! accession = "Proteins"
//! modified_sequence = "Modified sequence"
//! p_value = "PEP"
//! value = "Intensity"
//!
//! [reduction]
//! weight = "support"
//!
//! [sampling]
//! seed = 42
//! progress_interval = 10000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use crate::model::WeightType;
use crate::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub traversal: TraversalConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub measurements: MeasurementConfig,
    #[serde(default)]
    pub reduction: ReductionConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraversalConfig {
    /// Hop limit for report traversals. `None` walks the whole reachable set.
    #[serde(default)]
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Enrichment p-values below this are flagged significant.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { alpha: default_alpha() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// Measurement p-values below this mark a protein significant.
    #[serde(default = "default_alpha")]
    pub significance_threshold: f64,
    #[serde(default)]
    pub columns: ColumnNames,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            significance_threshold: default_alpha(),
            columns: ColumnNames::default(),
        }
    }
}

/// Header names of the measurement file, matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNames {
    #[serde(default = "default_accession_column")]
    pub accession: String,
    #[serde(default = "default_sequence_column")]
    pub modified_sequence: String,
    #[serde(default = "default_p_value_column")]
    pub p_value: String,
    #[serde(default = "default_value_column")]
    pub value: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            accession: default_accession_column(),
            modified_sequence: default_sequence_column(),
            p_value: default_p_value_column(),
            value: default_value_column(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReductionConfig {
    /// Edge weighting for the minimal connection network. `None` counts hops.
    #[serde(default)]
    pub weight: Option<WeightType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Fixed RNG seed for reproducible null distributions.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Log progress every this many repetitions.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { seed: None, progress_interval: default_progress_interval() }
    }
}

fn default_alpha() -> f64 { 0.05 }
fn default_progress_interval() -> u64 { 1_000 }
fn default_accession_column() -> String { "accession".to_string() }
fn default_sequence_column() -> String { "modified_sequence".to_string() }
fn default_p_value_column() -> String { "p_value".to_string() }
fn default_value_column() -> String { "value".to_string() }

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        let in_unit = |v: f64| v > 0.0 && v < 1.0;
        if !in_unit(self.scoring.alpha) {
            return Err(Error::Config(format!(
                "scoring.alpha must lie in (0, 1), got {}",
                self.scoring.alpha
            )));
        }
        if !in_unit(self.measurements.significance_threshold) {
            return Err(Error::Config(format!(
                "measurements.significance_threshold must lie in (0, 1), got {}",
                self.measurements.significance_threshold
            )));
        }
        if self.sampling.progress_interval == 0 {
            return Err(Error::Config("sampling.progress_interval must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.scoring.alpha, 0.05);
        assert_eq!(config.reduction.weight, None);
        assert_eq!(config.measurements.columns, ColumnNames::default());
        assert_eq!(config.sampling.progress_interval, 1_000);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [scoring]
            alpha = 0.01

            [measurements.columns]
            accession = "Proteins"

            [reduction]
            weight = "support"

            [sampling]
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.scoring.alpha, 0.01);
        assert_eq!(config.measurements.columns.accession, "Proteins");
        assert_eq!(config.measurements.columns.value, "value");
        assert_eq!(config.reduction.weight, Some(WeightType::Support));
        assert_eq!(config.sampling.seed, Some(7));
    }

    #[test]
    fn test_out_of_range_alpha_rejected() {
        let err = EngineConfig::from_toml_str("[scoring]\nalpha = 1.5\n").unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("1.5")));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        assert!(matches!(EngineConfig::from_toml_str("[scoring"), Err(Error::Config(_))));
    }
}
