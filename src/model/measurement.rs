//! Experiment-scoped measurements and the property keys they live under.
//!
//! A node can hold independent measurement sets for many experiments. Each
//! field is stored as its own property named `<field>_<experiment>`, so
//! "not measured in experiment X" is simply the absence of the key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use super::{PropertyMap, Value};
use crate::{Error, Result};

/// The measurement fields a node can carry per experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasurementField {
    Abundance,
    Support,
    PValue,
    Significant,
}

impl MeasurementField {
    pub fn name(&self) -> &'static str {
        match self {
            MeasurementField::Abundance => "abundance",
            MeasurementField::Support => "support",
            MeasurementField::PValue => "pValue",
            MeasurementField::Significant => "significant",
        }
    }

    /// Property key for this field in `experiment`.
    pub fn key(&self, experiment: &str) -> String {
        format!("{}_{}", self.name(), experiment)
    }
}

/// Derived annotations written back by the engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Annotation {
    /// Neighbourhood enrichment p-value.
    EnrichmentPValue,
    /// Neighbourhood enrichment flag at the configured alpha.
    EnrichmentSignificant,
    /// Membership in the minimal connection network.
    MinimalNetwork,
}

impl Annotation {
    pub fn key(&self, experiment: &str) -> String {
        let prefix = match self {
            Annotation::EnrichmentPValue => "enrichment_pValue",
            Annotation::EnrichmentSignificant => "enrichment_significant",
            Annotation::MinimalNetwork => "mcn",
        };
        format!("{prefix}_{experiment}")
    }
}

/// One experiment's measurements on a node. Every field is optional.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Measurement {
    pub abundance: Option<f64>,
    pub support: Option<f64>,
    pub p_value: Option<f64>,
    pub significant: Option<bool>,
}

impl Measurement {
    /// Read the measurement set for `experiment`. Returns `None` when no
    /// field for that experiment is present.
    pub fn from_properties(props: &PropertyMap, experiment: &str) -> Option<Self> {
        let float = |field: MeasurementField| props.get(&field.key(experiment)).and_then(Value::as_float);
        let m = Measurement {
            abundance: float(MeasurementField::Abundance),
            support: float(MeasurementField::Support),
            p_value: float(MeasurementField::PValue),
            significant: props
                .get(&MeasurementField::Significant.key(experiment))
                .and_then(Value::as_bool),
        };
        if m.is_empty() { None } else { Some(m) }
    }

    pub fn is_empty(&self) -> bool {
        self.abundance.is_none()
            && self.support.is_none()
            && self.p_value.is_none()
            && self.significant.is_none()
    }

    /// Property writes for the fields that are present.
    pub fn to_properties(&self, experiment: &str) -> Vec<(String, Value)> {
        let mut out = Vec::with_capacity(4);
        if let Some(v) = self.abundance {
            out.push((MeasurementField::Abundance.key(experiment), Value::Float(v)));
        }
        if let Some(v) = self.support {
            out.push((MeasurementField::Support.key(experiment), Value::Float(v)));
        }
        if let Some(v) = self.p_value {
            out.push((MeasurementField::PValue.key(experiment), Value::Float(v)));
        }
        if let Some(v) = self.significant {
            out.push((MeasurementField::Significant.key(experiment), Value::Bool(v)));
        }
        out
    }
}

/// Which measurement drives edge weights in pathfinding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightType {
    Abundance,
    Support,
}

impl WeightType {
    pub fn field(&self) -> MeasurementField {
        match self {
            WeightType::Abundance => MeasurementField::Abundance,
            WeightType::Support => MeasurementField::Support,
        }
    }
}

impl fmt::Display for WeightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightType::Abundance => f.write_str("Abundance"),
            WeightType::Support => f.write_str("Support"),
        }
    }
}

impl FromStr for WeightType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "abundance" | "a" => Ok(WeightType::Abundance),
            "support" | "s" => Ok(WeightType::Support),
            _ => Err(Error::InvalidArgument(format!(
                "weight type must equal 'Abundance' or 'Support', got '{s}'"
            ))),
        }
    }
}
