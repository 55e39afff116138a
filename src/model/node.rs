//! Node in the pathway graph.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use super::{Measurement, MeasurementField, PropertyMap, Value};

/// Property holding a protein's external accession (UniProt-style).
pub const ACCESSION_KEY: &str = "accession";
/// Property holding the human-readable name.
pub const NAME_KEY: &str = "name";
/// Property holding the reconciliation status.
pub const STATUS_KEY: &str = "status";
/// Property holding the organism a node belongs to.
pub const SPECIES_KEY: &str = "species";

/// Opaque node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of entity types a pathway graph holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Protein,
    Phosphosite,
    Reaction,
    Pathway,
    Complex,
    SmallMolecule,
    Other,
}

impl NodeKind {
    pub const ALL: [NodeKind; 7] = [
        NodeKind::Protein,
        NodeKind::Phosphosite,
        NodeKind::Reaction,
        NodeKind::Pathway,
        NodeKind::Complex,
        NodeKind::SmallMolecule,
        NodeKind::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Protein => "Protein",
            NodeKind::Phosphosite => "Phosphosite",
            NodeKind::Reaction => "Reaction",
            NodeKind::Pathway => "Pathway",
            NodeKind::Complex => "Complex",
            NodeKind::SmallMolecule => "SmallMolecule",
            NodeKind::Other => "Other",
        }
    }

    /// Only proteins carry a stable external accession.
    pub fn has_accession(&self) -> bool {
        matches!(self, NodeKind::Protein)
    }

    /// Kinds that experiment measurements can be attached to.
    pub fn has_measurements(&self) -> bool {
        matches!(self, NodeKind::Protein | NodeKind::Phosphosite)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for NodeKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        NodeKind::ALL
            .into_iter()
            .find(|k| k.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::Error::InvalidArgument(format!("unknown node kind '{s}'")))
    }
}

/// Identifier reconciliation status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    Current,
    Updated,
    Deleted,
}

impl NodeStatus {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "current" => Some(NodeStatus::Current),
            "updated" => Some(NodeStatus::Updated),
            "deleted" | "deleted?" => Some(NodeStatus::Deleted),
            _ => None,
        }
    }
}

/// A node in the pathway graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub properties: PropertyMap,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            properties: PropertyMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// External accession, only for kinds that carry one.
    pub fn accession(&self) -> Option<&str> {
        if !self.kind.has_accession() {
            return None;
        }
        self.get(ACCESSION_KEY).and_then(Value::as_str)
    }

    /// Name for reports: `name`, else accession, else the internal ID.
    pub fn display_name(&self) -> String {
        self.get(NAME_KEY)
            .and_then(Value::as_str)
            .or_else(|| self.accession())
            .map(str::to_owned)
            .unwrap_or_else(|| self.id.to_string())
    }

    /// Short identifier for tables: accession when present, else the
    /// internal ID.
    pub fn label(&self) -> String {
        self.accession().map(str::to_owned).unwrap_or_else(|| self.id.to_string())
    }

    /// Nodes without an explicit status are treated as current.
    pub fn status(&self) -> NodeStatus {
        self.get(STATUS_KEY)
            .and_then(Value::as_str)
            .and_then(NodeStatus::parse)
            .unwrap_or(NodeStatus::Current)
    }

    pub fn species(&self) -> Option<&str> {
        self.get(SPECIES_KEY).and_then(Value::as_str)
    }

    /// Measurement set for `experiment`, `None` when nothing was measured.
    pub fn measurement(&self, experiment: &str) -> Option<Measurement> {
        if !self.kind.has_measurements() {
            return None;
        }
        Measurement::from_properties(&self.properties, experiment)
    }

    /// Whether the node carries the significance flag for `experiment`.
    pub fn is_significant(&self, experiment: &str) -> bool {
        self.kind.has_measurements()
            && self
                .get(&MeasurementField::Significant.key(experiment))
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }
}
