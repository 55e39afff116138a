//! # Pathway Graph Model
//!
//! Plain DTOs for the annotated interaction network.
//! These types cross every boundary: storage ↔ engines ↔ reports.
//!
//! This module is pure data — no I/O, no state, no async.

pub mod node;
pub mod relationship;
pub mod path;
pub mod subgraph;
pub mod value;
pub mod property_map;
pub mod measurement;

pub use node::{
    Node, NodeId, NodeKind, NodeStatus,
    ACCESSION_KEY, NAME_KEY, SPECIES_KEY, STATUS_KEY,
};
pub use relationship::{Relationship, RelId, Direction};
pub use path::{Path, PathResult};
pub use subgraph::Subgraph;
pub use value::Value;
pub use property_map::{PropertyMap, props};
pub use measurement::{Annotation, Measurement, MeasurementField, WeightType};
