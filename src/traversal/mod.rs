//! Directional neighbourhood traversal and report generation.
//!
//! A traversal is a breadth-first walk from a seed node. `downstream`
//! follows edges in their natural direction, `upstream` follows them in
//! reverse. Each node is reported once at the depth it was first reached;
//! each edge is reported once at the hop on which it was walked.
//!
//! Ordering is deterministic: a node's edges are expanded in ascending
//! relationship ID, and nodes at equal depth keep discovery order.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::*;
use crate::storage::{resolve_node, StorageBackend};
use crate::tx::TxMode;
use crate::{Error, Result};

// ============================================================================
// Direction
// ============================================================================

/// Which way a report traversal walks from its seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraversalDirection {
    Upstream,
    Downstream,
}

impl TraversalDirection {
    /// Edge direction to follow from the current node.
    pub fn edge_direction(&self) -> Direction {
        match self {
            TraversalDirection::Downstream => Direction::Outgoing,
            TraversalDirection::Upstream => Direction::Incoming,
        }
    }
}

impl fmt::Display for TraversalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraversalDirection::Upstream => f.write_str("upstream"),
            TraversalDirection::Downstream => f.write_str("downstream"),
        }
    }
}

impl FromStr for TraversalDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "upstream" => Ok(TraversalDirection::Upstream),
            "downstream" => Ok(TraversalDirection::Downstream),
            _ => Err(Error::InvalidArgument(format!(
                "direction must equal 'upstream' or 'downstream', got '{s}'"
            ))),
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// One row of the node table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    pub node_id: NodeId,
    pub accession: Option<String>,
    pub name: String,
    pub kind: NodeKind,
    pub depth: usize,
    /// `None` when the node has no measurement for the experiment.
    pub measurement: Option<Measurement>,
}

/// One row of the edge table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeReport {
    pub depth: usize,
    pub rel_id: RelId,
    pub rel_type: String,
    pub source: NodeId,
    pub target: NodeId,
    /// Accession of the source if it has one, else its internal ID.
    pub source_label: String,
    pub target_label: String,
}

/// Both tables produced by one traversal, seed first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalReport {
    pub seed: NodeId,
    pub direction: TraversalDirection,
    pub experiment: String,
    pub nodes: Vec<NodeReport>,
    pub edges: Vec<EdgeReport>,
}

// ============================================================================
// Breadth-first walk
// ============================================================================

/// Raw result of a breadth-first walk.
#[derive(Debug, Clone)]
pub(crate) struct Walk {
    /// Visited nodes with their first-reached depth, seed first.
    pub visits: Vec<(Node, usize)>,
    /// Walked relationships with the hop they were walked on.
    pub edges: Vec<(usize, Relationship)>,
}

impl Walk {
    /// Visited nodes other than the seed.
    pub fn neighbours(&self) -> impl Iterator<Item = &(Node, usize)> {
        self.visits.iter().skip(1)
    }
}

/// Breadth-first walk from `seed` following `dir`, stopping at `max_depth`
/// hops when given. Reads only through `tx`.
pub(crate) async fn walk<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    seed: Node,
    dir: Direction,
    max_depth: Option<usize>,
) -> Result<Walk> {
    let mut depth_of: HashMap<NodeId, usize> = HashMap::new();
    let mut seen_edges: HashSet<RelId> = HashSet::new();
    let mut visits = Vec::new();
    let mut edges = Vec::new();
    let mut queue = VecDeque::new();

    depth_of.insert(seed.id, 0);
    visits.push((seed.clone(), 0));
    queue.push_back((seed.id, 0usize));

    while let Some((current, depth)) = queue.pop_front() {
        if max_depth.is_some_and(|limit| depth >= limit) {
            continue;
        }

        let mut rels = backend.get_relationships(tx, current, dir, None).await?;
        rels.sort_by_key(|r| r.id);

        for rel in rels {
            if !seen_edges.insert(rel.id) {
                continue;
            }
            let Some(next) = rel.step_from(current, dir) else {
                continue;
            };
            edges.push((depth + 1, rel));

            if depth_of.contains_key(&next) {
                continue;
            }
            let node = backend.get_node(tx, next).await?.ok_or_else(|| {
                Error::StorageError(format!("relationship points at missing node {next}"))
            })?;
            depth_of.insert(next, depth + 1);
            visits.push((node, depth + 1));
            queue.push_back((next, depth + 1));
        }
    }

    Ok(Walk { visits, edges })
}

// ============================================================================
// TraversalEngine
// ============================================================================

/// Builds node and edge reports for seed-rooted traversals.
pub struct TraversalEngine<'b, B: StorageBackend> {
    backend: &'b B,
    max_depth: Option<usize>,
}

impl<'b, B: StorageBackend> TraversalEngine<'b, B> {
    pub fn new(backend: &'b B) -> Self {
        Self { backend, max_depth: None }
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Traverse from `seed` (accession or internal ID) in `direction`
    /// (`"upstream"` or `"downstream"`, any case).
    pub async fn traverse(&self, seed: &str, direction: &str, experiment: &str) -> Result<TraversalReport> {
        let direction: TraversalDirection = direction.parse()?;
        self.traverse_with(seed, direction, experiment).await
    }

    pub async fn traverse_with(
        &self,
        seed: &str,
        direction: TraversalDirection,
        experiment: &str,
    ) -> Result<TraversalReport> {
        let tx = self.backend.begin_tx(TxMode::ReadOnly).await?;
        let report = self.traverse_in(&tx, seed, direction, experiment).await;
        self.backend.commit_tx(tx).await?;
        report
    }

    /// Traverse every seed. The direction is validated once up front; a seed
    /// that fails to resolve yields an `Err` entry without stopping the rest.
    pub async fn traverse_batch(
        &self,
        seeds: &[&str],
        direction: &str,
        experiment: &str,
    ) -> Result<Vec<Result<TraversalReport>>> {
        let direction: TraversalDirection = direction.parse()?;
        let tx = self.backend.begin_tx(TxMode::ReadOnly).await?;
        let mut reports = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let report = self.traverse_in(&tx, seed, direction, experiment).await;
            if let Err(e) = &report {
                debug!(seed, error = %e, "traversal skipped");
            }
            reports.push(report);
        }
        self.backend.commit_tx(tx).await?;
        Ok(reports)
    }

    async fn traverse_in(
        &self,
        tx: &B::Tx,
        seed: &str,
        direction: TraversalDirection,
        experiment: &str,
    ) -> Result<TraversalReport> {
        let seed_node = resolve_node(self.backend, tx, seed).await?;
        let seed_id = seed_node.id;
        let walk = walk(self.backend, tx, seed_node, direction.edge_direction(), self.max_depth).await?;

        let labels: HashMap<NodeId, String> = walk
            .visits
            .iter()
            .map(|(node, _)| (node.id, node.label()))
            .collect();
        let label_of = |id: NodeId| labels.get(&id).cloned().unwrap_or_else(|| id.to_string());

        let nodes = walk
            .visits
            .iter()
            .map(|(node, depth)| NodeReport {
                node_id: node.id,
                accession: node.accession().map(str::to_owned),
                name: node.display_name(),
                kind: node.kind,
                depth: *depth,
                measurement: node.measurement(experiment),
            })
            .collect::<Vec<_>>();

        let edges = walk
            .edges
            .iter()
            .map(|(depth, rel)| EdgeReport {
                depth: *depth,
                rel_id: rel.id,
                rel_type: rel.rel_type.clone(),
                source: rel.src,
                target: rel.dst,
                source_label: label_of(rel.src),
                target_label: label_of(rel.dst),
            })
            .collect::<Vec<_>>();

        debug!(
            seed,
            %direction,
            nodes = nodes.len(),
            edges = edges.len(),
            "traversal complete"
        );

        Ok(TraversalReport {
            seed: seed_id,
            direction,
            experiment: experiment.to_owned(),
            nodes,
            edges,
        })
    }
}
