//! Weighted shortest paths.
//!
//! Dijkstra over the directed graph, with edge costs derived from one
//! experiment's measurements so that the best supported route is the
//! cheapest one. The weight of an edge is its own measurement property if
//! it carries one, else the measurement of the node it leads into. Edges
//! with no usable measurement are left out of the query.
//!
//! Measurements are turned into costs by a strictly decreasing, always
//! positive transform:
//!
//! ```text
//! cost(v) = 1 / (1 + v)   for v >= 0
//! cost(v) = 1 - v         for v <  0
//! ```
//!
//! Ties are broken deterministically: among equal-cost frontier entries the
//! lowest node ID is settled first, edges are relaxed in ascending
//! relationship ID, and a node's predecessor only changes on a strictly
//! cheaper route, so the first route discovered wins.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::*;
use crate::storage::{resolve_node, StorageBackend};
use crate::tx::TxMode;
use crate::{Error, Result};

/// How an edge is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeCost {
    /// Priced from a measurement of the current experiment.
    Weighted(WeightType),
    /// Every edge costs 1.
    Hops,
}

/// Map a measurement to an edge cost. Non-finite values are unusable.
pub fn measurement_cost(value: f64) -> Option<f64> {
    if !value.is_finite() {
        None
    } else if value >= 0.0 {
        Some(1.0 / (1.0 + value))
    } else {
        Some(1.0 - value)
    }
}

#[derive(Debug, Clone, Copy)]
struct Frontier {
    cost: f64,
    node: NodeId,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    // Reversed so BinaryHeap pops the cheapest entry, lowest ID on ties.
    fn cmp(&self, other: &Self) -> Ordering {
        other.cost.total_cmp(&self.cost).then_with(|| other.node.cmp(&self.node))
    }
}

/// Shortest-path queries over a storage backend.
pub struct PathfindingEngine<'b, B: StorageBackend> {
    backend: &'b B,
}

impl<'b, B: StorageBackend> PathfindingEngine<'b, B> {
    pub fn new(backend: &'b B) -> Self {
        Self { backend }
    }

    /// Cheapest directed path from `start` to `end` (accessions or internal
    /// IDs), weighted by `weight` (`Abundance`/`Support`, or `a`/`s`) as
    /// measured in `experiment`.
    pub async fn shortest_path(
        &self,
        start: &str,
        end: &str,
        weight: &str,
        experiment: &str,
    ) -> Result<PathResult> {
        let weight: WeightType = weight.parse()?;
        let tx = self.backend.begin_tx(TxMode::ReadOnly).await?;
        let result = async {
            let from = resolve_node(self.backend, &tx, start).await?;
            let to = resolve_node(self.backend, &tx, end).await?;
            self.shortest_path_between(
                &tx,
                from.id,
                to.id,
                EdgeCost::Weighted(weight),
                Direction::Outgoing,
                experiment,
            )
            .await
        }
        .await
        .map_err(|e| match e {
            Error::NoPathFound { weight, .. } => Error::NoPathFound {
                start: start.to_owned(),
                end: end.to_owned(),
                weight,
            },
            other => other,
        });
        self.backend.commit_tx(tx).await?;
        result
    }

    /// Cheapest path between two resolved nodes inside an open transaction.
    pub async fn shortest_path_between(
        &self,
        tx: &B::Tx,
        start: NodeId,
        end: NodeId,
        cost: EdgeCost,
        dir: Direction,
        experiment: &str,
    ) -> Result<PathResult> {
        let sources = BTreeSet::from([start]);
        let targets = BTreeSet::from([end]);
        match self.nearest(tx, &sources, &targets, cost, dir, experiment).await? {
            Some(found) => {
                debug!(%start, %end, hops = found.path.len(), cost = found.total_cost, "shortest path found");
                Ok(found)
            }
            None => Err(Error::NoPathFound {
                start: start.to_string(),
                end: end.to_string(),
                weight: match cost {
                    EdgeCost::Weighted(w) => w.to_string(),
                    EdgeCost::Hops => "hops".to_string(),
                },
            }),
        }
    }

    /// Multi-source Dijkstra: the cheapest path from any of `sources` to the
    /// nearest of `targets`, or `None` when no target is reachable.
    pub async fn nearest(
        &self,
        tx: &B::Tx,
        sources: &BTreeSet<NodeId>,
        targets: &BTreeSet<NodeId>,
        cost: EdgeCost,
        dir: Direction,
        experiment: &str,
    ) -> Result<Option<PathResult>> {
        let mut dist: HashMap<NodeId, f64> = HashMap::new();
        let mut prev: HashMap<NodeId, (NodeId, Relationship)> = HashMap::new();
        let mut settled: HashSet<NodeId> = HashSet::new();
        let mut heap = BinaryHeap::new();

        for &source in sources {
            dist.insert(source, 0.0);
            heap.push(Frontier { cost: 0.0, node: source });
        }

        while let Some(Frontier { cost: reached, node }) = heap.pop() {
            if !settled.insert(node) {
                continue;
            }
            if targets.contains(&node) {
                return self.reconstruct(tx, node, reached, &prev).await.map(Some);
            }

            let mut rels = self.backend.get_relationships(tx, node, dir, None).await?;
            rels.sort_by_key(|r| r.id);

            for rel in rels {
                let Some(next) = rel.step_from(node, dir) else {
                    continue;
                };
                if next == node || settled.contains(&next) {
                    continue;
                }
                let Some(step) = self.edge_cost(tx, &rel, next, cost, experiment).await? else {
                    continue;
                };
                let candidate = reached + step;
                if dist.get(&next).is_none_or(|known| candidate < *known) {
                    dist.insert(next, candidate);
                    prev.insert(next, (node, rel));
                    heap.push(Frontier { cost: candidate, node: next });
                }
            }
        }

        Ok(None)
    }

    async fn edge_cost(
        &self,
        tx: &B::Tx,
        rel: &Relationship,
        entered: NodeId,
        cost: EdgeCost,
        experiment: &str,
    ) -> Result<Option<f64>> {
        let weight = match cost {
            EdgeCost::Hops => return Ok(Some(1.0)),
            EdgeCost::Weighted(weight) => weight,
        };
        let key = weight.field().key(experiment);

        let value = match rel.properties.get(&key).and_then(Value::as_float) {
            Some(v) => Some(v),
            None => self
                .backend
                .get_node(tx, entered)
                .await?
                .and_then(|n| n.get(&key).and_then(Value::as_float)),
        };
        Ok(value.and_then(measurement_cost))
    }

    async fn reconstruct(
        &self,
        tx: &B::Tx,
        target: NodeId,
        total_cost: f64,
        prev: &HashMap<NodeId, (NodeId, Relationship)>,
    ) -> Result<PathResult> {
        let mut steps = Vec::new();
        let mut cursor = target;
        while let Some((before, rel)) = prev.get(&cursor) {
            steps.push(rel.clone());
            cursor = *before;
        }
        steps.reverse();

        let mut path = Path::single(self.fetch_node(tx, cursor).await?);
        let mut at = cursor;
        for rel in steps {
            let next = rel.other_node(at).unwrap_or(rel.dst);
            path.append(rel, self.fetch_node(tx, next).await?);
            at = next;
        }

        Ok(PathResult { path, total_cost })
    }

    async fn fetch_node(&self, tx: &B::Tx, id: NodeId) -> Result<Node> {
        self.backend
            .get_node(tx, id)
            .await?
            .ok_or_else(|| Error::StorageError(format!("path node {id} disappeared")))
    }
}
