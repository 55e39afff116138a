//! Minimal connection network.
//!
//! Connects every node flagged significant in an experiment with a small
//! subnetwork. Finding the minimum Steiner tree is NP-hard, so the reducer
//! grows a tree greedily instead:
//!
//! 1. Start the tree at the lowest-ID terminal.
//! 2. Find the terminal nearest to any tree node (multi-source Dijkstra,
//!    edges taken in either direction) and add that path to the tree.
//!    Shared edges are merged, and terminals lying on the path are done.
//! 3. Repeat until every terminal is in the tree. A terminal that cannot be
//!    reached seeds a new component.
//!
//! The result connects all mutually reachable terminals. Its size is within
//! a factor of two of the optimum Steiner tree on each component.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::model::*;
use crate::pathfinding::{EdgeCost, PathfindingEngine};
use crate::storage::StorageBackend;
use crate::tx::TxMode;
use crate::{Error, Result};

/// Builds and annotates minimal connection networks.
pub struct NetworkReducer<'b, B: StorageBackend> {
    backend: &'b B,
    cost: EdgeCost,
}

impl<'b, B: StorageBackend> NetworkReducer<'b, B> {
    /// Reducer pricing every edge at one hop.
    pub fn new(backend: &'b B) -> Self {
        Self { backend, cost: EdgeCost::Hops }
    }

    /// Price edges from a measurement instead of hop count.
    pub fn with_weight(mut self, weight: Option<WeightType>) -> Self {
        self.cost = weight.map_or(EdgeCost::Hops, EdgeCost::Weighted);
        self
    }

    /// Build the network for `experiment` and mark its members with the
    /// `mcn_<experiment>` annotation.
    pub async fn minimal_connection_network(&self, experiment: &str) -> Result<Subgraph> {
        let tx = self.backend.begin_tx(TxMode::ReadOnly).await?;
        let built = self.build(&tx, experiment).await;
        self.backend.commit_tx(tx).await?;
        let subgraph = built?;

        self.persist(&subgraph).await?;
        info!(
            experiment,
            terminals = subgraph.terminals.len(),
            nodes = subgraph.node_count(),
            edges = subgraph.relationships.len(),
            components = subgraph.components,
            "minimal connection network built"
        );
        Ok(subgraph)
    }

    async fn build(&self, tx: &B::Tx, experiment: &str) -> Result<Subgraph> {
        let terminals: Vec<Node> = self
            .backend
            .all_nodes(tx)
            .await?
            .into_iter()
            .filter(|n| n.is_significant(experiment))
            .collect();
        if terminals.is_empty() {
            return Err(Error::EmptyTerminalSet(experiment.to_owned()));
        }

        let pathfinder = PathfindingEngine::new(self.backend);
        let mut subgraph = Subgraph::new(experiment);
        subgraph.terminals = terminals.iter().map(|n| n.id).collect();

        let mut remaining: BTreeSet<NodeId> = subgraph.terminals.iter().copied().collect();
        let mut tree: BTreeSet<NodeId> = BTreeSet::new();

        for terminal in terminals {
            if !remaining.contains(&terminal.id) {
                continue;
            }
            // Either the very first terminal or one no earlier search reached.
            remaining.remove(&terminal.id);
            tree.insert(terminal.id);
            subgraph.add_node(terminal);
            subgraph.components += 1;

            while !remaining.is_empty() {
                let found = pathfinder
                    .nearest(tx, &tree, &remaining, self.cost, Direction::Both, experiment)
                    .await?;
                let Some(found) = found else {
                    break;
                };
                debug!(
                    hops = found.path.len(),
                    cost = found.total_cost,
                    "joined terminal to tree"
                );
                for node in found.path.nodes {
                    remaining.remove(&node.id);
                    tree.insert(node.id);
                    subgraph.add_node(node);
                }
                for rel in found.path.relationships {
                    subgraph.add_relationship(rel);
                }
            }
        }

        if subgraph.components > 1 {
            warn!(
                experiment,
                components = subgraph.components,
                "significant nodes fall into disconnected components"
            );
        }
        Ok(subgraph)
    }

    /// Finalize phase: one write transaction for every annotation.
    async fn persist(&self, subgraph: &Subgraph) -> Result<()> {
        let key = Annotation::MinimalNetwork.key(&subgraph.experiment);
        let mut tx = self.backend.begin_tx(TxMode::ReadWrite).await?;

        let writes = subgraph
            .nodes
            .keys()
            .map(|id| (*id, key.clone(), Value::Bool(true)))
            .collect();
        let result = async {
            self.backend.set_node_properties_batch(&mut tx, writes).await?;
            for rel in &subgraph.relationships {
                self.backend
                    .set_relationship_property(&mut tx, rel.id, &key, Value::Bool(true))
                    .await?;
            }
            Ok::<_, Error>(())
        }
        .await;

        match result {
            Ok(()) => self.backend.commit_tx(tx).await,
            Err(e) => {
                self.backend.rollback_tx(tx).await?;
                Err(e)
            }
        }
    }
}
