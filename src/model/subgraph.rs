//! Subgraph — a node/edge set cut out of the full graph.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use super::{Node, NodeId, Relationship};

/// A reduced network produced for one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub experiment: String,
    /// Terminal nodes the subgraph was built to connect, ascending ID.
    pub terminals: Vec<NodeId>,
    /// Member nodes keyed by ID.
    pub nodes: BTreeMap<NodeId, Node>,
    /// Member relationships, ascending ID, no duplicates.
    pub relationships: Vec<Relationship>,
    /// Number of disconnected pieces the terminals fell into.
    pub components: usize,
}

impl Subgraph {
    pub fn new(experiment: impl Into<String>) -> Self {
        Self {
            experiment: experiment.into(),
            terminals: Vec::new(),
            nodes: BTreeMap::new(),
            relationships: Vec::new(),
            components: 0,
        }
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Insert a node unless already present.
    pub fn add_node(&mut self, node: Node) {
        self.nodes.entry(node.id).or_insert(node);
    }

    /// Insert a relationship unless already present. Keeps ID order.
    pub fn add_relationship(&mut self, rel: Relationship) {
        if let Err(pos) = self.relationships.binary_search_by_key(&rel.id, |r| r.id) {
            self.relationships.insert(pos, rel);
        }
    }

    /// Whether every terminal reaches every other terminal through the
    /// member relationships, ignoring edge direction.
    pub fn connects_terminals(&self) -> bool {
        let Some(&first) = self.terminals.first() else {
            return true;
        };
        let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for rel in &self.relationships {
            adjacency.entry(rel.src).or_default().push(rel.dst);
            adjacency.entry(rel.dst).or_default().push(rel.src);
        }

        let mut seen = BTreeSet::from([first]);
        let mut queue = VecDeque::from([first]);
        while let Some(id) = queue.pop_front() {
            for next in adjacency.get(&id).into_iter().flatten() {
                if seen.insert(*next) {
                    queue.push_back(*next);
                }
            }
        }
        self.terminals.iter().all(|t| seen.contains(t))
    }
}
