//! In-memory storage backend.
//!
//! This is the reference implementation of `StorageBackend`.
//!
//! ## Isolation model
//!
//! The committed graph is an immutable `Arc<GraphState>` behind an RwLock.
//! `begin_tx()` clones the `Arc`, so every transaction reads a stable
//! snapshot for its whole lifetime. The first write in a `ReadWrite`
//! transaction copies the snapshot (`Arc::make_mut`); `commit_tx()`
//! publishes that copy if nobody else committed in between, and fails with
//! `TxError` otherwise. `rollback_tx()` just drops the private copy.
//!
//! Concurrent readers never block each other and never observe partial
//! writes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::model::*;
use crate::tx::{Transaction, TxId, TxMode};
use crate::{Error, Result};
use super::StorageBackend;

// ============================================================================
// GraphState
// ============================================================================

#[derive(Debug, Clone)]
struct GraphState {
    nodes: BTreeMap<NodeId, Node>,
    relationships: BTreeMap<RelId, Relationship>,
    /// node_id → relationship IDs touching it, ascending
    adjacency: HashMap<NodeId, Vec<RelId>>,
    /// kind → node IDs, ascending
    kind_index: HashMap<NodeKind, Vec<NodeId>>,
    /// accession → node ID (uniqueness constraint)
    accession_index: HashMap<String, NodeId>,
    next_node_id: u64,
    next_rel_id: u64,
}

impl GraphState {
    fn empty() -> Self {
        Self {
            nodes: BTreeMap::new(),
            relationships: BTreeMap::new(),
            adjacency: HashMap::new(),
            kind_index: HashMap::new(),
            accession_index: HashMap::new(),
            next_node_id: 1,
            next_rel_id: 1,
        }
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))
    }
}

// ============================================================================
// MemoryBackend
// ============================================================================

/// In-memory pathway graph storage.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    /// (version, committed state)
    committed: RwLock<(u64, Arc<GraphState>)>,
    next_tx_id: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                committed: RwLock::new((0, Arc::new(GraphState::empty()))),
                next_tx_id: AtomicU64::new(1),
            }),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// MemoryTx
// ============================================================================

/// In-memory transaction: a snapshot plus a dirty flag.
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
    base_version: u64,
    state: Arc<GraphState>,
    dirty: bool,
}

impl MemoryTx {
    fn writable(&mut self) -> Result<&mut GraphState> {
        if self.mode == TxMode::ReadOnly {
            return Err(Error::TxError(format!(
                "write attempted in read-only transaction {}",
                self.id.0
            )));
        }
        self.dirty = true;
        Ok(Arc::make_mut(&mut self.state))
    }
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode { self.mode }
    fn id(&self) -> TxId { self.id }
}

// ============================================================================
// StorageBackend impl
// ============================================================================

#[async_trait]
impl StorageBackend for MemoryBackend {
    type Tx = MemoryTx;

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed));
        let (version, state) = {
            let guard = self.inner.committed.read();
            (guard.0, Arc::clone(&guard.1))
        };
        Ok(MemoryTx { id, mode, base_version: version, state, dirty: false })
    }

    async fn commit_tx(&self, tx: MemoryTx) -> Result<()> {
        if !tx.dirty {
            return Ok(());
        }
        let mut guard = self.inner.committed.write();
        if guard.0 != tx.base_version {
            return Err(Error::TxError(format!(
                "transaction {} conflicts with a concurrent commit (base version {}, current {})",
                tx.id.0, tx.base_version, guard.0
            )));
        }
        let next_version = guard.0 + 1;
        *guard = (next_version, tx.state);
        Ok(())
    }

    async fn rollback_tx(&self, _tx: MemoryTx) -> Result<()> { Ok(()) }

    // ========================================================================
    // Nodes
    // ========================================================================

    async fn create_node(
        &self,
        tx: &mut MemoryTx,
        kind: NodeKind,
        props: PropertyMap,
    ) -> Result<NodeId> {
        let state = tx.writable()?;
        let id = NodeId(state.next_node_id);
        let node = Node { id, kind, properties: props };

        if let Some(accession) = node.accession() {
            if let Some(existing) = state.accession_index.get(accession) {
                return Err(Error::ConstraintViolation(format!(
                    "accession '{accession}' already used by node {existing}"
                )));
            }
            state.accession_index.insert(accession.to_owned(), id);
        }

        state.next_node_id += 1;
        state.kind_index.entry(kind).or_default().push(id);
        state.adjacency.insert(id, Vec::new());
        state.nodes.insert(id, node);
        Ok(id)
    }

    async fn get_node(&self, tx: &MemoryTx, id: NodeId) -> Result<Option<Node>> {
        Ok(tx.state.nodes.get(&id).cloned())
    }

    async fn set_node_property(
        &self,
        tx: &mut MemoryTx,
        id: NodeId,
        key: &str,
        val: Value,
    ) -> Result<()> {
        let state = tx.writable()?;
        if key == ACCESSION_KEY && state.node_mut(id)?.kind.has_accession() {
            let new = val.as_str().map(str::to_owned);
            if let Some(new) = &new {
                if let Some(owner) = state.accession_index.get(new) {
                    if *owner != id {
                        return Err(Error::ConstraintViolation(format!(
                            "accession '{new}' already used by node {owner}"
                        )));
                    }
                }
            }
            if let Some(old) = state.node_mut(id)?.accession().map(str::to_owned) {
                state.accession_index.remove(&old);
            }
            if let Some(new) = new {
                state.accession_index.insert(new, id);
            }
        }
        state.node_mut(id)?.properties.insert(key.to_string(), val);
        Ok(())
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    async fn create_relationship(
        &self,
        tx: &mut MemoryTx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId> {
        let state = tx.writable()?;
        if !state.nodes.contains_key(&src) {
            return Err(Error::NotFound(format!("Source node {src}")));
        }
        if !state.nodes.contains_key(&dst) {
            return Err(Error::NotFound(format!("Target node {dst}")));
        }

        let id = RelId(state.next_rel_id);
        state.next_rel_id += 1;
        state.relationships.insert(id, Relationship {
            id,
            src,
            dst,
            rel_type: rel_type.to_string(),
            properties: props,
        });

        // IDs grow monotonically, so pushing keeps each list ascending.
        state.adjacency.entry(src).or_default().push(id);
        if src != dst {
            state.adjacency.entry(dst).or_default().push(id);
        }

        Ok(id)
    }

    async fn get_relationship(&self, tx: &MemoryTx, id: RelId) -> Result<Option<Relationship>> {
        Ok(tx.state.relationships.get(&id).cloned())
    }

    async fn set_relationship_property(
        &self,
        tx: &mut MemoryTx,
        id: RelId,
        key: &str,
        val: Value,
    ) -> Result<()> {
        let state = tx.writable()?;
        let rel = state.relationships.get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Relationship {id}")))?;
        rel.properties.insert(key.to_string(), val);
        Ok(())
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    async fn get_relationships(
        &self,
        tx: &MemoryTx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>> {
        let state = &tx.state;
        let Some(rel_ids) = state.adjacency.get(&node) else {
            return Ok(Vec::new());
        };

        let result = rel_ids
            .iter()
            .filter_map(|rid| state.relationships.get(rid))
            .filter(|rel| match dir {
                Direction::Outgoing => rel.src == node,
                Direction::Incoming => rel.dst == node,
                Direction::Both => true,
            })
            .filter(|rel| rel_type.is_none_or(|t| rel.rel_type == t))
            .cloned()
            .collect();

        Ok(result)
    }

    // ========================================================================
    // Schema introspection
    // ========================================================================

    async fn node_count(&self, tx: &MemoryTx) -> Result<u64> {
        Ok(tx.state.nodes.len() as u64)
    }

    // ========================================================================
    // Scan
    // ========================================================================

    async fn all_nodes(&self, tx: &MemoryTx) -> Result<Vec<Node>> {
        Ok(tx.state.nodes.values().cloned().collect())
    }

    async fn nodes_by_kind(&self, tx: &MemoryTx, kind: NodeKind) -> Result<Vec<Node>> {
        let state = &tx.state;
        let ids = state.kind_index.get(&kind).map(Vec::as_slice).unwrap_or_default();
        Ok(ids.iter().filter_map(|id| state.nodes.get(id).cloned()).collect())
    }

    async fn nodes_by_property(
        &self,
        tx: &MemoryTx,
        kind: NodeKind,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>> {
        let state = &tx.state;

        // Accession lookups are the hot path for seed resolution.
        if key == ACCESSION_KEY && kind.has_accession() {
            let hit = value
                .as_str()
                .and_then(|acc| state.accession_index.get(acc))
                .and_then(|id| state.nodes.get(id))
                .filter(|n| n.kind == kind)
                .cloned();
            return Ok(hit.into_iter().collect());
        }

        let ids = state.kind_index.get(&kind).map(Vec::as_slice).unwrap_or_default();
        Ok(ids.iter()
            .filter_map(|id| state.nodes.get(id))
            .filter(|n| n.get(key) == Some(value))
            .cloned()
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn protein(accession: &str) -> PropertyMap {
        props([(ACCESSION_KEY, accession)])
    }

    #[tokio::test]
    async fn test_create_and_get_node() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let id = db.create_node(&mut tx, NodeKind::Protein, protein("P06213")).await.unwrap();
        let node = db.get_node(&tx, id).await.unwrap().unwrap();

        assert_eq!(node.kind, NodeKind::Protein);
        assert_eq!(node.accession(), Some("P06213"));
    }

    #[tokio::test]
    async fn test_create_relationship() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, NodeKind::Protein, PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, NodeKind::Protein, PropertyMap::new()).await.unwrap();

        let rel_id = db.create_relationship(&mut tx, a, b, "controls", PropertyMap::new()).await.unwrap();
        let rel = db.get_relationship(&tx, rel_id).await.unwrap().unwrap();

        assert_eq!(rel.src, a);
        assert_eq!(rel.dst, b);
        assert_eq!(rel.rel_type, "controls");
    }

    #[tokio::test]
    async fn test_relationship_to_missing_node_fails() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let a = db.create_node(&mut tx, NodeKind::Protein, PropertyMap::new()).await.unwrap();

        let err = db.create_relationship(&mut tx, a, NodeId(99), "controls", PropertyMap::new()).await;
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_accession_rejected() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        db.create_node(&mut tx, NodeKind::Protein, protein("P31749")).await.unwrap();
        let err = db.create_node(&mut tx, NodeKind::Protein, protein("P31749")).await;
        assert!(matches!(err, Err(Error::ConstraintViolation(_))));
    }

    #[tokio::test]
    async fn test_accession_index_follows_property_updates() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let id = db.create_node(&mut tx, NodeKind::Protein, protein("Q00000")).await.unwrap();

        db.set_node_property(&mut tx, id, ACCESSION_KEY, Value::from("P49841")).await.unwrap();
        let old = db.find_node(&tx, NodeKind::Protein, ACCESSION_KEY, &Value::from("Q00000")).await.unwrap();
        let new = db.find_node(&tx, NodeKind::Protein, ACCESSION_KEY, &Value::from("P49841")).await.unwrap();

        assert!(old.is_none());
        assert_eq!(new.map(|n| n.id), Some(id));
    }

    #[tokio::test]
    async fn test_read_only_tx_rejects_writes() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        let err = db.create_node(&mut tx, NodeKind::Protein, PropertyMap::new()).await;
        assert!(matches!(err, Err(Error::TxError(_))));
    }

    #[tokio::test]
    async fn test_snapshot_isolation() {
        let db = MemoryBackend::new();
        let mut setup = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let a = db.create_node(&mut setup, NodeKind::Protein, PropertyMap::new()).await.unwrap();
        db.commit_tx(setup).await.unwrap();

        let reader = db.begin_tx(TxMode::ReadOnly).await.unwrap();

        let mut writer = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        db.set_node_property(&mut writer, a, "name", Value::from("INSR")).await.unwrap();
        db.create_node(&mut writer, NodeKind::Pathway, PropertyMap::new()).await.unwrap();
        db.commit_tx(writer).await.unwrap();

        // The reader still sees the graph as it was when it began.
        assert_eq!(db.node_count(&reader).await.unwrap(), 1);
        assert!(db.get_node(&reader, a).await.unwrap().unwrap().get("name").is_none());

        let fresh = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        assert_eq!(db.node_count(&fresh).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        db.create_node(&mut tx, NodeKind::Protein, PropertyMap::new()).await.unwrap();
        db.rollback_tx(tx).await.unwrap();

        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        assert_eq!(db.node_count(&tx).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_commit_conflict() {
        let db = MemoryBackend::new();
        let mut first = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let mut second = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        db.create_node(&mut first, NodeKind::Protein, PropertyMap::new()).await.unwrap();
        db.create_node(&mut second, NodeKind::Protein, PropertyMap::new()).await.unwrap();

        db.commit_tx(first).await.unwrap();
        assert!(matches!(db.commit_tx(second).await, Err(Error::TxError(_))));
    }

    #[tokio::test]
    async fn test_get_relationships_by_direction_and_type() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, NodeKind::Protein, PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, NodeKind::Reaction, PropertyMap::new()).await.unwrap();
        let c = db.create_node(&mut tx, NodeKind::Pathway, PropertyMap::new()).await.unwrap();

        db.create_relationship(&mut tx, a, b, "catalyzes", PropertyMap::new()).await.unwrap();
        db.create_relationship(&mut tx, c, b, "contains", PropertyMap::new()).await.unwrap();
        db.create_relationship(&mut tx, b, a, "produces", PropertyMap::new()).await.unwrap();

        let out = db.get_relationships(&tx, b, Direction::Outgoing, None).await.unwrap();
        assert_eq!(out.len(), 1);
        let inc = db.get_relationships(&tx, b, Direction::Incoming, None).await.unwrap();
        assert_eq!(inc.len(), 2);
        let typed = db.get_relationships(&tx, b, Direction::Both, Some("contains")).await.unwrap();
        assert_eq!(typed.len(), 1);
        let ids: Vec<u64> = db.get_relationships(&tx, b, Direction::Both, None).await.unwrap()
            .iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_nodes_by_kind() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        db.create_node(&mut tx, NodeKind::Protein, PropertyMap::new()).await.unwrap();
        db.create_node(&mut tx, NodeKind::Pathway, PropertyMap::new()).await.unwrap();
        db.create_node(&mut tx, NodeKind::Protein, PropertyMap::new()).await.unwrap();

        assert_eq!(db.nodes_by_kind(&tx, NodeKind::Protein).await.unwrap().len(), 2);
        assert_eq!(db.all_nodes(&tx).await.unwrap().len(), 3);
    }
}
