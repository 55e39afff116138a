//! # Storage Backend Trait
//!
//! This is THE contract between the analysis engines and any graph store.
//! The engines only need label/property lookup, directed edge iteration,
//! property reads and writes, and scoped transactions.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryBackend` | `memory` | Snapshot-isolated in-memory graph |
//!
//! Graph entities are created by ingestion and never deleted by this crate,
//! so the trait exposes no delete operations.

pub mod memory;

use async_trait::async_trait;

use crate::model::*;
use crate::tx::{Transaction, TxMode};
use crate::{Error, Result};

pub use memory::MemoryBackend;

// ============================================================================
// StorageBackend Trait
// ============================================================================

/// The universal storage contract.
///
/// Backends return `Error::StorageError("... not supported")` for optional
/// operations they can't handle rather than growing optional traits.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// The transaction type for this backend.
    type Tx: Transaction;

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a new transaction. `ReadOnly` transactions see a snapshot
    /// taken at this point.
    async fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx>;

    /// Commit a transaction.
    async fn commit_tx(&self, tx: Self::Tx) -> Result<()>;

    /// Roll back a transaction.
    async fn rollback_tx(&self, tx: Self::Tx) -> Result<()>;

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Create a node of the given kind with properties.
    async fn create_node(
        &self,
        tx: &mut Self::Tx,
        kind: NodeKind,
        props: PropertyMap,
    ) -> Result<NodeId>;

    /// Get a node by ID. Returns None if not found.
    async fn get_node(&self, tx: &Self::Tx, id: NodeId) -> Result<Option<Node>>;

    /// Set a property on a node (upsert).
    async fn set_node_property(
        &self,
        tx: &mut Self::Tx,
        id: NodeId,
        key: &str,
        val: Value,
    ) -> Result<()>;

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Create a relationship between two nodes.
    async fn create_relationship(
        &self,
        tx: &mut Self::Tx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId>;

    /// Get a relationship by ID.
    async fn get_relationship(&self, tx: &Self::Tx, id: RelId) -> Result<Option<Relationship>>;

    /// Set a property on a relationship (upsert).
    ///
    /// Default returns error — override for backends with relationship property writes.
    async fn set_relationship_property(
        &self,
        _tx: &mut Self::Tx,
        _id: RelId,
        _key: &str,
        _val: Value,
    ) -> Result<()> {
        Err(Error::StorageError("relationship property set not supported".into()))
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Get all relationships of a node, optionally filtered by direction and
    /// type, in ascending relationship ID.
    async fn get_relationships(
        &self,
        tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>>;

    // ========================================================================
    // Schema introspection
    // ========================================================================

    /// Total number of nodes.
    async fn node_count(&self, tx: &Self::Tx) -> Result<u64>;

    // ========================================================================
    // Scan
    // ========================================================================

    /// Return all nodes in ascending ID.
    async fn all_nodes(&self, tx: &Self::Tx) -> Result<Vec<Node>>;

    /// Find all nodes of a given kind.
    async fn nodes_by_kind(&self, tx: &Self::Tx, kind: NodeKind) -> Result<Vec<Node>>;

    /// Find nodes by kind + property value (index-backed if available).
    async fn nodes_by_property(
        &self,
        tx: &Self::Tx,
        kind: NodeKind,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>>;

    /// Find the single node of `kind` whose `key` equals `value`.
    ///
    /// Default: first match of `nodes_by_property`.
    async fn find_node(
        &self,
        tx: &Self::Tx,
        kind: NodeKind,
        key: &str,
        value: &Value,
    ) -> Result<Option<Node>> {
        Ok(self.nodes_by_property(tx, kind, key, value).await?.into_iter().next())
    }

    // ========================================================================
    // Batch operations
    // ========================================================================

    /// Apply many node property writes, used by the engines' finalize phase.
    ///
    /// Default falls back to sequential `set_node_property` calls.
    async fn set_node_properties_batch(
        &self,
        tx: &mut Self::Tx,
        writes: Vec<(NodeId, String, Value)>,
    ) -> Result<()> {
        for (id, key, val) in writes {
            self.set_node_property(tx, id, &key, val).await?;
        }
        Ok(())
    }
}

// ============================================================================
// Identifier resolution
// ============================================================================

/// Resolve a caller-supplied identifier to a node.
///
/// Tries the external accession on every accession-bearing kind first,
/// then the internal numeric ID.
pub async fn resolve_node<B: StorageBackend>(backend: &B, tx: &B::Tx, ident: &str) -> Result<Node> {
    let key = Value::from(ident);
    for kind in NodeKind::ALL.into_iter().filter(NodeKind::has_accession) {
        if let Some(node) = backend.find_node(tx, kind, ACCESSION_KEY, &key).await? {
            return Ok(node);
        }
    }
    if let Ok(raw) = ident.parse::<u64>() {
        if let Some(node) = backend.get_node(tx, NodeId(raw)).await? {
            return Ok(node);
        }
    }
    Err(Error::NotFound(format!("no node with accession or id '{ident}'")))
}
