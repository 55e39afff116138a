//! # phosphograph — Pathway Network Traversal and Enrichment Scoring
//!
//! Walks, connects and scores biological interaction networks annotated
//! with per-experiment measurements (abundance, support, p-value,
//! significance).
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `StorageBackend` is the contract between the engines and storage
//! 2. **Clean DTOs**: `Node`, `Relationship`, `Value` cross all boundaries
//! 3. **Explicit context**: the experiment (and species) is a parameter of every call
//! 4. **Read snapshots, one write**: engines read inside a single read-only
//!    transaction and write their annotations in one finalize transaction
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use phosphograph::Network;
//!
//! # async fn example() -> phosphograph::Result<()> {
//! let network = Network::open_memory().await?;
//! // ... load nodes and relationships through network.backend() ...
//!
//! let report = network.traverse("P06213", "downstream", "0").await?;
//! for row in &report.nodes {
//!     println!("{} at depth {}", row.name, row.depth);
//! }
//!
//! let path = network.shortest_path("P06213", "P49841", "support", "0").await?;
//! println!("cost {}", path.total_cost);
//! # Ok(())
//! # }
//! ```
//!
//! ## Engines
//!
//! | Engine | Module | Produces |
//! |--------|--------|----------|
//! | Traversal | [`traversal`] | Node and edge report tables |
//! | Pathfinding | [`pathfinding`] | Cheapest path and its cost |
//! | Reduction | [`reduction`] | Minimal connection network |
//! | Scoring | [`scoring`] | Neighbourhood enrichment p-values |
//! | Sampling | [`sampling`] | Empirical null distributions |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod storage;
pub mod tx;
pub mod config;
pub mod traversal;
pub mod pathfinding;
pub mod reduction;
pub mod scoring;
pub mod measurements;
pub mod sampling;
pub mod export;

use std::path::Path;

use tokio_util::sync::CancellationToken;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Node, NodeId, NodeKind, NodeStatus, Relationship, RelId, Direction, Path as NetworkPath,
    PathResult, Subgraph, Value, PropertyMap, Measurement, MeasurementField, Annotation,
    WeightType,
};

// ============================================================================
// Re-exports: Storage and transactions
// ============================================================================

pub use storage::{StorageBackend, MemoryBackend};
pub use tx::{Transaction, TxMode, TxId};
pub use config::EngineConfig;

// ============================================================================
// Re-exports: Engines
// ============================================================================

pub use traversal::{TraversalEngine, TraversalDirection, TraversalReport, NodeReport, EdgeReport};
pub use pathfinding::{PathfindingEngine, EdgeCost};
pub use reduction::NetworkReducer;
pub use scoring::{NeighbourhoodScorer, NeighbourhoodQuery, NeighbourhoodScore, Background};
pub use measurements::{MeasurementTable, MeasurementRecord, AnnotationSummary};
pub use sampling::{NullDistributionEngine, NullDistribution, SamplingPlan, MAX_SUBSET_SIZE};

// ============================================================================
// Top-level Network handle
// ============================================================================

/// The primary entry point. A `Network` wraps a storage backend and an
/// engine configuration, and hands both to the engines.
pub struct Network<B: StorageBackend> {
    backend: B,
    config: EngineConfig,
}

impl<B: StorageBackend> Network<B> {
    /// Create a Network over the given backend with default configuration.
    pub fn with_backend(backend: B) -> Self {
        Self { backend, config: EngineConfig::default() }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Access the underlying backend (for loading and advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Walk from `seed` (accession or internal ID) `"upstream"` or
    /// `"downstream"`, reporting measurements from `experiment`.
    pub async fn traverse(&self, seed: &str, direction: &str, experiment: &str) -> Result<TraversalReport> {
        self.traversal().traverse(seed, direction, experiment).await
    }

    /// Traverse every seed; an unresolvable seed yields an `Err` entry.
    pub async fn traverse_batch(
        &self,
        seeds: &[&str],
        direction: &str,
        experiment: &str,
    ) -> Result<Vec<Result<TraversalReport>>> {
        self.traversal().traverse_batch(seeds, direction, experiment).await
    }

    fn traversal(&self) -> TraversalEngine<'_, B> {
        TraversalEngine::new(&self.backend).with_max_depth(self.config.traversal.max_depth)
    }

    // ========================================================================
    // Pathfinding and reduction
    // ========================================================================

    /// Cheapest directed path between two nodes, weighted by `weight`
    /// (`"abundance"` or `"support"`).
    pub async fn shortest_path(
        &self,
        start: &str,
        end: &str,
        weight: &str,
        experiment: &str,
    ) -> Result<PathResult> {
        PathfindingEngine::new(&self.backend)
            .shortest_path(start, end, weight, experiment)
            .await
    }

    /// Connect every significant node of `experiment` and annotate the result.
    pub async fn minimal_connection_network(&self, experiment: &str) -> Result<Subgraph> {
        NetworkReducer::new(&self.backend)
            .with_weight(self.config.reduction.weight)
            .minimal_connection_network(experiment)
            .await
    }

    // ========================================================================
    // Scoring
    // ========================================================================

    pub async fn score_neighbourhood(
        &self,
        node: &str,
        depth: usize,
        experiment: &str,
    ) -> Result<NeighbourhoodScore> {
        self.scorer().score_neighbourhood(node, depth, experiment).await
    }

    pub async fn score_neighbourhood_with(
        &self,
        node: &str,
        query: &NeighbourhoodQuery<'_>,
        experiment: &str,
    ) -> Result<NeighbourhoodScore> {
        self.scorer().score_neighbourhood_with(node, query, experiment).await
    }

    pub async fn score_all(
        &self,
        query: &NeighbourhoodQuery<'_>,
        experiment: &str,
    ) -> Result<Vec<(NodeId, Result<NeighbourhoodScore>)>> {
        self.scorer().score_all(query, experiment).await
    }

    fn scorer(&self) -> NeighbourhoodScorer<'_, B> {
        NeighbourhoodScorer::new(&self.backend).with_alpha(self.config.scoring.alpha)
    }

    // ========================================================================
    // Measurements and sampling
    // ========================================================================

    /// Read a measurement file with the configured column names.
    pub fn load_measurements(&self, path: impl AsRef<Path>) -> Result<MeasurementTable> {
        MeasurementTable::from_path(path, &self.config.measurements.columns)
    }

    /// Attach per-protein measurement summaries for `experiment`.
    pub async fn annotate_measurements(
        &self,
        table: &MeasurementTable,
        experiment: &str,
    ) -> Result<AnnotationSummary> {
        measurements::annotate_measurements(
            &self.backend,
            table,
            experiment,
            self.config.measurements.significance_threshold,
        )
        .await
    }

    pub async fn sample_null_distribution(
        &self,
        data_file: impl AsRef<Path>,
        plan: &SamplingPlan,
        cancel: &CancellationToken,
    ) -> Result<NullDistribution> {
        self.sampler().sample_null_distribution(data_file, plan, cancel).await
    }

    pub async fn sample_null_distribution_for_species(
        &self,
        data_file: impl AsRef<Path>,
        species: &str,
        plan: &SamplingPlan,
        cancel: &CancellationToken,
    ) -> Result<NullDistribution> {
        self.sampler()
            .sample_null_distribution_for_species(data_file, species, plan, cancel)
            .await
    }

    fn sampler(&self) -> NullDistributionEngine<'_, B> {
        NullDistributionEngine::new(&self.backend)
            .with_columns(self.config.measurements.columns.clone())
            .with_threshold(self.config.measurements.significance_threshold)
            .with_seed(self.config.sampling.seed)
            .with_progress_interval(self.config.sampling.progress_interval)
    }
}

/// In-memory network for testing and embedding.
impl Network<storage::MemoryBackend> {
    pub async fn open_memory() -> Result<Self> {
        let backend = storage::MemoryBackend::new();
        Ok(Self::with_backend(backend))
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No path from '{start}' to '{end}' weighted by {weight}")]
    NoPathFound { start: String, end: String, weight: String },

    #[error("Empty terminal set: no node carries the significance flag for experiment '{0}'")]
    EmptyTerminalSet(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Data file error: {0}")]
    DataFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transaction error: {0}")]
    TxError(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::DataFile(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
