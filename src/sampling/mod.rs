//! Null distributions by resampling measurement files.
//!
//! Each repetition draws a random subset of measured proteins sized by the
//! rank distribution, marks the drawn proteins with a measurement below the
//! significance threshold as hits, then counts hits in the neighbourhood of
//! every drawn protein. The counts accumulate into a [`NullDistribution`]
//! that [`crate::scoring`] can use in place of the binomial background.
//!
//! All graph reads happen in one read-only transaction, and neighbourhoods
//! are cached for the length of the run.

mod distribution;
mod null_model;

pub use distribution::{
    build_rank_distribution, draw_sample, SampledProtein, OVERFLOW_RANK, RANK_PERCENTAGES,
};
pub use null_model::{DepthDistribution, NullDistribution};

use std::path::Path;

use hashbrown::{HashMap, HashSet};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ColumnNames;
use crate::measurements::MeasurementTable;
use crate::model::*;
use crate::scoring::query_direction;
use crate::storage::StorageBackend;
use crate::traversal::{walk, TraversalDirection};
use crate::tx::TxMode;
use crate::{Error, Result};

// ============================================================================
// SamplingPlan
// ============================================================================

/// Largest subset a single repetition may draw.
pub const MAX_SUBSET_SIZE: usize = 1 << 24;

/// Parameters of one resampling run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingPlan {
    pub depth: usize,
    pub subset_size: usize,
    pub repetitions: u64,
    /// `None` walks both ways.
    pub direction: Option<TraversalDirection>,
}

impl SamplingPlan {
    /// Sizes arrive signed from callers; negative values are rejected here.
    pub fn new(depth: usize, subset_size: i64, repetitions: i64) -> Result<Self> {
        if depth == 0 {
            return Err(Error::InvalidArgument("depth must be at least 1, got 0".into()));
        }
        let subset_size = usize::try_from(subset_size).map_err(|_| {
            Error::InvalidArgument(format!("subset size must not be negative, got {subset_size}"))
        })?;
        if subset_size > MAX_SUBSET_SIZE {
            return Err(Error::InvalidArgument(format!(
                "subset size must be at most {MAX_SUBSET_SIZE}, got {subset_size}"
            )));
        }
        if repetitions < 1 {
            return Err(Error::InvalidArgument(format!(
                "repetitions must be at least 1, got {repetitions}"
            )));
        }
        Ok(Self {
            depth,
            subset_size,
            repetitions: repetitions as u64,
            direction: None,
        })
    }

    pub fn with_direction(mut self, direction: Option<TraversalDirection>) -> Self {
        self.direction = direction;
        self
    }
}

// ============================================================================
// NullDistributionEngine
// ============================================================================

pub struct NullDistributionEngine<'b, B: StorageBackend> {
    backend: &'b B,
    columns: ColumnNames,
    threshold: f64,
    seed: Option<u64>,
    progress_interval: u64,
}

impl<'b, B: StorageBackend> NullDistributionEngine<'b, B> {
    pub fn new(backend: &'b B) -> Self {
        Self {
            backend,
            columns: ColumnNames::default(),
            threshold: 0.05,
            seed: None,
            progress_interval: 1_000,
        }
    }

    pub fn with_columns(mut self, columns: ColumnNames) -> Self {
        self.columns = columns;
        self
    }

    /// Measurement p-value below which a drawn protein counts as a hit.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Fixed seed; without one a fresh seed is drawn and recorded in the
    /// result.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    /// Resample the measurements in `data_file`.
    pub async fn sample_null_distribution(
        &self,
        data_file: impl AsRef<Path>,
        plan: &SamplingPlan,
        cancel: &CancellationToken,
    ) -> Result<NullDistribution> {
        let table = MeasurementTable::from_path(data_file, &self.columns)?;
        self.sample_table(&table, plan, None, cancel).await
    }

    /// As [`Self::sample_null_distribution`], drawing only from proteins of
    /// `species`.
    pub async fn sample_null_distribution_for_species(
        &self,
        data_file: impl AsRef<Path>,
        species: &str,
        plan: &SamplingPlan,
        cancel: &CancellationToken,
    ) -> Result<NullDistribution> {
        let table = MeasurementTable::from_path(data_file, &self.columns)?;
        self.sample_table(&table, plan, Some(species), cancel).await
    }

    /// Resample an already loaded table.
    pub async fn sample_table(
        &self,
        table: &MeasurementTable,
        plan: &SamplingPlan,
        species: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<NullDistribution> {
        let tx = self.backend.begin_tx(TxMode::ReadOnly).await?;
        let result = self.run(&tx, table, plan, species, cancel).await;
        self.backend.commit_tx(tx).await?;
        result
    }

    async fn run(
        &self,
        tx: &B::Tx,
        table: &MeasurementTable,
        plan: &SamplingPlan,
        species: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<NullDistribution> {
        let proteins: HashMap<String, NodeId> = self
            .backend
            .nodes_by_kind(tx, NodeKind::Protein)
            .await?
            .into_iter()
            .filter(|n| n.status() != NodeStatus::Deleted)
            .filter(|n| species.is_none_or(|s| n.species().is_some_and(|ns| ns.eq_ignore_ascii_case(s))))
            .filter_map(|n| n.accession().map(|acc| (acc.to_owned(), n.id)))
            .collect();

        let universe = table.restrict_to(|acc| proteins.contains_key(acc));
        if universe.is_empty() {
            return Err(Error::InsufficientData(match species {
                Some(s) => format!("no measured accession matches a {s} protein in the graph"),
                None => "no measured accession matches a protein in the graph".into(),
            }));
        }

        let seed = self.seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        let ranks = build_rank_distribution(plan.subset_size);
        let dir = query_direction(plan.direction);
        let mut neighbourhoods: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut null = NullDistribution {
            subset_size: plan.subset_size,
            repetitions: plan.repetitions,
            seed,
            universe_size: universe.len(),
            ..Default::default()
        };

        info!(
            seed,
            universe = universe.len(),
            subset_size = plan.subset_size,
            repetitions = plan.repetitions,
            depth = plan.depth,
            "null distribution sampling started"
        );

        for rep in 0..plan.repetitions {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled(format!(
                    "sampling stopped after {rep} of {} repetitions",
                    plan.repetitions
                )));
            }

            let sample = draw_sample(&mut rng, &universe, &ranks);
            let drawn: Vec<(NodeId, bool)> = sample
                .iter()
                .filter_map(|s| proteins.get(&s.accession).map(|id| (*id, s.is_hit(self.threshold))))
                .collect();
            let hits: HashSet<NodeId> = drawn.iter().filter(|(_, hit)| *hit).map(|(id, _)| *id).collect();

            for &(id, _) in &drawn {
                if !neighbourhoods.contains_key(&id) {
                    let ids = self.neighbourhood(tx, id, dir, plan.depth).await?;
                    neighbourhoods.insert(id, ids);
                }
                let Some(around) = neighbourhoods.get(&id) else {
                    continue;
                };
                if around.is_empty() {
                    continue;
                }
                let k = around.iter().filter(|n| hits.contains(*n)).count();
                null.record(plan.depth, k, around.len());
            }

            if (rep + 1) % self.progress_interval == 0 {
                info!(done = rep + 1, total = plan.repetitions, "sampling progress");
            }
        }

        debug!(
            cached = neighbourhoods.len(),
            observations = null.observations(plan.depth),
            "null distribution sampling complete"
        );
        Ok(null)
    }

    async fn neighbourhood(
        &self,
        tx: &B::Tx,
        id: NodeId,
        dir: Direction,
        depth: usize,
    ) -> Result<Vec<NodeId>> {
        let node = self
            .backend
            .get_node(tx, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        let walk = walk(self.backend, tx, node, dir, Some(depth)).await?;
        Ok(walk.neighbours().map(|(n, _)| n.id).collect())
    }
}
