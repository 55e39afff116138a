//! Neighbourhood enrichment scoring.
//!
//! For a node and a hop depth, count the `n` neighbours within that depth
//! and the `k` of them flagged significant in the experiment. The score is
//! the one-sided binomial probability of seeing `k` or more hits in `n`
//! draws at a background hit rate `p0`.
//!
//! `p0` is either the graph-wide share of significant nodes, a fixed value,
//! or the rate observed in an empirical null distribution built by
//! [`crate::sampling::NullDistributionEngine`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::*;
use crate::sampling::NullDistribution;
use crate::storage::{resolve_node, StorageBackend};
use crate::traversal::{walk, TraversalDirection, Walk};
use crate::tx::TxMode;
use crate::{Error, Result};

// ============================================================================
// Binomial tail
// ============================================================================

/// P(X >= k) for X ~ Binomial(n, p), summed in log space.
pub fn binomial_upper_tail(n: usize, k: usize, p: f64) -> f64 {
    if k == 0 {
        return 1.0;
    }
    if k > n || p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return 1.0;
    }

    let ln_p = p.ln();
    let ln_q = (-p).ln_1p();
    // ln C(n, k)
    let mut ln_choose: f64 = (1..=k)
        .map(|j| ((n - k + j) as f64).ln() - (j as f64).ln())
        .sum();

    let mut total = 0.0;
    for i in k..=n {
        total += (ln_choose + i as f64 * ln_p + (n - i) as f64 * ln_q).exp();
        if i < n {
            ln_choose += ((n - i) as f64).ln() - ((i + 1) as f64).ln();
        }
    }
    total.min(1.0)
}

/// Count (hits, total) among a walk's neighbours within `depth` hops.
pub(crate) fn neighbourhood_counts(
    walk: &Walk,
    depth: usize,
    is_hit: impl Fn(&Node) -> bool,
) -> (usize, usize) {
    walk.neighbours()
        .filter(|(_, d)| *d <= depth)
        .fold((0, 0), |(k, n), (node, _)| (k + usize::from(is_hit(node)), n + 1))
}

/// Edge direction for a neighbourhood query; `None` means both ways.
pub(crate) fn query_direction(direction: Option<TraversalDirection>) -> Direction {
    direction.map_or(Direction::Both, |d| d.edge_direction())
}

// ============================================================================
// Queries and results
// ============================================================================

/// Source of the background hit rate `p0`.
#[derive(Debug, Clone, Copy)]
pub enum Background<'a> {
    /// Share of significant nodes in the whole graph.
    GraphProportion,
    /// Caller-supplied rate.
    Fixed(f64),
    /// Rate observed at the query depth in an empirical null distribution.
    Empirical(&'a NullDistribution),
}

#[derive(Debug, Clone, Copy)]
pub struct NeighbourhoodQuery<'a> {
    pub depth: usize,
    /// `None` walks both ways.
    pub direction: Option<TraversalDirection>,
    pub background: Background<'a>,
}

impl NeighbourhoodQuery<'_> {
    pub fn new(depth: usize) -> Self {
        Self { depth, direction: None, background: Background::GraphProportion }
    }
}

/// Enrichment result for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighbourhoodScore {
    pub node: NodeId,
    pub depth: usize,
    /// Neighbours examined.
    pub neighbours: usize,
    /// Neighbours carrying the significance flag.
    pub significant_neighbours: usize,
    /// Background rate the test was run against.
    pub background: f64,
    pub p_value: f64,
    /// Share of null samples scoring at least as high, when scored against
    /// an empirical distribution.
    pub empirical_p_value: Option<f64>,
    pub significant: bool,
}

// ============================================================================
// NeighbourhoodScorer
// ============================================================================

pub struct NeighbourhoodScorer<'b, B: StorageBackend> {
    backend: &'b B,
    alpha: f64,
}

impl<'b, B: StorageBackend> NeighbourhoodScorer<'b, B> {
    pub fn new(backend: &'b B) -> Self {
        Self { backend, alpha: 0.05 }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Score `node` over both directions against the graph-wide background.
    pub async fn score_neighbourhood(
        &self,
        node: &str,
        depth: usize,
        experiment: &str,
    ) -> Result<NeighbourhoodScore> {
        self.score_neighbourhood_with(node, &NeighbourhoodQuery::new(depth), experiment).await
    }

    /// Score one node and annotate it with the result.
    pub async fn score_neighbourhood_with(
        &self,
        node: &str,
        query: &NeighbourhoodQuery<'_>,
        experiment: &str,
    ) -> Result<NeighbourhoodScore> {
        validate(query)?;
        let tx = self.backend.begin_tx(TxMode::ReadOnly).await?;
        let scored = async {
            let target = resolve_node(self.backend, &tx, node).await?;
            let p0 = self.background(&tx, query, experiment).await?;
            self.score_in(&tx, target, query, p0, experiment).await
        }
        .await;
        self.backend.commit_tx(tx).await?;
        let score = scored?;

        self.persist(std::slice::from_ref(&score), experiment).await?;
        Ok(score)
    }

    /// Score every node that can carry measurements. Nodes with an empty
    /// neighbourhood yield `InsufficientData` entries; all successful scores
    /// are annotated in a single write transaction at the end.
    pub async fn score_all(
        &self,
        query: &NeighbourhoodQuery<'_>,
        experiment: &str,
    ) -> Result<Vec<(NodeId, Result<NeighbourhoodScore>)>> {
        validate(query)?;
        let tx = self.backend.begin_tx(TxMode::ReadOnly).await?;
        let scored = async {
            let p0 = self.background(&tx, query, experiment).await?;
            let mut out = Vec::new();
            for node in self.backend.all_nodes(&tx).await? {
                if !node.kind.has_measurements() {
                    continue;
                }
                let id = node.id;
                out.push((id, self.score_in(&tx, node, query, p0, experiment).await));
            }
            Ok::<_, Error>(out)
        }
        .await;
        self.backend.commit_tx(tx).await?;
        let scored = scored?;

        let ok: Vec<NeighbourhoodScore> = scored
            .iter()
            .filter_map(|(_, r)| r.as_ref().ok().cloned())
            .collect();
        self.persist(&ok, experiment).await?;
        info!(
            experiment,
            depth = query.depth,
            scored = ok.len(),
            significant = ok.iter().filter(|s| s.significant).count(),
            "neighbourhood scoring complete"
        );
        Ok(scored)
    }

    /// Share of all nodes flagged significant in `experiment`.
    pub async fn graph_background(&self, tx: &B::Tx, experiment: &str) -> Result<f64> {
        let nodes = self.backend.all_nodes(tx).await?;
        if nodes.is_empty() {
            return Err(Error::InsufficientData("graph has no nodes".into()));
        }
        let hits = nodes.iter().filter(|n| n.is_significant(experiment)).count();
        Ok(hits as f64 / nodes.len() as f64)
    }

    async fn background(
        &self,
        tx: &B::Tx,
        query: &NeighbourhoodQuery<'_>,
        experiment: &str,
    ) -> Result<f64> {
        match query.background {
            Background::GraphProportion => self.graph_background(tx, experiment).await,
            Background::Fixed(p0) => Ok(p0),
            Background::Empirical(null) => null.background_rate(query.depth).ok_or_else(|| {
                Error::InsufficientData(format!(
                    "null distribution has no observations at depth {}",
                    query.depth
                ))
            }),
        }
    }

    async fn score_in(
        &self,
        tx: &B::Tx,
        node: Node,
        query: &NeighbourhoodQuery<'_>,
        p0: f64,
        experiment: &str,
    ) -> Result<NeighbourhoodScore> {
        let id = node.id;
        let dir = query_direction(query.direction);
        let walk = walk(self.backend, tx, node, dir, Some(query.depth)).await?;
        let (k, n) = neighbourhood_counts(&walk, query.depth, |n| n.is_significant(experiment));
        if n == 0 {
            return Err(Error::InsufficientData(format!(
                "node {id} has no neighbours within {} hops",
                query.depth
            )));
        }

        let p_value = binomial_upper_tail(n, k, p0);
        let empirical_p_value = match query.background {
            Background::Empirical(null) => null.upper_tail(query.depth, k),
            _ => None,
        };
        debug!(%id, k, n, p0, p_value, "neighbourhood scored");

        Ok(NeighbourhoodScore {
            node: id,
            depth: query.depth,
            neighbours: n,
            significant_neighbours: k,
            background: p0,
            p_value,
            empirical_p_value,
            significant: p_value < self.alpha,
        })
    }

    /// Finalize phase: write every score's annotations in one transaction.
    async fn persist(&self, scores: &[NeighbourhoodScore], experiment: &str) -> Result<()> {
        if scores.is_empty() {
            return Ok(());
        }
        let p_key = Annotation::EnrichmentPValue.key(experiment);
        let flag_key = Annotation::EnrichmentSignificant.key(experiment);
        let writes = scores
            .iter()
            .flat_map(|s| {
                [
                    (s.node, p_key.clone(), Value::Float(s.p_value)),
                    (s.node, flag_key.clone(), Value::Bool(s.significant)),
                ]
            })
            .collect();

        let mut tx = self.backend.begin_tx(TxMode::ReadWrite).await?;
        match self.backend.set_node_properties_batch(&mut tx, writes).await {
            Ok(()) => self.backend.commit_tx(tx).await,
            Err(e) => {
                self.backend.rollback_tx(tx).await?;
                Err(e)
            }
        }
    }
}

fn validate(query: &NeighbourhoodQuery<'_>) -> Result<()> {
    if query.depth == 0 {
        return Err(Error::InvalidArgument("depth must be at least 1, got 0".into()));
    }
    if let Background::Fixed(p0) = query.background {
        if !(0.0..=1.0).contains(&p0) {
            return Err(Error::InvalidArgument(format!(
                "background probability must lie in [0, 1], got {p0}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binomial_edge_cases() {
        assert_eq!(binomial_upper_tail(10, 0, 0.3), 1.0);
        assert_eq!(binomial_upper_tail(3, 4, 0.3), 0.0);
        assert_eq!(binomial_upper_tail(5, 1, 0.0), 0.0);
        assert_eq!(binomial_upper_tail(5, 5, 1.0), 1.0);
    }

    #[test]
    fn test_binomial_known_values() {
        // P(X >= 1), n = 2, p = 0.5 -> 0.75
        assert!((binomial_upper_tail(2, 1, 0.5) - 0.75).abs() < 1e-12);
        // P(X >= 3), n = 3, p = 0.2 -> 0.008
        assert!((binomial_upper_tail(3, 3, 0.2) - 0.008).abs() < 1e-12);
        // P(X >= 2), n = 4, p = 0.1 -> 1 - 0.9^4 - 4*0.1*0.9^3 = 0.0523
        assert!((binomial_upper_tail(4, 2, 0.1) - 0.0523).abs() < 1e-12);
    }

    #[test]
    fn test_binomial_tail_is_monotone_in_k() {
        let tails: Vec<f64> = (0..=40).map(|k| binomial_upper_tail(40, k, 0.15)).collect();
        assert!(tails.windows(2).all(|w| w[0] >= w[1]));
        // large n stays finite
        let big = binomial_upper_tail(5_000, 900, 0.15);
        assert!(big.is_finite() && big > 0.0 && big < 1e-3);
    }

    #[test]
    fn test_zero_depth_rejected() {
        let err = validate(&NeighbourhoodQuery::new(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
