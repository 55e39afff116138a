//! Empirical null distribution of neighbourhood hit counts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Observations at one depth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthDistribution {
    /// Hit count `k` -> how many times it was observed.
    pub histogram: BTreeMap<usize, u64>,
    /// Sum of `k` over all observations.
    pub total_hits: u64,
    /// Sum of `n` over all observations.
    pub total_neighbours: u64,
    pub observations: u64,
}

impl DepthDistribution {
    pub fn record(&mut self, k: usize, n: usize) {
        *self.histogram.entry(k).or_insert(0) += 1;
        self.total_hits += k as u64;
        self.total_neighbours += n as u64;
        self.observations += 1;
    }

    pub fn mean_hits(&self) -> Option<f64> {
        (self.observations > 0).then(|| self.total_hits as f64 / self.observations as f64)
    }

    /// Pooled hit rate `sum(k) / sum(n)`.
    pub fn background_rate(&self) -> Option<f64> {
        (self.total_neighbours > 0).then(|| self.total_hits as f64 / self.total_neighbours as f64)
    }

    /// Share of observations with at least `k` hits.
    pub fn upper_tail(&self, k: usize) -> Option<f64> {
        if self.observations == 0 {
            return None;
        }
        let at_least: u64 = self.histogram.range(k..).map(|(_, c)| c).sum();
        Some(at_least as f64 / self.observations as f64)
    }

    /// Smallest `k` whose upper tail is at most `alpha`.
    pub fn critical_count(&self, alpha: f64) -> Option<usize> {
        let max = *self.histogram.keys().next_back()?;
        (0..=max + 1).find(|&k| self.upper_tail(k).is_some_and(|tail| tail <= alpha))
    }
}

/// Result of a resampling run, keyed by neighbourhood depth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NullDistribution {
    pub subset_size: usize,
    pub repetitions: u64,
    /// Seed the run was drawn with.
    pub seed: u64,
    /// Accessions the samples were drawn from.
    pub universe_size: usize,
    pub depths: BTreeMap<usize, DepthDistribution>,
}

impl NullDistribution {
    pub fn record(&mut self, depth: usize, k: usize, n: usize) {
        self.depths.entry(depth).or_default().record(k, n);
    }

    pub fn at_depth(&self, depth: usize) -> Option<&DepthDistribution> {
        self.depths.get(&depth)
    }

    pub fn observations(&self, depth: usize) -> u64 {
        self.at_depth(depth).map_or(0, |d| d.observations)
    }

    pub fn background_rate(&self, depth: usize) -> Option<f64> {
        self.at_depth(depth)?.background_rate()
    }

    pub fn upper_tail(&self, depth: usize, k: usize) -> Option<f64> {
        self.at_depth(depth)?.upper_tail(k)
    }

    pub fn critical_count(&self, depth: usize, alpha: f64) -> Option<usize> {
        self.at_depth(depth)?.critical_count(alpha)
    }
}
