//! Rank distribution and subset drawing.
//!
//! A rank says how many measurements to take from one drawn protein. The
//! rank distribution mirrors how many peptides real significant proteins
//! tend to contribute: most contribute one, few contribute many.

use rand::seq::{index, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::measurements::{MeasurementRecord, MeasurementTable};

/// Share of the subset, in percent, for ranks 1 through 16.
pub const RANK_PERCENTAGES: [u64; 16] = [40, 21, 10, 8, 4, 4, 2, 2, 2, 1, 1, 1, 1, 1, 1, 1];

/// Label padding the distribution when rounding falls short. A protein
/// drawn at this rank contributes every measurement it has.
pub const OVERFLOW_RANK: u8 = 17;

/// Rank labels for a subset of `subset_size` proteins.
///
/// Each rank's count is its percentage of `subset_size`, rounded half up.
/// Ranks are laid out in ascending order; a short result is padded with
/// [`OVERFLOW_RANK`] and a long one is cut from the tail, so the length is
/// always exactly `subset_size`.
pub fn build_rank_distribution(subset_size: usize) -> Vec<u8> {
    let n = subset_size as u128;
    let mut ranks = Vec::with_capacity(subset_size);
    for (rank, pct) in (1u8..).zip(RANK_PERCENTAGES) {
        // never above `subset_size`, so it fits in usize
        let count = (u128::from(pct) * n + 50) / 100;
        ranks.extend(std::iter::repeat_n(rank, count as usize));
    }
    ranks.truncate(subset_size);
    ranks.resize(subset_size, OVERFLOW_RANK);
    ranks
}

/// One protein drawn into a null sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledProtein {
    pub accession: String,
    pub rank: u8,
    pub records: Vec<MeasurementRecord>,
}

impl SampledProtein {
    /// Whether any drawn measurement falls below `threshold`.
    pub fn is_hit(&self, threshold: f64) -> bool {
        self.records.iter().any(|r| r.p_value < threshold)
    }
}

/// Draw one random subset from `table`.
///
/// Proteins are drawn without replacement, one per rank label, until the
/// labels or the table run out. A protein at rank `r` contributes `r`
/// randomly chosen measurements (all of them if it has fewer), or all of
/// them at [`OVERFLOW_RANK`]. Same RNG state, same sample.
pub fn draw_sample<R: Rng + ?Sized>(
    rng: &mut R,
    table: &MeasurementTable,
    ranks: &[u8],
) -> Vec<SampledProtein> {
    let universe: Vec<(&str, &[MeasurementRecord])> = table.iter().collect();
    let amount = ranks.len().min(universe.len());
    let picks = index::sample(&mut *rng, universe.len(), amount);

    picks
        .into_iter()
        .zip(ranks)
        .map(|(i, &rank)| {
            let (accession, records) = universe[i];
            let records = if rank == OVERFLOW_RANK {
                records.to_vec()
            } else {
                records.choose_multiple(&mut *rng, usize::from(rank)).cloned().collect()
            };
            SampledProtein { accession: accession.to_owned(), rank, records }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn count(ranks: &[u8], rank: u8) -> usize {
        ranks.iter().filter(|&&r| r == rank).count()
    }

    #[test]
    fn test_percentages_sum_to_whole() {
        assert_eq!(RANK_PERCENTAGES.iter().sum::<u64>(), 100);
    }

    #[test]
    fn test_thousand_matches_table_exactly() {
        let ranks = build_rank_distribution(1000);
        assert_eq!(ranks.len(), 1000);
        assert_eq!(count(&ranks, 1), 400);
        assert_eq!(count(&ranks, 2), 210);
        assert_eq!(count(&ranks, 16), 10);
        assert_eq!(count(&ranks, OVERFLOW_RANK), 0);
    }

    #[test]
    fn test_small_sizes() {
        assert!(build_rank_distribution(0).is_empty());
        // every share rounds to zero
        assert_eq!(build_rank_distribution(1), vec![OVERFLOW_RANK]);
        // 40% of 5 = 2, 21% = 1.05 -> 1, 10% = 0.5 -> 1, 8% = 0.4 -> 0, ...
        assert_eq!(build_rank_distribution(5), vec![1, 1, 2, 3, OVERFLOW_RANK]);
    }

    #[test]
    fn test_long_rounding_is_trimmed_from_tail() {
        // 50: 20, 11 (10.5), 5, 4, 2, 2, 1, 1, 1, then seven 1s (0.5 each) = 54
        let ranks = build_rank_distribution(50);
        assert_eq!(ranks.len(), 50);
        assert_eq!(count(&ranks, 1), 20);
        assert_eq!(count(&ranks, 16), 0);
        assert_eq!(*ranks.last().unwrap(), 12);
    }

    proptest! {
        #[test]
        fn prop_length_and_labels(n in 0usize..5_000) {
            let ranks = build_rank_distribution(n);
            prop_assert_eq!(ranks.len(), n);
            prop_assert!(ranks.iter().all(|r| (1..=OVERFLOW_RANK).contains(r)));
            prop_assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
        }

        #[test]
        fn prop_rank_one_dominates(n in 2usize..5_000) {
            let ranks = build_rank_distribution(n);
            let first = count(&ranks, 1);
            prop_assert!(first > 0);
            for rank in 2..=16 {
                prop_assert!(first >= count(&ranks, rank));
            }
            if n >= 20 {
                prop_assert!(first >= count(&ranks, OVERFLOW_RANK));
            }
        }
    }

    fn table() -> MeasurementTable {
        let mut table = MeasurementTable::new();
        for (acc, n) in [("A", 1), ("B", 3), ("C", 5), ("D", 2)] {
            for i in 0..n {
                table.push(
                    acc,
                    MeasurementRecord {
                        modified_sequence: format!("{acc}{i}"),
                        p_value: 0.01 * (i + 1) as f64,
                        value: i as f64,
                    },
                );
            }
        }
        table
    }

    #[test]
    fn test_draw_respects_ranks() {
        let table = table();
        let mut rng = StdRng::seed_from_u64(9);
        let sample = draw_sample(&mut rng, &table, &[1, 2, OVERFLOW_RANK]);
        assert_eq!(sample.len(), 3);
        let accessions: std::collections::BTreeSet<_> = sample.iter().map(|s| s.accession.as_str()).collect();
        assert_eq!(accessions.len(), 3);
        for s in &sample {
            let available = table.get(&s.accession).unwrap().len();
            let expected = if s.rank == OVERFLOW_RANK { available } else { available.min(s.rank.into()) };
            assert_eq!(s.records.len(), expected);
        }
    }

    #[test]
    fn test_draw_stops_at_universe_size() {
        let mut rng = StdRng::seed_from_u64(1);
        let sample = draw_sample(&mut rng, &table(), &build_rank_distribution(10));
        assert_eq!(sample.len(), 4);
    }

    #[test]
    fn test_same_seed_same_sample() {
        let table = table();
        let ranks = build_rank_distribution(3);
        let a = draw_sample(&mut StdRng::seed_from_u64(42), &table, &ranks);
        let b = draw_sample(&mut StdRng::seed_from_u64(42), &table, &ranks);
        assert_eq!(a, b);
    }
}
