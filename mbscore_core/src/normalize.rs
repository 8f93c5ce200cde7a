//! Abundance normalization.
//!
//! Collapses raw feature counts onto a taxonomic rank and converts them to
//! relative abundances. Integer counts are summed per taxon before a single
//! division, so output is bit-identical for identical input.

use crate::{AbundanceVector, FeatureTable, Rank, UNCLASSIFIED};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ranks every profile carries, regardless of configuration
pub const PROFILE_RANKS: [Rank; 3] = [Rank::Phylum, Rank::Genus, Rank::Species];

/// Produce the abundance vector for one sample column at `rank`
///
/// Samples with fewer than `min_sample_reads` reads (always including zero)
/// get an all-zero vector flagged `insufficient_depth`.
pub fn normalize_sample(
    table: &FeatureTable,
    sample_idx: usize,
    rank: Rank,
    min_sample_reads: u64,
) -> AbundanceVector {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut total: u64 = 0;

    for feature in &table.features {
        let count = feature.counts[sample_idx];
        let label = feature.lineage.name_at(rank).unwrap_or(UNCLASSIFIED);
        *counts.entry(label.to_string()).or_insert(0) += count;
        total += count;
    }

    let insufficient_depth = total == 0 || total < min_sample_reads;
    let fractions = counts
        .into_iter()
        .map(|(taxon, count)| {
            let fraction = if insufficient_depth {
                0.0
            } else {
                count as f64 / total as f64
            };
            (taxon, fraction)
        })
        .collect();

    AbundanceVector {
        sample_id: table.samples[sample_idx].clone(),
        rank,
        total_reads: total,
        insufficient_depth,
        fractions,
    }
}

/// Everything the scoring stages need to know about one sample
#[derive(Clone, Debug)]
pub struct SampleProfile {
    pub sample_id: String,
    pub total_reads: u64,
    pub insufficient_depth: bool,
    /// Raw per-feature counts (Chao1 needs singletons/doubletons)
    pub feature_counts: Vec<u64>,
    vectors: BTreeMap<Rank, AbundanceVector>,
}

impl SampleProfile {
    /// Build a profile from pre-normalized vectors
    pub fn from_vectors(
        sample_id: impl Into<String>,
        feature_counts: Vec<u64>,
        vectors: Vec<AbundanceVector>,
    ) -> Self {
        let total_reads = feature_counts.iter().sum();
        let insufficient_depth = vectors.iter().any(|v| v.insufficient_depth);
        Self {
            sample_id: sample_id.into(),
            total_reads,
            insufficient_depth,
            feature_counts,
            vectors: vectors.into_iter().map(|v| (v.rank, v)).collect(),
        }
    }

    /// Vector at `rank`, if it was computed for this profile
    pub fn vector(&self, rank: Rank) -> Option<&AbundanceVector> {
        self.vectors.get(&rank)
    }

    pub fn ranks(&self) -> impl Iterator<Item = Rank> + '_ {
        self.vectors.keys().copied()
    }

    /// Relative abundance of a curated taxon at its rank (0.0 when absent or
    /// when the rank was not profiled). Genus lookups include numbered
    /// variants such as `Ruminococcus_2`.
    pub fn abundance(&self, taxon: &str, rank: Rank) -> f64 {
        match self.vectors.get(&rank) {
            Some(v) if rank == Rank::Genus => v.group_abundance(taxon),
            Some(v) => v.get(taxon),
            None => 0.0,
        }
    }
}

/// Build the profile of one sample over `extra_ranks` plus `PROFILE_RANKS`
pub fn profile_sample(
    table: &FeatureTable,
    sample_idx: usize,
    extra_ranks: &[Rank],
    min_sample_reads: u64,
) -> SampleProfile {
    let mut ranks: Vec<Rank> = PROFILE_RANKS.iter().chain(extra_ranks).copied().collect();
    ranks.sort();
    ranks.dedup();

    let vectors = ranks
        .into_iter()
        .map(|rank| normalize_sample(table, sample_idx, rank, min_sample_reads))
        .collect();

    SampleProfile::from_vectors(
        table.samples[sample_idx].clone(),
        table.feature_counts(sample_idx),
        vectors,
    )
}

/// Build profiles for every sample in the table, in column order
///
/// Runs on the current rayon pool.
pub fn profile_samples(
    table: &FeatureTable,
    extra_ranks: &[Rank],
    min_sample_reads: u64,
) -> Vec<SampleProfile> {
    (0..table.samples.len())
        .into_par_iter()
        .map(|idx| profile_sample(table, idx, extra_ranks, min_sample_reads))
        .collect()
}

/// One entry of a composition summary
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TaxonShare {
    pub taxon: String,
    pub fraction: f64,
}

/// Top `n` named taxa by abundance (ties broken by name)
pub fn top_taxa(vector: &AbundanceVector, n: usize) -> Vec<TaxonShare> {
    let mut taxa: Vec<TaxonShare> = vector
        .nonzero()
        .filter(|(name, _)| *name != UNCLASSIFIED)
        .map(|(taxon, fraction)| TaxonShare {
            taxon: taxon.to_string(),
            fraction,
        })
        .collect();

    taxa.sort_by(|a, b| {
        b.fraction
            .total_cmp(&a.fraction)
            .then_with(|| a.taxon.cmp(&b.taxon))
    });
    taxa.truncate(n);
    taxa
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::read_feature_table;

    const TABLE: &str = "id\tS1\tS2\tEMPTY\tTaxon
a1\t30\t0\t0\tp__Bacteroidota; g__Bacteroides; s__fragilis
a2\t10\t2\t0\tp__Bacteroidota; g__Prevotella_9
a3\t40\t1\t0\tp__Firmicutes; g__Faecalibacterium
a4\t20\t1\t0\tp__Firmicutes; g__
a5\t0\t7\t0\t
";

    fn table() -> FeatureTable {
        read_feature_table(TABLE.as_bytes()).unwrap()
    }

    #[test]
    fn test_fractions_sum_to_one_for_all_ranks() {
        let table = table();
        for rank in Rank::ALL {
            for idx in 0..table.samples.len() {
                let vector = normalize_sample(&table, idx, rank, 1);
                if vector.insufficient_depth {
                    continue;
                }
                assert!(
                    (vector.total_fraction() - 1.0).abs() < 1e-6,
                    "{} at {} sums to {}",
                    vector.sample_id,
                    rank,
                    vector.total_fraction()
                );
            }
        }
    }

    #[test]
    fn test_unassigned_features_collapse_into_unclassified() {
        let table = table();
        let genus = normalize_sample(&table, 0, Rank::Genus, 1);
        assert!((genus.get(UNCLASSIFIED) - 0.2).abs() < 1e-12);
        assert!((genus.get("Bacteroides") - 0.3).abs() < 1e-12);

        let s2 = normalize_sample(&table, 1, Rank::Genus, 1);
        assert!((s2.get(UNCLASSIFIED) - 8.0 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_depth_sample_is_flagged_not_divided() {
        let table = table();
        let empty = normalize_sample(&table, 2, Rank::Genus, 1);
        assert!(empty.insufficient_depth);
        assert_eq!(empty.total_reads, 0);
        assert!(empty.fractions.values().all(|v| *v == 0.0));
    }

    #[test]
    fn test_min_sample_reads_threshold() {
        let table = table();
        let shallow = normalize_sample(&table, 1, Rank::Genus, 100);
        assert!(shallow.insufficient_depth);
        assert_eq!(shallow.total_reads, 11);
    }

    #[test]
    fn test_normalization_is_deterministic() {
        let table = table();
        let a = normalize_sample(&table, 0, Rank::Species, 1);
        let b = normalize_sample(&table, 0, Rank::Species, 1);
        assert_eq!(a, b);
        let keys: Vec<_> = a.fractions.keys().cloned().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_profile_abundance_lookup() {
        let table = table();
        let profile = profile_sample(&table, 0, &[Rank::Family], 1);
        assert!(profile.vector(Rank::Family).is_some());
        assert!((profile.abundance("Prevotella", Rank::Genus) - 0.1).abs() < 1e-12);
        assert!((profile.abundance("Bacteroides_fragilis", Rank::Species) - 0.3).abs() < 1e-12);
        assert_eq!(profile.abundance("Akkermansia", Rank::Genus), 0.0);
        assert_eq!(profile.total_reads, 100);
        assert_eq!(profile.feature_counts, vec![30, 10, 40, 20, 0]);
    }

    #[test]
    fn test_profile_samples_keeps_column_order() {
        let table = table();
        let profiles = profile_samples(&table, &[], 1);
        let ids: Vec<_> = profiles.iter().map(|p| p.sample_id.as_str()).collect();
        assert_eq!(ids, vec!["S1", "S2", "EMPTY"]);
        assert!(profiles[2].insufficient_depth);
        assert_eq!(profiles[1].total_reads, 11);
        assert!(profiles[0].vector(Rank::Species).is_some());
    }

    #[test]
    fn test_top_taxa_excludes_unclassified() {
        let table = table();
        let genus = normalize_sample(&table, 0, Rank::Genus, 1);
        let top = top_taxa(&genus, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].taxon, "Faecalibacterium");
        assert_eq!(top[1].taxon, "Bacteroides");
    }
}
