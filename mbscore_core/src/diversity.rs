//! Alpha diversity and phylum-ratio metrics.

use crate::config::DiversityConfig;
use crate::normalize::SampleProfile;
use crate::{AbundanceVector, Error, Measure, Rank, ReasonCode, Result, StageOutcome};
use serde::{Deserialize, Serialize};

const BACTEROIDETES: [&str; 2] = ["Bacteroidetes", "Bacteroidota"];
const FIRMICUTES: [&str; 2] = ["Firmicutes", "Bacillota"];

/// Position of a value relative to a normal band
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BandStatus {
    Low,
    Normal,
    High,
}

impl BandStatus {
    pub fn classify(value: f64, low: f64, high: f64) -> Self {
        if value < low {
            BandStatus::Low
        } else if value > high {
            BandStatus::High
        } else {
            BandStatus::Normal
        }
    }
}

/// Diversity metrics for one sample
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DiversityMetrics {
    /// Rank the alpha metrics were computed at
    pub rank: Rank,
    pub shannon: f64,
    pub simpson: f64,
    pub chao1: f64,
    /// Taxa with nonzero abundance at `rank`
    pub observed_taxa: usize,
    /// Features (ASVs) with a nonzero count
    pub observed_features: usize,
    pub singletons: usize,
    pub doubletons: usize,
    pub evenness: Measure<f64>,
    pub bf_ratio: Measure<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bf_status: Option<BandStatus>,
    pub richness_status: BandStatus,
    pub total_reads: u64,
}

/// Shannon entropy, natural log, over nonzero fractions
pub fn shannon(fractions: impl IntoIterator<Item = f64>) -> f64 {
    fractions
        .into_iter()
        .filter(|p| *p > 0.0)
        .fold(0.0, |acc, p| acc - p * p.ln())
}

/// Simpson diversity, 1 - sum(p^2)
pub fn simpson(fractions: impl IntoIterator<Item = f64>) -> f64 {
    1.0 - fractions.into_iter().map(|p| p * p).sum::<f64>()
}

/// Bias-corrected Chao1 richness from raw feature counts
pub fn chao1(counts: &[u64]) -> f64 {
    let observed = counts.iter().filter(|c| **c > 0).count() as f64;
    let f1 = counts.iter().filter(|c| **c == 1).count() as f64;
    let f2 = counts.iter().filter(|c| **c == 2).count() as f64;

    if f2 > 0.0 {
        observed + f1 * f1 / (2.0 * f2)
    } else if f1 > 1.0 {
        observed + f1 * (f1 - 1.0) / 2.0
    } else {
        observed
    }
}

/// Pielou evenness; undefined with one or no observed taxa
pub fn evenness(shannon: f64, observed: usize) -> Measure<f64> {
    if observed <= 1 {
        return Measure::Undefined {
            reason: ReasonCode::TooFewTaxa,
        };
    }
    Measure::Defined {
        value: shannon / (observed as f64).ln(),
    }
}

/// Bacteroidetes / Firmicutes ratio from a phylum vector
pub fn bf_ratio(phylum: &AbundanceVector) -> Measure<f64> {
    let bacteroidetes: f64 = BACTEROIDETES.iter().map(|p| phylum.group_abundance(p)).sum();
    let firmicutes: f64 = FIRMICUTES.iter().map(|p| phylum.group_abundance(p)).sum();

    if firmicutes <= 0.0 {
        return Measure::Undefined {
            reason: ReasonCode::ZeroDenominator,
        };
    }
    Measure::Defined {
        value: bacteroidetes / firmicutes,
    }
}

/// Compute every diversity metric for one profile
///
/// Returns an error only when the profile lacks a vector the calculator
/// needs; a zero-depth sample yields `insufficient_data`.
pub fn compute_diversity(
    profile: &SampleProfile,
    config: &DiversityConfig,
) -> Result<StageOutcome<DiversityMetrics>> {
    if profile.insufficient_depth {
        return Ok(StageOutcome::insufficient(ReasonCode::InsufficientDepth));
    }

    let vector = required_vector(profile, config.rank)?;
    let phylum = required_vector(profile, Rank::Phylum)?;

    let fractions = || vector.fractions.values().copied();
    let shannon = shannon(fractions());
    let simpson = simpson(fractions());
    let observed_taxa = vector.nonzero().count();

    let counts = &profile.feature_counts;
    let observed_features = counts.iter().filter(|c| **c > 0).count();
    let singletons = counts.iter().filter(|c| **c == 1).count();
    let doubletons = counts.iter().filter(|c| **c == 2).count();

    let bf_ratio = bf_ratio(phylum);
    let bf_status = bf_ratio
        .value()
        .map(|r| BandStatus::classify(r, config.bf_ratio_low, config.bf_ratio_high));
    let richness_status = BandStatus::classify(
        observed_features as f64,
        config.richness_low as f64,
        config.richness_high as f64,
    );

    tracing::debug!(
        "{}: shannon={:.3} simpson={:.3} observed={} chao1={:.1}",
        profile.sample_id,
        shannon,
        simpson,
        observed_taxa,
        chao1(counts)
    );

    Ok(StageOutcome::Computed {
        value: DiversityMetrics {
            rank: config.rank,
            shannon,
            simpson,
            chao1: chao1(counts),
            observed_taxa,
            observed_features,
            singletons,
            doubletons,
            evenness: evenness(shannon, observed_taxa),
            bf_ratio,
            bf_status,
            richness_status,
            total_reads: profile.total_reads,
        },
    })
}

fn required_vector(profile: &SampleProfile, rank: Rank) -> Result<&AbundanceVector> {
    profile.vector(rank).ok_or_else(|| Error::Sample {
        sample: profile.sample_id.clone(),
        message: format!("no {} abundance vector in profile", rank),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::profile_sample;
    use crate::table::read_feature_table;
    use crate::UNCLASSIFIED;

    fn vector(rank: Rank, entries: &[(&str, f64)]) -> AbundanceVector {
        AbundanceVector {
            sample_id: "S".into(),
            rank,
            total_reads: 100,
            insufficient_depth: false,
            fractions: entries.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn test_shannon_zero_for_single_taxon() {
        assert_eq!(shannon([1.0, 0.0, 0.0]), 0.0);
        assert_eq!(simpson([1.0, 0.0]), 0.0);
        assert!(shannon([0.5, 0.5]) > 0.0);
    }

    #[test]
    fn test_shannon_increases_with_evenness() {
        let skewed = shannon([0.7, 0.1, 0.1, 0.1]);
        let mid = shannon([0.4, 0.2, 0.2, 0.2]);
        let even = shannon([0.25, 0.25, 0.25, 0.25]);
        assert!(skewed < mid && mid < even);
        assert!((even - 4f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_simpson_even_community() {
        assert!((simpson([0.25; 4]) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_chao1_branches() {
        // F2 > 0: 4 + 2^2 / (2 * 1) = 6
        assert_eq!(chao1(&[1, 1, 2, 10, 0]), 6.0);
        // F2 == 0, F1 > 1: 3 + 2 * 1 / 2 = 4
        assert_eq!(chao1(&[1, 1, 10]), 4.0);
        // F2 == 0, F1 <= 1
        assert_eq!(chao1(&[1, 10, 5]), 3.0);
        assert_eq!(chao1(&[]), 0.0);
    }

    #[test]
    fn test_evenness_undefined_for_single_taxon() {
        assert_eq!(
            evenness(0.0, 1),
            Measure::Undefined {
                reason: ReasonCode::TooFewTaxa
            }
        );
        let e = evenness(2f64.ln(), 2).value().unwrap();
        assert!((e - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_bf_ratio_zero_firmicutes_undefined() {
        let phylum = vector(Rank::Phylum, &[("Bacteroidota", 0.6), (UNCLASSIFIED, 0.4)]);
        assert_eq!(
            bf_ratio(&phylum),
            Measure::Undefined {
                reason: ReasonCode::ZeroDenominator
            }
        );
    }

    #[test]
    fn test_bf_ratio_sums_naming_schemes() {
        let phylum = vector(
            Rank::Phylum,
            &[
                ("Bacteroidetes", 0.2),
                ("Bacteroidota", 0.2),
                ("Firmicutes", 0.1),
                ("Bacillota", 0.1),
                (UNCLASSIFIED, 0.4),
            ],
        );
        let ratio = bf_ratio(&phylum).value().unwrap();
        assert!((ratio - 2.0).abs() < 1e-12);
        assert_eq!(BandStatus::classify(ratio, 0.84, 4.94), BandStatus::Normal);
        assert_eq!(BandStatus::classify(0.5, 0.84, 4.94), BandStatus::Low);
        assert_eq!(BandStatus::classify(5.0, 0.84, 4.94), BandStatus::High);
    }

    const TABLE: &str = "id\tS1\tZERO\tTaxon
a1\t50\t0\tp__Bacteroidota; g__Bacteroides
a2\t25\t0\tp__Firmicutes; g__Faecalibacterium
a3\t1\t0\tp__Firmicutes; g__Blautia
a4\t2\t0\tp__Firmicutes; g__Roseburia
";

    #[test]
    fn test_compute_diversity_on_profile() {
        let table = read_feature_table(TABLE.as_bytes()).unwrap();
        let profile = profile_sample(&table, 0, &[], 1);
        let outcome = compute_diversity(&profile, &DiversityConfig::default()).unwrap();
        let metrics = outcome.value().unwrap();

        assert_eq!(metrics.rank, Rank::Genus);
        assert_eq!(metrics.observed_taxa, 4);
        assert_eq!(metrics.observed_features, 4);
        assert_eq!(metrics.singletons, 1);
        assert_eq!(metrics.doubletons, 1);
        assert!((metrics.chao1 - 4.5).abs() < 1e-12);
        assert_eq!(metrics.total_reads, 78);
        let ratio = metrics.bf_ratio.value().unwrap();
        assert!((ratio - 50.0 / 28.0).abs() < 1e-12);
        assert_eq!(metrics.bf_status, Some(BandStatus::Normal));
        assert_eq!(metrics.richness_status, BandStatus::Low);
    }

    #[test]
    fn test_zero_depth_sample_is_insufficient() {
        let table = read_feature_table(TABLE.as_bytes()).unwrap();
        let profile = profile_sample(&table, 1, &[], 1);
        let outcome = compute_diversity(&profile, &DiversityConfig::default()).unwrap();
        assert_eq!(outcome.reason(), Some(ReasonCode::InsufficientDepth));
    }

    #[test]
    fn test_missing_rank_vector_fails_sample() {
        let table = read_feature_table(TABLE.as_bytes()).unwrap();
        let profile = profile_sample(&table, 0, &[], 1);
        let config = DiversityConfig {
            rank: Rank::Family,
            ..Default::default()
        };
        assert!(matches!(
            compute_diversity(&profile, &config),
            Err(Error::Sample { .. })
        ));
    }
}
