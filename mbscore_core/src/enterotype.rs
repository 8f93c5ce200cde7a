//! Enterotype classification.
//!
//! A sample is projected onto the reference feature genera and clustered
//! together with the three reference centroids. The clustering itself sits
//! behind [`Clusterer`] so other algorithms can be swapped in.

use crate::advice::EnterotypeTraits;
use crate::config::EnterotypeConfig;
use crate::reference::ReferenceData;
use crate::{AbundanceVector, Enterotype, ReasonCode, StageOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of clustering a point set
#[derive(Clone, Debug, PartialEq)]
pub struct Clustering {
    /// Cluster index for each input point
    pub assignments: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub iterations: usize,
}

/// Partition points into as many clusters as there are seeds
pub trait Clusterer: Send + Sync {
    fn cluster(&self, points: &[Vec<f64>], seeds: &[Vec<f64>]) -> Clustering;
}

/// Deterministic K-means seeded from fixed centroids
#[derive(Clone, Debug)]
pub struct SeededKMeans {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl SeededKMeans {
    pub fn from_config(config: &EnterotypeConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
        }
    }
}

impl Clusterer for SeededKMeans {
    fn cluster(&self, points: &[Vec<f64>], seeds: &[Vec<f64>]) -> Clustering {
        let mut centroids = seeds.to_vec();
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;
            let assignments = assign(points, &centroids);

            let mut shift: f64 = 0.0;
            for (k, centroid) in centroids.iter_mut().enumerate() {
                let members: Vec<&Vec<f64>> = points
                    .iter()
                    .zip(&assignments)
                    .filter(|(_, a)| **a == k)
                    .map(|(p, _)| p)
                    .collect();
                // Empty clusters keep their previous centroid
                if members.is_empty() {
                    continue;
                }
                let updated: Vec<f64> = (0..centroid.len())
                    .map(|d| members.iter().map(|p| p[d]).sum::<f64>() / members.len() as f64)
                    .collect();
                shift = shift.max(euclidean(centroid, &updated));
                *centroid = updated;
            }

            if shift <= self.tolerance {
                break;
            }
        }

        Clustering {
            assignments: assign(points, &centroids),
            centroids,
            iterations,
        }
    }
}

/// Nearest centroid per point; ties go to the lowest index
fn assign(points: &[Vec<f64>], centroids: &[Vec<f64>]) -> Vec<usize> {
    points
        .iter()
        .map(|p| nearest(p, centroids.iter().map(Vec::as_slice)).unwrap_or(0))
        .collect()
}

fn nearest<'a>(point: &[f64], candidates: impl Iterator<Item = &'a [f64]>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, c) in candidates.enumerate() {
        let d = euclidean(point, c);
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Enterotype assignment for one sample
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EnterotypeCall {
    pub label: Enterotype,
    /// Set when the cluster's top two genera are too close or its top genus
    /// is not a signature genus; the label then comes from the nearest
    /// reference centroid
    pub low_confidence: bool,
    /// Top-weighted genus of the sample's cluster centroid
    pub cluster_top_genus: String,
    /// Sample abundance of each feature genus
    pub key_genera: BTreeMap<String, f64>,
    /// Euclidean distance from the sample to each reference centroid
    pub distances: BTreeMap<String, f64>,
    pub iterations: usize,
    pub traits: EnterotypeTraits,
}

/// Classify one genus-rank vector
pub fn classify_enterotype(
    vector: &AbundanceVector,
    refs: &ReferenceData,
    config: &EnterotypeConfig,
    clusterer: &dyn Clusterer,
) -> StageOutcome<EnterotypeCall> {
    if vector.insufficient_depth {
        return StageOutcome::insufficient(ReasonCode::InsufficientDepth);
    }
    let classified = vector.classified_fraction();
    if classified < config.min_classified_fraction {
        return StageOutcome::InsufficientData {
            reason: ReasonCode::InsufficientGenusCoverage,
            detail: Some(format!(
                "classified genus fraction {:.4} below {}",
                classified, config.min_classified_fraction
            )),
        };
    }

    let centroids = refs.centroids();
    let genera = refs.enterotype_genera();
    let sample: Vec<f64> = genera.iter().map(|g| vector.group_abundance(g)).collect();
    let seeds: Vec<Vec<f64>> = centroids
        .iter()
        .map(|c| genera.iter().map(|g| c.profile.get(g).copied().unwrap_or(0.0)).collect())
        .collect();

    let nearest_label = nearest(&sample, seeds.iter().map(Vec::as_slice))
        .and_then(|idx| centroids.get(idx))
        .map(|c| c.label);
    let Some(nearest_label) = nearest_label else {
        return StageOutcome::unavailable(ReasonCode::NotSupplied, "no enterotype centroids loaded");
    };
    let distances: Vec<f64> = seeds.iter().map(|s| euclidean(&sample, s)).collect();

    let mut points = seeds.clone();
    points.push(sample.clone());
    let clustering = clusterer.cluster(&points, &seeds);

    let cluster = clustering
        .assignments
        .last()
        .and_then(|k| clustering.centroids.get(*k));
    let ranked = cluster.map(|c| rank_genera(genera, c)).unwrap_or_default();
    let (top_genus, top, second) = match ranked.as_slice() {
        [(g, top), (_, second), ..] => (g.clone(), *top, *second),
        [(g, top)] => (g.clone(), *top, 0.0),
        [] => (String::new(), 0.0, 0.0),
    };

    let ambiguous = top <= 0.0 || (top - second) / top < config.ambiguity_margin;
    let signature = centroids
        .iter()
        .find(|c| c.dominant_genus == top_genus)
        .map(|c| c.label);

    let (label, low_confidence) = match signature {
        Some(label) if !ambiguous => (label, false),
        _ => (nearest_label, true),
    };

    if low_confidence {
        tracing::debug!(
            "{}: low-confidence enterotype {} (cluster top genus {})",
            vector.sample_id,
            label,
            top_genus
        );
    }

    StageOutcome::Computed {
        value: EnterotypeCall {
            label,
            low_confidence,
            cluster_top_genus: top_genus,
            key_genera: genera.iter().cloned().zip(sample).collect(),
            distances: centroids
                .iter()
                .zip(distances)
                .map(|(c, d)| (c.label.label().to_string(), d))
                .collect(),
            iterations: clustering.iterations,
            traits: EnterotypeTraits::for_label(label),
        },
    }
}

/// Genera by descending centroid weight, ties in feature order
fn rank_genera(genera: &[String], centroid: &[f64]) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = genera.iter().cloned().zip(centroid.iter().copied()).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::build_default_references;
    use crate::reference::{DiseaseTable, EnterotypeTable, RangeTable};
    use crate::{Rank, UNCLASSIFIED};

    fn genus_vector(entries: &[(&str, f64)]) -> AbundanceVector {
        AbundanceVector {
            sample_id: "S".into(),
            rank: Rank::Genus,
            total_reads: 1000,
            insufficient_depth: false,
            fractions: entries.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    fn classify(vector: &AbundanceVector) -> StageOutcome<EnterotypeCall> {
        let refs = build_default_references();
        let config = EnterotypeConfig::default();
        classify_enterotype(vector, &refs, &config, &SeededKMeans::from_config(&config))
    }

    #[test]
    fn test_bacteroides_dominant_sample() {
        let vector = genus_vector(&[
            ("Bacteroides", 0.45),
            ("Prevotella", 0.10),
            ("Ruminococcus", 0.05),
            ("Other", 0.40),
        ]);
        let call = classify(&vector);
        let call = call.value().unwrap();
        assert_eq!(call.label, Enterotype::BacteroidesDominant);
        assert!(!call.low_confidence);
        assert_eq!(call.cluster_top_genus, "Bacteroides");
        assert_eq!(call.key_genera["Bacteroides"], 0.45);
        assert_eq!(call.distances.len(), 3);
        assert_eq!(call.traits.display_name, "拟杆菌型");
        assert!(call.traits.avoid_foods.contains(&"红肉".to_string()));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let vector = genus_vector(&[
            ("Prevotella_9", 0.25),
            ("Bacteroides", 0.08),
            ("Faecalibacterium", 0.1),
            (UNCLASSIFIED, 0.57),
        ]);
        let a = classify(&vector);
        let b = classify(&vector);
        assert_eq!(a, b);
        assert_eq!(a.value().unwrap().label, Enterotype::PrevotellaDominant);
    }

    #[test]
    fn test_non_signature_top_genus_is_low_confidence() {
        let vector = genus_vector(&[("Faecalibacterium", 0.6), (UNCLASSIFIED, 0.4)]);
        let call = classify(&vector);
        let call = call.value().unwrap();
        assert_eq!(call.cluster_top_genus, "Faecalibacterium");
        assert!(call.low_confidence);
        assert_eq!(call.label, Enterotype::RuminococcusDominant);
    }

    struct TiedClusterer;

    impl Clusterer for TiedClusterer {
        fn cluster(&self, points: &[Vec<f64>], _seeds: &[Vec<f64>]) -> Clustering {
            let mut centroid = vec![0.0; 8];
            centroid[0] = 0.20;
            centroid[1] = 0.195;
            Clustering {
                assignments: vec![0; points.len()],
                centroids: vec![centroid],
                iterations: 1,
            }
        }
    }

    #[test]
    fn test_near_tie_falls_back_to_nearest_reference() {
        let refs = build_default_references();
        let config = EnterotypeConfig::default();
        let vector = genus_vector(&[("Prevotella", 0.3), ("Bacteroides", 0.05), (UNCLASSIFIED, 0.65)]);
        let outcome = classify_enterotype(&vector, &refs, &config, &TiedClusterer);
        let call = outcome.value().unwrap();
        assert!(call.low_confidence);
        assert_eq!(call.label, Enterotype::PrevotellaDominant);
    }

    #[test]
    fn test_low_genus_coverage_skipped() {
        let vector = genus_vector(&[("Bacteroides", 0.01), (UNCLASSIFIED, 0.99)]);
        let outcome = classify(&vector);
        assert_eq!(outcome.reason(), Some(ReasonCode::InsufficientGenusCoverage));
    }

    #[test]
    fn test_zero_depth_skipped() {
        let mut vector = genus_vector(&[(UNCLASSIFIED, 0.0)]);
        vector.insufficient_depth = true;
        assert_eq!(classify(&vector).reason(), Some(ReasonCode::InsufficientDepth));
    }

    #[test]
    fn test_no_centroids_is_unavailable() {
        let defaults = build_default_references();
        let refs = ReferenceData::from_parts(
            RangeTable {
                version: "t".into(),
                taxa: defaults.ranges().to_vec(),
            },
            DiseaseTable {
                version: "t".into(),
                diseases: defaults.diseases().to_vec(),
            },
            EnterotypeTable {
                version: "t".into(),
                genera: defaults.enterotype_genera().to_vec(),
                centroids: Vec::new(),
            },
            defaults.core_genera().to_vec(),
            "t".into(),
        );
        let config = EnterotypeConfig::default();
        let vector = genus_vector(&[("Bacteroides", 0.5), (UNCLASSIFIED, 0.5)]);
        let outcome = classify_enterotype(&vector, &refs, &config, &SeededKMeans::from_config(&config));
        assert!(matches!(outcome, StageOutcome::Unavailable { reason: ReasonCode::NotSupplied, .. }));
    }

    #[test]
    fn test_kmeans_keeps_empty_cluster_centroid() {
        let kmeans = SeededKMeans {
            max_iterations: 10,
            tolerance: 1e-12,
        };
        let points = vec![vec![0.0, 0.0], vec![0.1, 0.0]];
        let seeds = vec![vec![0.0, 0.0], vec![5.0, 5.0]];
        let result = kmeans.cluster(&points, &seeds);
        assert_eq!(result.assignments, vec![0, 0]);
        assert_eq!(result.centroids[1], vec![5.0, 5.0]);
        assert!((result.centroids[0][0] - 0.05).abs() < 1e-12);
        assert!(result.iterations <= 10);
    }
}
