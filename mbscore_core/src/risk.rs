//! Disease risk scoring from weighted taxon associations.

use crate::advice::general_prevention;
use crate::normalize::SampleProfile;
use crate::reference::ReferenceData;
use crate::{Direction, DiseaseProfile, PreventionAdvice, ReasonCode, StageOutcome, TierThresholds};
use serde::{Deserialize, Serialize};

/// Up-associated taxa above this fraction are reported as elevated
const ELEVATED_FRACTION: f64 = 0.01;
/// Down-associated taxa below this fraction are reported as depleted
const DEPLETED_FRACTION: f64 = 0.001;
const MAX_FINDINGS: usize = 3;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Tier for a 0-100 score; lower bounds are inclusive
    pub fn classify(score: f64, tiers: &TierThresholds) -> Self {
        if score >= tiers.high {
            RiskTier::High
        } else if score >= tiers.medium {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Elevated,
    Depleted,
}

/// A taxon that drives one disease score
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RiskFinding {
    pub taxon: String,
    pub kind: FindingKind,
    pub abundance: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DiseaseRisk {
    pub disease: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub raw_score: f64,
    pub normalized_score: f64,
    pub tier: RiskTier,
    pub findings: Vec<RiskFinding>,
    /// Present for medium and high tiers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevention: Option<PreventionAdvice>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverallRiskStatus {
    Healthy,
    SubHealthy,
    NeedsAttention,
    NeedsIntervention,
}

impl OverallRiskStatus {
    pub fn from_mean_score(mean: f64) -> Self {
        if mean < 30.0 {
            OverallRiskStatus::Healthy
        } else if mean < 50.0 {
            OverallRiskStatus::SubHealthy
        } else if mean < 70.0 {
            OverallRiskStatus::NeedsAttention
        } else {
            OverallRiskStatus::NeedsIntervention
        }
    }
}

/// Scores for every disease profile plus a summary across them
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessment {
    pub diseases: Vec<DiseaseRisk>,
    pub mean_score: f64,
    pub high_risk_count: usize,
    pub medium_risk_count: usize,
    pub overall_status: OverallRiskStatus,
}

impl RiskAssessment {
    pub fn disease(&self, name: &str) -> Option<&DiseaseRisk> {
        self.diseases.iter().find(|d| d.disease == name)
    }
}

/// Score one disease profile
pub fn score_disease(profile: &SampleProfile, disease: &DiseaseProfile) -> DiseaseRisk {
    let mut raw_score = 0.0;
    let mut findings = Vec::new();

    for assoc in &disease.associations {
        let abundance = profile.abundance(&assoc.taxon, assoc.rank);
        let contribution = abundance * assoc.weight;
        match assoc.direction {
            Direction::Up => {
                raw_score += contribution;
                if abundance > ELEVATED_FRACTION {
                    findings.push(RiskFinding {
                        taxon: assoc.taxon.clone(),
                        kind: FindingKind::Elevated,
                        abundance,
                    });
                }
            }
            Direction::Down => {
                raw_score -= contribution;
                if abundance < DEPLETED_FRACTION {
                    findings.push(RiskFinding {
                        taxon: assoc.taxon.clone(),
                        kind: FindingKind::Depleted,
                        abundance,
                    });
                }
            }
        }
    }
    findings.truncate(MAX_FINDINGS);

    let normalized_score = (raw_score / disease.normalization_constant * 100.0).clamp(0.0, 100.0);
    let tier = RiskTier::classify(normalized_score, &disease.tiers);
    let prevention = match tier {
        RiskTier::Low => None,
        RiskTier::Medium | RiskTier::High => {
            Some(disease.prevention.clone().unwrap_or_else(general_prevention))
        }
    };

    DiseaseRisk {
        disease: disease.name.clone(),
        display_name: disease.display_name.clone(),
        raw_score,
        normalized_score,
        tier,
        findings,
        prevention,
    }
}

/// Score every disease profile for one sample
pub fn score_risks(profile: &SampleProfile, refs: &ReferenceData) -> StageOutcome<RiskAssessment> {
    if profile.insufficient_depth {
        return StageOutcome::insufficient(ReasonCode::InsufficientDepth);
    }

    let diseases: Vec<DiseaseRisk> = refs
        .diseases()
        .iter()
        .map(|d| score_disease(profile, d))
        .collect();

    let mean_score = if diseases.is_empty() {
        0.0
    } else {
        diseases.iter().map(|d| d.normalized_score).sum::<f64>() / diseases.len() as f64
    };
    let high_risk_count = diseases.iter().filter(|d| d.tier == RiskTier::High).count();
    let medium_risk_count = diseases.iter().filter(|d| d.tier == RiskTier::Medium).count();

    tracing::debug!(
        "{}: mean disease score {:.1}, {} high-risk",
        profile.sample_id,
        mean_score,
        high_risk_count
    );

    StageOutcome::Computed {
        value: RiskAssessment {
            diseases,
            mean_score,
            high_risk_count,
            medium_risk_count,
            overall_status: OverallRiskStatus::from_mean_score(mean_score),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::build_default_references;
    use crate::normalize::profile_sample;
    use crate::table::read_feature_table;
    use crate::{AbundanceVector, Rank, TaxonAssociation, UNCLASSIFIED};

    fn profile(genus: &[(&str, f64)], species: &[(&str, f64)]) -> SampleProfile {
        let vector = |rank, entries: &[(&str, f64)]| AbundanceVector {
            sample_id: "S".into(),
            rank,
            total_reads: 10_000,
            insufficient_depth: false,
            fractions: entries.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        };
        SampleProfile::from_vectors(
            "S",
            vec![10_000],
            vec![
                vector(Rank::Phylum, &[(UNCLASSIFIED, 1.0)]),
                vector(Rank::Genus, genus),
                vector(Rank::Species, species),
            ],
        )
    }

    fn assoc(taxon: &str, direction: Direction, weight: f64) -> TaxonAssociation {
        TaxonAssociation {
            taxon: taxon.into(),
            rank: Rank::Genus,
            direction,
            weight,
        }
    }

    fn two_taxon_disease() -> DiseaseProfile {
        DiseaseProfile {
            name: "Test".into(),
            display_name: None,
            associations: vec![
                assoc("Alpha", Direction::Up, 50.0),
                assoc("Beta", Direction::Down, 20.0),
            ],
            normalization_constant: 1.0,
            tiers: TierThresholds::default(),
            prevention: None,
        }
    }

    #[test]
    fn test_weighted_score_and_tier() {
        let p = profile(&[("Alpha", 0.02), ("Beta", 0.01), (UNCLASSIFIED, 0.97)], &[]);
        let risk = score_disease(&p, &two_taxon_disease());
        assert!((risk.raw_score - 0.8).abs() < 1e-12);
        assert!((risk.normalized_score - 80.0).abs() < 1e-9);
        assert_eq!(risk.tier, RiskTier::High);
        assert_eq!(risk.findings.len(), 1);
        assert_eq!(risk.findings[0].kind, FindingKind::Elevated);
        assert_eq!(risk.prevention, Some(general_prevention()));
    }

    #[test]
    fn test_tier_boundaries() {
        let tiers = TierThresholds::default();
        assert_eq!(RiskTier::classify(0.0, &tiers), RiskTier::Low);
        assert_eq!(RiskTier::classify(39.999, &tiers), RiskTier::Low);
        assert_eq!(RiskTier::classify(40.0, &tiers), RiskTier::Medium);
        assert_eq!(RiskTier::classify(69.999, &tiers), RiskTier::Medium);
        assert_eq!(RiskTier::classify(70.0, &tiers), RiskTier::High);
        assert_eq!(RiskTier::classify(100.0, &tiers), RiskTier::High);
    }

    #[test]
    fn test_score_clipped_to_range() {
        let heavy = profile(&[("Alpha", 0.9), (UNCLASSIFIED, 0.1)], &[]);
        assert_eq!(score_disease(&heavy, &two_taxon_disease()).normalized_score, 100.0);

        let protective = profile(&[("Beta", 0.5), (UNCLASSIFIED, 0.5)], &[]);
        let risk = score_disease(&protective, &two_taxon_disease());
        assert!(risk.raw_score < 0.0);
        assert_eq!(risk.normalized_score, 0.0);
        assert_eq!(risk.tier, RiskTier::Low);
    }

    #[test]
    fn test_all_taxa_absent_scores_low() {
        let p = profile(&[(UNCLASSIFIED, 1.0)], &[]);
        let risk = score_disease(&p, &two_taxon_disease());
        assert_eq!(risk.raw_score, 0.0);
        assert_eq!(risk.tier, RiskTier::Low);
        assert!(risk.prevention.is_none());
        // Beta absent counts as depleted
        assert_eq!(risk.findings[0].kind, FindingKind::Depleted);
    }

    #[test]
    fn test_species_associations_use_species_vector() {
        let refs = build_default_references();
        let p = profile(
            &[("Fusobacterium", 0.05), ("Bacteroides", 0.2), (UNCLASSIFIED, 0.75)],
            &[("Bacteroides_fragilis", 0.05), (UNCLASSIFIED, 0.95)],
        );
        let crc = refs.disease("CRC").unwrap();
        let risk = score_disease(&p, crc);
        // 0.05 * 80 + 0.05 * 40
        assert!((risk.raw_score - 6.0).abs() < 1e-9);
        assert_eq!(risk.normalized_score, 100.0);
        assert!(risk.findings.len() <= 3);
        let advice = risk.prevention.unwrap();
        assert_eq!(advice.supplements, "膳食纤维、益生菌、维生素D");
    }

    #[test]
    fn test_silva_table_species_reach_risk_score() {
        let raw = "#OTU ID\tS1\tTaxon
asv1\t100\td__Bacteria; p__Bacteroidota; c__Bacteroidia; o__Bacteroidales; f__Prevotellaceae; g__Prevotella_9; s__Prevotella_copri
asv2\t900\td__Bacteria; p__Firmicutes; c__Clostridia; o__Oscillospirales; f__Ruminococcaceae; g__Faecalibacterium; s__prausnitzii
";
        let table = read_feature_table(raw.as_bytes()).unwrap();
        let p = profile_sample(&table, 0, &[], 1);
        assert!((p.abundance("Prevotella_copri", Rank::Species) - 0.1).abs() < 1e-12);
        assert!((p.abundance("Faecalibacterium_prausnitzii", Rank::Species) - 0.9).abs() < 1e-12);

        let refs = build_default_references();
        let risk = score_disease(&p, refs.disease("RA").unwrap());
        // 0.1 * 30 (P. copri) - 0.9 * 20 (Faecalibacterium)
        assert!((risk.raw_score + 15.0).abs() < 1e-9);
        assert_eq!(risk.tier, RiskTier::Low);
    }

    #[test]
    fn test_bracketed_gnavus_reaches_ibd_score() {
        let raw = "#OTU ID\tS1\tTaxon
asv1\t100\tp__Firmicutes; f__Lachnospiraceae; g__[Ruminococcus]_gnavus_group; s__[Ruminococcus]_gnavus
asv2\t900\tp__Firmicutes; g__
";
        let table = read_feature_table(raw.as_bytes()).unwrap();
        let p = profile_sample(&table, 0, &[], 1);
        let refs = build_default_references();
        let risk = score_disease(&p, refs.disease("IBD").unwrap());
        // 0.1 * 50 (R. gnavus); depleted taxa contribute nothing
        assert!((risk.raw_score - 5.0).abs() < 1e-9);
        assert_eq!(risk.tier, RiskTier::High);
    }

    #[test]
    fn test_all_fourteen_diseases_scored() {
        let refs = build_default_references();
        let p = profile(&[("Faecalibacterium", 0.1), (UNCLASSIFIED, 0.9)], &[]);
        let outcome = score_risks(&p, &refs);
        let assessment = outcome.value().unwrap();
        assert_eq!(assessment.diseases.len(), 14);
        assert!(assessment
            .diseases
            .iter()
            .all(|d| (0.0..=100.0).contains(&d.normalized_score)));
        assert_eq!(assessment.overall_status, OverallRiskStatus::Healthy);
        assert!(assessment.disease("IBD").is_some());
    }

    #[test]
    fn test_overall_status_bands() {
        assert_eq!(OverallRiskStatus::from_mean_score(29.9), OverallRiskStatus::Healthy);
        assert_eq!(OverallRiskStatus::from_mean_score(30.0), OverallRiskStatus::SubHealthy);
        assert_eq!(OverallRiskStatus::from_mean_score(50.0), OverallRiskStatus::NeedsAttention);
        assert_eq!(OverallRiskStatus::from_mean_score(70.0), OverallRiskStatus::NeedsIntervention);
    }

    #[test]
    fn test_zero_depth_is_insufficient() {
        let refs = build_default_references();
        let mut p = profile(&[(UNCLASSIFIED, 0.0)], &[]);
        p.insufficient_depth = true;
        assert_eq!(score_risks(&p, &refs).reason(), Some(ReasonCode::InsufficientDepth));
    }
}
