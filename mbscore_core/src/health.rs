//! Core-taxon health scoring against curated reference ranges.

use crate::advice::{Recommendation, RecommendationKind};
use crate::config::HealthConfig;
use crate::normalize::SampleProfile;
use crate::reference::ReferenceData;
use crate::{ReasonCode, ReferenceRange, StageOutcome, TaxonCategory};
use serde::{Deserialize, Serialize};

/// Abundance relative to a reference range
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RangeStatus {
    Below,
    Normal,
    Above,
}

/// Score of one curated taxon
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TaxonScore {
    pub taxon: String,
    pub category: TaxonCategory,
    pub abundance: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub status: RangeStatus,
    /// Harmful or conditional taxon above its upper bound
    pub flagged: bool,
    pub score: f64,
}

/// Mean sub-score of one category
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CategoryScore {
    pub category: TaxonCategory,
    pub score: f64,
    pub taxa_scored: usize,
    pub flagged: usize,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthGrade {
    Excellent,
    Good,
    Normal,
    SubHealthy,
    NeedsImprovement,
}

impl HealthGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            HealthGrade::Excellent
        } else if score >= 80.0 {
            HealthGrade::Good
        } else if score >= 70.0 {
            HealthGrade::Normal
        } else if score >= 60.0 {
            HealthGrade::SubHealthy
        } else {
            HealthGrade::NeedsImprovement
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HealthGrade::Excellent => "Excellent",
            HealthGrade::Good => "Good",
            HealthGrade::Normal => "Normal",
            HealthGrade::SubHealthy => "Sub-healthy",
            HealthGrade::NeedsImprovement => "Needs improvement",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            HealthGrade::Excellent => "优秀",
            HealthGrade::Good => "良好",
            HealthGrade::Normal => "正常",
            HealthGrade::SubHealthy => "亚健康",
            HealthGrade::NeedsImprovement => "需改善",
        }
    }
}

/// Beneficial sub-score below this triggers a probiotic recommendation
const PROBIOTIC_THRESHOLD: f64 = 60.0;
/// Harmful sub-score below this triggers a recommendation to suppress them
const SUPPRESS_HARMFUL_THRESHOLD: f64 = 70.0;

/// Verbal rating of the beneficial sub-score
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CategoryEvaluation {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl CategoryEvaluation {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            CategoryEvaluation::Excellent
        } else if score >= 60.0 {
            CategoryEvaluation::Good
        } else if score >= 40.0 {
            CategoryEvaluation::Fair
        } else {
            CategoryEvaluation::Poor
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            CategoryEvaluation::Excellent => "优秀",
            CategoryEvaluation::Good => "良好",
            CategoryEvaluation::Fair => "一般",
            CategoryEvaluation::Poor => "较差",
        }
    }
}

/// Risk rating of the harmful sub-score (a high sub-score is low risk)
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HarmRiskLevel {
    Low,
    LowMedium,
    MediumHigh,
    High,
}

impl HarmRiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            HarmRiskLevel::Low
        } else if score >= 60.0 {
            HarmRiskLevel::LowMedium
        } else if score >= 40.0 {
            HarmRiskLevel::MediumHigh
        } else {
            HarmRiskLevel::High
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            HarmRiskLevel::Low => "低风险",
            HarmRiskLevel::LowMedium => "中低风险",
            HarmRiskLevel::MediumHigh => "中高风险",
            HarmRiskLevel::High => "高风险",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthAssessment {
    pub overall: f64,
    pub grade: HealthGrade,
    pub grade_display: String,
    pub beneficial: CategoryScore,
    pub conditional: CategoryScore,
    pub harmful: CategoryScore,
    pub beneficial_evaluation: CategoryEvaluation,
    pub harmful_risk_level: HarmRiskLevel,
    pub taxa: Vec<TaxonScore>,
    pub flagged_conditional: usize,
    pub attention_needed: bool,
    pub recommendations: Vec<Recommendation>,
}

/// Recommendations for the weak spots of an assessment
pub fn recommendations(
    beneficial: &CategoryScore,
    harmful: &CategoryScore,
    attention_needed: bool,
) -> Vec<Recommendation> {
    let mut kinds = Vec::new();
    if beneficial.score < PROBIOTIC_THRESHOLD {
        kinds.push(RecommendationKind::Probiotics);
    }
    if harmful.score < SUPPRESS_HARMFUL_THRESHOLD {
        kinds.push(RecommendationKind::SuppressHarmful);
    }
    if attention_needed {
        kinds.push(RecommendationKind::ImmuneBalance);
    }
    kinds.into_iter().map(Recommendation::for_kind).collect()
}

/// Score one taxon abundance against its range
pub fn score_taxon(range: &ReferenceRange, abundance: f64) -> TaxonScore {
    let status = if abundance < range.minimum {
        RangeStatus::Below
    } else if abundance > range.maximum {
        RangeStatus::Above
    } else {
        RangeStatus::Normal
    };

    let single_sided = range.category.is_single_sided();
    let score = if single_sided {
        upper_bound_score(abundance, range.maximum)
    } else {
        match status {
            RangeStatus::Normal => 100.0,
            RangeStatus::Below => 50.0 * abundance / range.minimum,
            RangeStatus::Above => 80.0,
        }
    };

    TaxonScore {
        taxon: range.taxon.clone(),
        category: range.category,
        abundance,
        minimum: range.minimum,
        maximum: range.maximum,
        status,
        flagged: single_sided && status == RangeStatus::Above,
        score,
    }
}

/// 100 up to `max`, then losing 50 points per `max` of excess, floored at 0
fn upper_bound_score(abundance: f64, max: f64) -> f64 {
    if abundance <= max {
        100.0
    } else if max <= 0.0 {
        0.0
    } else {
        (100.0 - 50.0 * (abundance - max) / max).max(0.0)
    }
}

fn category_score(category: TaxonCategory, taxa: &[TaxonScore]) -> CategoryScore {
    let members: Vec<&TaxonScore> = taxa.iter().filter(|t| t.category == category).collect();
    // An empty category scores 100
    let score = if members.is_empty() {
        100.0
    } else {
        members.iter().map(|t| t.score).sum::<f64>() / members.len() as f64
    };
    CategoryScore {
        category,
        score,
        taxa_scored: members.len(),
        flagged: members.iter().filter(|t| t.flagged).count(),
    }
}

/// Score every curated taxon of a profile
pub fn score_health(
    profile: &SampleProfile,
    refs: &ReferenceData,
    config: &HealthConfig,
) -> StageOutcome<HealthAssessment> {
    if profile.insufficient_depth {
        return StageOutcome::insufficient(ReasonCode::InsufficientDepth);
    }

    let taxa: Vec<TaxonScore> = refs
        .ranges()
        .iter()
        .map(|range| score_taxon(range, profile.abundance(&range.taxon, range.rank)))
        .collect();

    let beneficial = category_score(TaxonCategory::Beneficial, &taxa);
    let conditional = category_score(TaxonCategory::Conditional, &taxa);
    let harmful = category_score(TaxonCategory::Harmful, &taxa);

    let overall = (config.beneficial_weight * beneficial.score
        + config.harmful_weight * harmful.score
        + config.conditional_weight * conditional.score)
        .clamp(0.0, 100.0);
    let grade = HealthGrade::from_score(overall);
    let flagged_conditional = conditional.flagged;

    if harmful.flagged > 0 {
        tracing::debug!(
            "{}: {} harmful taxa above range",
            profile.sample_id,
            harmful.flagged
        );
    }

    let attention_needed = flagged_conditional > config.attention_threshold;

    StageOutcome::Computed {
        value: HealthAssessment {
            overall,
            grade,
            grade_display: grade.display_name().to_string(),
            beneficial_evaluation: CategoryEvaluation::from_score(beneficial.score),
            harmful_risk_level: HarmRiskLevel::from_score(harmful.score),
            recommendations: recommendations(&beneficial, &harmful, attention_needed),
            beneficial,
            conditional,
            harmful,
            taxa,
            flagged_conditional,
            attention_needed,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::build_default_references;
    use crate::{AbundanceVector, Rank, UNCLASSIFIED};

    fn range(category: TaxonCategory, min: f64, max: f64, optimal: f64) -> ReferenceRange {
        ReferenceRange {
            taxon: "Roseburia".into(),
            category,
            rank: Rank::Genus,
            minimum: min,
            maximum: max,
            optimal,
        }
    }

    fn profile(entries: &[(&str, f64)]) -> SampleProfile {
        let vector = |rank| AbundanceVector {
            sample_id: "S".into(),
            rank,
            total_reads: 10_000,
            insufficient_depth: false,
            fractions: entries.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        };
        SampleProfile::from_vectors(
            "S",
            vec![10_000],
            vec![vector(Rank::Phylum), vector(Rank::Genus), vector(Rank::Species)],
        )
    }

    #[test]
    fn test_above_range_beneficial() {
        let score = score_taxon(&range(TaxonCategory::Beneficial, 0.001, 0.05, 0.02), 0.10);
        assert_eq!(score.status, RangeStatus::Above);
        assert_eq!(score.score, 80.0);
        assert!(!score.flagged);
    }

    #[test]
    fn test_below_range_beneficial_scales_linearly() {
        let score = score_taxon(&range(TaxonCategory::Beneficial, 0.01, 0.05, 0.02), 0.005);
        assert_eq!(score.status, RangeStatus::Below);
        assert!((score.score - 25.0).abs() < 1e-9);

        let absent = score_taxon(&range(TaxonCategory::Beneficial, 0.01, 0.05, 0.02), 0.0);
        assert_eq!(absent.score, 0.0);
    }

    #[test]
    fn test_harmful_above_max_is_flagged() {
        let r = range(TaxonCategory::Harmful, 0.0, 0.01, 0.0);
        let score = score_taxon(&r, 0.015);
        assert!(score.flagged);
        assert!((score.score - 75.0).abs() < 1e-9);

        let way_over = score_taxon(&r, 0.05);
        assert_eq!(way_over.score, 0.0);

        let within = score_taxon(&r, 0.01);
        assert!(!within.flagged);
        assert_eq!(within.score, 100.0);
    }

    #[test]
    fn test_zero_max_taxon_present_scores_zero() {
        let score = score_taxon(&range(TaxonCategory::Conditional, 0.0, 0.0, 0.0), 0.001);
        assert!(score.flagged);
        assert_eq!(score.score, 0.0);
    }

    #[test]
    fn test_grade_ladder() {
        assert_eq!(HealthGrade::from_score(95.0), HealthGrade::Excellent);
        assert_eq!(HealthGrade::from_score(90.0), HealthGrade::Excellent);
        assert_eq!(HealthGrade::from_score(89.9), HealthGrade::Good);
        assert_eq!(HealthGrade::from_score(70.0), HealthGrade::Normal);
        assert_eq!(HealthGrade::from_score(60.0), HealthGrade::SubHealthy);
        assert_eq!(HealthGrade::from_score(59.9), HealthGrade::NeedsImprovement);
        assert_eq!(HealthGrade::SubHealthy.display_name(), "亚健康");
    }

    #[test]
    fn test_every_curated_taxon_scored() {
        let refs = build_default_references();
        let outcome = score_health(
            &profile(&[("Bacteroides", 0.2), (UNCLASSIFIED, 0.8)]),
            &refs,
            &HealthConfig::default(),
        );
        let assessment = outcome.value().unwrap();
        assert_eq!(assessment.taxa.len(), 43);
        assert_eq!(assessment.beneficial.taxa_scored, 13);
        assert_eq!(assessment.harmful.score, 100.0);
        assert_eq!(assessment.conditional.score, 100.0);
        // Every beneficial taxon absent
        assert_eq!(assessment.beneficial.score, 0.0);
        assert!((assessment.overall - 60.0).abs() < 1e-9);
        assert_eq!(assessment.grade, HealthGrade::SubHealthy);
        assert_eq!(assessment.beneficial_evaluation, CategoryEvaluation::Poor);
        assert_eq!(assessment.harmful_risk_level, HarmRiskLevel::Low);
        let kinds: Vec<_> = assessment.recommendations.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![RecommendationKind::Probiotics]);
    }

    #[test]
    fn test_evaluation_and_risk_level_bands() {
        assert_eq!(CategoryEvaluation::from_score(80.0), CategoryEvaluation::Excellent);
        assert_eq!(CategoryEvaluation::from_score(79.9), CategoryEvaluation::Good);
        assert_eq!(CategoryEvaluation::from_score(40.0), CategoryEvaluation::Fair);
        assert_eq!(CategoryEvaluation::from_score(39.9).display_name(), "较差");
        assert_eq!(HarmRiskLevel::from_score(80.0), HarmRiskLevel::Low);
        assert_eq!(HarmRiskLevel::from_score(60.0), HarmRiskLevel::LowMedium);
        assert_eq!(HarmRiskLevel::from_score(59.9), HarmRiskLevel::MediumHigh);
        assert_eq!(HarmRiskLevel::from_score(0.0).display_name(), "高风险");
    }

    #[test]
    fn test_harmful_load_lowers_overall() {
        let refs = build_default_references();
        let config = HealthConfig::default();
        let clean = score_health(&profile(&[("Bifidobacterium", 0.05), (UNCLASSIFIED, 0.95)]), &refs, &config);
        let loaded = score_health(
            &profile(&[
                ("Bifidobacterium", 0.05),
                ("Escherichia-Shigella", 0.02),
                (UNCLASSIFIED, 0.93),
            ]),
            &refs,
            &config,
        );
        let clean = clean.value().unwrap();
        let loaded = loaded.value().unwrap();
        assert!(loaded.overall < clean.overall);
        assert_eq!(loaded.harmful.flagged, 2);
    }

    #[test]
    fn test_attention_needed_over_three_conditional_flags() {
        let refs = build_default_references();
        let outcome = score_health(
            &profile(&[
                ("Veillonella", 0.01),
                ("Streptococcus", 0.05),
                ("Eggerthella", 0.01),
                ("Haemophilus", 0.01),
                (UNCLASSIFIED, 0.92),
            ]),
            &refs,
            &HealthConfig::default(),
        );
        let assessment = outcome.value().unwrap();
        assert_eq!(assessment.flagged_conditional, 4);
        assert!(assessment.attention_needed);
        assert!(assessment
            .recommendations
            .iter()
            .any(|r| r.kind == RecommendationKind::ImmuneBalance));
    }

    #[test]
    fn test_zero_depth_is_insufficient() {
        let refs = build_default_references();
        let mut p = profile(&[(UNCLASSIFIED, 0.0)]);
        p.insufficient_depth = true;
        let outcome = score_health(&p, &refs, &HealthConfig::default());
        assert_eq!(outcome.reason(), Some(ReasonCode::InsufficientDepth));
    }
}
