//! Per-sample result assembly.

use crate::age::AgePrediction;
use crate::diversity::DiversityMetrics;
use crate::enterotype::EnterotypeCall;
use crate::functional::FunctionalSummary;
use crate::health::HealthAssessment;
use crate::normalize::{top_taxa, SampleProfile, TaxonShare};
use crate::reference::ReferenceVersions;
use crate::risk::RiskAssessment;
use crate::{Rank, StageOutcome, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of every stage for one sample
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Completeness {
    pub diversity: StageStatus,
    pub enterotype: StageStatus,
    pub health: StageStatus,
    pub disease_risk: StageStatus,
    pub age: StageStatus,
    pub functional: StageStatus,
}

impl Completeness {
    fn statuses(&self) -> [StageStatus; 6] {
        [
            self.diversity,
            self.enterotype,
            self.health,
            self.disease_risk,
            self.age,
            self.functional,
        ]
    }

    /// Every stage computed
    pub fn is_complete(&self) -> bool {
        self.statuses().iter().all(|s| *s == StageStatus::Computed)
    }

    pub fn computed_count(&self) -> usize {
        self.statuses()
            .iter()
            .filter(|s| **s == StageStatus::Computed)
            .count()
    }
}

/// Top taxa per rank
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Composition {
    pub phylum: Vec<TaxonShare>,
    pub genus: Vec<TaxonShare>,
    pub species: Vec<TaxonShare>,
}

impl Composition {
    pub fn from_profile(profile: &SampleProfile, n: usize) -> Self {
        let top = |rank| profile.vector(rank).map(|v| top_taxa(v, n)).unwrap_or_default();
        Self {
            phylum: top(Rank::Phylum),
            genus: top(Rank::Genus),
            species: top(Rank::Species),
        }
    }
}

/// Where and how a result was produced
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Provenance {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub engine_version: String,
    pub diversity_rank: Rank,
    pub references: ReferenceVersions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_model: Option<String>,
}

/// Raw stage outputs handed to the aggregator
#[derive(Clone, Debug)]
pub struct StageOutcomes {
    pub diversity: StageOutcome<DiversityMetrics>,
    pub enterotype: StageOutcome<EnterotypeCall>,
    pub health: StageOutcome<HealthAssessment>,
    pub disease_risk: StageOutcome<RiskAssessment>,
    pub age: StageOutcome<AgePrediction>,
    pub functional: StageOutcome<FunctionalSummary>,
}

/// Complete, immutable scoring result for one sample
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SampleResult {
    sample_id: String,
    total_reads: u64,
    insufficient_depth: bool,
    completeness: Completeness,
    composition: Composition,
    diversity: StageOutcome<DiversityMetrics>,
    enterotype: StageOutcome<EnterotypeCall>,
    health: StageOutcome<HealthAssessment>,
    disease_risk: StageOutcome<RiskAssessment>,
    age: StageOutcome<AgePrediction>,
    functional: StageOutcome<FunctionalSummary>,
    provenance: Provenance,
}

impl SampleResult {
    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    pub fn total_reads(&self) -> u64 {
        self.total_reads
    }

    pub fn insufficient_depth(&self) -> bool {
        self.insufficient_depth
    }

    pub fn completeness(&self) -> &Completeness {
        &self.completeness
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    pub fn diversity(&self) -> &StageOutcome<DiversityMetrics> {
        &self.diversity
    }

    pub fn enterotype(&self) -> &StageOutcome<EnterotypeCall> {
        &self.enterotype
    }

    pub fn health(&self) -> &StageOutcome<HealthAssessment> {
        &self.health
    }

    pub fn disease_risk(&self) -> &StageOutcome<RiskAssessment> {
        &self.disease_risk
    }

    pub fn age(&self) -> &StageOutcome<AgePrediction> {
        &self.age
    }

    pub fn functional(&self) -> &StageOutcome<FunctionalSummary> {
        &self.functional
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

/// Merge stage outputs into one result; statuses are recorded as-is
pub fn aggregate(
    profile: &SampleProfile,
    stages: StageOutcomes,
    provenance: Provenance,
    top_n: usize,
) -> SampleResult {
    let completeness = Completeness {
        diversity: stages.diversity.status(),
        enterotype: stages.enterotype.status(),
        health: stages.health.status(),
        disease_risk: stages.disease_risk.status(),
        age: stages.age.status(),
        functional: stages.functional.status(),
    };

    if !completeness.is_complete() {
        tracing::debug!(
            "{}: {}/6 stages computed",
            profile.sample_id,
            completeness.computed_count()
        );
    }

    SampleResult {
        sample_id: profile.sample_id.clone(),
        total_reads: profile.total_reads,
        insufficient_depth: profile.insufficient_depth,
        completeness,
        composition: Composition::from_profile(profile, top_n),
        diversity: stages.diversity,
        enterotype: stages.enterotype,
        health: stages.health,
        disease_risk: stages.disease_risk,
        age: stages.age,
        functional: stages.functional,
        provenance,
    }
}
