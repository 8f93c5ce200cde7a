//! Scoring engine.
//!
//! Loads reference tables and the age model once, then scores samples
//! independently. Batches run on a rayon pool; a failing sample is recorded
//! and never aborts the rest of the batch.

use crate::age::{default_age_model, predict_age, AgeModel, LinearAgeModel};
use crate::aggregate::{aggregate, Provenance, SampleResult, StageOutcomes};
use crate::diversity::compute_diversity;
use crate::enterotype::{classify_enterotype, Clusterer, SeededKMeans};
use crate::functional::{resolve_functional, FunctionalSummary};
use crate::health::score_health;
use crate::normalize::{profile_sample, profile_samples, SampleProfile};
use crate::reference::ReferenceData;
use crate::risk::score_risks;
use crate::{Config, Error, FeatureTable, Rank, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Optional per-sample inputs supplied alongside the abundance table
#[derive(Clone, Debug, Default)]
pub struct ScoringInputs {
    pub chronological_ages: HashMap<String, f64>,
    pub functional: HashMap<String, FunctionalSummary>,
}

/// A sample that could not be scored
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SampleFailure {
    pub sample_id: String,
    pub error: String,
}

/// Results of one batch run
#[derive(Clone, Debug)]
pub struct BatchOutcome {
    pub run_id: Uuid,
    pub results: Vec<SampleResult>,
    pub failures: Vec<SampleFailure>,
}

/// Shared, read-only scoring state
#[derive(Clone)]
pub struct Engine {
    config: Arc<Config>,
    references: Arc<ReferenceData>,
    age_model: Option<Arc<dyn AgeModel>>,
    clusterer: Arc<dyn Clusterer>,
}

impl Engine {
    /// Load references and the age model named in `config`
    ///
    /// A malformed reference table is fatal. An age model that fails to load
    /// only disables the age stage.
    pub fn new(config: Config) -> Result<Self> {
        let references = ReferenceData::load(&config.references)?;

        let age_model: Option<Arc<dyn AgeModel>> = match &config.references.age_model {
            Some(path) => match LinearAgeModel::load(path) {
                Ok(model) => Some(Arc::new(model)),
                Err(e) => {
                    tracing::warn!("Age prediction disabled: {}", e);
                    None
                }
            },
            None => Some(Arc::new(default_age_model())),
        };

        Self::with_parts(config, references, age_model)
    }

    /// Assemble an engine from already-loaded parts
    ///
    /// The references are validated here as well, so hand-built tables get
    /// the same checks as loaded ones.
    pub fn with_parts(
        config: Config,
        references: ReferenceData,
        age_model: Option<Arc<dyn AgeModel>>,
    ) -> Result<Self> {
        config.validate()?;
        references.ensure_valid()?;
        let clusterer = Arc::new(SeededKMeans::from_config(&config.enterotype));
        Ok(Self {
            config: Arc::new(config),
            references: Arc::new(references),
            age_model,
            clusterer,
        })
    }

    /// Replace the enterotype clustering algorithm
    pub fn with_clusterer(mut self, clusterer: Arc<dyn Clusterer>) -> Self {
        self.clusterer = clusterer;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn references(&self) -> &ReferenceData {
        &self.references
    }

    pub fn age_model(&self) -> Option<&dyn AgeModel> {
        self.age_model.as_deref()
    }

    /// Normalize one table column into a profile
    pub fn profile(&self, table: &FeatureTable, sample_idx: usize) -> SampleProfile {
        profile_sample(
            table,
            sample_idx,
            &[self.config.diversity.rank],
            self.config.normalization.min_sample_reads,
        )
    }

    fn provenance(&self, run_id: Uuid, generated_at: DateTime<Utc>) -> Provenance {
        Provenance {
            run_id,
            generated_at,
            engine_version: ENGINE_VERSION.to_string(),
            diversity_rank: self.config.diversity.rank,
            references: self.references.versions(),
            age_model: self.age_model.as_ref().map(|m| m.version().to_string()),
        }
    }

    /// Run every stage on one profile
    pub fn score_profile(
        &self,
        profile: &SampleProfile,
        inputs: &ScoringInputs,
        provenance: Provenance,
    ) -> Result<SampleResult> {
        let config = &self.config;
        let refs = &self.references;

        let genus = profile.vector(Rank::Genus).ok_or_else(|| Error::Sample {
            sample: profile.sample_id.clone(),
            message: "no genus abundance vector in profile".into(),
        })?;

        let stages = StageOutcomes {
            diversity: compute_diversity(profile, &config.diversity)?,
            enterotype: classify_enterotype(genus, refs, &config.enterotype, self.clusterer.as_ref()),
            health: score_health(profile, refs, &config.health),
            disease_risk: score_risks(profile, refs),
            age: predict_age(
                profile,
                refs.core_genera(),
                self.age_model(),
                inputs.chronological_ages.get(&profile.sample_id).copied(),
            ),
            functional: resolve_functional(
                profile,
                inputs.functional.get(&profile.sample_id),
                config.functional.estimate_when_missing,
            ),
        };

        Ok(aggregate(
            profile,
            stages,
            provenance,
            config.normalization.top_taxa,
        ))
    }

    /// Score a single named sample
    pub fn score_sample(
        &self,
        table: &FeatureTable,
        sample_id: &str,
        inputs: &ScoringInputs,
    ) -> Result<SampleResult> {
        let idx = table.sample_index(sample_id).ok_or_else(|| Error::Sample {
            sample: sample_id.to_string(),
            message: "not present in abundance table".into(),
        })?;
        let profile = self.profile(table, idx);
        self.score_profile(&profile, inputs, self.provenance(Uuid::new_v4(), Utc::now()))
    }

    /// Score every sample in the table in parallel
    pub fn score_batch(&self, table: &FeatureTable, inputs: &ScoringInputs) -> Result<BatchOutcome> {
        match self.config.engine.threads {
            0 => Ok(self.run_batch(table, inputs)),
            threads => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| Error::Other(format!("Failed to build thread pool: {}", e)))?;
                Ok(pool.install(|| self.run_batch(table, inputs)))
            }
        }
    }

    fn run_batch(&self, table: &FeatureTable, inputs: &ScoringInputs) -> BatchOutcome {
        let run_id = Uuid::new_v4();
        let provenance = self.provenance(run_id, Utc::now());

        tracing::info!("Scoring {} samples (run {})", table.samples.len(), run_id);

        let profiles = profile_samples(
            table,
            &[self.config.diversity.rank],
            self.config.normalization.min_sample_reads,
        );
        let scored: Vec<std::result::Result<SampleResult, SampleFailure>> = profiles
            .par_iter()
            .map(|profile| {
                self.score_profile(profile, inputs, provenance.clone())
                    .map_err(|e| SampleFailure {
                        sample_id: profile.sample_id.clone(),
                        error: e.to_string(),
                    })
            })
            .collect();

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for outcome in scored {
            match outcome {
                Ok(result) => results.push(result),
                Err(failure) => {
                    tracing::warn!("Sample '{}' failed: {}", failure.sample_id, failure.error);
                    failures.push(failure);
                }
            }
        }

        let complete = results
            .iter()
            .filter(|r| r.completeness().is_complete())
            .count();
        tracing::info!(
            "Scored {} samples ({} fully complete, {} failed)",
            results.len(),
            complete,
            failures.len()
        );

        BatchOutcome {
            run_id,
            results,
            failures,
        }
    }
}
