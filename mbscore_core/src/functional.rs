//! Functional potential summary.
//!
//! Summaries are normally supplied from an external functional-prediction
//! run. When none is available the engine can estimate vitamin and
//! short-chain fatty acid potential from a small genus signature table.

use crate::normalize::SampleProfile;
use crate::{Rank, ReasonCode, Result, StageOutcome};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Genera above this fraction contribute their key functions
const KEY_FUNCTION_FRACTION: f64 = 0.01;

const VITAMINS: [&str; 13] = [
    "B1", "B2", "B3", "B4", "B5", "B6", "B7", "B8", "B9", "B10", "B11", "B12", "K",
];
const SCFAS: [&str; 3] = ["Butyrate", "Propionate", "Acetate"];

struct GenusSignature {
    genus: &'static str,
    vitamins: &'static [&'static str],
    scfa: &'static [&'static str],
    functions: &'static [&'static str],
}

const SIGNATURES: &[GenusSignature] = &[
    GenusSignature {
        genus: "Bifidobacterium",
        vitamins: &["B1", "B2", "B9", "K"],
        scfa: &["Acetate"],
        functions: &["probiotic", "immune modulation"],
    },
    GenusSignature {
        genus: "Lactobacillus",
        vitamins: &["B2", "B6", "B12"],
        scfa: &[],
        functions: &["probiotic", "lactate production"],
    },
    GenusSignature {
        genus: "Faecalibacterium",
        vitamins: &["B2"],
        scfa: &["Butyrate"],
        functions: &["butyrate production", "anti-inflammatory"],
    },
    GenusSignature {
        genus: "Bacteroides",
        vitamins: &["B7", "K"],
        scfa: &["Propionate", "Acetate"],
        functions: &["polysaccharide degradation", "SCFA production"],
    },
    GenusSignature {
        genus: "Akkermansia",
        vitamins: &[],
        scfa: &["Propionate"],
        functions: &["mucin degradation", "metabolic regulation"],
    },
    GenusSignature {
        genus: "Roseburia",
        vitamins: &[],
        scfa: &["Butyrate"],
        functions: &["butyrate production"],
    },
    GenusSignature {
        genus: "Prevotella",
        vitamins: &["B1"],
        scfa: &["Propionate", "Acetate"],
        functions: &["fiber degradation"],
    },
];

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FunctionalSource {
    #[default]
    External,
    Estimated,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PotentialLevel {
    Low,
    Moderate,
    High,
}

/// Potential as a percentage of classified genus abundance
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Potential {
    pub potential: f64,
    pub level: PotentialLevel,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct FunctionalSummary {
    #[serde(default)]
    pub source: FunctionalSource,
    /// Nearest sequenced taxon index from the prediction run
    #[serde(default)]
    pub nsti: Option<f64>,
    #[serde(default)]
    pub vitamin_synthesis: BTreeMap<String, Potential>,
    #[serde(default)]
    pub scfa_production: BTreeMap<String, Potential>,
    #[serde(default)]
    pub key_findings: Vec<String>,
}

/// Load externally produced summaries keyed by sample id
pub fn load_functional_summaries(path: &Path) -> Result<HashMap<String, FunctionalSummary>> {
    let contents = std::fs::read_to_string(path)?;
    let summaries: HashMap<String, FunctionalSummary> = serde_json::from_str(&contents)?;
    tracing::info!("Loaded {} functional summaries from {:?}", summaries.len(), path);
    Ok(summaries)
}

fn level(potential: f64, moderate: f64, high: f64) -> PotentialLevel {
    if potential > high {
        PotentialLevel::High
    } else if potential > moderate {
        PotentialLevel::Moderate
    } else {
        PotentialLevel::Low
    }
}

/// Estimate a summary from genus abundances
pub fn estimate_functional(profile: &SampleProfile) -> StageOutcome<FunctionalSummary> {
    if profile.insufficient_depth {
        return StageOutcome::insufficient(ReasonCode::InsufficientDepth);
    }
    let Some(genus) = profile.vector(Rank::Genus) else {
        return StageOutcome::unavailable(ReasonCode::NotSupplied, "no genus profile");
    };

    let classified = genus.classified_fraction();
    let mut vitamins: BTreeMap<&str, f64> = VITAMINS.iter().map(|v| (*v, 0.0)).collect();
    let mut scfas: BTreeMap<&str, f64> = SCFAS.iter().map(|s| (*s, 0.0)).collect();
    let mut findings = BTreeSet::new();

    for signature in SIGNATURES {
        let abundance = genus.group_abundance(signature.genus);
        if abundance <= 0.0 {
            continue;
        }
        for vitamin in signature.vitamins {
            *vitamins.entry(*vitamin).or_insert(0.0) += abundance;
        }
        for scfa in signature.scfa {
            *scfas.entry(*scfa).or_insert(0.0) += abundance;
        }
        if abundance > KEY_FUNCTION_FRACTION {
            findings.extend(signature.functions.iter().map(|f| f.to_string()));
        }
    }

    let percent = |abundance: f64| {
        if classified > 0.0 {
            abundance / classified * 100.0
        } else {
            0.0
        }
    };

    let vitamin_synthesis = vitamins
        .into_iter()
        .map(|(name, a)| {
            let p = percent(a);
            (name.to_string(), Potential { potential: p, level: level(p, 1.0, 5.0) })
        })
        .collect();
    let scfa_production = scfas
        .into_iter()
        .map(|(name, a)| {
            let p = percent(a);
            (name.to_string(), Potential { potential: p, level: level(p, 5.0, 10.0) })
        })
        .collect();

    StageOutcome::Computed {
        value: FunctionalSummary {
            source: FunctionalSource::Estimated,
            nsti: None,
            vitamin_synthesis,
            scfa_production,
            key_findings: findings.into_iter().collect(),
        },
    }
}

/// Pick the external summary if supplied, otherwise estimate or report it
/// as not supplied
pub fn resolve_functional(
    profile: &SampleProfile,
    external: Option<&FunctionalSummary>,
    estimate_when_missing: bool,
) -> StageOutcome<FunctionalSummary> {
    match external {
        Some(summary) => StageOutcome::Computed {
            value: summary.clone(),
        },
        None if estimate_when_missing => estimate_functional(profile),
        None => StageOutcome::unavailable(
            ReasonCode::NotSupplied,
            "no functional summary supplied for this sample",
        ),
    }
}
