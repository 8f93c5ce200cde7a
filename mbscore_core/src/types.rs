//! Core domain types for the microbiome scoring engine.
//!
//! This module defines the fundamental types shared by every stage:
//! - Taxonomic ranks, features and abundance vectors
//! - Reference-table records (ranges, disease profiles, enterotype centroids)
//! - Stage outcomes and reason codes used to surface incomplete results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Bucket name for reads without an assignment at the requested rank
pub const UNCLASSIFIED: &str = "Unclassified";

// ============================================================================
// Taxonomy
// ============================================================================

/// Taxonomic rank, ordered from root to leaf
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    Kingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
}

impl Rank {
    pub const ALL: [Rank; 7] = [
        Rank::Kingdom,
        Rank::Phylum,
        Rank::Class,
        Rank::Order,
        Rank::Family,
        Rank::Genus,
        Rank::Species,
    ];

    /// Position in a positional (unprefixed) lineage string
    pub fn depth(self) -> usize {
        self as usize
    }

    /// Map a lineage prefix letter (`p` in `p__Firmicutes`) to a rank
    pub fn from_prefix(prefix: char) -> Option<Rank> {
        match prefix.to_ascii_lowercase() {
            'k' | 'd' => Some(Rank::Kingdom),
            'p' => Some(Rank::Phylum),
            'c' => Some(Rank::Class),
            'o' => Some(Rank::Order),
            'f' => Some(Rank::Family),
            'g' => Some(Rank::Genus),
            's' => Some(Rank::Species),
            _ => None,
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Rank::Kingdom => "kingdom",
            Rank::Phylum => "phylum",
            Rank::Class => "class",
            Rank::Order => "order",
            Rank::Family => "family",
            Rank::Genus => "genus",
            Rank::Species => "species",
        };
        f.write_str(name)
    }
}

/// A parsed taxonomic lineage. Unresolved ranks are `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Lineage {
    names: [Option<String>; 7],
}

impl Lineage {
    pub fn new(names: [Option<String>; 7]) -> Self {
        Self { names }
    }

    /// Name assigned at `rank`, if resolved
    pub fn name_at(&self, rank: Rank) -> Option<&str> {
        self.names[rank.depth()].as_deref()
    }
}

/// One detected sequence feature (ASV/OTU) with its per-sample counts
#[derive(Clone, Debug)]
pub struct TaxonFeature {
    pub id: String,
    /// Raw read counts, indexed like `FeatureTable::samples`
    pub counts: Vec<u64>,
    pub lineage: Lineage,
    pub confidence: Option<f64>,
}

/// A parsed abundance-by-feature table
#[derive(Clone, Debug, Default)]
pub struct FeatureTable {
    pub samples: Vec<String>,
    pub features: Vec<TaxonFeature>,
}

impl FeatureTable {
    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.samples.iter().position(|s| s == sample_id)
    }

    /// Total reads for one sample column
    pub fn sample_total(&self, sample_idx: usize) -> u64 {
        self.features.iter().map(|f| f.counts[sample_idx]).sum()
    }

    /// Raw per-feature counts for one sample column
    pub fn feature_counts(&self, sample_idx: usize) -> Vec<u64> {
        self.features.iter().map(|f| f.counts[sample_idx]).collect()
    }
}

// ============================================================================
// Abundance Vector
// ============================================================================

/// Relative abundances for one sample at one rank
///
/// Fractions sum to 1.0 including the `Unclassified` bucket, unless the sample
/// was flagged `insufficient_depth`, in which case all fractions are zero.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AbundanceVector {
    pub sample_id: String,
    pub rank: Rank,
    pub total_reads: u64,
    pub insufficient_depth: bool,
    pub fractions: BTreeMap<String, f64>,
}

impl AbundanceVector {
    /// Fraction for an exact taxon name (0.0 when absent)
    pub fn get(&self, taxon: &str) -> f64 {
        self.fractions.get(taxon).copied().unwrap_or(0.0)
    }

    /// Fraction for a taxon including numbered variants (`Prevotella_9`
    /// counts toward `Prevotella`)
    pub fn group_abundance(&self, taxon: &str) -> f64 {
        self.fractions
            .iter()
            .filter(|(name, _)| is_same_or_variant(name, taxon))
            .map(|(_, v)| *v)
            .sum()
    }

    /// Fraction assigned to named taxa (everything except `Unclassified`)
    pub fn classified_fraction(&self) -> f64 {
        self.fractions
            .iter()
            .filter(|(name, _)| name.as_str() != UNCLASSIFIED)
            .map(|(_, v)| *v)
            .sum()
    }

    /// Taxa with nonzero abundance, in key order
    pub fn nonzero(&self) -> impl Iterator<Item = (&str, f64)> {
        self.fractions
            .iter()
            .filter(|(_, v)| **v > 0.0)
            .map(|(k, v)| (k.as_str(), *v))
    }

    pub fn total_fraction(&self) -> f64 {
        self.fractions.values().sum()
    }
}

/// Base genus of a reference-database label: `Prevotella_9` is `Prevotella`,
/// `Escherichia-Shigella` is `Escherichia`
pub fn genus_base(name: &str) -> &str {
    let head = name.split('-').next().unwrap_or(name);
    match head.rsplit_once('_') {
        Some((base, suffix))
            if !base.is_empty() && !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) =>
        {
            base
        }
        _ => head,
    }
}

/// `name` equals `base`, is `base_<digits>`, or is a hyphenated group that
/// names `base` (`Escherichia-Shigella`)
fn is_same_or_variant(name: &str, base: &str) -> bool {
    if name == base || name.split('-').any(|part| part == base) {
        return true;
    }
    match name.strip_prefix(base).and_then(|rest| rest.strip_prefix('_')) {
        Some(suffix) => !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

// ============================================================================
// Reference Records
// ============================================================================

/// Curated taxon category used by the health scorer
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaxonCategory {
    Beneficial,
    Conditional,
    Harmful,
}

impl TaxonCategory {
    /// Whether the category is scored against an upper bound only
    pub fn is_single_sided(self) -> bool {
        !matches!(self, TaxonCategory::Beneficial)
    }
}

fn default_genus() -> Rank {
    Rank::Genus
}

/// Normal band for one curated taxon, as relative-abundance fractions
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReferenceRange {
    pub taxon: String,
    pub category: TaxonCategory,
    #[serde(default = "default_genus")]
    pub rank: Rank,
    pub minimum: f64,
    pub maximum: f64,
    pub optimal: f64,
}

/// Direction of a taxon's association with a disease
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Enriched in disease
    Up,
    /// Depleted in disease
    Down,
}

/// One weighted taxon-disease association
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TaxonAssociation {
    pub taxon: String,
    #[serde(default = "default_genus")]
    pub rank: Rank,
    pub direction: Direction,
    pub weight: f64,
}

/// Lower bounds (inclusive) of the medium and high risk tiers
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TierThresholds {
    pub medium: f64,
    pub high: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            medium: 40.0,
            high: 70.0,
        }
    }
}

/// Prevention guidance attached to a disease at medium or high risk
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreventionAdvice {
    pub diet: String,
    pub lifestyle: String,
    pub supplements: String,
}

/// Taxon-association record for one disease
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DiseaseProfile {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub associations: Vec<TaxonAssociation>,
    pub normalization_constant: f64,
    #[serde(default)]
    pub tiers: TierThresholds,
    /// Disease-specific guidance; general guidance applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevention: Option<PreventionAdvice>,
}

/// Canonical enterotype labels
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Enterotype {
    #[serde(rename = "Bacteroides-dominant")]
    BacteroidesDominant,
    #[serde(rename = "Prevotella-dominant")]
    PrevotellaDominant,
    #[serde(rename = "Ruminococcus-dominant")]
    RuminococcusDominant,
}

impl Enterotype {
    pub fn label(self) -> &'static str {
        match self {
            Enterotype::BacteroidesDominant => "Bacteroides-dominant",
            Enterotype::PrevotellaDominant => "Prevotella-dominant",
            Enterotype::RuminococcusDominant => "Ruminococcus-dominant",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Enterotype::BacteroidesDominant => "拟杆菌型",
            Enterotype::PrevotellaDominant => "普氏菌型",
            Enterotype::RuminococcusDominant => "瘤胃球菌型",
        }
    }
}

impl fmt::Display for Enterotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reference point in genus-abundance space for one enterotype
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EnterotypeCentroid {
    pub label: Enterotype,
    pub dominant_genus: String,
    pub profile: BTreeMap<String, f64>,
}

// ============================================================================
// Stage Outcomes
// ============================================================================

/// Why a stage or metric could not produce a value
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Sample has zero (or too few) reads
    InsufficientDepth,
    /// Too little of the sample is classified at genus rank
    InsufficientGenusCoverage,
    /// Age model missing, failed, or received a malformed vector
    AgePredictionUnavailable,
    /// An external input or reference table was not supplied
    NotSupplied,
    /// Ratio denominator is zero
    ZeroDenominator,
    /// Metric needs more than one observed taxon
    TooFewTaxa,
}

/// Result of one scoring stage for one sample
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome<T> {
    Computed {
        value: T,
    },
    InsufficientData {
        reason: ReasonCode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Unavailable {
        reason: ReasonCode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl<T> StageOutcome<T> {
    pub fn insufficient(reason: ReasonCode) -> Self {
        StageOutcome::InsufficientData {
            reason,
            detail: None,
        }
    }

    pub fn unavailable(reason: ReasonCode, detail: impl Into<String>) -> Self {
        StageOutcome::Unavailable {
            reason,
            detail: Some(detail.into()),
        }
    }

    pub fn status(&self) -> StageStatus {
        match self {
            StageOutcome::Computed { .. } => StageStatus::Computed,
            StageOutcome::InsufficientData { .. } => StageStatus::InsufficientData,
            StageOutcome::Unavailable { .. } => StageStatus::Unavailable,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            StageOutcome::Computed { value } => Some(value),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            StageOutcome::Computed { .. } => None,
            StageOutcome::InsufficientData { reason, .. }
            | StageOutcome::Unavailable { reason, .. } => Some(*reason),
        }
    }
}

/// Completeness flag recorded per stage by the aggregator
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Computed,
    InsufficientData,
    Unavailable,
}

/// A metric that may be undefined for numeric reasons
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Measure<T> {
    Defined { value: T },
    Undefined { reason: ReasonCode },
}

impl<T: Copy> Measure<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            Measure::Defined { value } => Some(*value),
            Measure::Undefined { .. } => None,
        }
    }
}
