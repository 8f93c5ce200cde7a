//! Biological age prediction from core-genus abundances.
//!
//! Besides the predicted age, each prediction breaks the model down into
//! per-genus contributions, summarizes them as youth and aging scores, and
//! derives an aging rate plus rejuvenation advice from a fixed set of marker
//! genera.

use crate::advice::RejuvenationAdvice;
use crate::defaults::{BUILTIN_VERSION, CORE_GENERA};
use crate::normalize::SampleProfile;
use crate::{Error, Rank, ReasonCode, Result, StageOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// Predicts an age in years from an ordered feature vector
pub trait AgeModel: Send + Sync {
    /// Number of features the model expects
    fn input_len(&self) -> usize;

    fn predict(&self, features: &[f64]) -> Result<f64>;

    /// Per-feature contribution in years, for models that decompose
    fn contributions(&self, _features: &[f64]) -> Option<Vec<f64>> {
        None
    }

    fn version(&self) -> &str;
}

/// Linear model over the core-genus vector, clamped to `[min_age, max_age]`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LinearAgeModel {
    pub version: String,
    pub intercept: f64,
    /// One coefficient per core genus, in core-genus order
    pub coefficients: Vec<f64>,
    pub min_age: f64,
    pub max_age: f64,
}

impl LinearAgeModel {
    /// Load a model from JSON
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Model(format!("cannot read {:?}: {}", path, e)))?;
        let model: LinearAgeModel = serde_json::from_str(&contents)
            .map_err(|e| Error::Model(format!("malformed model {:?}: {}", path, e)))?;
        model.validate()?;
        tracing::info!(
            "Loaded age model {} ({} coefficients) from {:?}",
            model.version,
            model.coefficients.len(),
            path
        );
        Ok(model)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.intercept.is_finite() && self.coefficients.iter().all(|c| c.is_finite())) {
            return Err(Error::Model("model parameters must be finite".into()));
        }
        if !(self.min_age <= self.max_age) {
            return Err(Error::Model(format!(
                "min_age {} exceeds max_age {}",
                self.min_age, self.max_age
            )));
        }
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

impl AgeModel for LinearAgeModel {
    fn input_len(&self) -> usize {
        self.coefficients.len()
    }

    fn predict(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.coefficients.len() {
            return Err(Error::Model(format!(
                "expected {} features, got {}",
                self.coefficients.len(),
                features.len()
            )));
        }
        let linear: f64 = self.intercept
            + self
                .coefficients
                .iter()
                .zip(features)
                .map(|(c, x)| c * x)
                .sum::<f64>();
        if !linear.is_finite() {
            return Err(Error::Model("prediction is not finite".into()));
        }
        Ok(linear.clamp(self.min_age, self.max_age))
    }

    fn contributions(&self, features: &[f64]) -> Option<Vec<f64>> {
        if features.len() != self.coefficients.len() {
            return None;
        }
        Some(self.coefficients.iter().zip(features).map(|(c, x)| c * x).collect())
    }

    fn version(&self) -> &str {
        &self.version
    }
}

/// Years per unit relative abundance for the built-in model
const DEFAULT_COEFFICIENTS: &[(&str, f64)] = &[
    ("Bifidobacterium", -25.0),
    ("Lactobacillus", -60.0),
    ("Prevotella", -6.0),
    ("Faecalibacterium", -20.0),
    ("Akkermansia", -40.0),
    ("Roseburia", -15.0),
    ("Christensenella", -30.0),
    ("Escherichia", 60.0),
    ("Enterococcus", 90.0),
    ("Streptococcus", 30.0),
    ("Clostridium", 20.0),
    ("Staphylococcus", 150.0),
    ("Klebsiella", 80.0),
    ("Eggerthella", 50.0),
    ("Desulfovibrio", 40.0),
    ("Bilophila", 30.0),
    ("Methanobrevibacter", 25.0),
    ("Alistipes", 10.0),
    ("Oscillospira", 15.0),
];

/// The built-in linear model, aligned with the built-in core genera
pub fn default_age_model() -> LinearAgeModel {
    let coefficients = CORE_GENERA
        .iter()
        .map(|genus| {
            DEFAULT_COEFFICIENTS
                .iter()
                .find(|(g, _)| g == genus)
                .map_or(0.0, |(_, c)| *c)
        })
        .collect();

    LinearAgeModel {
        version: BUILTIN_VERSION.into(),
        intercept: 40.0,
        coefficients,
        min_age: 20.0,
        max_age: 90.0,
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgeGapStatus {
    Younger,
    Matched,
    Older,
}

impl AgeGapStatus {
    pub fn from_gap(gap: f64) -> Self {
        if gap < -5.0 {
            AgeGapStatus::Younger
        } else if gap > 5.0 {
            AgeGapStatus::Older
        } else {
            AgeGapStatus::Matched
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgeBand {
    Young,
    MiddleAged,
    Mature,
    Senior,
}

impl AgeBand {
    pub fn from_age(age: f64) -> Self {
        if age < 35.0 {
            AgeBand::Young
        } else if age < 50.0 {
            AgeBand::MiddleAged
        } else if age < 65.0 {
            AgeBand::Mature
        } else {
            AgeBand::Senior
        }
    }
}

/// Expected abundance of a marker genus
#[derive(Clone, Copy, Debug)]
enum MarkerBand {
    /// Youth-associated; best between `min` and `max`
    Youth { min: f64, max: f64 },
    /// Aging-associated; elevated above `threshold`
    Aging { threshold: f64 },
}

const MARKER_BANDS: &[(&str, MarkerBand)] = &[
    ("Bifidobacterium", MarkerBand::Youth { min: 0.05, max: 0.15 }),
    ("Lactobacillus", MarkerBand::Youth { min: 0.005, max: 0.03 }),
    ("Prevotella", MarkerBand::Youth { min: 0.10, max: 0.40 }),
    ("Faecalibacterium", MarkerBand::Youth { min: 0.05, max: 0.15 }),
    ("Akkermansia", MarkerBand::Youth { min: 0.01, max: 0.05 }),
    ("Escherichia", MarkerBand::Aging { threshold: 0.01 }),
    ("Enterococcus", MarkerBand::Aging { threshold: 0.005 }),
    ("Streptococcus", MarkerBand::Aging { threshold: 0.02 }),
    ("Clostridium", MarkerBand::Aging { threshold: 0.03 }),
    ("Staphylococcus", MarkerBand::Aging { threshold: 0.001 }),
    ("Klebsiella", MarkerBand::Aging { threshold: 0.005 }),
];

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarkerStatus {
    Low,
    Optimal,
    Normal,
    High,
}

impl MarkerBand {
    fn status(self, abundance: f64) -> MarkerStatus {
        match self {
            MarkerBand::Youth { min, .. } if abundance < min => MarkerStatus::Low,
            MarkerBand::Youth { max, .. } if abundance > max => MarkerStatus::High,
            MarkerBand::Youth { .. } => MarkerStatus::Optimal,
            MarkerBand::Aging { threshold } if abundance > threshold => MarkerStatus::High,
            MarkerBand::Aging { .. } => MarkerStatus::Normal,
        }
    }
}

/// One genus's share of the prediction
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AgeMarker {
    pub genus: String,
    pub abundance: f64,
    /// Years added (positive) or removed (negative) by this genus
    pub contribution: f64,
    /// Set for the youth- and aging-associated marker genera
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MarkerStatus>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgingRateLevel {
    Slow,
    Normal,
    Fast,
    Rapid,
}

impl AgingRateLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 0.5 {
            AgingRateLevel::Slow
        } else if score < 1.0 {
            AgingRateLevel::Normal
        } else if score < 2.0 {
            AgingRateLevel::Fast
        } else {
            AgingRateLevel::Rapid
        }
    }
}

/// `aging_score / (youth_score + 1)`
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct AgingRate {
    pub score: f64,
    pub level: AgingRateLevel,
}

impl AgingRate {
    pub fn from_scores(youth_score: f64, aging_score: f64) -> Self {
        let score = aging_score / (youth_score + 1.0);
        Self {
            score,
            level: AgingRateLevel::from_score(score),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AgePrediction {
    pub predicted_age: f64,
    pub chronological_age: Option<f64>,
    /// `predicted - chronological`, when the chronological age is known
    pub age_gap: Option<f64>,
    pub gap_status: Option<AgeGapStatus>,
    pub age_band: AgeBand,
    pub model_version: String,
    /// Contributing genera, largest absolute contribution first
    pub markers: Vec<AgeMarker>,
    /// Years removed by youth-associated genera
    pub youth_score: f64,
    /// Years added by aging-associated genera
    pub aging_score: f64,
    pub aging_rate: AgingRate,
    pub advice: RejuvenationAdvice,
}

/// Marker breakdown for one feature vector
fn age_markers(
    profile: &SampleProfile,
    core_genera: &[String],
    contributions: Option<Vec<f64>>,
) -> Vec<AgeMarker> {
    let contributions = contributions.unwrap_or_else(|| vec![0.0; core_genera.len()]);
    let band = |genus: &str| MARKER_BANDS.iter().find(|(g, _)| *g == genus).map(|(_, b)| *b);

    let mut markers: Vec<AgeMarker> = core_genera
        .iter()
        .zip(contributions)
        .filter(|(genus, c)| *c != 0.0 || band(genus.as_str()).is_some())
        .map(|(genus, contribution)| {
            let abundance = profile.abundance(genus, Rank::Genus);
            AgeMarker {
                genus: genus.clone(),
                abundance,
                contribution,
                status: band(genus.as_str()).map(|b| b.status(abundance)),
            }
        })
        .collect();

    markers.sort_by(|a, b| {
        b.contribution
            .abs()
            .total_cmp(&a.contribution.abs())
            .then_with(|| a.genus.cmp(&b.genus))
    });
    markers
}

fn rejuvenation_advice(markers: &[AgeMarker]) -> RejuvenationAdvice {
    let depleted_youth: Vec<&str> = MARKER_BANDS
        .iter()
        .filter(|(_, b)| matches!(b, MarkerBand::Youth { .. }))
        .filter(|(genus, _)| {
            markers
                .iter()
                .any(|m| m.genus == *genus && m.status == Some(MarkerStatus::Low))
        })
        .map(|(genus, _)| *genus)
        .collect();
    let aging_elevated = MARKER_BANDS
        .iter()
        .filter(|(_, b)| matches!(b, MarkerBand::Aging { .. }))
        .any(|(genus, _)| {
            markers
                .iter()
                .any(|m| m.genus == *genus && m.status == Some(MarkerStatus::High))
        });
    RejuvenationAdvice::from_markers(&depleted_youth, aging_elevated)
}

/// Predict biological age for one profile
///
/// Every failure (no model, zero depth, vector length mismatch, model error)
/// is reported as `unavailable` for this stage only.
pub fn predict_age(
    profile: &SampleProfile,
    core_genera: &[String],
    model: Option<&dyn AgeModel>,
    chronological_age: Option<f64>,
) -> StageOutcome<AgePrediction> {
    let unavailable = |detail: String| {
        StageOutcome::unavailable(ReasonCode::AgePredictionUnavailable, detail)
    };

    if profile.insufficient_depth {
        return unavailable("sample has insufficient read depth".into());
    }
    let Some(model) = model else {
        return unavailable("no age model loaded".into());
    };

    let features: Vec<f64> = core_genera
        .iter()
        .map(|genus| profile.abundance(genus, Rank::Genus))
        .collect();
    if features.len() != model.input_len() {
        return unavailable(format!(
            "model expects {} core genera, got {}",
            model.input_len(),
            features.len()
        ));
    }

    let predicted_age = match model.predict(&features) {
        Ok(age) => age,
        Err(e) => {
            tracing::warn!("{}: age prediction failed: {}", profile.sample_id, e);
            return unavailable(e.to_string());
        }
    };

    let markers = age_markers(profile, core_genera, model.contributions(&features));
    let youth_score: f64 = markers.iter().map(|m| (-m.contribution).max(0.0)).sum();
    let aging_score: f64 = markers.iter().map(|m| m.contribution.max(0.0)).sum();
    let advice = rejuvenation_advice(&markers);

    let age_gap = chronological_age.map(|age| predicted_age - age);
    StageOutcome::Computed {
        value: AgePrediction {
            predicted_age,
            chronological_age,
            age_gap,
            gap_status: age_gap.map(AgeGapStatus::from_gap),
            age_band: AgeBand::from_age(predicted_age),
            model_version: model.version().to_string(),
            markers,
            youth_score,
            aging_score,
            aging_rate: AgingRate::from_scores(youth_score, aging_score),
            advice,
        },
    }
}

/// Load chronological ages from a `sample<TAB>age` file
pub fn load_chronological_ages(path: &Path) -> Result<HashMap<String, f64>> {
    let file = std::fs::File::open(path)?;
    let ages = read_chronological_ages(file)?;
    tracing::info!("Loaded {} chronological ages from {:?}", ages.len(), path);
    Ok(ages)
}

/// Parse chronological ages; a header row is skipped when its age column is
/// not numeric
pub fn read_chronological_ages<R: Read>(reader: R) -> Result<HashMap<String, f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut ages = HashMap::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let sample = record.get(0).unwrap_or("").trim();
        let raw = record.get(1).unwrap_or("").trim();
        if sample.is_empty() {
            continue;
        }
        match raw.parse::<f64>() {
            Ok(age) if age.is_finite() && age >= 0.0 => {
                ages.insert(sample.to_string(), age);
            }
            _ if i == 0 => continue,
            _ => {
                return Err(Error::Table {
                    line: i + 1,
                    message: format!("invalid age '{}' for sample '{}'", raw, sample),
                })
            }
        }
    }
    Ok(ages)
}
