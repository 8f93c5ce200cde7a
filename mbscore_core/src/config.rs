//! Configuration file support for mbscore.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/mbscore/config.toml`. Every
//! field has a default, so a partial file (or no file) is valid.

use crate::{Error, Rank, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub references: ReferencesConfig,

    #[serde(default)]
    pub normalization: NormalizationConfig,

    #[serde(default)]
    pub diversity: DiversityConfig,

    #[serde(default)]
    pub enterotype: EnterotypeConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub functional: FunctionalConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Reference table locations; unset paths use the built-in tables
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ReferencesConfig {
    pub ranges: Option<PathBuf>,
    pub diseases: Option<PathBuf>,
    pub core_genera: Option<PathBuf>,
    pub enterotypes: Option<PathBuf>,
    pub age_model: Option<PathBuf>,
}

/// Abundance normalization parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NormalizationConfig {
    /// Samples below this many reads are flagged `insufficient_depth`
    #[serde(default = "default_min_sample_reads")]
    pub min_sample_reads: u64,

    /// Number of taxa kept per rank in the composition summary
    #[serde(default = "default_top_taxa")]
    pub top_taxa: usize,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            min_sample_reads: default_min_sample_reads(),
            top_taxa: default_top_taxa(),
        }
    }
}

/// Diversity calculator parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiversityConfig {
    #[serde(default = "default_diversity_rank")]
    pub rank: Rank,

    #[serde(default = "default_bf_low")]
    pub bf_ratio_low: f64,

    #[serde(default = "default_bf_high")]
    pub bf_ratio_high: f64,

    /// Observed-feature band considered normal richness
    #[serde(default = "default_richness_low")]
    pub richness_low: usize,

    #[serde(default = "default_richness_high")]
    pub richness_high: usize,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            rank: default_diversity_rank(),
            bf_ratio_low: default_bf_low(),
            bf_ratio_high: default_bf_high(),
            richness_low: default_richness_low(),
            richness_high: default_richness_high(),
        }
    }
}

/// Enterotype classifier parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnterotypeConfig {
    /// Minimum classified genus-level fraction required to classify
    #[serde(default = "default_min_classified_fraction")]
    pub min_classified_fraction: f64,

    /// Relative margin under which the top two genera are ambiguous
    #[serde(default = "default_ambiguity_margin")]
    pub ambiguity_margin: f64,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Centroid movement below which K-means stops early
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for EnterotypeConfig {
    fn default() -> Self {
        Self {
            min_classified_fraction: default_min_classified_fraction(),
            ambiguity_margin: default_ambiguity_margin(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

/// Health scorer category weights
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_beneficial_weight")]
    pub beneficial_weight: f64,

    #[serde(default = "default_harmful_weight")]
    pub harmful_weight: f64,

    #[serde(default = "default_conditional_weight")]
    pub conditional_weight: f64,

    /// Flagged conditional taxa above this count set `attention_needed`
    #[serde(default = "default_attention_threshold")]
    pub attention_threshold: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            beneficial_weight: default_beneficial_weight(),
            harmful_weight: default_harmful_weight(),
            conditional_weight: default_conditional_weight(),
            attention_threshold: default_attention_threshold(),
        }
    }
}

/// Functional summary handling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionalConfig {
    /// Estimate a summary from genus signatures when none is supplied
    #[serde(default = "default_true")]
    pub estimate_when_missing: bool,
}

impl Default for FunctionalConfig {
    fn default() -> Self {
        Self {
            estimate_when_missing: true,
        }
    }
}

/// Batch execution parameters
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Worker threads for batch scoring (0 = rayon default)
    #[serde(default)]
    pub threads: usize,
}

// Default value functions
fn default_min_sample_reads() -> u64 {
    1
}

fn default_top_taxa() -> usize {
    10
}

fn default_diversity_rank() -> Rank {
    Rank::Genus
}

fn default_bf_low() -> f64 {
    0.84
}

fn default_bf_high() -> f64 {
    4.94
}

fn default_richness_low() -> usize {
    350
}

fn default_richness_high() -> usize {
    770
}

fn default_min_classified_fraction() -> f64 {
    0.05
}

fn default_ambiguity_margin() -> f64 {
    0.05
}

fn default_max_iterations() -> usize {
    20
}

fn default_tolerance() -> f64 {
    1e-9
}

fn default_beneficial_weight() -> f64 {
    0.4
}

fn default_harmful_weight() -> f64 {
    0.4
}

fn default_conditional_weight() -> f64 {
    0.2
}

fn default_attention_threshold() -> usize {
    3
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        match Self::default_config_path() {
            Some(config_path) if config_path.exists() => Self::load_from(&config_path),
            Some(config_path) => {
                tracing::info!("No config file found at {:?}, using defaults", config_path);
                Ok(Self::default())
            }
            None => {
                tracing::info!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|base| base.join("mbscore").join("config.toml"))
    }

    /// Save the configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Reject values that would make scoring meaningless
    pub fn validate(&self) -> Result<()> {
        let d = &self.diversity;
        if !(d.bf_ratio_low >= 0.0 && d.bf_ratio_low <= d.bf_ratio_high) {
            return Err(Error::Config(format!(
                "diversity.bf_ratio_low ({}) must be >= 0 and <= bf_ratio_high ({})",
                d.bf_ratio_low, d.bf_ratio_high
            )));
        }
        if d.richness_low > d.richness_high {
            return Err(Error::Config(
                "diversity.richness_low must not exceed richness_high".into(),
            ));
        }

        let e = &self.enterotype;
        if !(0.0..=1.0).contains(&e.min_classified_fraction) {
            return Err(Error::Config(
                "enterotype.min_classified_fraction must be within [0, 1]".into(),
            ));
        }
        if !(0.0..1.0).contains(&e.ambiguity_margin) {
            return Err(Error::Config(
                "enterotype.ambiguity_margin must be within [0, 1)".into(),
            ));
        }
        if e.max_iterations == 0 {
            return Err(Error::Config("enterotype.max_iterations must be > 0".into()));
        }

        let h = &self.health;
        let weights = [h.beneficial_weight, h.harmful_weight, h.conditional_weight];
        if weights.iter().any(|w| *w < 0.0) {
            return Err(Error::Config("health weights must be non-negative".into()));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(Error::Config(format!(
                "health weights must sum to 1.0 (got {})",
                sum
            )));
        }

        Ok(())
    }
}
