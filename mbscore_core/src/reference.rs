//! Reference tables: curated ranges, disease associations, enterotype
//! centroids and the core-genus ordering.
//!
//! Each table is loaded from the path in `ReferencesConfig` or falls back to
//! the built-in copy. Loaded tables are validated before any sample is scored.

use crate::config::ReferencesConfig;
use crate::defaults::default_references;
use crate::types::*;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

fn default_version() -> String {
    "unversioned".into()
}

/// On-disk reference-range table
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RangeTable {
    #[serde(default = "default_version")]
    pub version: String,
    pub taxa: Vec<ReferenceRange>,
}

/// On-disk disease-association table
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DiseaseTable {
    #[serde(default = "default_version")]
    pub version: String,
    pub diseases: Vec<DiseaseProfile>,
}

/// On-disk enterotype centroid table
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EnterotypeTable {
    #[serde(default = "default_version")]
    pub version: String,
    /// Feature genera spanning the clustering space, in order
    pub genera: Vec<String>,
    pub centroids: Vec<EnterotypeCentroid>,
}

/// Versions of the reference tables a result was computed against
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReferenceVersions {
    pub ranges: String,
    pub diseases: String,
    pub enterotypes: String,
    pub core_genera: String,
}

/// Every reference table the engine needs, read-only after load
#[derive(Clone, Debug)]
pub struct ReferenceData {
    ranges: RangeTable,
    diseases: DiseaseTable,
    enterotypes: EnterotypeTable,
    core_genera: Vec<String>,
    core_genera_version: String,
}

impl ReferenceData {
    pub fn from_parts(
        ranges: RangeTable,
        diseases: DiseaseTable,
        enterotypes: EnterotypeTable,
        core_genera: Vec<String>,
        core_genera_version: String,
    ) -> Self {
        Self {
            ranges,
            diseases,
            enterotypes,
            core_genera,
            core_genera_version,
        }
    }

    /// Load every table named in `config`, using built-ins for the rest
    ///
    /// Returns `Error::Reference` when a loaded table fails validation.
    pub fn load(config: &ReferencesConfig) -> Result<Self> {
        let builtin = default_references();

        let ranges = match &config.ranges {
            Some(path) => load_json::<RangeTable>(path)?,
            None => builtin.ranges.clone(),
        };
        let diseases = match &config.diseases {
            Some(path) => load_json::<DiseaseTable>(path)?,
            None => builtin.diseases.clone(),
        };
        let enterotypes = match &config.enterotypes {
            Some(path) => load_json::<EnterotypeTable>(path)?,
            None => builtin.enterotypes.clone(),
        };
        let (core_genera, core_genera_version) = match &config.core_genera {
            Some(path) => load_core_genera(path)?,
            None => (builtin.core_genera.clone(), builtin.core_genera_version.clone()),
        };

        let data = Self::from_parts(ranges, diseases, enterotypes, core_genera, core_genera_version);

        data.ensure_valid()?;
        for warning in data.count_warnings() {
            tracing::warn!("{}", warning);
        }

        tracing::info!(
            "Loaded references: {} ranges, {} diseases, {} core genera",
            data.ranges.taxa.len(),
            data.diseases.diseases.len(),
            data.core_genera.len()
        );
        Ok(data)
    }

    /// Range for a curated taxon
    pub fn range(&self, taxon: &str) -> Option<&ReferenceRange> {
        self.ranges.taxa.iter().find(|r| r.taxon == taxon)
    }

    pub fn ranges(&self) -> &[ReferenceRange] {
        &self.ranges.taxa
    }

    /// Curated taxa of one category, in table order
    pub fn curated(&self, category: TaxonCategory) -> impl Iterator<Item = &ReferenceRange> {
        self.ranges.taxa.iter().filter(move |r| r.category == category)
    }

    pub fn disease(&self, name: &str) -> Option<&DiseaseProfile> {
        self.diseases.diseases.iter().find(|d| d.name == name)
    }

    pub fn diseases(&self) -> &[DiseaseProfile] {
        &self.diseases.diseases
    }

    pub fn enterotype_genera(&self) -> &[String] {
        &self.enterotypes.genera
    }

    pub fn centroids(&self) -> &[EnterotypeCentroid] {
        &self.enterotypes.centroids
    }

    pub fn centroid(&self, label: Enterotype) -> Option<&EnterotypeCentroid> {
        self.enterotypes.centroids.iter().find(|c| c.label == label)
    }

    pub fn core_genera(&self) -> &[String] {
        &self.core_genera
    }

    pub fn versions(&self) -> ReferenceVersions {
        ReferenceVersions {
            ranges: self.ranges.version.clone(),
            diseases: self.diseases.version.clone(),
            enterotypes: self.enterotypes.version.clone(),
            core_genera: self.core_genera_version.clone(),
        }
    }

    /// `validate()` as a `Result`, joining every problem into one error
    pub fn ensure_valid(&self) -> Result<()> {
        let problems = self.validate();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Reference(problems.join("; ")))
        }
    }

    /// Validate the tables, returning every problem found (empty = valid)
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let mut seen = HashSet::new();
        for r in &self.ranges.taxa {
            if r.taxon.is_empty() {
                errors.push("Reference range has empty taxon".to_string());
                continue;
            }
            if !seen.insert(r.taxon.as_str()) {
                errors.push(format!("Duplicate reference range for '{}'", r.taxon));
            }
            let finite = r.minimum.is_finite() && r.maximum.is_finite() && r.optimal.is_finite();
            if !finite || r.minimum < 0.0 || r.maximum > 1.0 {
                errors.push(format!(
                    "Range for '{}' must lie within [0, 1] (got {}..{})",
                    r.taxon, r.minimum, r.maximum
                ));
            } else if r.minimum > r.maximum {
                errors.push(format!(
                    "Range for '{}' has minimum {} above maximum {}",
                    r.taxon, r.minimum, r.maximum
                ));
            } else if r.optimal < r.minimum || r.optimal > r.maximum {
                errors.push(format!(
                    "Range for '{}' has optimal {} outside {}..{}",
                    r.taxon, r.optimal, r.minimum, r.maximum
                ));
            }
        }

        let mut seen = HashSet::new();
        for d in &self.diseases.diseases {
            if d.name.is_empty() {
                errors.push("Disease profile has empty name".to_string());
                continue;
            }
            if !seen.insert(d.name.as_str()) {
                errors.push(format!("Duplicate disease profile '{}'", d.name));
            }
            if d.associations.is_empty() {
                errors.push(format!("Disease '{}' has no associations", d.name));
            }
            if !(d.normalization_constant.is_finite() && d.normalization_constant > 0.0) {
                errors.push(format!(
                    "Disease '{}' has non-positive normalization constant {}",
                    d.name, d.normalization_constant
                ));
            }
            let t = d.tiers;
            if !(0.0 <= t.medium && t.medium <= t.high && t.high <= 100.0) {
                errors.push(format!(
                    "Disease '{}' tiers must satisfy 0 <= medium <= high <= 100 (got {}, {})",
                    d.name, t.medium, t.high
                ));
            }
            for a in &d.associations {
                if a.taxon.is_empty() {
                    errors.push(format!("Disease '{}' has an association with empty taxon", d.name));
                }
                if !(a.weight.is_finite() && a.weight >= 0.0) {
                    errors.push(format!(
                        "Disease '{}' association '{}' has invalid weight {}",
                        d.name, a.taxon, a.weight
                    ));
                }
            }
        }

        let genera: HashSet<&str> = self.enterotypes.genera.iter().map(String::as_str).collect();
        if genera.is_empty() {
            errors.push("Enterotype table has no feature genera".to_string());
        }
        if genera.len() != self.enterotypes.genera.len() {
            errors.push("Enterotype table lists a feature genus twice".to_string());
        }
        for label in [
            Enterotype::BacteroidesDominant,
            Enterotype::PrevotellaDominant,
            Enterotype::RuminococcusDominant,
        ] {
            let count = self.enterotypes.centroids.iter().filter(|c| c.label == label).count();
            if count != 1 {
                errors.push(format!(
                    "Enterotype table needs exactly one '{}' centroid (found {})",
                    label, count
                ));
            }
        }
        for c in &self.enterotypes.centroids {
            if !genera.contains(c.dominant_genus.as_str()) {
                errors.push(format!(
                    "Centroid '{}' dominant genus '{}' is not a feature genus",
                    c.label, c.dominant_genus
                ));
            }
            for (genus, value) in &c.profile {
                if !genera.contains(genus.as_str()) {
                    errors.push(format!(
                        "Centroid '{}' references unknown genus '{}'",
                        c.label, genus
                    ));
                }
                if !(value.is_finite() && *value >= 0.0) {
                    errors.push(format!(
                        "Centroid '{}' has invalid value {} for '{}'",
                        c.label, value, genus
                    ));
                }
            }
        }

        if self.core_genera.is_empty() {
            errors.push("Core genus list is empty".to_string());
        }
        let mut seen = HashSet::new();
        for genus in &self.core_genera {
            if !seen.insert(genus.as_str()) {
                errors.push(format!("Core genus '{}' listed twice", genus));
            }
        }

        errors
    }

    /// Count mismatches against the curated table sizes; not fatal
    pub fn count_warnings(&self) -> Vec<String> {
        let expected = [
            ("beneficial taxa", self.curated(TaxonCategory::Beneficial).count(), 13),
            ("conditional taxa", self.curated(TaxonCategory::Conditional).count(), 15),
            ("harmful taxa", self.curated(TaxonCategory::Harmful).count(), 15),
            ("disease profiles", self.diseases.diseases.len(), 14),
            ("core genera", self.core_genera.len(), 39),
        ];

        expected
            .iter()
            .filter(|(_, found, want)| found != want)
            .map(|(what, found, want)| format!("Expected {} {}, found {}", want, what, found))
            .collect()
    }

    /// Write every table to `dir` in its on-disk format
    pub fn export_to(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;

        std::fs::write(dir.join("ranges.json"), serde_json::to_string_pretty(&self.ranges)?)?;
        std::fs::write(dir.join("diseases.json"), serde_json::to_string_pretty(&self.diseases)?)?;
        std::fs::write(
            dir.join("enterotypes.json"),
            serde_json::to_string_pretty(&self.enterotypes)?,
        )?;

        let mut genera = format!("# core genera, version {}\n", self.core_genera_version);
        for genus in &self.core_genera {
            genera.push_str(genus);
            genera.push('\n');
        }
        std::fs::write(dir.join("core_genera.txt"), genera)?;

        tracing::info!("Exported reference tables to {:?}", dir);
        Ok(())
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Reference(format!("cannot read {:?}: {}", path, e)))?;
    serde_json::from_str(&contents)
        .map_err(|e| Error::Reference(format!("malformed table {:?}: {}", path, e)))
}

/// Read a core-genus ordering: one genus per line, `#` comments
///
/// The version is taken from a `# ... version <tag>` header when present,
/// otherwise from the file name.
fn load_core_genera(path: &Path) -> Result<(Vec<String>, String)> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Reference(format!("cannot read {:?}: {}", path, e)))?;

    let mut version = None;
    let mut genera = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if let Some(comment) = line.strip_prefix('#') {
            if let Some((_, tag)) = comment.split_once("version") {
                version.get_or_insert_with(|| tag.trim().to_string());
            }
            continue;
        }
        if !line.is_empty() {
            genera.push(line.to_string());
        }
    }

    let version = version.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(default_version)
    });
    Ok((genera, version))
}
