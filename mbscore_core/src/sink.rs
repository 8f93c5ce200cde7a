//! Result persistence.
//!
//! Results are appended to a JSONL file under an exclusive lock, written as
//! one JSON document per sample (atomically, via temp file + rename), and
//! summarized in a flat CSV.

use crate::aggregate::SampleResult;
use crate::{Error, Result};
use fs2::FileExt;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Destination for scored samples
pub trait ResultSink {
    fn write(&mut self, result: &SampleResult) -> Result<()>;
}

/// JSONL result log with file locking
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonlSink {
    fn write(&mut self, result: &SampleResult) -> Result<()> {
        ensure_parent_dir(&self.path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(result)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;
        tracing::debug!("Appended {} to {:?}", result.sample_id(), self.path);
        Ok(())
    }
}

/// Read every result from a JSONL log; malformed lines are skipped
pub fn read_results(path: &Path) -> Result<Vec<SampleResult>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut results = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SampleResult>(&line) {
            Ok(result) => results.push(result),
            Err(e) => tracing::warn!("Skipping result at line {}: {}", line_num + 1, e),
        }
    }

    file.unlock()?;
    Ok(results)
}

/// One pretty-printed JSON document per sample
///
/// Distinct sample ids that sanitize to the same file name (`A/B`, `A_B`)
/// get numbered names (`A_B.json`, `A_B~2.json`) in write order.
pub struct JsonDirSink {
    dir: PathBuf,
    /// File stem -> sample id that owns it
    claimed: HashMap<String, String>,
    /// Sample id -> path written
    paths: HashMap<String, PathBuf>,
}

impl JsonDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            claimed: HashMap::new(),
            paths: HashMap::new(),
        }
    }

    /// File a sample's result was written to
    pub fn path_for(&self, sample_id: &str) -> Option<&Path> {
        self.paths.get(sample_id).map(PathBuf::as_path)
    }

    fn claim(&mut self, sample_id: &str) -> PathBuf {
        if let Some(path) = self.paths.get(sample_id) {
            return path.clone();
        }

        let base = file_stem(sample_id);
        let mut stem = base.clone();
        let mut n = 1;
        while self.claimed.get(&stem).is_some_and(|owner| owner != sample_id) {
            n += 1;
            stem = format!("{}~{}", base, n);
        }
        if n > 1 {
            tracing::warn!(
                "Sample id '{}' collides with '{}' on disk; writing {}.json",
                sample_id,
                self.claimed.get(&base).map(String::as_str).unwrap_or(""),
                stem
            );
        }

        let path = self.dir.join(format!("{}.json", stem));
        self.claimed.insert(stem, sample_id.to_string());
        self.paths.insert(sample_id.to_string(), path.clone());
        path
    }
}

impl ResultSink for JsonDirSink {
    fn write(&mut self, result: &SampleResult) -> Result<()> {
        let contents = serde_json::to_string_pretty(result)?;
        let path = self.claim(result.sample_id());
        write_atomic(&path, contents.as_bytes())
    }
}

/// Sample ids become file names; path separators and control characters are replaced
fn file_stem(sample_id: &str) -> String {
    let stem: String = sample_id
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match stem.as_str() {
        "" | "." | ".." => format!("sample_{}", stem.len()),
        _ => stem,
    }
}

/// Write `contents` to `path` via a temp file in the same directory
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dir(path)?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// A row of the batch summary CSV
#[derive(Debug, Serialize)]
struct SummaryRow {
    sample_id: String,
    total_reads: u64,
    stages_computed: usize,
    shannon: Option<f64>,
    simpson: Option<f64>,
    chao1: Option<f64>,
    observed_taxa: Option<usize>,
    bf_ratio: Option<f64>,
    enterotype: Option<String>,
    enterotype_low_confidence: Option<bool>,
    health_score: Option<f64>,
    health_grade: Option<String>,
    mean_disease_score: Option<f64>,
    high_risk_diseases: Option<usize>,
    predicted_age: Option<f64>,
    age_gap: Option<f64>,
}

impl From<&SampleResult> for SummaryRow {
    fn from(result: &SampleResult) -> Self {
        let diversity = result.diversity().value();
        let enterotype = result.enterotype().value();
        let health = result.health().value();
        let risk = result.disease_risk().value();
        let age = result.age().value();

        SummaryRow {
            sample_id: result.sample_id().to_string(),
            total_reads: result.total_reads(),
            stages_computed: result.completeness().computed_count(),
            shannon: diversity.map(|d| d.shannon),
            simpson: diversity.map(|d| d.simpson),
            chao1: diversity.map(|d| d.chao1),
            observed_taxa: diversity.map(|d| d.observed_taxa),
            bf_ratio: diversity.and_then(|d| d.bf_ratio.value()),
            enterotype: enterotype.map(|e| e.label.to_string()),
            enterotype_low_confidence: enterotype.map(|e| e.low_confidence),
            health_score: health.map(|h| h.overall),
            health_grade: health.map(|h| h.grade.label().to_string()),
            mean_disease_score: risk.map(|r| r.mean_score),
            high_risk_diseases: risk.map(|r| r.high_risk_count),
            predicted_age: age.map(|a| a.predicted_age),
            age_gap: age.and_then(|a| a.age_gap),
        }
    }
}

/// Write the summary CSV for a batch, replacing any previous file
pub fn write_summary_csv(path: &Path, results: &[SampleResult]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(Vec::new());
    for result in results {
        writer.serialize(SummaryRow::from(result))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Other(format!("Failed to finish summary CSV: {}", e)))?;
    write_atomic(path, &bytes)?;

    tracing::info!("Wrote summary of {} samples to {:?}", results.len(), path);
    Ok(())
}
