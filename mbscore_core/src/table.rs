//! Taxon abundance table parsing.
//!
//! Reads the tab-separated feature table produced upstream: one row per
//! feature, one column per sample, plus the `Taxon` (required) and
//! `Confidence` (optional) metadata columns.

use crate::{genus_base, Error, FeatureTable, Lineage, Rank, Result, TaxonFeature};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

pub const TAXON_COLUMN: &str = "Taxon";
pub const CONFIDENCE_COLUMN: &str = "Confidence";

/// Columns that carry metadata rather than sample counts
const METADATA_COLUMNS: &[&str] = &[
    TAXON_COLUMN,
    CONFIDENCE_COLUMN,
    "Kingdom",
    "Phylum",
    "Class",
    "Order",
    "Family",
    "Genus",
    "Species",
    "sequence",
];

/// Load a feature table from a TSV file
pub fn load_feature_table(path: &Path) -> Result<FeatureTable> {
    let file = std::fs::File::open(path)?;
    let table = read_feature_table(file)?;
    tracing::info!(
        "Loaded {} features x {} samples from {:?}",
        table.features.len(),
        table.samples.len(),
        path
    );
    Ok(table)
}

/// Parse a feature table from any reader
pub fn read_feature_table<R: Read>(reader: R) -> Result<FeatureTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut records = reader.records();
    let mut line = 0usize;

    // Header, skipping the BIOM conversion banner if present
    let header = loop {
        line += 1;
        match records.next() {
            Some(record) => {
                let record = record?;
                let first = record.get(0).unwrap_or("").trim();
                if first.starts_with("# Constructed") {
                    continue;
                }
                break record;
            }
            None => return Err(Error::Table { line, message: "table is empty".into() }),
        }
    };

    let columns: Vec<String> = header.iter().map(|c| c.trim().to_string()).collect();
    let index: HashMap<&str, usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();

    let taxon_idx = *index
        .get(TAXON_COLUMN)
        .ok_or_else(|| Error::MissingColumn(TAXON_COLUMN.into()))?;
    let confidence_idx = index.get(CONFIDENCE_COLUMN).copied();

    // Column 0 holds feature identifiers
    let sample_cols: Vec<(usize, String)> = columns
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, c)| !METADATA_COLUMNS.contains(&c.as_str()))
        .map(|(i, c)| (i, c.clone()))
        .collect();

    if sample_cols.is_empty() {
        return Err(Error::Table {
            line,
            message: "no sample columns found".into(),
        });
    }

    let mut features = Vec::new();
    for record in records {
        line += 1;
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        if record.len() != columns.len() {
            return Err(Error::Table {
                line,
                message: format!("expected {} fields, found {}", columns.len(), record.len()),
            });
        }

        let id = record.get(0).unwrap_or("").trim().to_string();
        let mut counts = Vec::with_capacity(sample_cols.len());
        for (col, sample) in &sample_cols {
            let raw = record.get(*col).unwrap_or("");
            let count = parse_count(raw).ok_or_else(|| Error::Table {
                line,
                message: format!(
                    "invalid read count '{}' for feature '{}' in sample '{}'",
                    raw, id, sample
                ),
            })?;
            counts.push(count);
        }

        let lineage = parse_lineage(record.get(taxon_idx).unwrap_or(""));
        let confidence = confidence_idx
            .and_then(|i| record.get(i))
            .and_then(|c| c.trim().parse::<f64>().ok());

        features.push(TaxonFeature {
            id,
            counts,
            lineage,
            confidence,
        });
    }

    Ok(FeatureTable {
        samples: sample_cols.into_iter().map(|(_, s)| s).collect(),
        features,
    })
}

/// Parse a non-negative integer read count; integral floats (`12.0`) are accepted
fn parse_count(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0);
    }
    if let Ok(v) = raw.parse::<u64>() {
        return Some(v);
    }
    let v: f64 = raw.parse().ok()?;
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 {
        Some(v as u64)
    } else {
        None
    }
}

/// Parse a lineage string.
///
/// Accepts prefixed (`d__Bacteria; p__Firmicutes; ...`) and positional
/// (`Bacteria;Firmicutes;...`) forms. Placeholder names resolve to `None`.
/// Species names are qualified with their genus.
pub fn parse_lineage(raw: &str) -> Lineage {
    let mut names: [Option<String>; 7] = Default::default();

    for (pos, part) in raw.split(';').enumerate() {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let (rank, name) = match split_prefix(part) {
            Some((rank, name)) => (rank, name),
            None => match Rank::ALL.get(pos) {
                Some(rank) => (*rank, part),
                None => continue,
            },
        };

        if let Some(name) = clean_name(name) {
            names[rank.depth()] = Some(name);
        }
    }

    // Bare epithets (`s__copri`) are qualified with the base genus; binomials
    // (`s__Prevotella_copri`) are kept as written
    let genus = names[Rank::Genus.depth()].clone();
    if let (Some(species), Some(genus)) = (names[Rank::Species.depth()].as_mut(), genus) {
        if !species.contains('_') {
            *species = format!("{}_{}", genus_base(&genus), species);
        }
    }

    Lineage::new(names)
}

fn split_prefix(part: &str) -> Option<(Rank, &str)> {
    let mut chars = part.chars();
    let prefix = chars.next()?;
    let rest = chars.as_str().strip_prefix("__")?;
    Rank::from_prefix(prefix).map(|rank| (rank, rest))
}

fn clean_name(name: &str) -> Option<String> {
    let name = name.replace(['[', ']'], "");
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let lower = name.to_lowercase();
    let placeholder = ["unclassified", "uncultured", "unidentified", "unknown", "metagenome"]
        .iter()
        .any(|p| lower.starts_with(p));
    if placeholder {
        return None;
    }
    Some(name.replace(' ', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "#OTU ID\tS1\tS2\tTaxon\tConfidence
asv1\t10\t0\td__Bacteria; p__Bacteroidota; c__Bacteroidia; o__Bacteroidales; f__Bacteroidaceae; g__Bacteroides; s__fragilis\t0.99
asv2\t5.0\t3\td__Bacteria; p__Firmicutes; c__Clostridia; o__Oscillospirales; f__Ruminococcaceae; g__Faecalibacterium\t0.95
asv3\t1\t0\td__Bacteria; p__Firmicutes; c__Clostridia; o__; f__; g__\t0.7
";

    #[test]
    fn test_read_feature_table() {
        let table = read_feature_table(TABLE.as_bytes()).unwrap();
        assert_eq!(table.samples, vec!["S1", "S2"]);
        assert_eq!(table.features.len(), 3);
        assert_eq!(table.features[1].counts, vec![5, 3]);
        assert_eq!(table.features[0].confidence, Some(0.99));
        assert_eq!(table.sample_total(0), 16);
    }

    #[test]
    fn test_missing_taxon_column_is_fatal() {
        let raw = "#OTU ID\tS1\nasv1\t10\n";
        let err = read_feature_table(raw.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MissingColumn(c) if c == "Taxon"));
    }

    #[test]
    fn test_negative_count_rejected() {
        let raw = "id\tS1\tTaxon\nasv1\t-4\tg__Bacteroides\n";
        let err = read_feature_table(raw.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Table { line: 2, .. }));
    }

    #[test]
    fn test_fractional_count_rejected() {
        assert_eq!(parse_count("12.0"), Some(12));
        assert_eq!(parse_count("12.5"), None);
        assert_eq!(parse_count(""), Some(0));
    }

    #[test]
    fn test_biom_banner_skipped() {
        let raw = "# Constructed from biom file\n#OTU ID\tS1\tTaxon\nasv1\t4\tg__Blautia\n";
        let table = read_feature_table(raw.as_bytes()).unwrap();
        assert_eq!(table.samples, vec!["S1"]);
        assert_eq!(table.features.len(), 1);
    }

    #[test]
    fn test_parse_prefixed_lineage() {
        let lineage = parse_lineage(
            "d__Bacteria; p__Bacteroidota; c__Bacteroidia; o__Bacteroidales; f__Bacteroidaceae; g__Bacteroides; s__fragilis",
        );
        assert_eq!(lineage.name_at(Rank::Phylum), Some("Bacteroidota"));
        assert_eq!(lineage.name_at(Rank::Genus), Some("Bacteroides"));
        assert_eq!(lineage.name_at(Rank::Species), Some("Bacteroides_fragilis"));
    }

    #[test]
    fn test_parse_partial_and_placeholder_lineage() {
        let lineage = parse_lineage("k__Bacteria; p__Firmicutes; c__Clostridia; o__; f__; g__uncultured");
        assert_eq!(lineage.name_at(Rank::Class), Some("Clostridia"));
        assert_eq!(lineage.name_at(Rank::Genus), None);
        assert_eq!(lineage.name_at(Rank::Order), None);
    }

    #[test]
    fn test_parse_positional_lineage() {
        let lineage = parse_lineage("Bacteria;Firmicutes;Clostridia;Lachnospirales;Lachnospiraceae;Blautia");
        assert_eq!(lineage.name_at(Rank::Order), Some("Lachnospirales"));
        assert_eq!(lineage.name_at(Rank::Genus), Some("Blautia"));
        assert_eq!(lineage.name_at(Rank::Species), None);
    }

    #[test]
    fn test_silva_species_under_suffixed_genus() {
        let lineage = parse_lineage("g__Prevotella_9; s__Prevotella_copri");
        assert_eq!(lineage.name_at(Rank::Genus), Some("Prevotella_9"));
        assert_eq!(lineage.name_at(Rank::Species), Some("Prevotella_copri"));

        let lineage = parse_lineage("g__Prevotella_9; s__copri");
        assert_eq!(lineage.name_at(Rank::Species), Some("Prevotella_copri"));

        let lineage = parse_lineage("g__Escherichia-Shigella; s__coli");
        assert_eq!(lineage.name_at(Rank::Species), Some("Escherichia_coli"));
    }

    #[test]
    fn test_bracketed_names_unwrapped() {
        let lineage = parse_lineage("g__[Ruminococcus]_gnavus_group; s__[Ruminococcus]_gnavus");
        assert_eq!(lineage.name_at(Rank::Genus), Some("Ruminococcus_gnavus_group"));
        assert_eq!(lineage.name_at(Rank::Species), Some("Ruminococcus_gnavus"));

        let lineage = parse_lineage("f__Lachnospiraceae; g__[Eubacterium]_hallii_group");
        assert_eq!(lineage.name_at(Rank::Genus), Some("Eubacterium_hallii_group"));
    }

    #[test]
    fn test_qualified_species_kept() {
        let lineage = parse_lineage("g__Ruminococcus; s__Ruminococcus gnavus");
        assert_eq!(lineage.name_at(Rank::Species), Some("Ruminococcus_gnavus"));
    }
}
