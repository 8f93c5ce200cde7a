//! Built-in reference tables.
//!
//! Used whenever the configuration does not point at an external table.

use crate::advice::builtin_prevention;
use crate::reference::{DiseaseTable, EnterotypeTable, RangeTable, ReferenceData};
use crate::types::*;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// Version tag stamped on every built-in table
pub const BUILTIN_VERSION: &str = "builtin-1";

/// Cached default references - built once and shared by every engine
static DEFAULT_REFERENCES: Lazy<ReferenceData> = Lazy::new(build_default_references);

/// Get a reference to the cached built-in reference data
pub fn default_references() -> &'static ReferenceData {
    &DEFAULT_REFERENCES
}

/// Build the built-in reference data from scratch
///
/// **Note**: For production use, prefer `default_references()` which returns
/// a cached reference.
pub fn build_default_references() -> ReferenceData {
    ReferenceData::from_parts(
        build_default_ranges(),
        build_default_diseases(),
        build_default_enterotypes(),
        default_core_genera(),
        BUILTIN_VERSION.to_string(),
    )
}

/// The fixed, ordered 39-genus input of the age model
pub const CORE_GENERA: [&str; 39] = [
    "Bacteroides",
    "Prevotella",
    "Ruminococcus",
    "Faecalibacterium",
    "Bifidobacterium",
    "Lactobacillus",
    "Akkermansia",
    "Roseburia",
    "Blautia",
    "Coprococcus",
    "Dorea",
    "Eubacterium",
    "Alistipes",
    "Parabacteroides",
    "Odoribacter",
    "Butyricimonas",
    "Christensenella",
    "Oscillospira",
    "Subdoligranulum",
    "Lachnospira",
    "Anaerostipes",
    "Collinsella",
    "Streptococcus",
    "Veillonella",
    "Escherichia",
    "Klebsiella",
    "Enterococcus",
    "Enterobacter",
    "Clostridium",
    "Staphylococcus",
    "Desulfovibrio",
    "Bilophila",
    "Eggerthella",
    "Fusobacterium",
    "Sutterella",
    "Methanobrevibacter",
    "Megamonas",
    "Phascolarctobacterium",
    "Dialister",
];

fn default_core_genera() -> Vec<String> {
    CORE_GENERA.iter().map(|g| g.to_string()).collect()
}

// ============================================================================
// Reference ranges
// ============================================================================

fn range(taxon: &str, category: TaxonCategory, min: f64, max: f64, optimal: f64) -> ReferenceRange {
    ReferenceRange {
        taxon: taxon.into(),
        category,
        rank: Rank::Genus,
        minimum: min,
        maximum: max,
        optimal,
    }
}

fn build_default_ranges() -> RangeTable {
    use TaxonCategory::*;

    let taxa = vec![
        // Beneficial
        range("Bifidobacterium", Beneficial, 0.00183, 0.146, 0.05),
        range("Lactobacillus", Beneficial, 0.00008, 0.0003, 0.0002),
        range("Faecalibacterium", Beneficial, 0.00636, 0.1097, 0.05),
        range("Akkermansia", Beneficial, 0.0001, 0.0389, 0.01),
        range("Prevotella", Beneficial, 0.00014, 0.6613, 0.1),
        range("Roseburia", Beneficial, 0.001, 0.05, 0.02),
        range("Coprococcus", Beneficial, 0.00009, 0.0057, 0.002),
        range("Butyricimonas", Beneficial, 0.00014, 0.0086, 0.003),
        range("Odoribacter", Beneficial, 0.00013, 0.0061, 0.002),
        range("Alistipes", Beneficial, 0.0001, 0.0289, 0.01),
        range("Christensenella", Beneficial, 0.00005, 0.005, 0.001),
        range("Blautia", Beneficial, 0.005, 0.08, 0.03),
        range("Lachnospira", Beneficial, 0.001, 0.03, 0.01),
        // Conditional pathogens
        range("Veillonella", Conditional, 0.0, 0.0022, 0.001),
        range("Streptococcus", Conditional, 0.0, 0.02, 0.005),
        range("Bacteroides", Conditional, 0.0, 0.30, 0.15),
        range("Eggerthella", Conditional, 0.0, 0.001, 0.0005),
        range("Peptostreptococcus", Conditional, 0.0, 0.001, 0.0005),
        range("Haemophilus", Conditional, 0.0, 0.005, 0.002),
        range("Enterobacter", Conditional, 0.0, 0.002, 0.001),
        range("Citrobacter", Conditional, 0.0, 0.001, 0.0005),
        range("Proteus", Conditional, 0.0, 0.0005, 0.0),
        range("Morganella", Conditional, 0.0, 0.0005, 0.0),
        range("Desulfovibrio", Conditional, 0.0, 0.005, 0.002),
        range("Bilophila", Conditional, 0.0, 0.003, 0.001),
        range("Collinsella", Conditional, 0.0, 0.02, 0.005),
        range("Dorea", Conditional, 0.0, 0.02, 0.008),
        range("Parabacteroides", Conditional, 0.0, 0.04, 0.015),
        // Harmful
        range("Escherichia", Harmful, 0.0, 0.005, 0.0),
        range("Shigella", Harmful, 0.0, 0.0014, 0.0),
        range("Salmonella", Harmful, 0.0, 0.0001, 0.0),
        range("Clostridioides", Harmful, 0.0, 0.00001, 0.0),
        range("Staphylococcus", Harmful, 0.0, 0.001, 0.0),
        range("Klebsiella", Harmful, 0.0, 0.0011, 0.0),
        range("Enterococcus", Harmful, 0.0, 0.005, 0.0),
        range("Fusobacterium", Harmful, 0.0, 0.001, 0.0),
        range("Campylobacter", Harmful, 0.0, 0.0001, 0.0),
        range("Helicobacter", Harmful, 0.0, 0.0001, 0.0),
        range("Porphyromonas", Harmful, 0.0, 0.001, 0.0),
        range("Pseudomonas", Harmful, 0.0, 0.0005, 0.0),
        range("Yersinia", Harmful, 0.0, 0.0001, 0.0),
        range("Vibrio", Harmful, 0.0, 0.0001, 0.0),
        range("Listeria", Harmful, 0.0, 0.0001, 0.0),
    ];

    RangeTable {
        version: BUILTIN_VERSION.into(),
        taxa,
    }
}

// ============================================================================
// Disease associations
// ============================================================================

fn up(taxon: &str, weight: f64) -> TaxonAssociation {
    TaxonAssociation {
        taxon: taxon.into(),
        rank: Rank::Genus,
        direction: Direction::Up,
        weight,
    }
}

fn down(taxon: &str, weight: f64) -> TaxonAssociation {
    TaxonAssociation {
        taxon: taxon.into(),
        rank: Rank::Genus,
        direction: Direction::Down,
        weight,
    }
}

fn up_species(taxon: &str, weight: f64) -> TaxonAssociation {
    TaxonAssociation {
        rank: Rank::Species,
        ..up(taxon, weight)
    }
}

fn disease(
    name: &str,
    display_name: &str,
    associations: Vec<TaxonAssociation>,
    normalization_constant: f64,
) -> DiseaseProfile {
    DiseaseProfile {
        name: name.into(),
        display_name: Some(display_name.into()),
        associations,
        normalization_constant,
        tiers: TierThresholds::default(),
        prevention: builtin_prevention(name),
    }
}

fn build_default_diseases() -> DiseaseTable {
    let diseases = vec![
        disease(
            "IBD",
            "炎症性肠病",
            vec![
                up("Escherichia", 60.0),
                up("Streptococcus", 40.0),
                up("Eggerthella", 50.0),
                up("Klebsiella", 60.0),
                up_species("Ruminococcus_gnavus", 50.0),
                down("Faecalibacterium", 20.0),
                down("Akkermansia", 25.0),
                down("Coprococcus", 30.0),
                down("Roseburia", 25.0),
            ],
            4.0,
        ),
        disease(
            "IBS",
            "肠易激综合征",
            vec![
                up("Veillonella", 50.0),
                up("Streptococcus", 40.0),
                up_species("Ruminococcus_gnavus", 50.0),
                up("Dorea", 30.0),
                down("Bifidobacterium", 20.0),
                down("Lactobacillus", 40.0),
                down("Faecalibacterium", 20.0),
            ],
            4.0,
        ),
        disease(
            "Constipation",
            "便秘",
            vec![
                up("Clostridium", 30.0),
                up("Veillonella", 40.0),
                up("Methanobrevibacter", 50.0),
                down("Lactobacillus", 40.0),
                down("Bifidobacterium", 20.0),
                down("Prevotella", 10.0),
            ],
            4.0,
        ),
        disease(
            "CRC",
            "结直肠癌",
            vec![
                up("Fusobacterium", 80.0),
                up("Porphyromonas", 60.0),
                up("Peptostreptococcus", 60.0),
                up_species("Bacteroides_fragilis", 40.0),
                down("Bifidobacterium", 20.0),
                down("Lactobacillus", 40.0),
                down("Faecalibacterium", 20.0),
            ],
            3.0,
        ),
        disease(
            "Celiac",
            "乳糜泻",
            vec![
                up("Escherichia", 40.0),
                up("Staphylococcus", 50.0),
                up("Bacteroides", 10.0),
                down("Bifidobacterium", 25.0),
                down("Lactobacillus", 40.0),
            ],
            4.0,
        ),
        disease(
            "Diabetes",
            "2型糖尿病",
            vec![
                up("Peptostreptococcus", 50.0),
                up("Clostridium", 30.0),
                up("Desulfovibrio", 50.0),
                up("Escherichia", 30.0),
                down("Prevotella", 10.0),
                down("Roseburia", 25.0),
                down("Akkermansia", 30.0),
                down("Faecalibacterium", 20.0),
            ],
            4.0,
        ),
        disease(
            "Obesity",
            "肥胖",
            vec![
                up("Staphylococcus", 50.0),
                up("Collinsella", 30.0),
                up("Enterobacter", 40.0),
                down("Akkermansia", 30.0),
                down("Christensenella", 50.0),
                down("Prevotella", 10.0),
            ],
            4.0,
        ),
        disease(
            "NAFLD",
            "非酒精性脂肪肝",
            vec![
                up("Klebsiella", 60.0),
                up("Escherichia", 40.0),
                up("Veillonella", 40.0),
                down("Ruminococcus", 20.0),
                down("Akkermansia", 25.0),
                down("Faecalibacterium", 20.0),
            ],
            4.0,
        ),
        disease(
            "CVD",
            "心血管疾病",
            vec![
                up("Klebsiella", 50.0),
                up("Streptococcus", 40.0),
                up("Enterobacter", 40.0),
                up("Collinsella", 30.0),
                down("Prevotella", 10.0),
                down("Roseburia", 25.0),
                down("Faecalibacterium", 20.0),
            ],
            4.0,
        ),
        disease(
            "Depression",
            "抑郁症",
            vec![
                up("Eggerthella", 60.0),
                up("Veillonella", 40.0),
                up("Alistipes", 20.0),
                down("Bifidobacterium", 20.0),
                down("Lactobacillus", 40.0),
                down("Faecalibacterium", 20.0),
                down("Coprococcus", 30.0),
            ],
            4.0,
        ),
        disease(
            "Autism",
            "自闭症",
            vec![
                up("Clostridium", 30.0),
                up("Desulfovibrio", 50.0),
                up("Sutterella", 40.0),
                down("Bifidobacterium", 20.0),
                down("Prevotella", 10.0),
                down("Coprococcus", 30.0),
            ],
            4.0,
        ),
        disease(
            "Parkinson",
            "帕金森病",
            vec![
                up("Akkermansia", 20.0),
                up("Enterococcus", 40.0),
                up("Desulfovibrio", 40.0),
                down("Prevotella", 10.0),
                down("Faecalibacterium", 20.0),
                down("Roseburia", 25.0),
                down("Blautia", 15.0),
            ],
            4.0,
        ),
        disease(
            "Eczema",
            "湿疹",
            vec![
                up("Escherichia", 40.0),
                up("Staphylococcus", 50.0),
                up("Veillonella", 30.0),
                down("Bifidobacterium", 20.0),
                down("Lactobacillus", 40.0),
                down("Ruminococcus", 20.0),
            ],
            4.0,
        ),
        disease(
            "RA",
            "类风湿性关节炎",
            vec![
                up("Collinsella", 40.0),
                up("Eggerthella", 40.0),
                up_species("Prevotella_copri", 30.0),
                down("Faecalibacterium", 20.0),
                down("Bifidobacterium", 20.0),
                down("Haemophilus", 20.0),
            ],
            4.0,
        ),
    ];

    DiseaseTable {
        version: BUILTIN_VERSION.into(),
        diseases,
    }
}

// ============================================================================
// Enterotype centroids
// ============================================================================

/// Genera spanning the enterotype feature space
pub const ENTEROTYPE_GENERA: [&str; 8] = [
    "Bacteroides",
    "Prevotella",
    "Ruminococcus",
    "Faecalibacterium",
    "Alistipes",
    "Parabacteroides",
    "Blautia",
    "Bifidobacterium",
];

fn centroid(label: Enterotype, dominant: &str, values: [f64; 8]) -> EnterotypeCentroid {
    let profile: BTreeMap<String, f64> = ENTEROTYPE_GENERA
        .iter()
        .zip(values)
        .map(|(genus, v)| (genus.to_string(), v))
        .collect();
    EnterotypeCentroid {
        label,
        dominant_genus: dominant.into(),
        profile,
    }
}

fn build_default_enterotypes() -> EnterotypeTable {
    EnterotypeTable {
        version: BUILTIN_VERSION.into(),
        genera: ENTEROTYPE_GENERA.iter().map(|g| g.to_string()).collect(),
        centroids: vec![
            centroid(
                Enterotype::BacteroidesDominant,
                "Bacteroides",
                [0.30, 0.02, 0.03, 0.06, 0.04, 0.03, 0.03, 0.02],
            ),
            centroid(
                Enterotype::PrevotellaDominant,
                "Prevotella",
                [0.05, 0.30, 0.03, 0.06, 0.01, 0.01, 0.02, 0.02],
            ),
            centroid(
                Enterotype::RuminococcusDominant,
                "Ruminococcus",
                [0.08, 0.02, 0.12, 0.08, 0.03, 0.02, 0.06, 0.03],
            ),
        ],
    }
}
