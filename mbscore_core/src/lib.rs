#![forbid(unsafe_code)]

//! Core scoring library for 16S gut microbiome profiles.
//!
//! This crate provides:
//! - Abundance table parsing and normalization
//! - Diversity, enterotype, core-taxon health, disease risk and biological
//!   age stages, with advisory content for each
//! - Built-in and file-backed reference tables
//! - A parallel batch engine and result sinks (JSONL, JSON, CSV)

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod table;
pub mod normalize;
pub mod reference;
pub mod defaults;
pub mod diversity;
pub mod enterotype;
pub mod health;
pub mod risk;
pub mod age;
pub mod advice;
pub mod functional;
pub mod aggregate;
pub mod engine;
pub mod sink;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use table::load_feature_table;
pub use reference::ReferenceData;
pub use defaults::{build_default_references, default_references};
pub use age::{default_age_model, load_chronological_ages, AgeModel, LinearAgeModel};
pub use functional::load_functional_summaries;
pub use aggregate::SampleResult;
pub use engine::{BatchOutcome, Engine, ScoringInputs};
pub use sink::{JsonDirSink, JsonlSink, ResultSink};
