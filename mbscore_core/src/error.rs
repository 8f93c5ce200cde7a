//! Error types for the mbscore_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for mbscore_core operations
///
/// Data-insufficiency and numeric edge cases are not errors: they are carried
/// as stage statuses inside a `SampleResult`. Anything returned here is either
/// a configuration problem (fatal for the run) or a per-sample failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV/TSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reference table missing or malformed
    #[error("Reference table error: {0}")]
    Reference(String),

    /// Abundance table lacks a required column
    #[error("Abundance table is missing required column '{0}'")]
    MissingColumn(String),

    /// Malformed row in the abundance table
    #[error("Abundance table line {line}: {message}")]
    Table { line: usize, message: String },

    /// Age model could not be loaded or evaluated
    #[error("Age model error: {0}")]
    Model(String),

    /// A single sample could not be scored
    #[error("Sample '{sample}': {message}")]
    Sample { sample: String, message: String },

    /// Generic error
    #[error("{0}")]
    Other(String),
}
