// error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Every failure the projection library can report.
///
/// The variants follow the run-level taxonomy: configuration problems and
/// data-integrity violations are fatal and raised before (or instead of) any
/// computation; numerical degeneracies are handled locally and never show up
/// here.
#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Linear algebra failure: {0}")]
    Linalg(String),

    #[error("Genotype file error: {0}")]
    Genotype(String),

    #[error("Malformed artifact {}: {reason}", path.display())]
    Artifact { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProjectionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProjectionError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn artifact(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ProjectionError::Artifact {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<Box<bed_reader::BedErrorPlus>> for ProjectionError {
    fn from(e: Box<bed_reader::BedErrorPlus>) -> Self {
        ProjectionError::Genotype(format!("bed_reader error: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
