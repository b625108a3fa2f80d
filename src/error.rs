//! Error taxonomy for the cluster permutation test
//!
//! Configuration problems are detected before any computation starts. I/O
//! failures from the NIfTI reader/writer are passed through unchanged.
//! Zero-variance locations and empty results are not errors.

use thiserror::Error;

/// Errors produced by the cluster permutation test and its collaborators
#[derive(Error, Debug)]
pub enum ClusterTestError {
    #[error("Need at least 2 subjects for a paired test, got {0}")]
    TooFewSubjects(usize),

    #[error("Number of permutations must be >= 1, got {0}")]
    InvalidPermutationCount(usize),

    #[error("Shape mismatch: {what} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Unsupported tail {0} (expected 0, 1 or -1)")]
    UnsupportedTail(i64),

    #[error("alpha must be in (0, 1), got {0}")]
    InvalidAlpha(f64),

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("max_step must be >= 1, got {0}")]
    InvalidMaxStep(usize),

    #[error("Exhaustive sign flipping supports at most {max} subjects, got {actual}")]
    TooManySubjectsForExhaustive { max: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Student-t distribution error: {0}")]
    Distribution(String),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::NiftiError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for cluster permutation operations
pub type Result<T> = std::result::Result<T, ClusterTestError>;
