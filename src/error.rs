//! Error types for longitudinal UniFrac computations.

use phylotree::tree::TreeError;
use thiserror::Error;

/// Every failure the crate reports. All of them are fatal for the run:
/// the core computation has no recoverable error states.
#[derive(Error, Debug)]
pub enum LufError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse Newick tree: {0}")]
    Newick(String),

    #[error("Tree error: {0}")]
    Tree(String),

    #[error("The tree is not rooted (root has {children} children, expected 2)")]
    UnrootedTree { children: usize },

    #[error("Malformed tree: {0}")]
    InvalidTree(String),

    #[error("{count} taxa of the abundance table are not tips of the tree (e.g. {examples})")]
    UnmatchedTaxa { count: usize, examples: String },

    #[error("Proportion columns are not aligned with the tree tips")]
    TaxaMisaligned,

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid abundance value '{value}' at row {row}, column {col}")]
    InvalidValue { value: String, row: usize, col: usize },

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Sample '{0}' has a total abundance of zero")]
    EmptySample(String),

    #[error("Missing column '{0}' in sample sheet")]
    MissingColumn(String),

    #[error("Sample '{0}' has no entry in the sample sheet")]
    MissingSample(String),

    #[error("Sample '{0}' is listed more than once in the sample sheet")]
    DuplicateSheetEntry(String),

    #[error("Subject '{subject}' has more than one sample at time '{time}'")]
    DuplicateSample { subject: String, time: String },

    #[error("Sample '{sample}' has time label '{label}', expected one of the two configured labels")]
    UnknownTimeLabel { sample: String, label: String },

    #[error("Subjects differ between time points: {0}")]
    SubjectMismatch(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl From<TreeError> for LufError {
    fn from(err: TreeError) -> Self {
        LufError::Tree(err.to_string())
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, LufError>;
