//! Crate root: lightweight module orchestration and public re-exports.
//!
//! Modules:
//! - `snapshot`: arena view of a rooted tree (edges, lengths, post-order, pruning).
//! - `abundance`: abundance tables, row normalisation, proportion matrices.
//! - `design`: subject / time-point mapping and pairing of samples.
//! - `accumulate`: cumulative taxon proportions per branch and sample.
//! - `distances`: change profiles and pairwise longitudinal UniFrac distances.
//! - `pipeline`: input reconciliation followed by the two core stages.
//! - `config`: validated run parameters.
//! - `io`: Newick / TSV readers and TSV matrix writers.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod abundance;
pub mod accumulate;
pub mod config;
pub mod design;
pub mod distances;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod snapshot;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use config::LufConfig;
pub use design::{SampleSheet, TimeLabels, TimePoint};
pub use distances::{DistanceArray, Metric};
pub use error::{LufError, Result};
pub use io::{read_abundance_table, read_sample_sheet, read_tree, write_distance_array};
pub use pipeline::compute;
pub use snapshot::TreeSnapshot;
