//! Python binding layer for longitudinal UniFrac.
//!
//! Provides Python functions computing subject × subject × metric distance
//! arrays either from files or from in-memory tables.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::abundance::AbundanceTable;
use crate::config::LufConfig;
use crate::design::{SampleSheet, TimeLabels};
use crate::distances::DistanceArray;
use crate::error::LufError;
use crate::io::{SheetColumns, read_abundance_table, read_sample_sheet, read_tree};
use crate::pipeline::compute;
use crate::snapshot::TreeSnapshot;

type LufArray = (Vec<String>, Vec<String>, Vec<Vec<Vec<f64>>>);

fn to_py_err(err: LufError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn package(dists: DistanceArray) -> LufArray {
    let labels = dists.metrics().iter().map(|m| m.label()).collect();
    let array = dists.to_nested();
    (dists.subjects().to_vec(), labels, array)
}

fn config_for(alphas: Option<Vec<f64>>, labels: TimeLabels) -> LufConfig {
    let config = LufConfig::default().with_time_labels(labels);
    match alphas {
        Some(alphas) => config.with_alphas(alphas),
        None => config,
    }
}

/// Compute longitudinal UniFrac distances from files.
///
/// Args:
///     tree_path: Rooted Newick tree
///     table_path: Abundance TSV, samples as rows (unless taxa_as_rows)
///     metadata_path: Sample sheet TSV with subject and time columns
///     alphas: Generalized metric exponents (default: [0, 0.5, 1])
///     subject_column: Sample sheet column with subject IDs (default: "subject")
///     time_column: Sample sheet column with time labels (default: "time")
///     time1 / time2: Labels of the two time points (default: "1" / "2")
///     taxa_as_rows: Table has taxa as rows (default: False)
///
/// Returns:
///     A tuple (subjects, metric_labels, array) where array[i][j][k] is the
///     distance between subjects i and j under metric k.
///
/// Raises:
///     ValueError: On any read or validation failure
#[pyfunction]
#[pyo3(signature = (
    tree_path,
    table_path,
    metadata_path,
    alphas=None,
    subject_column="subject".to_string(),
    time_column="time".to_string(),
    time1="1".to_string(),
    time2="2".to_string(),
    taxa_as_rows=false
))]
#[allow(clippy::too_many_arguments)]
fn pairwise_luf(
    tree_path: String,
    table_path: String,
    metadata_path: String,
    alphas: Option<Vec<f64>>,
    subject_column: String,
    time_column: String,
    time1: String,
    time2: String,
    taxa_as_rows: bool,
) -> PyResult<LufArray> {
    let labels = TimeLabels::new(time1, time2);
    let columns = SheetColumns {
        sample: None,
        subject: subject_column,
        time: time_column,
    };

    let tree = read_tree(&tree_path).map_err(to_py_err)?;
    let table = read_abundance_table(&table_path, taxa_as_rows).map_err(to_py_err)?;
    let sheet = read_sample_sheet(&metadata_path, &columns, &labels).map_err(to_py_err)?;

    let config = config_for(alphas, labels);
    let dists = compute(&tree, &table, &sheet, &config).map_err(to_py_err)?;
    Ok(package(dists))
}

/// Compute longitudinal UniFrac distances from in-memory data.
///
/// Args:
///     tip_labels: Taxon name of tip node i, for i in 0..len(tip_labels)
///     edges: (parent, child) node ids; internal nodes use ids >= len(tip_labels)
///     lengths: Branch length of each edge
///     sample_ids: Row names of `proportions`
///     taxa: Column names of `proportions`
///     proportions: Samples × taxa abundances; rows are normalised, so counts work too
///     subjects / times: Subject ID and time label of each sample
///     alphas: Generalized metric exponents (default: [0, 0.5, 1])
///
/// Returns:
///     Same tuple as `pairwise_luf`.
#[pyfunction]
#[pyo3(signature = (
    tip_labels,
    edges,
    lengths,
    sample_ids,
    taxa,
    proportions,
    subjects,
    times,
    alphas=None,
    time1="1".to_string(),
    time2="2".to_string()
))]
#[allow(clippy::too_many_arguments)]
fn pairwise_luf_from_edges(
    tip_labels: Vec<String>,
    edges: Vec<(usize, usize)>,
    lengths: Vec<f64>,
    sample_ids: Vec<String>,
    taxa: Vec<String>,
    proportions: Vec<Vec<f64>>,
    subjects: Vec<String>,
    times: Vec<String>,
    alphas: Option<Vec<f64>>,
    time1: String,
    time2: String,
) -> PyResult<LufArray> {
    let labels = TimeLabels::new(time1, time2);

    let tree = TreeSnapshot::from_edges(tip_labels, &edges, &lengths).map_err(to_py_err)?;
    if let Some(row) = proportions.iter().find(|r| r.len() != taxa.len()) {
        return Err(to_py_err(LufError::DimensionMismatch {
            expected: taxa.len(),
            actual: row.len(),
        }));
    }
    let values = proportions.into_iter().flatten().collect();
    let table = AbundanceTable::new(sample_ids.clone(), taxa, values).map_err(to_py_err)?;
    let sheet =
        SampleSheet::from_columns(&sample_ids, &subjects, &times, &labels).map_err(to_py_err)?;

    let config = config_for(alphas, labels);
    let dists = compute(&tree, &table, &sheet, &config).map_err(to_py_err)?;
    Ok(package(dists))
}

/// Python module definition
#[pymodule]
fn longitudinal_unifrac(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(pairwise_luf, m)?)?;
    m.add_function(wrap_pyfunction!(pairwise_luf_from_edges, m)?)?;
    Ok(())
}
