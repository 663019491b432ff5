use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use itertools::Itertools;
use phylotree::tree::Tree;
use tracing::debug;

use crate::abundance::AbundanceTable;
use crate::design::{SampleSheet, TimeLabels};
use crate::distances::DistanceArray;
use crate::error::{LufError, Result};
use crate::snapshot::TreeSnapshot;

fn is_gz(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".gz")
}

/// Open a file for buffered reading, transparently decompressing `.gz` files.
pub fn open_reader<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let p = path.as_ref();
    let file = File::open(p)?;
    if is_gz(p) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Read the first Newick tree of a file and snapshot it.
///
/// Anything after the first `;` is ignored.
pub fn read_tree<P: AsRef<Path>>(path: P) -> Result<TreeSnapshot> {
    let mut content = String::new();
    open_reader(path.as_ref())?.read_to_string(&mut content)?;

    let newick = match content.find(';') {
        Some(end) => format!("{};", content[..end].trim()),
        None => return Err(LufError::Newick(format!("no ';' in {:?}", path.as_ref()))),
    };

    let tree = Tree::from_newick(&newick).map_err(|e| LufError::Newick(e.to_string()))?;
    let snapshot = TreeSnapshot::from_tree(&tree)?;
    debug!(
        tips = snapshot.n_tips(),
        branches = snapshot.n_branches(),
        "read tree"
    );
    Ok(snapshot)
}

/// Non-empty, non-comment lines split on tabs.
///
/// A line starting with `#` and holding no tab is a comment. `#OTU ID\t...`
/// style headers are kept.
fn tsv_records(reader: Box<dyn BufRead>) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() || (line.starts_with('#') && !line.contains('\t')) {
            continue;
        }
        records.push(line.split('\t').map(|f| f.trim().to_string()).collect());
    }
    Ok(records)
}

/// Read an abundance table from a (optionally gzipped) TSV file.
///
/// Expected format, samples as rows:
/// ```text
/// sample   taxonA  taxonB ...
/// s1       12      0
/// ```
/// With `taxa_as_rows` the file is read transposed (taxa as rows, samples as
/// columns). The first header cell is ignored.
pub fn read_abundance_table<P: AsRef<Path>>(path: P, taxa_as_rows: bool) -> Result<AbundanceTable> {
    let mut records = tsv_records(open_reader(path)?)?.into_iter();

    let header = records
        .next()
        .ok_or_else(|| LufError::EmptyData("abundance table is empty".to_string()))?;
    if header.len() < 2 {
        return Err(LufError::EmptyData(
            "abundance table needs at least one data column".to_string(),
        ));
    }
    let columns: Vec<String> = header[1..].to_vec();

    let mut row_ids = Vec::new();
    let mut values = Vec::new();
    for (row, fields) in records.enumerate() {
        if fields.len() != header.len() {
            return Err(LufError::DimensionMismatch {
                expected: header.len(),
                actual: fields.len(),
            });
        }
        row_ids.push(fields[0].clone());
        for (col, raw) in fields[1..].iter().enumerate() {
            let value: f64 = raw.parse().map_err(|_| LufError::InvalidValue {
                value: raw.clone(),
                row,
                col,
            })?;
            values.push(value);
        }
    }

    let table = AbundanceTable::new(row_ids, columns, values)?;
    let table = if taxa_as_rows { table.transpose() } else { table };
    debug!(
        samples = table.n_samples(),
        taxa = table.n_taxa(),
        "read abundance table"
    );
    Ok(table)
}

/// Sample sheet columns, by header name. `sample: None` uses the first column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetColumns {
    pub sample: Option<String>,
    pub subject: String,
    pub time: String,
}

impl Default for SheetColumns {
    fn default() -> Self {
        Self {
            sample: None,
            subject: "subject".to_string(),
            time: "time".to_string(),
        }
    }
}

/// Read the sample → (subject, time) mapping from a (optionally gzipped) TSV file.
pub fn read_sample_sheet<P: AsRef<Path>>(
    path: P,
    columns: &SheetColumns,
    labels: &TimeLabels,
) -> Result<SampleSheet> {
    let mut records = tsv_records(open_reader(path)?)?.into_iter();
    let header = records
        .next()
        .ok_or_else(|| LufError::EmptyData("sample sheet is empty".to_string()))?;

    let find = |name: &str| {
        header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| LufError::MissingColumn(name.to_string()))
    };
    let sample_col = match &columns.sample {
        Some(name) => find(name)?,
        None => 0,
    };
    let subject_col = find(&columns.subject)?;
    let time_col = find(&columns.time)?;
    let width = sample_col.max(subject_col).max(time_col) + 1;

    let mut samples = Vec::new();
    let mut subjects = Vec::new();
    let mut times = Vec::new();
    for fields in records {
        if fields.len() < width {
            return Err(LufError::DimensionMismatch {
                expected: width,
                actual: fields.len(),
            });
        }
        samples.push(fields[sample_col].clone());
        subjects.push(fields[subject_col].clone());
        times.push(fields[time_col].clone());
    }
    if samples.is_empty() {
        return Err(LufError::EmptyData("sample sheet has no rows".to_string()));
    }

    SampleSheet::from_columns(&samples, &subjects, &times, labels)
}

/// Write a labeled square matrix as TSV to a file.
/// If `path` ends with `.gz`, the output is gzip-compressed.
pub fn write_matrix_tsv<P: AsRef<Path>, T: std::fmt::Display>(
    path: P,
    names: &[String],
    mat: &[Vec<T>],
) -> Result<()> {
    let p = path.as_ref();
    if p.as_os_str() == "-" {
        return Err(LufError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "writing to stdout is not supported by write_matrix_tsv",
        )));
    }

    let mut out: Box<dyn Write> = if is_gz(p) {
        let enc = GzEncoder::new(File::create(p)?, Compression::default());
        Box::new(BufWriter::new(enc))
    } else {
        Box::new(BufWriter::new(File::create(p)?))
    };

    writeln!(out, "\t{}", names.iter().join("\t"))?;
    for (name, row) in names.iter().zip(mat) {
        writeln!(out, "{}\t{}", name, row.iter().join("\t"))?;
    }

    out.flush()?;
    Ok(())
}

/// Write one matrix per metric into `dir` as `<label>.tsv` (or `.tsv.gz`).
///
/// Returns the written paths in metric order.
pub fn write_distance_array<P: AsRef<Path>>(
    dir: P,
    dists: &DistanceArray,
    gzip: bool,
) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let extension = if gzip { "tsv.gz" } else { "tsv" };
    let mut written = Vec::with_capacity(dists.metrics().len());
    for metric in dists.metrics() {
        let path = dir.join(format!("{}.{extension}", metric.label()));
        let rows = dists.rows(metric).unwrap_or_default();
        write_matrix_tsv(&path, dists.subjects(), &rows)?;
        written.push(path);
    }
    Ok(written)
}
