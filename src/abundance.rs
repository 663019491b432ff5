//! Abundance tables and per-sample taxon proportions.

use crate::error::{LufError, Result};
use std::collections::HashMap;

/// Raw, non-negative abundances (counts or already-normalised values).
///
/// Rows are samples, columns are taxa, stored row-major.
#[derive(Debug, Clone)]
pub struct AbundanceTable {
    sample_ids: Vec<String>,
    taxa: Vec<String>,
    values: Vec<f64>,
}

impl AbundanceTable {
    /// Create a table, checking the shape and that every value is finite and non-negative.
    pub fn new(sample_ids: Vec<String>, taxa: Vec<String>, values: Vec<f64>) -> Result<Self> {
        let expected = sample_ids.len() * taxa.len();
        if values.len() != expected {
            return Err(LufError::DimensionMismatch {
                expected,
                actual: values.len(),
            });
        }
        if sample_ids.is_empty() || taxa.is_empty() {
            return Err(LufError::EmptyData(
                "abundance table needs at least one sample and one taxon".to_string(),
            ));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite() || *v < 0.0) {
            return Err(LufError::InvalidValue {
                value: values[pos].to_string(),
                row: pos / taxa.len(),
                col: pos % taxa.len(),
            });
        }
        Ok(Self {
            sample_ids,
            taxa,
            values,
        })
    }

    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    #[inline]
    pub fn taxa(&self) -> &[String] {
        &self.taxa
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    #[inline]
    pub fn n_taxa(&self) -> usize {
        self.taxa.len()
    }

    pub fn row(&self, sample: usize) -> &[f64] {
        let n = self.n_taxa();
        &self.values[sample * n..(sample + 1) * n]
    }

    /// Swap samples and taxa.
    pub fn transpose(self) -> Self {
        let (rows, cols) = (self.n_samples(), self.n_taxa());
        let mut values = vec![0.0; self.values.len()];
        for r in 0..rows {
            for c in 0..cols {
                values[c * rows + r] = self.values[r * cols + c];
            }
        }
        Self {
            sample_ids: self.taxa,
            taxa: self.sample_ids,
            values,
        }
    }

    /// Divide every row by its total.
    ///
    /// # Errors
    /// A sample whose abundances sum to zero cannot be turned into proportions.
    pub fn normalize(&self) -> Result<ProportionMatrix> {
        let mut values = self.values.clone();
        let n = self.n_taxa();
        for (sample, row) in values.chunks_mut(n).enumerate() {
            let total: f64 = row.iter().sum();
            if total <= 0.0 {
                return Err(LufError::EmptySample(self.sample_ids[sample].clone()));
            }
            row.iter_mut().for_each(|v| *v /= total);
        }
        Ok(ProportionMatrix {
            sample_ids: self.sample_ids.clone(),
            taxa: self.taxa.clone(),
            values,
        })
    }
}

/// Per-sample taxon proportions (samples × taxa, row-major, rows summing to 1).
#[derive(Debug, Clone)]
pub struct ProportionMatrix {
    sample_ids: Vec<String>,
    taxa: Vec<String>,
    values: Vec<f64>,
}

impl ProportionMatrix {
    /// Wrap values that are already proportions. Only the shape is checked.
    pub fn new(sample_ids: Vec<String>, taxa: Vec<String>, values: Vec<f64>) -> Result<Self> {
        let expected = sample_ids.len() * taxa.len();
        if values.len() != expected {
            return Err(LufError::DimensionMismatch {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            sample_ids,
            taxa,
            values,
        })
    }

    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    #[inline]
    pub fn taxa(&self) -> &[String] {
        &self.taxa
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    #[inline]
    pub fn n_taxa(&self) -> usize {
        self.taxa.len()
    }

    pub fn row(&self, sample: usize) -> &[f64] {
        let n = self.n_taxa();
        &self.values[sample * n..(sample + 1) * n]
    }

    #[inline]
    pub fn get(&self, sample: usize, taxon: usize) -> f64 {
        self.values[sample * self.n_taxa() + taxon]
    }

    /// Reorder the columns to `order`, which must name exactly the same taxa.
    pub fn align_to(&self, order: &[String]) -> Result<Self> {
        if order.len() != self.n_taxa() {
            return Err(LufError::DimensionMismatch {
                expected: self.n_taxa(),
                actual: order.len(),
            });
        }
        let position: HashMap<&str, usize> = self
            .taxa
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i))
            .collect();
        let columns: Vec<usize> = order
            .iter()
            .map(|t| position.get(t.as_str()).copied())
            .collect::<Option<_>>()
            .ok_or(LufError::TaxaMisaligned)?;

        let mut values = Vec::with_capacity(self.values.len());
        for sample in 0..self.n_samples() {
            let row = self.row(sample);
            values.extend(columns.iter().map(|&c| row[c]));
        }
        Ok(Self {
            sample_ids: self.sample_ids.clone(),
            taxa: order.to_vec(),
            values,
        })
    }
}
