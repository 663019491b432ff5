//! Cumulative branch abundances.
//!
//! For every branch and sample, the total proportion of all taxa descending
//! through that branch. Computed with one post-order sweep per sample: each
//! tip seeds its own branch, then every branch pushes its total into the
//! branch above it. Cost is linear in the number of branches, whatever the
//! depth of the tree.
//!
//! ```text
//!        root
//!       /    \
//!     0.7     C:0.3        branch into (A,B) = 0.2 + 0.5 = 0.7
//!    /   \
//!  A:0.2  B:0.5
//! ```

use crate::abundance::ProportionMatrix;
use crate::error::{LufError, Result};
use crate::snapshot::TreeSnapshot;
use rayon::prelude::*;

/// Branches × samples matrix of cumulative proportions.
///
/// Stored sample-major: all branches of sample 0, then sample 1, ...
#[derive(Debug, Clone)]
pub struct BranchAbundance {
    n_branches: usize,
    n_samples: usize,
    values: Vec<f64>,
}

impl BranchAbundance {
    #[inline]
    pub fn n_branches(&self) -> usize {
        self.n_branches
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    #[inline]
    pub fn get(&self, branch: usize, sample: usize) -> f64 {
        self.values[sample * self.n_branches + branch]
    }

    /// All branch values of one sample.
    pub fn sample(&self, sample: usize) -> &[f64] {
        &self.values[sample * self.n_branches..(sample + 1) * self.n_branches]
    }
}

/// Accumulate tip proportions up the tree, one independent column per sample.
///
/// `proportions` must have its columns in the tree's tip order
/// (see [`ProportionMatrix::align_to`]).
pub fn accumulate(tree: &TreeSnapshot, proportions: &ProportionMatrix) -> Result<BranchAbundance> {
    if proportions.taxa() != tree.tip_labels.as_slice() {
        return Err(LufError::TaxaMisaligned);
    }

    let n_branches = tree.n_branches();
    let n_samples = proportions.n_samples();
    let mut values = vec![0.0; n_branches * n_samples];

    if n_branches > 0 {
        values
            .par_chunks_mut(n_branches)
            .enumerate()
            .for_each(|(sample, column)| accumulate_sample(tree, proportions.row(sample), column));
    }

    Ok(BranchAbundance {
        n_branches,
        n_samples,
        values,
    })
}

/// Subtree sums for a single sample, written into `column` (one slot per edge).
fn accumulate_sample(tree: &TreeSnapshot, tips: &[f64], column: &mut [f64]) {
    for (tip, &p) in tips.iter().enumerate() {
        if let Some(edge) = tree.incoming[tip] {
            column[edge] = p;
        }
    }
    for &edge in &tree.postorder {
        if let Some(above) = tree.edge_above[edge] {
            column[above] += column[edge];
        }
    }
}
