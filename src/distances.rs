//! Longitudinal UniFrac distances between subjects.
//!
//! Every subject is observed twice. The distance between two subjects compares
//! *how* their communities changed between the two time points, branch by
//! branch, weighted by branch length:
//!
//! 1. **Change profiles** (per subject, per branch), from the cumulative
//!    abundances `c1` (time 1) and `c2` (time 2):
//!    - `avg = (c1 + c2) / 2`
//!    - `diff_gen = (c2 - c1) / (c2 + c1)`, and 0 when both are 0
//!    - `diff_uw = [c2 > 0] - [c1 > 0]`, one of -1 (lost), 0, +1 (gained)
//!
//! 2. **Generalized distance** at exponent alpha, over the branches where at
//!    least one of the two subjects has a non-zero `diff_gen`:
//!    ```text
//!    D_alpha = Σ w·|d_i - d_j|/2 / Σ w,   w = length · ((avg_i + avg_j)/2)^alpha
//!    ```
//!
//! 3. **Unweighted distance**, over the branches where at least one subject has
//!    a non-zero `diff_uw`:
//!    ```text
//!    D_UW = Σ length·|u_i - u_j|/2 / Σ length
//!    ```
//!
//! Branches where neither subject changed are left out of both sums. An empty
//! branch set, or a zero total weight, gives a distance of 0.

use crate::accumulate::BranchAbundance;
use crate::design::SubjectPairs;
use crate::error::{LufError, Result};
use rayon::prelude::*;
use std::fmt;

/// Which distance a matrix holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    /// Presence/absence changes only.
    Unweighted,
    /// Abundance-weighted changes with the given exponent.
    Generalized(f64),
}

impl Metric {
    /// Metric axis for a run: one generalized metric per alpha, in request
    /// order, followed by the unweighted metric.
    pub fn for_alphas(alphas: &[f64]) -> Vec<Metric> {
        alphas
            .iter()
            .map(|&a| Metric::Generalized(a))
            .chain(std::iter::once(Metric::Unweighted))
            .collect()
    }

    /// Label used in output files: `d_UW` or `d_<alpha>`.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Unweighted => write!(f, "d_UW"),
            Metric::Generalized(alpha) => write!(f, "d_{alpha}"),
        }
    }
}

/// Per-subject, per-branch change signals. Subject-major storage.
#[derive(Debug, Clone)]
pub struct ChangeProfiles {
    n_branches: usize,
    n_subjects: usize,
    avg: Vec<f64>,
    diff_gen: Vec<f64>,
    diff_uw: Vec<i8>,
}

impl ChangeProfiles {
    /// Derive change signals from the cumulative abundances of each subject's
    /// two samples. `first[s]` and `second[s]` are sample columns of `cum`.
    pub fn new(cum: &BranchAbundance, first: &[usize], second: &[usize]) -> Result<Self> {
        if first.len() != second.len() {
            return Err(LufError::DimensionMismatch {
                expected: first.len(),
                actual: second.len(),
            });
        }
        if let Some(&bad) = first.iter().chain(second).find(|&&s| s >= cum.n_samples()) {
            return Err(LufError::InvalidParameter(format!(
                "sample column {bad} out of range ({} samples)",
                cum.n_samples()
            )));
        }

        let n_branches = cum.n_branches();
        let n_subjects = first.len();
        let mut avg = Vec::with_capacity(n_branches * n_subjects);
        let mut diff_gen = Vec::with_capacity(n_branches * n_subjects);
        let mut diff_uw = Vec::with_capacity(n_branches * n_subjects);

        for (&s1, &s2) in first.iter().zip(second) {
            for (&c1, &c2) in cum.sample(s1).iter().zip(cum.sample(s2)) {
                let total = c1 + c2;
                avg.push(total / 2.0);
                diff_gen.push(if total == 0.0 { 0.0 } else { (c2 - c1) / total });
                diff_uw.push(i8::from(c2 > 0.0) - i8::from(c1 > 0.0));
            }
        }

        Ok(Self {
            n_branches,
            n_subjects,
            avg,
            diff_gen,
            diff_uw,
        })
    }

    /// Profiles for every subject of `pairs`, whose row indices are sample columns of `cum`.
    pub fn from_pairs(cum: &BranchAbundance, pairs: &SubjectPairs) -> Result<Self> {
        Self::new(cum, &pairs.first, &pairs.second)
    }

    #[inline]
    pub fn n_branches(&self) -> usize {
        self.n_branches
    }

    #[inline]
    pub fn n_subjects(&self) -> usize {
        self.n_subjects
    }

    fn span(&self, subject: usize) -> std::ops::Range<usize> {
        subject * self.n_branches..(subject + 1) * self.n_branches
    }

    pub fn avg(&self, subject: usize) -> &[f64] {
        &self.avg[self.span(subject)]
    }

    pub fn diff_gen(&self, subject: usize) -> &[f64] {
        &self.diff_gen[self.span(subject)]
    }

    pub fn diff_uw(&self, subject: usize) -> &[i8] {
        &self.diff_uw[self.span(subject)]
    }
}

/// Subject × subject distances, one dense matrix per metric.
#[derive(Debug, Clone)]
pub struct DistanceArray {
    subjects: Vec<String>,
    metrics: Vec<Metric>,
    matrices: Vec<Vec<f64>>,
}

impl DistanceArray {
    #[inline]
    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    #[inline]
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    #[inline]
    pub fn n_subjects(&self) -> usize {
        self.subjects.len()
    }

    fn metric_index(&self, metric: &Metric) -> Option<usize> {
        self.metrics.iter().position(|m| m == metric)
    }

    /// Row-major `n × n` matrix for `metric`.
    pub fn matrix(&self, metric: &Metric) -> Option<&[f64]> {
        self.metric_index(metric).map(|k| self.matrices[k].as_slice())
    }

    /// Distance between subjects `i` and `j` under `metric`.
    pub fn get(&self, i: usize, j: usize, metric: &Metric) -> Option<f64> {
        let n = self.n_subjects();
        if i >= n || j >= n {
            return None;
        }
        self.matrix(metric).map(|m| m[i * n + j])
    }

    /// Distance between two subjects looked up by identifier.
    pub fn get_by_id(&self, a: &str, b: &str, metric: &Metric) -> Option<f64> {
        let i = self.subjects.iter().position(|s| s == a)?;
        let j = self.subjects.iter().position(|s| s == b)?;
        self.get(i, j, metric)
    }

    /// The matrix for `metric` as nested rows, ready for writing.
    pub fn rows(&self, metric: &Metric) -> Option<Vec<Vec<f64>>> {
        let n = self.n_subjects();
        self.matrix(metric)
            .map(|m| m.chunks(n.max(1)).map(<[f64]>::to_vec).collect())
    }

    /// The full array indexed `[i][j][metric]`, metrics in [`DistanceArray::metrics`] order.
    pub fn to_nested(&self) -> Vec<Vec<Vec<f64>>> {
        let n = self.n_subjects();
        (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| self.matrices.iter().map(|m| m[i * n + j]).collect())
                    .collect()
            })
            .collect()
    }
}

/// Compute every pairwise distance for the unweighted metric and one
/// generalized metric per alpha.
///
/// Pairs are independent and are spread over the rayon pool; each pair is
/// computed once and written to both `(i, j)` and `(j, i)`. The diagonal is 0.
pub fn pairwise_change_distances(
    profiles: &ChangeProfiles,
    lengths: &[f64],
    alphas: &[f64],
    subjects: Vec<String>,
) -> Result<DistanceArray> {
    if lengths.len() != profiles.n_branches() {
        return Err(LufError::DimensionMismatch {
            expected: profiles.n_branches(),
            actual: lengths.len(),
        });
    }
    if subjects.len() != profiles.n_subjects() {
        return Err(LufError::DimensionMismatch {
            expected: profiles.n_subjects(),
            actual: subjects.len(),
        });
    }

    let n = profiles.n_subjects();
    let metrics = Metric::for_alphas(alphas);
    let mut matrices = vec![vec![0.0f64; n * n]; metrics.len()];

    let pairs: Vec<(usize, usize, Vec<f64>)> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| (i + 1..n).map(move |j| (i, j)))
        .map(|(i, j)| (i, j, pair_distances(profiles, lengths, alphas, i, j)))
        .collect();

    for (i, j, dists) in pairs {
        for (matrix, d) in matrices.iter_mut().zip(dists) {
            matrix[i * n + j] = d;
            matrix[j * n + i] = d;
        }
    }

    Ok(DistanceArray {
        subjects,
        metrics,
        matrices,
    })
}

/// All metrics for one subject pair, in [`Metric::for_alphas`] order.
///
/// A single pass over the branches feeds every numerator/denominator.
fn pair_distances(
    profiles: &ChangeProfiles,
    lengths: &[f64],
    alphas: &[f64],
    i: usize,
    j: usize,
) -> Vec<f64> {
    let (avg_i, avg_j) = (profiles.avg(i), profiles.avg(j));
    let (gen_i, gen_j) = (profiles.diff_gen(i), profiles.diff_gen(j));
    let (uw_i, uw_j) = (profiles.diff_uw(i), profiles.diff_uw(j));

    let mut gen_num = vec![0.0; alphas.len()];
    let mut gen_den = vec![0.0; alphas.len()];
    let mut uw_num = 0.0;
    let mut uw_den = 0.0;

    for (b, &length) in lengths.iter().enumerate() {
        if gen_i[b] != 0.0 || gen_j[b] != 0.0 {
            let delta = (gen_i[b] - gen_j[b]).abs() / 2.0;
            let pooled = (avg_i[b] + avg_j[b]) / 2.0;
            for (k, &alpha) in alphas.iter().enumerate() {
                let w = length * pooled.powf(alpha);
                gen_num[k] += w * delta;
                gen_den[k] += w;
            }
        }
        if uw_i[b] != 0 || uw_j[b] != 0 {
            let delta = f64::from((uw_i[b] - uw_j[b]).abs()) / 2.0;
            uw_num += length * delta;
            uw_den += length;
        }
    }

    gen_num
        .into_iter()
        .zip(gen_den)
        .chain(std::iter::once((uw_num, uw_den)))
        .map(|(num, den)| if den > 0.0 { num / den } else { 0.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abundance::ProportionMatrix;
    use crate::accumulate::accumulate;
    use crate::snapshot::TreeSnapshot;
    use itertools::Itertools;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    /// Star tree: A, B, C hang directly off the root, every branch length 1.
    fn star() -> TreeSnapshot {
        TreeSnapshot::from_edges(
            strings(&["A", "B", "C"]),
            &[(3, 0), (3, 1), (3, 2)],
            &[1.0, 1.0, 1.0],
        )
        .unwrap()
    }

    /// Runs both stages. `samples` holds (time 1, time 2) proportions per subject.
    fn run(tree: &TreeSnapshot, samples: &[(Vec<f64>, Vec<f64>)], alphas: &[f64]) -> DistanceArray {
        let n_taxa = tree.n_tips();
        let mut ids = Vec::new();
        let mut values = Vec::new();
        for (s, (t1, t2)) in samples.iter().enumerate() {
            assert_eq!(t1.len(), n_taxa);
            ids.push(format!("s{s}_t1"));
            values.extend(t1);
            ids.push(format!("s{s}_t2"));
            values.extend(t2);
        }
        let props = ProportionMatrix::new(ids, tree.tip_labels.clone(), values).unwrap();
        let cum = accumulate(tree, &props).unwrap();
        let first: Vec<usize> = (0..samples.len()).map(|s| 2 * s).collect();
        let second: Vec<usize> = (0..samples.len()).map(|s| 2 * s + 1).collect();
        let profiles = ChangeProfiles::new(&cum, &first, &second).unwrap();
        let subjects = (1..=samples.len()).map(|s| s.to_string()).collect();
        pairwise_change_distances(&profiles, &tree.lengths(), alphas, subjects).unwrap()
    }

    #[test]
    fn test_metric_axis_and_labels() {
        let metrics = Metric::for_alphas(&[0.0, 0.5, 1.0]);
        let labels: Vec<String> = metrics.iter().map(Metric::label).collect();
        assert_eq!(labels, strings(&["d_0", "d_0.5", "d_1", "d_UW"]));
    }

    #[test]
    fn test_change_signals() {
        let tree = star();
        let props = ProportionMatrix::new(
            strings(&["t1", "t2"]),
            tree.tip_labels.clone(),
            vec![0.6, 0.4, 0.0, 0.2, 0.0, 0.8],
        )
        .unwrap();
        let cum = accumulate(&tree, &props).unwrap();
        let profiles = ChangeProfiles::new(&cum, &[0], &[1]).unwrap();

        let a = tree.incoming[0].unwrap();
        let b = tree.incoming[1].unwrap();
        let c = tree.incoming[2].unwrap();

        assert!((profiles.avg(0)[a] - 0.4).abs() < 1e-12);
        assert!((profiles.diff_gen(0)[a] - (0.2 - 0.6) / 0.8).abs() < 1e-12);
        assert_eq!(profiles.diff_uw(0)[a], 0);
        assert_eq!(profiles.diff_gen(0)[b], -1.0);
        assert_eq!(profiles.diff_uw(0)[b], -1);
        assert_eq!(profiles.diff_gen(0)[c], 1.0);
        assert_eq!(profiles.diff_uw(0)[c], 1);
    }

    #[test]
    fn test_absent_at_both_times_is_no_change() {
        let tree = star();
        let props = ProportionMatrix::new(
            strings(&["t1", "t2"]),
            tree.tip_labels.clone(),
            vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
        )
        .unwrap();
        let cum = accumulate(&tree, &props).unwrap();
        let profiles = ChangeProfiles::new(&cum, &[0], &[1]).unwrap();
        let c = tree.incoming[2].unwrap();
        assert_eq!(profiles.diff_gen(0)[c], 0.0);
        assert_eq!(profiles.avg(0)[c], 0.0);
        assert!(!profiles.diff_gen(0)[c].is_nan());
    }

    #[test]
    fn test_star_tree_loss_and_gain_against_static_subject() {
        // Subject 1 loses A and gains B; subject 2 stays on A.
        let dists = run(
            &star(),
            &[
                (vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]),
                (vec![1.0, 0.0, 0.0], vec![1.0, 0.0, 0.0]),
            ],
            &[0.0, 0.5, 1.0],
        );
        // Active branches A and B, each with |±1 - 0| / 2 = 0.5 disagreement.
        assert_eq!(dists.get(0, 1, &Metric::Unweighted), Some(0.5));
        assert_eq!(dists.get(1, 0, &Metric::Unweighted), Some(0.5));
        assert_eq!(dists.get(0, 0, &Metric::Unweighted), Some(0.0));
        assert_eq!(dists.get(1, 1, &Metric::Unweighted), Some(0.0));
        for alpha in [0.0, 0.5, 1.0] {
            let d = dists.get(0, 1, &Metric::Generalized(alpha)).unwrap();
            assert!((d - 0.5).abs() < 1e-12, "alpha {alpha}: {d}");
        }
    }

    #[test]
    fn test_star_tree_identical_shift() {
        let shift = (vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]);
        let dists = run(&star(), &[shift.clone(), shift], &[0.0, 0.5, 1.0]);
        for metric in dists.metrics() {
            assert_eq!(dists.get(0, 1, metric), Some(0.0));
        }
    }

    #[test]
    fn test_opposite_shifts_are_maximally_distant() {
        let dists = run(
            &star(),
            &[
                (vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]),
                (vec![0.0, 1.0, 0.0], vec![1.0, 0.0, 0.0]),
            ],
            &[1.0],
        );
        assert_eq!(dists.get(0, 1, &Metric::Unweighted), Some(1.0));
        assert_eq!(dists.get(0, 1, &Metric::Generalized(1.0)), Some(1.0));
    }

    /// Hand-computed alpha = 0 example on a nested tree.
    ///
    /// ```text
    ///         root
    ///        /    \
    ///     e2:2    C (e3:1)
    ///      /  \
    ///  A(e0:1) B(e1:1)
    /// ```
    ///
    /// Subject 1: (A,B,C) = (0.5, 0.5, 0) -> (0.25, 0.25, 0.5)
    /// Subject 2: (A,B,C) = (0.5, 0.5, 0) -> (0.5, 0.5, 0)  (static)
    ///
    /// diff_gen for subject 1:
    /// - A, B: (0.25 - 0.5) / 0.75 = -1/3
    /// - (A,B): (0.5 - 1.0) / 1.5 = -1/3
    /// - C: (0.5 - 0) / 0.5 = 1
    ///
    /// alpha = 0 weights are branch lengths over the 4 active branches:
    /// D_0 = (1·1/6 + 1·1/6 + 2·1/6 + 1·1/2) / (1 + 1 + 2 + 1) = (7/6) / 5 = 7/30
    ///
    /// Only C changes presence: D_UW = (1 · 1/2) / 1 = 1/2
    #[test]
    fn test_alpha_zero_hand_computed() {
        let tree = TreeSnapshot::from_edges(
            strings(&["A", "B", "C"]),
            &[(3, 0), (3, 1), (4, 3), (4, 2)],
            &[1.0, 1.0, 2.0, 1.0],
        )
        .unwrap();
        let dists = run(
            &tree,
            &[
                (vec![0.5, 0.5, 0.0], vec![0.25, 0.25, 0.5]),
                (vec![0.5, 0.5, 0.0], vec![0.5, 0.5, 0.0]),
            ],
            &[0.0, 1.0],
        );
        let d0 = dists.get(0, 1, &Metric::Generalized(0.0)).unwrap();
        assert!((d0 - 7.0 / 30.0).abs() < 1e-12, "{d0}");
        assert_eq!(dists.get(0, 1, &Metric::Unweighted), Some(0.5));

        // alpha = 1 weights by the pooled mean abundance:
        // A, B: pooled (0.375 + 0.5) / 2 = 0.4375, delta 1/6, length 1
        // (A,B): pooled (0.75 + 1.0) / 2 = 0.875, delta 1/6, length 2
        // C: pooled (0.25 + 0) / 2 = 0.125, delta 1/2, length 1
        let num = 2.0 * 0.4375 / 6.0 + 2.0 * 0.875 / 6.0 + 0.125 / 2.0;
        let den = 2.0 * 0.4375 + 2.0 * 0.875 + 0.125;
        let d1 = dists.get(0, 1, &Metric::Generalized(1.0)).unwrap();
        assert!((d1 - num / den).abs() < 1e-12, "{d1}");
    }

    #[test]
    fn test_zero_length_active_branches_give_zero() {
        // All branches of length 0: weights vanish, distance falls back to 0.
        let tree = TreeSnapshot::from_edges(
            strings(&["A", "B"]),
            &[(2, 0), (2, 1)],
            &[0.0, 0.0],
        )
        .unwrap();
        let dists = run(
            &tree,
            &[
                (vec![1.0, 0.0], vec![0.0, 1.0]),
                (vec![0.5, 0.5], vec![0.5, 0.5]),
            ],
            &[0.5],
        );
        for metric in dists.metrics() {
            assert_eq!(dists.get(0, 1, metric), Some(0.0));
        }
    }

    #[test]
    fn test_symmetry_range_and_diagonal() {
        let tree = TreeSnapshot::from_edges(
            strings(&["A", "B", "C", "D"]),
            &[(4, 0), (4, 1), (5, 2), (5, 3), (6, 4), (6, 5)],
            &[0.3, 1.2, 0.7, 0.1, 0.9, 0.4],
        )
        .unwrap();
        let samples = vec![
            (vec![0.1, 0.2, 0.3, 0.4], vec![0.4, 0.3, 0.2, 0.1]),
            (vec![0.0, 0.5, 0.5, 0.0], vec![0.25, 0.25, 0.25, 0.25]),
            (vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 0.0, 0.0, 1.0]),
            (vec![0.7, 0.0, 0.3, 0.0], vec![0.7, 0.0, 0.3, 0.0]),
            (vec![0.2, 0.2, 0.2, 0.4], vec![0.0, 0.6, 0.0, 0.4]),
        ];
        let dists = run(&tree, &samples, &[0.0, 0.25, 0.5, 1.0, 2.0]);
        let n = dists.n_subjects();

        for metric in dists.metrics() {
            for i in 0..n {
                assert_eq!(dists.get(i, i, metric), Some(0.0));
            }
            for pair in (0..n).combinations(2) {
                let (i, j) = (pair[0], pair[1]);
                let dij = dists.get(i, j, metric).unwrap();
                let dji = dists.get(j, i, metric).unwrap();
                assert_eq!(dij, dji);
                assert!((0.0..=1.0).contains(&dij), "{metric} [{i},{j}] = {dij}");
            }
        }

        let nested = dists.to_nested();
        assert_eq!(nested.len(), n);
        assert_eq!(nested[0][1].len(), dists.metrics().len());
    }

    #[test]
    fn test_static_subjects_are_identical() {
        let tree = star();
        let dists = run(
            &tree,
            &[
                (vec![0.2, 0.3, 0.5], vec![0.2, 0.3, 0.5]),
                (vec![0.9, 0.1, 0.0], vec![0.9, 0.1, 0.0]),
            ],
            &[0.0, 0.5, 1.0],
        );
        for metric in dists.metrics() {
            assert_eq!(dists.get(0, 1, metric), Some(0.0));
        }
    }

    #[test]
    fn test_taxon_relabelling_does_not_change_distances() {
        let samples = vec![
            (vec![0.1, 0.2, 0.3, 0.4], vec![0.4, 0.3, 0.2, 0.1]),
            (vec![0.0, 0.5, 0.5, 0.0], vec![0.25, 0.25, 0.25, 0.25]),
            (vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 0.0, 0.0, 1.0]),
        ];
        let edges = [(4, 0), (4, 1), (5, 2), (5, 3), (6, 4), (6, 5)];
        let lengths = [0.3, 1.2, 0.7, 0.1, 0.9, 0.4];

        let original =
            TreeSnapshot::from_edges(strings(&["A", "B", "C", "D"]), &edges, &lengths).unwrap();
        let renamed =
            TreeSnapshot::from_edges(strings(&["w", "z", "x", "y"]), &edges, &lengths).unwrap();

        let a = run(&original, &samples, &[0.0, 0.5, 1.0]);
        let b = run(&renamed, &samples, &[0.0, 0.5, 1.0]);
        for metric in a.metrics() {
            assert_eq!(a.matrix(metric), b.matrix(metric));
        }
    }

    #[test]
    fn test_lookup_by_metric_and_id() {
        let dists = run(
            &star(),
            &[
                (vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]),
                (vec![1.0, 0.0, 0.0], vec![1.0, 0.0, 0.0]),
            ],
            &[0.5],
        );
        assert_eq!(dists.get_by_id("1", "2", &Metric::Unweighted), Some(0.5));
        assert_eq!(dists.get_by_id("1", "9", &Metric::Unweighted), None);
        assert!(dists.matrix(&Metric::Generalized(2.0)).is_none());
        let rows = dists.rows(&Metric::Unweighted).unwrap();
        assert_eq!(rows, vec![vec![0.0, 0.5], vec![0.5, 0.0]]);
    }

    #[test]
    fn test_mismatched_lengths_are_rejected() {
        let tree = star();
        let props = ProportionMatrix::new(
            strings(&["t1", "t2"]),
            tree.tip_labels.clone(),
            vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        )
        .unwrap();
        let cum = accumulate(&tree, &props).unwrap();
        let profiles = ChangeProfiles::new(&cum, &[0], &[1]).unwrap();
        let result = pairwise_change_distances(&profiles, &[1.0], &[0.5], strings(&["x"]));
        assert!(matches!(result, Err(LufError::DimensionMismatch { .. })));
    }
}
