//! End-to-end computation.
//!
//! Upstream checks run first and abort the whole computation on failure:
//! rootedness, taxon reconciliation, normalisation and subject pairing. Only
//! then do the two core stages (branch accumulation, pairwise change
//! distances) run, so the core never sees invalid input.

use crate::abundance::{AbundanceTable, ProportionMatrix};
use crate::accumulate::accumulate;
use crate::config::LufConfig;
use crate::design::{SampleSheet, SubjectPairs};
use crate::distances::{ChangeProfiles, DistanceArray, pairwise_change_distances};
use crate::error::{LufError, Result};
use crate::snapshot::TreeSnapshot;
use std::collections::HashSet;
use tracing::{debug, info};

/// How many unmatched taxa are quoted in the error message.
const UNMATCHED_EXAMPLES: usize = 5;

/// Validate and reconcile the inputs, then compute the distance array.
///
/// When `config.threads` is set the work runs inside a dedicated rayon pool.
pub fn compute(
    tree: &TreeSnapshot,
    table: &AbundanceTable,
    sheet: &SampleSheet,
    config: &LufConfig,
) -> Result<DistanceArray> {
    config.validate()?;
    match config.threads {
        Some(threads) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| LufError::InvalidParameter(format!("cannot build thread pool: {e}")))?;
            pool.install(|| reconcile_and_compute(tree, table, sheet, &config.alphas))
        }
        None => reconcile_and_compute(tree, table, sheet, &config.alphas),
    }
}

fn reconcile_and_compute(
    tree: &TreeSnapshot,
    table: &AbundanceTable,
    sheet: &SampleSheet,
    alphas: &[f64],
) -> Result<DistanceArray> {
    tree.ensure_rooted()?;

    let (pruned, proportions) = reconcile(tree, table)?;
    let pairs = SubjectPairs::resolve(sheet, proportions.sample_ids())?;

    info!(
        subjects = pairs.len(),
        taxa = pruned.n_tips(),
        branches = pruned.n_branches(),
        metrics = alphas.len() + 1,
        "computing longitudinal UniFrac distances"
    );

    compute_aligned(&pruned, &proportions, &pairs, alphas)
}

/// Match table taxa against tree tips, prune tips missing from the table and
/// return the pruned tree with proportions in its tip order.
///
/// # Errors
/// - a table taxon is not a tip of the tree
/// - a taxon appears twice in the table
/// - a sample has no abundance at all
pub fn reconcile(
    tree: &TreeSnapshot,
    table: &AbundanceTable,
) -> Result<(TreeSnapshot, ProportionMatrix)> {
    let tips: HashSet<&str> = tree.tip_labels.iter().map(String::as_str).collect();
    let unmatched: Vec<&str> = table
        .taxa()
        .iter()
        .map(String::as_str)
        .filter(|t| !tips.contains(t))
        .collect();
    if !unmatched.is_empty() {
        return Err(LufError::UnmatchedTaxa {
            count: unmatched.len(),
            examples: unmatched
                .iter()
                .take(UNMATCHED_EXAMPLES)
                .map(|t| format!("'{t}'"))
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    let keep: HashSet<&str> = table.taxa().iter().map(String::as_str).collect();
    if keep.len() != table.n_taxa() {
        return Err(LufError::InvalidParameter(
            "the abundance table lists a taxon more than once".to_string(),
        ));
    }

    let pruned = if keep.len() < tree.n_tips() {
        debug!(
            dropped = tree.n_tips() - keep.len(),
            "tree tips absent from the table are pruned"
        );
        tree.prune_to(&keep)?
    } else {
        tree.clone()
    };

    let proportions = table.normalize()?.align_to(&pruned.tip_labels)?;
    Ok((pruned, proportions))
}

/// The two core stages on inputs that are already validated and aligned.
pub fn compute_aligned(
    tree: &TreeSnapshot,
    proportions: &ProportionMatrix,
    pairs: &SubjectPairs,
    alphas: &[f64],
) -> Result<DistanceArray> {
    let cum = accumulate(tree, proportions)?;
    let profiles = ChangeProfiles::from_pairs(&cum, pairs)?;
    pairwise_change_distances(&profiles, &tree.lengths(), alphas, pairs.subjects.clone())
}
