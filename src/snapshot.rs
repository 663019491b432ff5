//! Index-based snapshots of rooted phylogenetic trees.
//!
//! # Overview
//! A `TreeSnapshot` flattens a tree into an arena: nodes are plain integer ids,
//! every non-root node has exactly one incoming edge, and edges carry their
//! branch length. The snapshot is immutable once built, so it can be shared by
//! the parallel accumulation and distance stages without locking.
//!
//! # Node numbering
//! Tips always occupy ids `0..n_tips`, in the order of `tip_labels`. Internal
//! nodes (the root included) follow. A branch is identified by the edge index
//! of the edge entering its child node.
//!
//! ```text
//!          root (4)
//!         /       \
//!      e2:0.5    e3:3.0
//!       (3)        C (2)
//!      /   \
//!   e0:1  e1:2
//!   A(0)  B(1)
//! ```
//!
//! `postorder` lists edges so that every edge comes after all edges below it
//! (here e.g. `[e3, e1, e0, e2]`), which is all the subtree-sum needs.

use crate::error::{LufError, Result};
use phylotree::tree::Tree as PhyloTree;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A single branch: the edge from `parent` down to `child`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub parent: usize,
    pub child: usize,
    pub length: f64,
}

/// An immutable arena representation of a rooted tree.
///
/// # Fields
/// - `tip_labels`: taxon names, indexed by tip node id
/// - `edges`: every branch of the tree
/// - `incoming`: the edge entering each node (`None` for the root)
/// - `edge_above`: for each edge, the edge entering its parent (`None` below the root)
/// - `children`: outgoing edges of each node
/// - `postorder`: edge indices, descendants before ancestors
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    pub tip_labels: Vec<String>,
    pub edges: Vec<Edge>,
    pub incoming: Vec<Option<usize>>,
    pub edge_above: Vec<Option<usize>>,
    pub children: Vec<Vec<usize>>,
    pub postorder: Vec<usize>,
    pub root: usize,
}

impl TreeSnapshot {
    /// Build a snapshot from an edge list.
    ///
    /// Tip `i` is node `i` and is labelled `tip_labels[i]`; internal nodes use
    /// ids `>= tip_labels.len()`. `lengths` is parallel to `edges`, each edge
    /// given as `(parent, child)`.
    ///
    /// # Errors
    /// Rejects edge lists that do not describe a single tree: several or no
    /// roots, nodes with two parents, tips with children, childless internal
    /// nodes, unreachable nodes, and negative or non-finite lengths.
    pub fn from_edges(
        tip_labels: Vec<String>,
        edges: &[(usize, usize)],
        lengths: &[f64],
    ) -> Result<Self> {
        let n_tips = tip_labels.len();
        if n_tips == 0 {
            return Err(LufError::EmptyData("tree has no tips".to_string()));
        }
        if edges.len() != lengths.len() {
            return Err(LufError::DimensionMismatch {
                expected: edges.len(),
                actual: lengths.len(),
            });
        }

        let mut seen = HashSet::with_capacity(n_tips);
        for label in &tip_labels {
            if !seen.insert(label.as_str()) {
                return Err(LufError::InvalidTree(format!("duplicate tip label '{label}'")));
            }
        }

        let n_nodes = edges
            .iter()
            .flat_map(|&(p, c)| [p, c])
            .max()
            .map_or(n_tips, |m| (m + 1).max(n_tips));

        let mut incoming = vec![None; n_nodes];
        let mut children = vec![Vec::new(); n_nodes];
        let mut arena = Vec::with_capacity(edges.len());

        for (idx, (&(parent, child), &length)) in edges.iter().zip(lengths).enumerate() {
            if !length.is_finite() || length < 0.0 {
                return Err(LufError::InvalidTree(format!(
                    "edge {idx} has invalid length {length}"
                )));
            }
            if parent == child {
                return Err(LufError::InvalidTree(format!("node {parent} is its own parent")));
            }
            if parent < n_tips {
                return Err(LufError::InvalidTree(format!(
                    "tip '{}' has children",
                    tip_labels[parent]
                )));
            }
            if incoming[child].replace(idx).is_some() {
                return Err(LufError::InvalidTree(format!(
                    "node {child} has more than one parent"
                )));
            }
            children[parent].push(idx);
            arena.push(Edge { parent, child, length });
        }

        let roots: Vec<usize> = (0..n_nodes).filter(|&n| incoming[n].is_none()).collect();
        let root = match roots.as_slice() {
            [r] => *r,
            [] => return Err(LufError::InvalidTree("every node has a parent".to_string())),
            _ => {
                return Err(LufError::InvalidTree(format!(
                    "{} nodes have no parent, expected a single root",
                    roots.len()
                )));
            }
        };
        if root < n_tips {
            return Err(LufError::InvalidTree(format!(
                "tip '{}' cannot be the root",
                tip_labels[root]
            )));
        }
        if let Some(node) = (n_tips..n_nodes).find(|&n| children[n].is_empty()) {
            return Err(LufError::InvalidTree(format!(
                "internal node {node} has no children"
            )));
        }

        // Iterative DFS: an edge is emitted once everything below it is.
        let mut postorder = Vec::with_capacity(arena.len());
        let mut stack: Vec<(usize, bool)> = children[root].iter().map(|&e| (e, false)).collect();
        while let Some((e, expanded)) = stack.pop() {
            if expanded {
                postorder.push(e);
                continue;
            }
            stack.push((e, true));
            stack.extend(children[arena[e].child].iter().map(|&c| (c, false)));
        }
        if postorder.len() != arena.len() {
            return Err(LufError::InvalidTree(format!(
                "{} edges are not connected to the root",
                arena.len() - postorder.len()
            )));
        }

        let edge_above = arena.iter().map(|e| incoming[e.parent]).collect();

        Ok(TreeSnapshot {
            tip_labels,
            edges: arena,
            incoming,
            edge_above,
            children,
            postorder,
            root,
        })
    }

    /// Extract a snapshot from a parsed phylogenetic tree.
    ///
    /// Tips keep the order reported by `get_leaves`; internal nodes are
    /// numbered in DFS order from the root. Missing branch lengths are read
    /// as 0.0.
    ///
    /// # Errors
    /// Fails on unnamed tips and on the underlying `TreeError`s. Rootedness is
    /// not checked here, see [`TreeSnapshot::ensure_rooted`].
    pub fn from_tree(tree: &PhyloTree) -> Result<Self> {
        let root_id = tree.get_root()?;

        let mut index: HashMap<usize, usize> = HashMap::new();
        let mut tip_labels = Vec::new();
        for leaf_id in tree.get_leaves() {
            let name = tree
                .get(&leaf_id)?
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .ok_or_else(|| LufError::InvalidTree(format!("tip node {leaf_id} has no name")))?;
            index.insert(leaf_id, tip_labels.len());
            tip_labels.push(name);
        }

        let mut next_id = tip_labels.len();
        let mut edges = Vec::new();
        let mut lengths = Vec::new();
        let mut stack = vec![root_id];

        while let Some(node_id) = stack.pop() {
            let parent = *index.entry(node_id).or_insert_with(|| {
                next_id += 1;
                next_id - 1
            });
            let node = tree.get(&node_id)?;
            for &child_id in &node.children {
                let child = *index.entry(child_id).or_insert_with(|| {
                    next_id += 1;
                    next_id - 1
                });
                edges.push((parent, child));
                lengths.push(tree.get(&child_id)?.parent_edge.unwrap_or(0.0));
                stack.push(child_id);
            }
        }

        Self::from_edges(tip_labels, &edges, &lengths)
    }

    /// Number of children of the root.
    pub fn root_degree(&self) -> usize {
        self.children[self.root].len()
    }

    /// A tree counts as rooted only when its root has exactly two children.
    ///
    /// A root with a single child is rejected too, unlike the looser rule of
    /// some phylogenetics packages: its branch would carry every tip.
    pub fn is_rooted(&self) -> bool {
        self.root_degree() == 2
    }

    /// Fail with [`LufError::UnrootedTree`] unless the tree is rooted.
    pub fn ensure_rooted(&self) -> Result<()> {
        if self.is_rooted() {
            Ok(())
        } else {
            Err(LufError::UnrootedTree {
                children: self.root_degree(),
            })
        }
    }

    #[inline]
    pub fn n_tips(&self) -> usize {
        self.tip_labels.len()
    }

    #[inline]
    pub fn n_branches(&self) -> usize {
        self.edges.len()
    }

    /// Branch lengths, indexed by edge.
    pub fn lengths(&self) -> Vec<f64> {
        self.edges.iter().map(|e| e.length).collect()
    }

    /// Tips whose path to the root passes through `edge`.
    pub fn descendant_tips(&self, edge: usize) -> Vec<usize> {
        let mut tips = Vec::new();
        let mut stack = vec![self.edges[edge].child];
        while let Some(node) = stack.pop() {
            if node < self.n_tips() {
                tips.push(node);
            }
            stack.extend(self.children[node].iter().map(|&e| self.edges[e].child));
        }
        tips.sort_unstable();
        tips
    }

    /// Drop every tip not named in `keep`, together with the branches that
    /// no longer lead to any retained tip.
    ///
    /// Retained tips keep their relative order. Internal nodes left with a
    /// single child are kept as they are: a chain of branches carries the same
    /// descendant set along its whole length, so no distance changes.
    pub fn prune_to(&self, keep: &HashSet<&str>) -> Result<Self> {
        let n_tips = self.n_tips();
        let n_nodes = self.incoming.len();

        let mut retained = vec![false; n_nodes];
        for (tip, label) in self.tip_labels.iter().enumerate() {
            retained[tip] = keep.contains(label.as_str());
        }
        for &e in &self.postorder {
            let edge = self.edges[e];
            if retained[edge.child] {
                retained[edge.parent] = true;
            }
        }

        let mut new_id: Vec<Option<usize>> = vec![None; n_nodes];
        let mut tip_labels = Vec::new();
        for tip in (0..n_tips).filter(|&t| retained[t]) {
            new_id[tip] = Some(tip_labels.len());
            tip_labels.push(self.tip_labels[tip].clone());
        }
        if tip_labels.is_empty() {
            return Err(LufError::EmptyData("no tree tip is retained".to_string()));
        }

        let mut next = tip_labels.len();
        for node in (n_tips..n_nodes).filter(|&n| retained[n]) {
            new_id[node] = Some(next);
            next += 1;
        }

        let (edges, lengths): (Vec<(usize, usize)>, Vec<f64>) = self
            .edges
            .iter()
            .filter_map(|e| Some(((new_id[e.parent]?, new_id[e.child]?), e.length)))
            .unzip();

        debug!(
            pruned_tips = n_tips - tip_labels.len(),
            pruned_branches = self.n_branches() - edges.len(),
            "pruned tree to table taxa"
        );

        Self::from_edges(tip_labels, &edges, &lengths)
    }
}
