//! Traversal-table encoding: a fixed number of gather steps over per-node tables.
//!
//! Every node gets a row in five parallel tables. Leaves point at themselves,
//! so after `depth` steps every row rests on its leaf no matter how short its
//! path was.

use ndarray::{Array1, Array2, ArrayView2, Zip};

use crate::repr::{Node, SplitRule, TreeIr};

/// Gather-table encoded tree.
#[derive(Debug, Clone)]
pub struct TraversalProgram {
    features: Box<[u32]>,
    thresholds: Box<[f32]>,
    left: Box<[u32]>,
    right: Box<[u32]>,
    /// Row in `values` for leaf nodes, 0 for splits.
    leaf_rows: Box<[u32]>,
    /// Leaf values, `[n_leaves, output_width]`.
    values: Array2<f32>,
    depth: usize,
    split_rule: SplitRule,
}

impl TraversalProgram {
    /// Encode a tree.
    pub fn compile(tree: &TreeIr) -> Self {
        let n_nodes = tree.n_nodes();
        let mut features = vec![0u32; n_nodes];
        let mut thresholds = vec![0.0f32; n_nodes];
        let mut left = vec![0u32; n_nodes];
        let mut right = vec![0u32; n_nodes];
        let mut leaf_rows = vec![0u32; n_nodes];
        let mut values = Array2::<f32>::zeros((tree.n_leaves(), tree.output_width()));

        let mut n_leaf = 0usize;
        for (id, node) in tree.nodes().iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left: l,
                    right: r,
                } => {
                    features[id] = *feature;
                    thresholds[id] = *threshold;
                    left[id] = *l;
                    right[id] = *r;
                }
                Node::Leaf { value } => {
                    // Self-loop: further steps stay put
                    left[id] = id as u32;
                    right[id] = id as u32;
                    leaf_rows[id] = n_leaf as u32;
                    values
                        .row_mut(n_leaf)
                        .iter_mut()
                        .zip(value)
                        .for_each(|(dst, &v)| *dst = v);
                    n_leaf += 1;
                }
            }
        }

        Self {
            features: features.into_boxed_slice(),
            thresholds: thresholds.into_boxed_slice(),
            left: left.into_boxed_slice(),
            right: right.into_boxed_slice(),
            leaf_rows: leaf_rows.into_boxed_slice(),
            values,
            depth: tree.depth(),
            split_rule: tree.split_rule(),
        }
    }

    /// Length of each output row.
    #[inline]
    pub fn output_width(&self) -> usize {
        self.values.ncols()
    }

    /// Number of gather steps per evaluation.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Node reached by each row after `depth` steps.
    pub fn leaf_nodes(&self, x: ArrayView2<'_, f32>) -> Array1<u32> {
        let mut idx = Array1::<u32>::zeros(x.nrows());
        let rule = self.split_rule;

        for _ in 0..self.depth {
            Zip::from(&mut idx).and(x.rows()).for_each(|i, row| {
                let n = *i as usize;
                if self.left[n] == self.right[n] {
                    return;
                }
                let fvalue = row[self.features[n] as usize];
                *i = if rule.goes_right(fvalue, self.thresholds[n]) {
                    self.right[n]
                } else {
                    self.left[n]
                };
            });
        }

        idx
    }

    /// Evaluate on a row block `[batch, n_features]`, returning `[batch, output_width]`.
    pub fn evaluate(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        let idx = self.leaf_nodes(x);
        let mut out = Array2::<f32>::zeros((x.nrows(), self.output_width()));

        Zip::from(out.rows_mut()).and(&idx).for_each(|mut dst, &i| {
            let leaf_row = self.leaf_rows[i as usize] as usize;
            dst.assign(&self.values.row(leaf_row));
        });

        out
    }
}
