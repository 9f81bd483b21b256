//! Perfect-tree encoding: implicit array layout with index arithmetic.
//!
//! The tree is padded to a perfect binary tree of its depth. A shallow leaf is
//! replicated over its whole padded subtree, so the comparison taken at a
//! padding node does not matter.
//!
//! ```text
//! Level 0:           [0]              <- root (array idx 0)
//! Level 1:        [1]   [2]           <- array idx 1, 2
//! Level 2:      [3][4] [5][6]         <- array idx 3, 4, 5, 6
//! ...
//! ```
//!
//! Each step is `idx = 2*idx + 1 + cmp`; after `depth` steps `idx - (2^depth - 1)`
//! is the bottom-level slot holding the leaf value.

use ndarray::{Array1, Array2, ArrayView2, Zip};

use crate::repr::{Node, NodeId, SplitRule, TreeIr};

/// Deepest tree that can be padded (2^20 bottom slots).
pub const PERFECT_TREE_MAX_DEPTH: usize = 20;

/// Number of internal slots in a perfect tree of given depth.
#[inline]
const fn internal_slots(depth: usize) -> usize {
    (1 << depth) - 1
}

/// Padded perfect-tree encoded tree.
#[derive(Debug, Clone)]
pub struct PerfectTreeProgram {
    /// Split feature per internal slot, length `2^depth - 1`.
    features: Box<[u32]>,
    /// Split threshold per internal slot.
    thresholds: Box<[f32]>,
    /// Leaf value per bottom slot, `[2^depth, output_width]`.
    values: Array2<f32>,
    depth: usize,
    split_rule: SplitRule,
}

impl PerfectTreeProgram {
    /// Encode a tree.
    ///
    /// # Panics
    ///
    /// Panics if the tree is deeper than [`PERFECT_TREE_MAX_DEPTH`].
    pub fn compile(tree: &TreeIr) -> Self {
        let depth = tree.depth();
        assert!(
            depth <= PERFECT_TREE_MAX_DEPTH,
            "tree depth {depth} exceeds perfect-tree limit {PERFECT_TREE_MAX_DEPTH}"
        );

        let n_internal = internal_slots(depth);
        let mut layout = Layout {
            depth,
            features: vec![0u32; n_internal],
            thresholds: vec![0.0f32; n_internal],
            values: Array2::<f32>::zeros((n_internal + 1, tree.output_width())),
        };
        layout.populate(tree, 0, 0, 0);

        Self {
            features: layout.features.into_boxed_slice(),
            thresholds: layout.thresholds.into_boxed_slice(),
            values: layout.values,
            depth,
            split_rule: tree.split_rule(),
        }
    }

    /// Length of each output row.
    #[inline]
    pub fn output_width(&self) -> usize {
        self.values.ncols()
    }

    /// Number of steps per evaluation.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Bottom-level slot reached by each row.
    pub fn leaf_slots(&self, x: ArrayView2<'_, f32>) -> Array1<usize> {
        let mut idx = Array1::<usize>::zeros(x.nrows());
        let rule = self.split_rule;

        for _ in 0..self.depth {
            Zip::from(&mut idx).and(x.rows()).for_each(|i, row| {
                let fvalue = row[self.features[*i] as usize];
                let cmp = rule.goes_right(fvalue, self.thresholds[*i]) as usize;
                *i = 2 * *i + 1 + cmp;
            });
        }

        let offset = internal_slots(self.depth);
        idx.mapv_inplace(|i| i - offset);
        idx
    }

    /// Evaluate on a row block `[batch, n_features]`, returning `[batch, output_width]`.
    pub fn evaluate(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        let slots = self.leaf_slots(x);
        let mut out = Array2::<f32>::zeros((x.nrows(), self.output_width()));

        Zip::from(out.rows_mut()).and(&slots).for_each(|mut dst, &slot| {
            dst.assign(&self.values.row(slot));
        });

        out
    }
}

/// Buffers filled while padding the tree.
struct Layout {
    depth: usize,
    features: Vec<u32>,
    thresholds: Vec<f32>,
    values: Array2<f32>,
}

impl Layout {
    /// Recursively populate the slots under `slot` from tree node `node`.
    fn populate(&mut self, tree: &TreeIr, node: NodeId, slot: usize, level: usize) {
        if level == self.depth {
            let value = tree.node(node).leaf_value().unwrap_or_default();
            let bottom = slot - internal_slots(self.depth);
            self.values
                .row_mut(bottom)
                .iter_mut()
                .zip(value)
                .for_each(|(dst, &v)| *dst = v);
            return;
        }

        match tree.node(node) {
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                self.features[slot] = *feature;
                self.thresholds[slot] = *threshold;
                self.populate(tree, *left, 2 * slot + 1, level + 1);
                self.populate(tree, *right, 2 * slot + 2, level + 1);
            }
            Node::Leaf { .. } => {
                // Padding: both sides lead to the same leaf
                self.populate(tree, node, 2 * slot + 1, level + 1);
                self.populate(tree, node, 2 * slot + 2, level + 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::TreeBuilder;
    use ndarray::array;

    /// ```text
    ///        [0] f0 <= 0.5
    ///        /          \
    ///    [1] leaf     [2] f1 <= 0.3
    ///                   /      \
    ///              [3] leaf   [4] leaf
    /// ```
    fn test_tree(rule: SplitRule) -> TreeIr {
        let mut builder = TreeBuilder::new();
        builder.add_split(0, 0.5, 1, 2);
        builder.add_leaf(vec![1.0]);
        builder.add_split(1, 0.3, 3, 4);
        builder.add_leaf(vec![2.0]);
        builder.add_leaf(vec![3.0]);
        builder.build(2, rule).unwrap()
    }

    #[test]
    fn shallow_leaves_are_replicated() {
        let program = PerfectTreeProgram::compile(&test_tree(SplitRule::LessOrEqual));

        assert_eq!(program.depth(), 2);
        assert_eq!(program.features.len(), 3);
        assert_eq!(program.values.column(0).to_vec(), vec![1.0, 1.0, 2.0, 3.0]);
        assert_eq!(&*program.features, &[0, 0, 1]);
    }

    #[test]
    fn evaluate_matches_branching() {
        let tree = test_tree(SplitRule::LessOrEqual);
        let program = PerfectTreeProgram::compile(&tree);
        let x = array![[0.1f32, 0.9], [0.5, 0.0], [0.9, 0.3], [0.9, 0.31]];

        assert_eq!(program.leaf_slots(x.view()).to_vec(), vec![1, 1, 2, 3]);
        assert_eq!(program.evaluate(x.view()), array![[1.0f32], [1.0], [2.0], [3.0]]);
    }

    #[test]
    fn less_rule_sends_ties_right() {
        let program = PerfectTreeProgram::compile(&test_tree(SplitRule::Less));
        let x = array![[0.5f32, 0.3]];
        assert_eq!(program.evaluate(x.view()), array![[3.0f32]]);
    }

    #[test]
    fn single_leaf_tree() {
        let mut builder = TreeBuilder::new();
        builder.add_leaf(vec![7.0]);
        let program = PerfectTreeProgram::compile(&builder.build(1, SplitRule::LessOrEqual).unwrap());

        let x = array![[1.0f32], [2.0]];
        assert_eq!(program.evaluate(x.view()), array![[7.0f32], [7.0]]);
    }
}
