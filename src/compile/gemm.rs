//! GEMM encoding: tree inference as dense matrix products.
//!
//! A tree with `I` internal nodes, `L` leaves and `F` features becomes:
//!
//! ```text
//! A [I, F]   one-hot decision feature per internal node
//! B [I]      thresholds
//! C [L, I]   +1 if the leaf's path goes right at the node, -1 left, 0 off path
//! E [L]      path lengths (non-zero count of each C row)
//! D [L, W]   leaf values
//! ```
//!
//! and a row block `X [N, F]` is evaluated as
//!
//! ```text
//! T = ±1 where (X · Aᵀ) > B     (>= under SplitRule::Less)
//! S = T · Cᵀ
//! M = (S == E)                    one-hot leaf selection
//! Y = M · D
//! ```
//!
//! A leaf's score reaches its path length only if every condition on its path
//! holds, so exactly one column of `M` is set per row.

use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};

use crate::repr::{Node, NodeId, SplitRule, TreeIr};

/// A row that did not select exactly one leaf.
///
/// Indicates a broken encoding; compiled programs never produce it for a
/// valid tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("row {row} matched {n_matches} leaves, expected exactly one")]
pub struct LeafMatchError {
    pub row: usize,
    pub n_matches: usize,
}

/// GEMM-encoded tree.
#[derive(Debug, Clone)]
pub struct GemmProgram {
    /// Decision features, `[n_internal, n_features]`.
    a: Array2<f32>,
    /// Thresholds, `[n_internal]`.
    b: Array1<f32>,
    /// Path directions, `[n_leaves, n_internal]`.
    c: Array2<f32>,
    /// Path lengths, `[n_leaves]`.
    path_lengths: Array1<f32>,
    /// Leaf values, `[n_leaves, output_width]`.
    d: Array2<f32>,
    split_rule: SplitRule,
}

impl GemmProgram {
    /// Encode a tree.
    pub fn compile(tree: &TreeIr) -> Self {
        let n_nodes = tree.n_nodes();
        let n_internal = tree.n_internal();
        let n_leaves = tree.n_leaves();
        let width = tree.output_width();

        // Column / row positions of internal nodes and leaves, in table order.
        let mut position = vec![0usize; n_nodes];
        // (parent, went_right) per node; the root has none.
        let mut parent: Vec<Option<(NodeId, bool)>> = vec![None; n_nodes];

        let mut a = Array2::<f32>::zeros((n_internal, tree.n_features()));
        let mut b = Array1::<f32>::zeros(n_internal);
        let mut d = Array2::<f32>::zeros((n_leaves, width));

        let (mut n_split, mut n_leaf) = (0usize, 0usize);
        for (id, node) in tree.nodes().iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    a[[n_split, *feature as usize]] = 1.0;
                    b[n_split] = *threshold;
                    parent[*left as usize] = Some((id as NodeId, false));
                    parent[*right as usize] = Some((id as NodeId, true));
                    position[id] = n_split;
                    n_split += 1;
                }
                Node::Leaf { value } => {
                    d.row_mut(n_leaf)
                        .iter_mut()
                        .zip(value)
                        .for_each(|(dst, &v)| *dst = v);
                    position[id] = n_leaf;
                    n_leaf += 1;
                }
            }
        }

        let mut c = Array2::<f32>::zeros((n_leaves, n_internal));
        let mut path_lengths = Array1::<f32>::zeros(n_leaves);
        for leaf in tree.leaf_ids() {
            let row = position[leaf as usize];
            let mut length = 0usize;
            let mut node = leaf;
            while let Some((p, went_right)) = parent[node as usize] {
                c[[row, position[p as usize]]] = if went_right { 1.0 } else { -1.0 };
                length += 1;
                node = p;
            }
            path_lengths[row] = length as f32;
        }

        Self {
            a,
            b,
            c,
            path_lengths,
            d,
            split_rule: tree.split_rule(),
        }
    }

    /// Number of internal (decision) nodes.
    #[inline]
    pub fn n_internal(&self) -> usize {
        self.b.len()
    }

    /// Number of leaves.
    #[inline]
    pub fn n_leaves(&self) -> usize {
        self.d.nrows()
    }

    /// Length of each output row.
    #[inline]
    pub fn output_width(&self) -> usize {
        self.d.ncols()
    }

    /// Decision feature matrix `A`.
    pub fn decision_features(&self) -> ArrayView2<'_, f32> {
        self.a.view()
    }

    /// Path direction matrix `C`.
    pub fn path_matrix(&self) -> ArrayView2<'_, f32> {
        self.c.view()
    }

    /// One-hot leaf selection `M [batch, n_leaves]`.
    ///
    /// Not checked; see [`GemmProgram::evaluate`].
    pub fn leaf_matches(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        let batch = x.nrows();
        if self.n_internal() == 0 {
            // A lone leaf matches every row.
            return Array2::ones((batch, self.n_leaves()));
        }

        let rule = self.split_rule;

        // T = ±1 <- (X · Aᵀ) cmp B
        let mut t = x.dot(&self.a.t());
        Zip::from(&mut t)
            .and_broadcast(&self.b)
            .for_each(|v, &threshold| {
                *v = if rule.goes_right(*v, threshold) { 1.0 } else { -1.0 };
            });

        // M = (T · Cᵀ == E)
        let mut m = t.dot(&self.c.t());
        Zip::from(&mut m)
            .and_broadcast(&self.path_lengths)
            .for_each(|s, &len| {
                *s = if *s == len { 1.0 } else { 0.0 };
            });
        m
    }

    /// Evaluate on a row block `[batch, n_features]`.
    ///
    /// Returns `[batch, output_width]`, or the first row whose leaf selection
    /// is not one-hot.
    pub fn evaluate(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, LeafMatchError> {
        let m = self.leaf_matches(x);

        for (row, matches) in m.axis_iter(Axis(0)).enumerate() {
            let n_matches = matches.iter().filter(|&&v| v != 0.0).count();
            if n_matches != 1 {
                return Err(LeafMatchError { row, n_matches });
            }
        }

        Ok(m.dot(&self.d))
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
        builder.add_leaf(vec![1.0, 0.0]);
        builder.add_split(1, 0.3, 3, 4);
        builder.add_leaf(vec![0.0, 1.0]);
        builder.add_leaf(vec![0.5, 0.5]);
        builder.build(3, rule).unwrap()
    }

    #[test]
    fn matrices() {
        let program = GemmProgram::compile(&test_tree(SplitRule::LessOrEqual));

        assert_eq!(program.n_internal(), 2);
        assert_eq!(program.n_leaves(), 3);
        assert_eq!(
            program.decision_features(),
            array![[1.0f32, 0.0, 0.0], [0.0, 1.0, 0.0]]
        );
        assert_eq!(program.b, array![0.5f32, 0.3]);
        assert_eq!(
            program.path_matrix(),
            array![[-1.0f32, 0.0], [1.0, -1.0], [1.0, 1.0]]
        );
        assert_eq!(program.path_lengths, array![1.0f32, 2.0, 2.0]);
    }

    #[test]
    fn evaluate_selects_one_leaf() {
        let program = GemmProgram::compile(&test_tree(SplitRule::LessOrEqual));
        let x = array![[0.2f32, 9.0, 0.0], [0.8, 0.1, 0.0], [0.8, 0.9, 0.0]];

        let m = program.leaf_matches(x.view());
        assert_eq!(m, array![[1.0f32, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

        let y = program.evaluate(x.view()).unwrap();
        assert_eq!(y, array![[1.0f32, 0.0], [0.0, 1.0], [0.5, 0.5]]);
    }

    #[test]
    fn ties_follow_split_rule() {
        let x = array![[0.5f32, 0.3, 0.0]];

        let le = GemmProgram::compile(&test_tree(SplitRule::LessOrEqual));
        assert_eq!(le.evaluate(x.view()).unwrap(), array![[1.0f32, 0.0]]);

        let lt = GemmProgram::compile(&test_tree(SplitRule::Less));
        assert_eq!(lt.evaluate(x.view()).unwrap(), array![[0.5f32, 0.5]]);
    }

    #[test]
    fn single_leaf_tree() {
        let mut builder = TreeBuilder::new();
        builder.add_leaf(vec![0.25, 0.75]);
        let program = GemmProgram::compile(&builder.build(2, SplitRule::LessOrEqual).unwrap());

        let x = array![[1.0f32, 2.0], [3.0, 4.0]];
        let y = program.evaluate(x.view()).unwrap();
        assert_eq!(y, array![[0.25f32, 0.75], [0.25, 0.75]]);
    }

    #[test]
    fn empty_batch() {
        let program = GemmProgram::compile(&test_tree(SplitRule::LessOrEqual));
        let x = Array2::<f32>::zeros((0, 3));
        assert_eq!(program.evaluate(x.view()).unwrap().dim(), (0, 2));
    }

    #[test]
    fn broken_encoding_is_reported() {
        let mut program = GemmProgram::compile(&test_tree(SplitRule::LessOrEqual));
        // Make the two right-subtree leaves indistinguishable
        program.c[[2, 1]] = -1.0;

        let x = array![[0.2f32, 0.0, 0.0], [0.8, 0.1, 0.0]];
        let err = program.evaluate(x.view()).unwrap_err();
        assert_eq!(err, LeafMatchError { row: 1, n_matches: 2 });
    }
}
