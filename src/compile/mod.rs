//! Compilation of single trees into tensor programs.
//!
//! Each tree is encoded with one of three strategies, all producing identical
//! `[batch, output_width]` outputs:
//!
//! - [`Strategy::Gemm`]: path membership as matrix products ([`GemmProgram`])
//! - [`Strategy::TraversalTable`]: per-node gather tables ([`TraversalProgram`])
//! - [`Strategy::PerfectTreeTraversal`]: implicit perfect-tree indexing
//!   ([`PerfectTreeProgram`])
//!
//! [`select_strategy`] picks one per tree from its shape alone.

pub mod gemm;
pub mod perfect;
pub mod traversal;

pub use gemm::{GemmProgram, LeafMatchError};
pub use perfect::{PERFECT_TREE_MAX_DEPTH, PerfectTreeProgram};
pub use traversal::TraversalProgram;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::repr::TreeIr;

// =============================================================================
// Strategy selection
// =============================================================================

/// Deepest tree compiled with [`Strategy::Gemm`] by default.
pub const GEMM_MAX_DEPTH: usize = 3;

/// Deepest tree [`select_strategy`] considers for perfect-tree padding.
pub const PERFECT_TREE_AUTO_MAX_DEPTH: usize = 10;

/// Largest allowed ratio of padded perfect-tree nodes to actual nodes.
pub const PERFECT_TREE_MAX_EXPANSION: usize = 4;

/// Tensor encoding used for one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Dense matrix products over decision / path / leaf matrices.
    Gemm,
    /// Depth-many gather steps over per-node tables.
    TraversalTable,
    /// Depth-many steps of `2*i + 1 + cmp` over a padded perfect tree.
    PerfectTreeTraversal,
}

impl Strategy {
    /// Short human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gemm => "gemm",
            Self::TraversalTable => "traversal_table",
            Self::PerfectTreeTraversal => "perfect_tree",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Number of nodes in a perfect binary tree with `depth` edges per path.
#[inline]
const fn perfect_tree_nodes(depth: usize) -> usize {
    (1 << (depth + 1)) - 1
}

/// Pick a strategy from a tree's shape.
///
/// - `depth <= 3`: GEMM
/// - `depth <= 10` and the padded perfect tree has at most 4x the nodes:
///   perfect-tree traversal
/// - otherwise: traversal table
pub fn select_strategy(depth: usize, n_nodes: usize) -> Strategy {
    if depth <= GEMM_MAX_DEPTH {
        Strategy::Gemm
    } else if depth <= PERFECT_TREE_AUTO_MAX_DEPTH
        && perfect_tree_nodes(depth) <= PERFECT_TREE_MAX_EXPANSION.saturating_mul(n_nodes)
    {
        Strategy::PerfectTreeTraversal
    } else {
        Strategy::TraversalTable
    }
}

/// How strategies are assigned to trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StrategyChoice {
    /// Per-tree [`select_strategy`].
    #[default]
    Auto,
    /// The same strategy for every tree.
    ///
    /// Trees deeper than [`PERFECT_TREE_MAX_DEPTH`] cannot be padded and use
    /// [`Strategy::TraversalTable`] instead of the perfect-tree encoding.
    Fixed(Strategy),
}

impl StrategyChoice {
    /// Resolve the strategy for one tree.
    pub fn resolve(self, tree: &TreeIr) -> Strategy {
        match self {
            Self::Auto => select_strategy(tree.depth(), tree.n_nodes()),
            Self::Fixed(Strategy::PerfectTreeTraversal) if tree.depth() > PERFECT_TREE_MAX_DEPTH => {
                log::warn!(
                    "tree of depth {} is too deep for perfect-tree padding, using {}",
                    tree.depth(),
                    Strategy::TraversalTable
                );
                Strategy::TraversalTable
            }
            Self::Fixed(strategy) => strategy,
        }
    }
}

// =============================================================================
// TreeProgram
// =============================================================================

/// A compiled tree. Immutable after compilation.
#[derive(Debug, Clone)]
pub enum TreeProgram {
    Gemm(GemmProgram),
    TraversalTable(TraversalProgram),
    PerfectTree(PerfectTreeProgram),
}

impl TreeProgram {
    /// Compile a tree with the given strategy.
    ///
    /// # Panics
    ///
    /// Panics if `strategy` is [`Strategy::PerfectTreeTraversal`] and the tree
    /// is deeper than [`PERFECT_TREE_MAX_DEPTH`]. [`StrategyChoice::resolve`]
    /// never returns such a combination.
    pub fn compile(tree: &TreeIr, strategy: Strategy) -> Self {
        match strategy {
            Strategy::Gemm => Self::Gemm(GemmProgram::compile(tree)),
            Strategy::TraversalTable => Self::TraversalTable(TraversalProgram::compile(tree)),
            Strategy::PerfectTreeTraversal => Self::PerfectTree(PerfectTreeProgram::compile(tree)),
        }
    }

    /// Strategy this program was compiled with.
    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Gemm(_) => Strategy::Gemm,
            Self::TraversalTable(_) => Strategy::TraversalTable,
            Self::PerfectTree(_) => Strategy::PerfectTreeTraversal,
        }
    }

    /// Length of each output row.
    pub fn output_width(&self) -> usize {
        match self {
            Self::Gemm(p) => p.output_width(),
            Self::TraversalTable(p) => p.output_width(),
            Self::PerfectTree(p) => p.output_width(),
        }
    }

    /// Evaluate on a row block `[batch, n_features]`, returning the selected
    /// leaf value per row `[batch, output_width]`.
    ///
    /// Only the GEMM encoding can report a leaf-selection failure; the
    /// gather-based encodings select exactly one leaf by construction.
    pub fn evaluate(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, LeafMatchError> {
        match self {
            Self::Gemm(p) => p.evaluate(x),
            Self::TraversalTable(p) => Ok(p.evaluate(x)),
            Self::PerfectTree(p) => Ok(p.evaluate(x)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::{Node, SplitRule};
    use ndarray::array;

    #[test]
    fn shallow_trees_use_gemm() {
        for depth in 0..=3 {
            assert_eq!(select_strategy(depth, 1), Strategy::Gemm);
        }
    }

    #[test]
    fn dense_medium_trees_use_perfect_tree() {
        // depth 6: perfect tree has 127 nodes
        assert_eq!(select_strategy(6, 127), Strategy::PerfectTreeTraversal);
        assert_eq!(select_strategy(6, 32), Strategy::PerfectTreeTraversal);
        assert_eq!(select_strategy(6, 31), Strategy::TraversalTable);
        assert_eq!(select_strategy(10, 2047), Strategy::PerfectTreeTraversal);
    }

    #[test]
    fn deep_trees_use_traversal_table() {
        assert_eq!(select_strategy(11, 4095), Strategy::TraversalTable);
        assert_eq!(select_strategy(40, 81), Strategy::TraversalTable);
    }

    /// Right-leaning spine: node 2k splits on `x <= k`, node 2k+1 is its left
    /// leaf with value k, the last node is the leaf at full depth.
    fn spine(depth: usize) -> TreeIr {
        let nodes = (0..2 * depth + 1)
            .map(|i| {
                if i % 2 == 0 && i < 2 * depth {
                    Node::split(0, (i / 2) as f32, i as u32 + 1, i as u32 + 2)
                } else if i == 2 * depth {
                    Node::leaf(vec![depth as f32])
                } else {
                    Node::leaf(vec![(i / 2) as f32])
                }
            })
            .collect();
        TreeIr::new(nodes, 1, SplitRule::LessOrEqual).unwrap()
    }

    #[test]
    fn fixed_choice_caps_perfect_tree_depth() {
        let deep = spine(PERFECT_TREE_MAX_DEPTH + 1);
        let choice = StrategyChoice::Fixed(Strategy::PerfectTreeTraversal);
        assert_eq!(choice.resolve(&deep), Strategy::TraversalTable);

        let shallow = spine(5);
        assert_eq!(choice.resolve(&shallow), Strategy::PerfectTreeTraversal);
        assert_eq!(StrategyChoice::Auto.resolve(&shallow), Strategy::TraversalTable);
    }

    #[test]
    fn all_strategies_agree_on_spine() {
        let tree = spine(6);
        let x = array![[-1.0f32], [0.0], [2.5], [5.0], [5.5], [100.0]];

        let expected: Vec<f32> = x.column(0).iter().map(|&v| tree.predict_row(&[v])[0]).collect();
        assert_eq!(expected, vec![0.0, 0.0, 3.0, 5.0, 6.0, 6.0]);

        for strategy in [Strategy::Gemm, Strategy::TraversalTable, Strategy::PerfectTreeTraversal] {
            let program = TreeProgram::compile(&tree, strategy);
            assert_eq!(program.strategy(), strategy);
            assert_eq!(program.output_width(), 1);

            let out = program.evaluate(x.view()).unwrap();
            assert_eq!(out.column(0).to_vec(), expected, "{strategy}");
        }
    }
}
