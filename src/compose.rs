//! Ensemble composition: per-tree programs plus the model's aggregation rule.
//!
//! Per-tree outputs are summed in tree order and scaled by `1 / n_trees`.
//! Classifier leaves are already normalized, so the mean is the probability
//! vector; the predicted class is its argmax (ties to the lowest index).

use ndarray::{Array1, Array2, ArrayView2, ArrayViewMut2, Axis};

use crate::compile::{Strategy, StrategyChoice, TreeProgram};
use crate::repr::{Ensemble, ModelKind};

/// Compiled ensemble. Immutable after compilation.
#[derive(Debug, Clone)]
pub struct EnsembleProgram {
    programs: Box<[TreeProgram]>,
    kind: ModelKind,
    n_features: usize,
    output_width: usize,
    classes: Box<[i64]>,
    tree_weight: f32,
}

impl EnsembleProgram {
    /// Compile every tree of a validated ensemble.
    ///
    /// The ensemble must have passed [`Ensemble::validate`].
    pub fn compile(ensemble: &Ensemble, choice: StrategyChoice) -> Self {
        let programs: Box<[TreeProgram]> = ensemble
            .trees()
            .enumerate()
            .map(|(tree_idx, tree)| {
                let strategy = choice.resolve(tree);
                log::debug!(
                    "tree {tree_idx}: depth={} nodes={} leaves={} strategy={strategy}",
                    tree.depth(),
                    tree.n_nodes(),
                    tree.n_leaves(),
                );
                TreeProgram::compile(tree, strategy)
            })
            .collect();

        Self {
            programs,
            kind: ensemble.kind(),
            n_features: ensemble.n_features(),
            output_width: ensemble.output_width(),
            classes: ensemble.classes().into(),
            tree_weight: ensemble.tree_weight(),
        }
    }

    #[inline]
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.programs.len()
    }

    /// Per-row output width: number of classes, or 1 for regression.
    #[inline]
    pub fn output_width(&self) -> usize {
        self.output_width
    }

    /// Class labels (empty for regressors).
    #[inline]
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// Per-tree programs in aggregation order.
    pub fn programs(&self) -> &[TreeProgram] {
        &self.programs
    }

    /// Strategy chosen for each tree.
    pub fn strategies(&self) -> Vec<Strategy> {
        self.programs.iter().map(TreeProgram::strategy).collect()
    }

    /// Mean of per-tree outputs for a row block, written into `output`
    /// (`[batch, output_width]`, overwritten).
    ///
    /// # Panics
    ///
    /// Panics if a tree program fails to select exactly one leaf for a row.
    /// This is an internal invariant violation, never a data error.
    pub fn raw_output_into(&self, x: ArrayView2<'_, f32>, mut output: ArrayViewMut2<'_, f32>) {
        output.fill(0.0);

        for (tree_idx, program) in self.programs.iter().enumerate() {
            match program.evaluate(x) {
                Ok(tree_output) => output += &tree_output,
                Err(err) => panic!(
                    "leaf selection invariant violated in tree {tree_idx} ({}): {err}",
                    program.strategy()
                ),
            }
        }

        output *= self.tree_weight;
    }

    /// Mean of per-tree outputs, `[batch, output_width]`.
    pub fn raw_output(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut output = Array2::<f32>::zeros((x.nrows(), self.output_width));
        self.raw_output_into(x, output.view_mut());
        output
    }

    /// Class labels for rows of a probability matrix.
    ///
    /// Ties go to the lowest class index.
    pub fn labels(&self, probabilities: ArrayView2<'_, f32>) -> Array1<i64> {
        probabilities
            .axis_iter(Axis(0))
            .map(|row| self.classes[argmax(row.iter().copied())])
            .collect()
    }
}

/// Index of the first maximum.
#[inline]
pub(crate) fn argmax(values: impl Iterator<Item = f32>) -> usize {
    let mut best_idx = 0;
    let mut best = f32::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if v > best {
            best = v;
            best_idx = i;
        }
    }
    best_idx
}
