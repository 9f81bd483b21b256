//! Ensemble representation (ordered collection of trees) and model metadata.

use serde::{Deserialize, Serialize};

use super::tree::{TreeIr, TreeValidationError};

// =============================================================================
// Model metadata
// =============================================================================

/// Family of tree model the ensemble was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelFamily {
    /// A single decision tree.
    DecisionTree,
    /// Bagged trees with best-split search.
    RandomForest,
    /// Extremely randomized trees.
    ExtraTrees,
}

impl ModelFamily {
    /// Short human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DecisionTree => "decision_tree",
            Self::RandomForest => "random_forest",
            Self::ExtraTrees => "extra_trees",
        }
    }
}

/// Prediction task of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    /// Classification with `n_classes` classes (2 for binary).
    Classification {
        /// Number of classes.
        n_classes: usize,
    },
    /// Regression (single continuous target).
    Regression,
}

impl TaskKind {
    /// Length of each per-tree output vector.
    pub fn output_width(&self) -> usize {
        match self {
            Self::Classification { n_classes } => *n_classes,
            Self::Regression => 1,
        }
    }

    /// Returns true if this is a classification task.
    pub fn is_classification(&self) -> bool {
        matches!(self, Self::Classification { .. })
    }

    /// Returns true if this is a regression task.
    pub fn is_regression(&self) -> bool {
        matches!(self, Self::Regression)
    }
}

/// Model family x task, resolved once at extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelKind {
    pub family: ModelFamily,
    pub task: TaskKind,
}

impl ModelKind {
    pub fn new(family: ModelFamily, task: TaskKind) -> Self {
        Self { family, task }
    }
}

// =============================================================================
// Ensemble
// =============================================================================

/// Structural validation errors for [`Ensemble`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnsembleValidationError {
    #[error("ensemble has no trees")]
    NoTrees,
    #[error("tree {tree_idx} has {actual} features, ensemble has {expected}")]
    FeatureCountMismatch {
        tree_idx: usize,
        expected: usize,
        actual: usize,
    },
    #[error("tree {tree_idx} has output width {actual}, task requires {expected}")]
    OutputWidthMismatch {
        tree_idx: usize,
        expected: usize,
        actual: usize,
    },
    #[error("{n_labels} class labels for {n_classes} classes")]
    ClassLabelsMismatch { n_classes: usize, n_labels: usize },
    #[error("invalid tree {tree_idx}: {error}")]
    InvalidTree {
        tree_idx: usize,
        #[source]
        error: TreeValidationError,
    },
}

/// Ordered collection of trees with uniform mean aggregation.
///
/// Tree order is insertion order and is the order outputs are summed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ensemble {
    trees: Vec<TreeIr>,
    kind: ModelKind,
    n_features: usize,
    classes: Vec<i64>,
}

impl Ensemble {
    /// Create an empty ensemble.
    ///
    /// Classifiers get the default labels `0..n_classes`.
    pub fn new(kind: ModelKind, n_features: usize) -> Self {
        let classes = match kind.task {
            TaskKind::Classification { n_classes } => (0..n_classes as i64).collect(),
            TaskKind::Regression => Vec::new(),
        };
        Self {
            trees: Vec::new(),
            kind,
            n_features,
            classes,
        }
    }

    /// Set the class labels returned for each class index.
    pub fn with_classes(mut self, classes: Vec<i64>) -> Self {
        self.classes = classes;
        self
    }

    /// Add a tree to the ensemble.
    pub fn push_tree(&mut self, tree: TreeIr) {
        self.trees.push(tree);
    }

    /// Number of trees.
    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Get a reference to a specific tree.
    #[inline]
    pub fn tree(&self, idx: usize) -> &TreeIr {
        &self.trees[idx]
    }

    /// Iterate over trees in aggregation order.
    pub fn trees(&self) -> impl Iterator<Item = &TreeIr> {
        self.trees.iter()
    }

    #[inline]
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    #[inline]
    pub fn task(&self) -> TaskKind {
        self.kind.task
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Class labels (empty for regressors).
    #[inline]
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// Per-row output width: number of classes, or 1 for regression.
    #[inline]
    pub fn output_width(&self) -> usize {
        self.kind.task.output_width()
    }

    /// Aggregation weight applied to each tree's output.
    #[inline]
    pub fn tree_weight(&self) -> f32 {
        1.0 / self.trees.len() as f32
    }

    /// Validate structural invariants for this ensemble.
    pub fn validate(&self) -> Result<(), EnsembleValidationError> {
        if self.trees.is_empty() {
            return Err(EnsembleValidationError::NoTrees);
        }

        if let TaskKind::Classification { n_classes } = self.kind.task {
            if self.classes.len() != n_classes {
                return Err(EnsembleValidationError::ClassLabelsMismatch {
                    n_classes,
                    n_labels: self.classes.len(),
                });
            }
        }

        let expected_width = self.output_width();
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate()
                .map_err(|e| EnsembleValidationError::InvalidTree { tree_idx: i, error: e })?;

            if tree.n_features() != self.n_features {
                return Err(EnsembleValidationError::FeatureCountMismatch {
                    tree_idx: i,
                    expected: self.n_features,
                    actual: tree.n_features(),
                });
            }
            if tree.output_width() != expected_width {
                return Err(EnsembleValidationError::OutputWidthMismatch {
                    tree_idx: i,
                    expected: expected_width,
                    actual: tree.output_width(),
                });
            }
        }

        Ok(())
    }

    /// Mean of the per-tree leaf values for a single row, by branching traversal.
    pub fn predict_row(&self, features: &[f32]) -> Vec<f32> {
        let mut output = vec![0.0f32; self.output_width()];

        for tree in &self.trees {
            for (acc, &v) in output.iter_mut().zip(tree.predict_row(features)) {
                *acc += v;
            }
        }

        let weight = self.tree_weight();
        output.iter_mut().for_each(|v| *v *= weight);
        output
    }
}
