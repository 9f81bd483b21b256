//! scikit-learn fitted-estimator JSON interchange types.
//!
//! These are "foreign types" mirroring the fitted attributes of scikit-learn
//! tree estimators (`tree_`, `estimators_`, `classes_`, ...). They are used
//! only for parsing; see [`SklearnModel`](super::SklearnModel) for the
//! validated model.

use serde::{Deserialize, Serialize};

use crate::compat::extract::{SourceNode, TreeSource};

/// Leaf marker in `children_left` / `children_right`.
pub const TREE_LEAF: i64 = -1;

fn default_n_outputs() -> usize {
    1
}

/// Top-level fitted estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkEstimator {
    /// Estimator class name, optionally module-qualified
    /// (`"RandomForestClassifier"`, `"sklearn.tree.DecisionTreeRegressor"`).
    #[serde(rename = "type")]
    pub estimator_type: String,
    #[serde(default)]
    pub n_features_in_: Option<usize>,
    #[serde(default = "default_n_outputs")]
    pub n_outputs_: usize,
    /// Class labels, classifiers only.
    #[serde(default)]
    pub classes_: Option<Vec<i64>>,
    #[serde(default)]
    pub n_classes_: Option<usize>,
    /// Single-tree estimators.
    #[serde(default)]
    pub tree_: Option<SkTree>,
    /// Ensembles.
    #[serde(default)]
    pub estimators_: Option<Vec<SkSubEstimator>>,
}

/// Member of an ensemble's `estimators_` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkSubEstimator {
    pub tree_: SkTree,
}

/// Parallel node arrays of a fitted `sklearn.tree._tree.Tree`.
///
/// Node `i` is a leaf iff `children_left[i] == TREE_LEAF`. `value` has shape
/// `[n_nodes][n_outputs][n_classes]` (`n_classes == 1` for regressors).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: Vec<Vec<Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
}

impl SkTree {
    /// Number of nodes in storage.
    pub fn n_nodes(&self) -> usize {
        self.children_left.len()
    }

    /// Returns true if node `idx` is a leaf.
    #[inline]
    pub fn is_leaf(&self, idx: usize) -> bool {
        self.children_left[idx] == TREE_LEAF
    }

    /// Check that all parallel arrays have the same length.
    ///
    /// Returns the first mismatching field name and its length.
    pub(crate) fn check_lengths(&self) -> Result<(), (&'static str, usize)> {
        let n = self.n_nodes();
        let lengths = [
            ("children_right", self.children_right.len()),
            ("feature", self.feature.len()),
            ("threshold", self.threshold.len()),
            ("value", self.value.len()),
        ];
        for (field, len) in lengths {
            if len != n {
                return Err((field, len));
            }
        }
        if let Some(count) = self.node_count {
            if count != n {
                return Err(("node_count", count));
            }
        }
        Ok(())
    }

    /// View this tree as a [`TreeSource`] over `n_features` inputs.
    pub fn source(&self, n_features: usize) -> SkTreeSource<'_> {
        SkTreeSource {
            tree: self,
            n_features,
        }
    }
}

/// [`TreeSource`] adapter for the first output of an [`SkTree`].
#[derive(Debug, Clone, Copy)]
pub struct SkTreeSource<'a> {
    tree: &'a SkTree,
    n_features: usize,
}

impl TreeSource for SkTreeSource<'_> {
    fn n_nodes(&self) -> usize {
        self.tree.n_nodes()
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn node(&self, idx: usize) -> SourceNode<'_> {
        let t = self.tree;
        if t.is_leaf(idx) {
            SourceNode::Leaf {
                value: t.value[idx].first().map(Vec::as_slice).unwrap_or_default(),
            }
        } else {
            SourceNode::Split {
                feature: t.feature[idx],
                threshold: t.threshold[idx],
                left: t.children_left[idx],
                right: t.children_right[idx],
            }
        }
    }
}
