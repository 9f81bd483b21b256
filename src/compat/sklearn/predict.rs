//! Reference branching prediction over raw scikit-learn trees.
//!
//! Reproduces the source library's `predict` / `predict_proba` semantics
//! (f64 thresholds, f64 accumulation) directly from the node arrays, without
//! going through extraction. Compiled programs are checked against it.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::program::PredictError;
use crate::repr::TaskKind;

use super::convert::SklearnModel;
use super::json::SkTree;

/// Output of [`SklearnModel::predict`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReferencePrediction {
    /// Predicted class labels.
    Labels(Array1<i64>),
    /// Predicted regression values.
    Values(Array1<f64>),
}

/// Traverse a raw tree to its leaf: left iff `x <= threshold`.
///
/// Trees are structurally validated when the model is loaded.
fn leaf_index(tree: &SkTree, row: &[f32]) -> usize {
    let mut node = 0usize;
    while !tree.is_leaf(node) {
        let fvalue = row[tree.feature[node] as usize] as f64;
        node = if fvalue <= tree.threshold[node] {
            tree.children_left[node] as usize
        } else {
            tree.children_right[node] as usize
        };
    }
    node
}

impl SklearnModel {
    fn check_width(&self, x: &ArrayView2<f32>) -> Result<(), PredictError> {
        if x.ncols() != self.n_features() {
            return Err(PredictError::ShapeMismatch {
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }
        Ok(())
    }

    /// Mean class probabilities, `[n_rows, n_classes]`.
    ///
    /// # Errors
    ///
    /// [`PredictError::ShapeMismatch`] if `x` does not have `n_features`
    /// columns, [`PredictError::UnsupportedOutput`] for regressors.
    pub fn predict_proba(&self, x: ArrayView2<f32>) -> Result<Array2<f64>, PredictError> {
        let TaskKind::Classification { n_classes } = self.task() else {
            return Err(PredictError::UnsupportedOutput {
                output: "predict_proba",
                task: "regression",
            });
        };
        self.check_width(&x)?;

        let mut proba = Array2::<f64>::zeros((x.nrows(), n_classes));
        let mut row_buf = Vec::with_capacity(x.ncols());

        for (row, mut out) in x.axis_iter(Axis(0)).zip(proba.axis_iter_mut(Axis(0))) {
            row_buf.clear();
            row_buf.extend(row.iter().copied());

            for tree in self.trees() {
                let value = &tree.value[leaf_index(tree, &row_buf)][0];
                let total: f64 = value.iter().sum();
                let normalizer = if total == 0.0 { 1.0 } else { total };
                for (acc, &v) in out.iter_mut().zip(value) {
                    *acc += v / normalizer;
                }
            }
        }

        proba /= self.n_trees() as f64;
        Ok(proba)
    }

    /// Mean regression values, `[n_rows]`.
    ///
    /// # Errors
    ///
    /// [`PredictError::ShapeMismatch`] if `x` does not have `n_features`
    /// columns, [`PredictError::UnsupportedOutput`] for classifiers.
    pub fn predict_values(&self, x: ArrayView2<f32>) -> Result<Array1<f64>, PredictError> {
        if self.task().is_classification() {
            return Err(PredictError::UnsupportedOutput {
                output: "predict_values",
                task: "classification",
            });
        }
        self.check_width(&x)?;

        let mut row_buf = Vec::with_capacity(x.ncols());
        let values = x
            .axis_iter(Axis(0))
            .map(|row| {
                row_buf.clear();
                row_buf.extend(row.iter().copied());
                let sum: f64 = self
                    .trees()
                    .iter()
                    .map(|tree| tree.value[leaf_index(tree, &row_buf)][0][0])
                    .sum();
                sum / self.n_trees() as f64
            })
            .collect();
        Ok(values)
    }

    /// Predicted labels (classifiers) or values (regressors).
    ///
    /// Labels are `classes_[argmax(proba)]` with ties going to the lowest class
    /// index.
    pub fn predict(&self, x: ArrayView2<f32>) -> Result<ReferencePrediction, PredictError> {
        if self.task().is_regression() {
            return self.predict_values(x).map(ReferencePrediction::Values);
        }

        let proba = self.predict_proba(x)?;
        let labels = proba
            .axis_iter(Axis(0))
            .map(|row| self.classes()[argmax_f64(row.iter().copied())])
            .collect();
        Ok(ReferencePrediction::Labels(labels))
    }
}

/// Index of the first maximum.
fn argmax_f64(values: impl Iterator<Item = f64>) -> usize {
    let mut best_idx = 0;
    let mut best = f64::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if v > best {
            best = v;
            best_idx = i;
        }
    }
    best_idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use serde_json::json;

    fn forest() -> SklearnModel {
        let tree_a = json!({
            "children_left": [1, -1, -1],
            "children_right": [2, -1, -1],
            "feature": [0, -2, -2],
            "threshold": [0.5, -2.0, -2.0],
            "value": [[[2.0, 2.0]], [[2.0, 0.0]], [[0.0, 2.0]]]
        });
        let tree_b = json!({
            "children_left": [1, -1, -1],
            "children_right": [2, -1, -1],
            "feature": [1, -2, -2],
            "threshold": [0.25, -2.0, -2.0],
            "value": [[[1.0, 3.0]], [[0.25, 0.75]], [[0.0, 0.0]]]
        });
        SklearnModel::from_value(json!({
            "type": "RandomForestClassifier",
            "n_features_in_": 2,
            "classes_": [10, 20],
            "estimators_": [{"tree_": tree_a}, {"tree_": tree_b}]
        }))
        .unwrap()
    }

    #[test]
    fn proba_is_mean_of_normalized_leaves() {
        let model = forest();
        let x = array![[0.5f32, 0.25], [0.75, 1.0]];

        let proba = model.predict_proba(x.view()).unwrap();
        // Row 0: [1, 0] and [0.25, 0.75]
        assert_abs_diff_eq!(proba[[0, 0]], 0.625);
        assert_abs_diff_eq!(proba[[0, 1]], 0.375);
        // Row 1: [0, 1] and the zero leaf
        assert_abs_diff_eq!(proba[[1, 0]], 0.0);
        assert_abs_diff_eq!(proba[[1, 1]], 0.5);

        assert!(matches!(
            model.predict_values(x.view()),
            Err(PredictError::UnsupportedOutput { output: "predict_values", .. })
        ));
    }

    #[test]
    fn predict_maps_through_classes() {
        let model = forest();
        let x = array![[0.5f32, 0.25], [0.75, 1.0]];

        assert_eq!(
            model.predict(x.view()).unwrap(),
            ReferencePrediction::Labels(array![10, 20])
        );
    }

    #[test]
    fn argmax_ties_go_to_lowest_index() {
        assert_eq!(argmax_f64([0.5, 0.5].into_iter()), 0);
        assert_eq!(argmax_f64([0.1, 0.3, 0.3].into_iter()), 1);
    }

    #[test]
    fn wrong_width_is_an_error() {
        let model = forest();
        let x = array![[0.5f32, 0.25, 1.0]];

        assert_eq!(
            model.predict_proba(x.view()).unwrap_err(),
            PredictError::ShapeMismatch { expected: 2, actual: 3 }
        );
        assert!(model.predict(x.view()).is_err());
    }
}
