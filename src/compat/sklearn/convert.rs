//! Conversion from scikit-learn JSON types to native forest-tensor types.

use std::io::Read;

use serde_json::Value;

use crate::compat::extract::{ExtractError, extract_tree};
use crate::repr::{Ensemble, ModelFamily, ModelKind, SplitRule, TaskKind};

use super::json::{SkEstimator, SkSubEstimator, SkTree};

/// Error type for scikit-learn model conversion.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("unrecognized model type: {0}")]
    UnrecognizedModel(String),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("multi-output models are not supported (n_outputs_ = {0})")]
    MultiOutput(usize),
    #[error("ensemble has no estimators")]
    NoEstimators,
    #[error("classifier has no classes")]
    NoClasses,
    #[error("class count mismatch: n_classes_ = {n_classes}, classes_ has {n_labels} labels")]
    ClassCountMismatch { n_classes: usize, n_labels: usize },
    #[error("tree {tree}: field `{field}` has length {actual}, expected {expected}")]
    ArrayLengthMismatch {
        tree: usize,
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("invalid tree {tree}: {source}")]
    InvalidTree {
        tree: usize,
        #[source]
        source: ExtractError,
    },
    #[error("invalid model JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A recognized, shape-checked scikit-learn tree model.
///
/// Holds the raw fitted trees; [`SklearnModel::to_ensemble`] extracts them
/// into the canonical representation.
#[derive(Debug, Clone)]
pub struct SklearnModel {
    kind: ModelKind,
    n_features: usize,
    classes: Vec<i64>,
    trees: Vec<SkTree>,
}

/// Recognize an estimator class name.
///
/// Returns the family and whether the model is a classifier.
fn recognize(type_name: &str) -> Option<(ModelFamily, bool)> {
    // Accept module-qualified names
    let name = type_name.rsplit('.').next().unwrap_or(type_name);
    match name {
        "DecisionTreeClassifier" => Some((ModelFamily::DecisionTree, true)),
        "DecisionTreeRegressor" => Some((ModelFamily::DecisionTree, false)),
        "RandomForestClassifier" => Some((ModelFamily::RandomForest, true)),
        "RandomForestRegressor" => Some((ModelFamily::RandomForest, false)),
        "ExtraTreeClassifier" | "ExtraTreesClassifier" => Some((ModelFamily::ExtraTrees, true)),
        "ExtraTreeRegressor" | "ExtraTreesRegressor" => Some((ModelFamily::ExtraTrees, false)),
        _ => None,
    }
}

impl SklearnModel {
    /// Parse a model from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConversionError> {
        let estimator: SkEstimator = serde_json::from_str(json)?;
        Self::from_estimator(estimator)
    }

    /// Parse a model from a reader yielding JSON.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConversionError> {
        let estimator: SkEstimator = serde_json::from_reader(reader)?;
        Self::from_estimator(estimator)
    }

    /// Parse a model from an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, ConversionError> {
        let estimator: SkEstimator = serde_json::from_value(value)?;
        Self::from_estimator(estimator)
    }

    /// Recognize and shape-check a parsed estimator.
    pub fn from_estimator(estimator: SkEstimator) -> Result<Self, ConversionError> {
        let (family, is_classifier) = recognize(&estimator.estimator_type)
            .ok_or_else(|| ConversionError::UnrecognizedModel(estimator.estimator_type.clone()))?;

        if estimator.n_outputs_ != 1 {
            return Err(ConversionError::MultiOutput(estimator.n_outputs_));
        }
        let n_features = estimator
            .n_features_in_
            .ok_or(ConversionError::MissingField("n_features_in_"))?;

        let (task, classes) = if is_classifier {
            let classes = estimator
                .classes_
                .ok_or(ConversionError::MissingField("classes_"))?;
            if classes.is_empty() {
                return Err(ConversionError::NoClasses);
            }
            if let Some(n_classes) = estimator.n_classes_ {
                if n_classes != classes.len() {
                    return Err(ConversionError::ClassCountMismatch {
                        n_classes,
                        n_labels: classes.len(),
                    });
                }
            }
            let task = TaskKind::Classification {
                n_classes: classes.len(),
            };
            (task, classes)
        } else {
            (TaskKind::Regression, Vec::new())
        };

        let trees: Vec<SkTree> = if is_ensemble_type(&estimator.estimator_type) {
            let estimators = estimator
                .estimators_
                .ok_or(ConversionError::MissingField("estimators_"))?;
            if estimators.is_empty() {
                return Err(ConversionError::NoEstimators);
            }
            estimators.into_iter().map(|e| e.tree_).collect()
        } else {
            vec![estimator.tree_.ok_or(ConversionError::MissingField("tree_"))?]
        };

        for (tree_idx, tree) in trees.iter().enumerate() {
            tree.check_lengths()
                .map_err(|(field, actual)| ConversionError::ArrayLengthMismatch {
                    tree: tree_idx,
                    field,
                    expected: tree.n_nodes(),
                    actual,
                })?;
            // Malformed structure is rejected at load time
            extract_tree(&tree.source(n_features), SplitRule::LessOrEqual, task)
                .map_err(|source| ConversionError::InvalidTree {
                    tree: tree_idx,
                    source,
                })?;
        }

        Ok(Self {
            kind: ModelKind::new(family, task),
            n_features,
            classes,
            trees,
        })
    }

    #[inline]
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    #[inline]
    pub fn task(&self) -> TaskKind {
        self.kind.task
    }

    /// Number of input features recorded at fit time (`n_features_in_`).
    #[inline]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Class labels (empty for regressors).
    #[inline]
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// Fitted trees in estimator order.
    #[inline]
    pub fn trees(&self) -> &[SkTree] {
        &self.trees
    }

    /// Number of trees.
    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Extract every tree into a canonical [`Ensemble`].
    ///
    /// scikit-learn sends `x <= threshold` to the left child, so trees are
    /// extracted with [`SplitRule::LessOrEqual`].
    pub fn to_ensemble(&self) -> Result<Ensemble, ConversionError> {
        let mut ensemble = Ensemble::new(self.kind, self.n_features).with_classes(self.classes.clone());

        for (tree_idx, sk_tree) in self.trees.iter().enumerate() {
            let tree = extract_tree(&sk_tree.source(self.n_features), SplitRule::LessOrEqual, self.kind.task)
                .map_err(|source| ConversionError::InvalidTree {
                    tree: tree_idx,
                    source,
                })?;
            ensemble.push_tree(tree);
        }

        Ok(ensemble)
    }

    /// Back to the interchange form (single-tree estimators use `tree_`,
    /// ensembles `estimators_`).
    pub fn to_estimator(&self) -> SkEstimator {
        let is_classifier = self.kind.task.is_classification();
        let type_name = estimator_type_name(self.kind.family, is_classifier);
        let (tree_, estimators_) = if is_ensemble_type(type_name) {
            let estimators = self
                .trees
                .iter()
                .map(|tree| SkSubEstimator { tree_: tree.clone() })
                .collect();
            (None, Some(estimators))
        } else {
            (self.trees.first().cloned(), None)
        };

        SkEstimator {
            estimator_type: type_name.to_string(),
            n_features_in_: Some(self.n_features),
            n_outputs_: 1,
            classes_: is_classifier.then(|| self.classes.clone()),
            n_classes_: is_classifier.then_some(self.classes.len()),
            tree_,
            estimators_,
        }
    }
}

/// Estimator class name for a family and task.
///
/// Extra trees always map to the ensemble estimators; a lone `ExtraTree*`
/// is written back as a one-tree ensemble.
pub(crate) fn estimator_type_name(family: ModelFamily, is_classifier: bool) -> &'static str {
    match (family, is_classifier) {
        (ModelFamily::DecisionTree, true) => "DecisionTreeClassifier",
        (ModelFamily::DecisionTree, false) => "DecisionTreeRegressor",
        (ModelFamily::RandomForest, true) => "RandomForestClassifier",
        (ModelFamily::RandomForest, false) => "RandomForestRegressor",
        (ModelFamily::ExtraTrees, true) => "ExtraTreesClassifier",
        (ModelFamily::ExtraTrees, false) => "ExtraTreesRegressor",
    }
}

/// Whether the class name denotes an ensemble holding `estimators_`.
fn is_ensemble_type(type_name: &str) -> bool {
    let name = type_name.rsplit('.').next().unwrap_or(type_name);
    name.starts_with("RandomForest") || name.starts_with("ExtraTrees")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stump() -> Value {
        json!({
            "children_left": [1, -1, -1],
            "children_right": [2, -1, -1],
            "feature": [1, -2, -2],
            "threshold": [0.5, -2.0, -2.0],
            "value": [[[3.0, 1.0]], [[3.0, 0.0]], [[0.0, 1.0]]]
        })
    }

    fn classifier(type_name: &str) -> Value {
        json!({
            "type": type_name,
            "n_features_in_": 3,
            "n_outputs_": 1,
            "classes_": [4, 8],
            "n_classes_": 2,
            "tree_": stump(),
            "estimators_": [{"tree_": stump()}, {"tree_": stump()}]
        })
    }

    #[test]
    fn recognizes_families() {
        let cases = [
            ("DecisionTreeClassifier", ModelFamily::DecisionTree, 1),
            ("sklearn.ensemble.RandomForestClassifier", ModelFamily::RandomForest, 2),
            ("ExtraTreesClassifier", ModelFamily::ExtraTrees, 2),
            ("ExtraTreeClassifier", ModelFamily::ExtraTrees, 1),
        ];
        for (name, family, n_trees) in cases {
            let model = SklearnModel::from_value(classifier(name)).unwrap();
            assert_eq!(model.kind().family, family, "{name}");
            assert_eq!(model.n_trees(), n_trees, "{name}");
            assert_eq!(model.task(), TaskKind::Classification { n_classes: 2 });
            assert_eq!(model.classes(), &[4, 8]);
        }
    }

    #[test]
    fn regressor_from_json_str() {
        let json = json!({
            "type": "DecisionTreeRegressor",
            "n_features_in_": 2,
            "tree_": {
                "children_left": [1, -1, -1],
                "children_right": [2, -1, -1],
                "feature": [0, -2, -2],
                "threshold": [0.0, -2.0, -2.0],
                "value": [[[0.5]], [[-1.0]], [[2.0]]]
            }
        })
        .to_string();

        let model = SklearnModel::from_json_str(&json).unwrap();
        assert_eq!(model.task(), TaskKind::Regression);
        assert!(model.classes().is_empty());

        let ensemble = model.to_ensemble().unwrap();
        assert_eq!(ensemble.n_trees(), 1);
        assert_eq!(ensemble.predict_row(&[0.5, 0.0]), vec![2.0]);
    }

    #[test]
    fn from_reader() {
        let bytes = classifier("RandomForestClassifier").to_string().into_bytes();
        let model = SklearnModel::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(model.n_features(), 3);
    }

    #[test]
    fn to_ensemble_normalizes_leaves() {
        let model = SklearnModel::from_value(classifier("RandomForestClassifier")).unwrap();
        let ensemble = model.to_ensemble().unwrap();

        ensemble.validate().unwrap();
        assert_eq!(ensemble.classes(), &[4, 8]);
        assert_eq!(ensemble.tree(0).predict_row(&[0.0, 0.2, 0.0]), &[1.0, 0.0]);
    }

    #[test]
    fn rejects_unknown_type() {
        let err = SklearnModel::from_value(classifier("GradientBoostingClassifier")).unwrap_err();
        assert!(matches!(err, ConversionError::UnrecognizedModel(name) if name == "GradientBoostingClassifier"));
    }

    #[test]
    fn rejects_multi_output() {
        let mut value = classifier("DecisionTreeClassifier");
        value["n_outputs_"] = json!(2);
        let err = SklearnModel::from_value(value).unwrap_err();
        assert!(matches!(err, ConversionError::MultiOutput(2)));
    }

    #[test]
    fn rejects_missing_fields() {
        let mut value = classifier("RandomForestClassifier");
        value.as_object_mut().unwrap().remove("estimators_");
        let err = SklearnModel::from_value(value).unwrap_err();
        assert!(matches!(err, ConversionError::MissingField("estimators_")));

        let mut value = classifier("DecisionTreeClassifier");
        value.as_object_mut().unwrap().remove("classes_");
        let err = SklearnModel::from_value(value).unwrap_err();
        assert!(matches!(err, ConversionError::MissingField("classes_")));
    }

    #[test]
    fn rejects_empty_ensemble_and_class_mismatch() {
        let mut value = classifier("ExtraTreesClassifier");
        value["estimators_"] = json!([]);
        let err = SklearnModel::from_value(value).unwrap_err();
        assert!(matches!(err, ConversionError::NoEstimators));

        let mut value = classifier("DecisionTreeClassifier");
        value["n_classes_"] = json!(3);
        let err = SklearnModel::from_value(value).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::ClassCountMismatch { n_classes: 3, n_labels: 2 }
        ));
    }

    #[test]
    fn reports_invalid_tree_index() {
        let mut value = classifier("RandomForestClassifier");
        value["estimators_"][1]["tree_"]["children_right"] = json!([7, -1, -1]);

        let err = SklearnModel::from_value(value).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::InvalidTree { tree: 1, source: ExtractError::ChildOutOfBounds { child: 7, .. } }
        ));
    }

    #[test]
    fn rejects_cyclic_tree_at_load() {
        let mut value = classifier("DecisionTreeClassifier");
        value["tree_"]["children_left"] = json!([1, 0, -1]);
        value["tree_"]["children_right"] = json!([2, 2, -1]);
        value["tree_"]["feature"] = json!([1, 0, -2]);

        let err = SklearnModel::from_value(value).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::InvalidTree { tree: 0, source: ExtractError::CycleDetected { node: 0 } }
        ));
    }

    #[test]
    fn rejects_feature_beyond_input_width() {
        let mut value = classifier("DecisionTreeClassifier");
        value["n_features_in_"] = json!(1);

        let err = SklearnModel::from_value(value).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::InvalidTree { source: ExtractError::FeatureOutOfRange { feature: 1, .. }, .. }
        ));
    }

    #[test]
    fn rejects_ragged_arrays() {
        let mut value = classifier("DecisionTreeClassifier");
        value["tree_"]["feature"] = json!([1, -2]);
        let err = SklearnModel::from_value(value).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::ArrayLengthMismatch { tree: 0, field: "feature", expected: 3, actual: 2 }
        ));
    }

    #[test]
    fn estimator_roundtrip() {
        for name in ["DecisionTreeClassifier", "RandomForestClassifier", "ExtraTreeClassifier"] {
            let model = SklearnModel::from_value(classifier(name)).unwrap();
            let json = serde_json::to_string(&model.to_estimator()).unwrap();
            let restored = SklearnModel::from_json_str(&json).unwrap();

            assert_eq!(restored.kind(), model.kind(), "{name}");
            assert_eq!(restored.classes(), model.classes());
            assert_eq!(restored.trees(), model.trees());
        }
    }

    #[test]
    fn malformed_json() {
        let err = SklearnModel::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConversionError::Json(_)));
    }
}
