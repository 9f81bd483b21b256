//! Fixture tree growers producing scikit-learn-shaped fitted models.
//!
//! A small CART implementation: Gini impurity for classifiers, squared error
//! for regressors, best-split search (decision trees, random forests) or
//! random thresholds (extra trees), and bootstrap resampling for random
//! forests. Node arrays follow scikit-learn's layout (depth-first ids, `-1`
//! children and `-2` feature/threshold at leaves, raw class counts in leaf
//! values), so fitted models exercise the same paths as exported ones.

use bon::Builder;
use ndarray::ArrayView2;
use rand::prelude::*;

use crate::compat::sklearn::{
    SkEstimator, SkSubEstimator, SkTree, SklearnModel, TREE_LEAF, estimator_type_name,
};
use crate::repr::ModelFamily;

/// Feature/threshold marker at leaves.
const TREE_UNDEFINED: i64 = -2;

/// Training target.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// Class labels.
    Classes(&'a [i64]),
    /// Regression values.
    Values(&'a [f64]),
}

/// Growth parameters.
#[derive(Debug, Clone, Builder)]
pub struct FitParams {
    /// Trees per ensemble (ignored for single decision trees). Default: 10.
    #[builder(default = 10)]
    pub n_estimators: usize,
    /// Maximum depth; `None` grows until leaves are pure.
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node. Default: 2.
    #[builder(default = 2)]
    pub min_samples_split: usize,
    /// Features considered per split. Default: `sqrt` for ensemble
    /// classifiers, all features otherwise.
    pub max_features: Option<usize>,
    #[builder(default = 0)]
    pub seed: u64,
}

impl Default for FitParams {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Fit a decision tree classifier.
pub fn fit_decision_tree_classifier(x: ArrayView2<'_, f32>, y: &[i64], max_depth: Option<usize>) -> SklearnModel {
    let params = FitParams::builder().maybe_max_depth(max_depth).build();
    fit(ModelFamily::DecisionTree, x, Target::Classes(y), &params)
}

/// Fit a decision tree regressor.
pub fn fit_decision_tree_regressor(x: ArrayView2<'_, f32>, y: &[f64], max_depth: Option<usize>) -> SklearnModel {
    let params = FitParams::builder().maybe_max_depth(max_depth).build();
    fit(ModelFamily::DecisionTree, x, Target::Values(y), &params)
}

/// Fit a model of `family`.
///
/// # Panics
///
/// Panics if `x` and the target disagree on the number of rows or if `x` has
/// no rows.
pub fn fit(family: ModelFamily, x: ArrayView2<'_, f32>, target: Target<'_>, params: &FitParams) -> SklearnModel {
    let n_rows = x.nrows();
    let n_features = x.ncols();
    assert!(n_rows > 0, "cannot fit on an empty batch");

    let (encoded, classes) = match target {
        Target::Classes(labels) => {
            assert_eq!(labels.len(), n_rows, "labels length must match X rows");
            let mut classes = labels.to_vec();
            classes.sort_unstable();
            classes.dedup();
            let idx: Vec<usize> = labels
                .iter()
                .map(|l| classes.binary_search(l).unwrap_or_default())
                .collect();
            (Encoded::Classes { idx, n_classes: classes.len() }, Some(classes))
        }
        Target::Values(values) => {
            assert_eq!(values.len(), n_rows, "targets length must match X rows");
            (Encoded::Values(values.to_vec()), None)
        }
    };
    let is_classifier = classes.is_some();

    let (n_trees, bootstrap, splitter) = match family {
        ModelFamily::DecisionTree => (1, false, Splitter::Best),
        ModelFamily::RandomForest => (params.n_estimators.max(1), true, Splitter::Best),
        ModelFamily::ExtraTrees => (params.n_estimators.max(1), false, Splitter::Random),
    };
    let max_features = params
        .max_features
        .unwrap_or(if is_classifier && family != ModelFamily::DecisionTree {
            (n_features as f64).sqrt().floor().max(1.0) as usize
        } else {
            n_features
        })
        .clamp(1, n_features.max(1));

    let trees: Vec<SkTree> = (0..n_trees)
        .map(|tree_idx| {
            let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(tree_idx as u64));
            let samples: Vec<usize> = if bootstrap {
                (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect()
            } else {
                (0..n_rows).collect()
            };
            let mut grower = Grower {
                x,
                target: &encoded,
                splitter,
                max_depth: params.max_depth,
                min_samples_split: params.min_samples_split.max(2),
                max_features,
                rng,
                tree: empty_tree(),
            };
            grower.grow(samples, 0);
            grower.finish()
        })
        .collect();

    let type_name = estimator_type_name(family, is_classifier);

    let (tree_, estimators_) = if family == ModelFamily::DecisionTree {
        (trees.into_iter().next(), None)
    } else {
        let estimators = trees.into_iter().map(|tree_| SkSubEstimator { tree_ }).collect();
        (None, Some(estimators))
    };

    let estimator = SkEstimator {
        estimator_type: type_name.to_string(),
        n_features_in_: Some(n_features),
        n_outputs_: 1,
        n_classes_: classes.as_ref().map(Vec::len),
        classes_: classes,
        tree_,
        estimators_,
    };
    SklearnModel::from_estimator(estimator).expect("fitted estimator is well-formed")
}

// =============================================================================
// Growing
// =============================================================================

enum Encoded {
    Classes { idx: Vec<usize>, n_classes: usize },
    Values(Vec<f64>),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Splitter {
    Best,
    Random,
}

struct Split {
    feature: usize,
    threshold: f64,
    /// Weighted child impurity (lower is better).
    score: f64,
}

struct Grower<'a, 'x> {
    x: ArrayView2<'x, f32>,
    target: &'a Encoded,
    splitter: Splitter,
    max_depth: Option<usize>,
    min_samples_split: usize,
    max_features: usize,
    rng: StdRng,
    tree: SkTree,
}

fn empty_tree() -> SkTree {
    SkTree {
        children_left: Vec::new(),
        children_right: Vec::new(),
        feature: Vec::new(),
        threshold: Vec::new(),
        value: Vec::new(),
        node_count: None,
        max_depth: None,
    }
}

impl Grower<'_, '_> {
    /// Grow the subtree for `samples` depth-first. Returns its node id.
    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let node = self.tree.children_left.len();
        self.tree.children_left.push(TREE_LEAF);
        self.tree.children_right.push(TREE_LEAF);
        self.tree.feature.push(TREE_UNDEFINED);
        self.tree.threshold.push(TREE_UNDEFINED as f64);
        self.tree.value.push(vec![self.node_value(&samples)]);
        self.tree.max_depth = Some(self.tree.max_depth.unwrap_or(0).max(depth));

        let depth_reached = self.max_depth.is_some_and(|d| depth >= d);
        if depth_reached || samples.len() < self.min_samples_split || self.impurity(&samples) <= 0.0 {
            return node;
        }

        let Some(split) = self.find_split(&samples) else {
            return node;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| (self.x[[i, split.feature]] as f64) <= split.threshold);

        self.tree.feature[node] = split.feature as i64;
        self.tree.threshold[node] = split.threshold;
        let left_id = self.grow(left, depth + 1);
        let right_id = self.grow(right, depth + 1);
        self.tree.children_left[node] = left_id as i64;
        self.tree.children_right[node] = right_id as i64;
        node
    }

    fn finish(mut self) -> SkTree {
        self.tree.node_count = Some(self.tree.children_left.len());
        self.tree
    }

    /// Raw class counts, or the mean target.
    fn node_value(&self, samples: &[usize]) -> Vec<f64> {
        match self.target {
            Encoded::Classes { idx, n_classes } => {
                let mut counts = vec![0.0; *n_classes];
                for &i in samples {
                    counts[idx[i]] += 1.0;
                }
                counts
            }
            Encoded::Values(values) => {
                let sum: f64 = samples.iter().map(|&i| values[i]).sum();
                vec![sum / samples.len().max(1) as f64]
            }
        }
    }

    fn impurity(&self, samples: &[usize]) -> f64 {
        let stats = Stats::from_samples(self.target, samples);
        stats.impurity()
    }

    fn find_split(&mut self, samples: &[usize]) -> Option<Split> {
        let n_features = self.x.ncols();
        let features: Vec<usize> = if self.max_features >= n_features {
            (0..n_features).collect()
        } else {
            rand::seq::index::sample(&mut self.rng, n_features, self.max_features).into_vec()
        };

        let mut best: Option<Split> = None;
        for feature in features {
            let candidate = match self.splitter {
                Splitter::Best => self.best_threshold(samples, feature),
                Splitter::Random => self.random_threshold(samples, feature),
            };
            if let Some(c) = candidate {
                if best.as_ref().is_none_or(|b| c.score < b.score) {
                    best = Some(c);
                }
            }
        }
        best
    }

    /// Exhaustive sweep over midpoints between consecutive distinct values.
    fn best_threshold(&self, samples: &[usize], feature: usize) -> Option<Split> {
        let mut order: Vec<(f32, usize)> = samples.iter().map(|&i| (self.x[[i, feature]], i)).collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left = Stats::empty(self.target);
        let mut right = Stats::from_samples(self.target, samples);
        let mut best: Option<Split> = None;

        for w in 0..order.len() - 1 {
            let (value, i) = order[w];
            left.add(self.target, i);
            right.remove(self.target, i);

            let next = order[w + 1].0;
            if next <= value {
                continue;
            }
            let score = left.weighted_impurity() + right.weighted_impurity();
            if best.as_ref().is_none_or(|b| score < b.score) {
                best = Some(Split {
                    feature,
                    threshold: (value as f64 + next as f64) / 2.0,
                    score,
                });
            }
        }
        best
    }

    /// One uniform threshold in `[min, max)` of the node's values.
    fn random_threshold(&mut self, samples: &[usize], feature: usize) -> Option<Split> {
        let (min, max) = samples.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &i| {
            let v = self.x[[i, feature]];
            (lo.min(v), hi.max(v))
        });
        if max <= min {
            return None;
        }

        let threshold = self.rng.gen_range(min as f64..max as f64);
        let mut left = Stats::empty(self.target);
        let mut right = Stats::empty(self.target);
        for &i in samples {
            if (self.x[[i, feature]] as f64) <= threshold {
                left.add(self.target, i);
            } else {
                right.add(self.target, i);
            }
        }

        Some(Split {
            feature,
            threshold,
            score: left.weighted_impurity() + right.weighted_impurity(),
        })
    }
}

// =============================================================================
// Impurity statistics
// =============================================================================

/// Running sufficient statistics of a sample set.
enum Stats {
    Gini { counts: Vec<f64>, n: f64 },
    Mse { sum: f64, sum_sq: f64, n: f64 },
}

impl Stats {
    fn empty(target: &Encoded) -> Self {
        match target {
            Encoded::Classes { n_classes, .. } => Self::Gini {
                counts: vec![0.0; *n_classes],
                n: 0.0,
            },
            Encoded::Values(_) => Self::Mse {
                sum: 0.0,
                sum_sq: 0.0,
                n: 0.0,
            },
        }
    }

    fn from_samples(target: &Encoded, samples: &[usize]) -> Self {
        let mut stats = Self::empty(target);
        for &i in samples {
            stats.add(target, i);
        }
        stats
    }

    fn add(&mut self, target: &Encoded, i: usize) {
        self.update(target, i, 1.0);
    }

    fn remove(&mut self, target: &Encoded, i: usize) {
        self.update(target, i, -1.0);
    }

    fn update(&mut self, target: &Encoded, i: usize, sign: f64) {
        match (self, target) {
            (Self::Gini { counts, n }, Encoded::Classes { idx, .. }) => {
                counts[idx[i]] += sign;
                *n += sign;
            }
            (Self::Mse { sum, sum_sq, n }, Encoded::Values(values)) => {
                let v = values[i];
                *sum += sign * v;
                *sum_sq += sign * v * v;
                *n += sign;
            }
            _ => unreachable!("statistics kind follows the target kind"),
        }
    }

    /// Impurity per sample.
    fn impurity(&self) -> f64 {
        match self {
            Self::Gini { counts, n } => {
                if *n <= 0.0 {
                    return 0.0;
                }
                1.0 - counts.iter().map(|c| (c / n) * (c / n)).sum::<f64>()
            }
            Self::Mse { sum, sum_sq, n } => {
                if *n <= 0.0 {
                    return 0.0;
                }
                let mean = sum / n;
                (sum_sq / n - mean * mean).max(0.0)
            }
        }
    }

    fn weighted_impurity(&self) -> f64 {
        let n = match self {
            Self::Gini { n, .. } | Self::Mse { n, .. } => *n,
        };
        n * self.impurity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::TaskKind;
    use crate::testing::data::{random_features, random_labels, random_targets};
    use ndarray::array;

    #[test]
    fn separable_classes_get_one_split() {
        let x = array![[0.0f32], [1.0], [2.0], [3.0]];
        let y = [7, 7, 9, 9];

        let model = fit_decision_tree_classifier(x.view(), &y, None);
        let tree = &model.trees()[0];

        assert_eq!(model.classes(), &[7, 9]);
        assert_eq!(tree.children_left, vec![1, -1, -1]);
        assert_eq!(tree.children_right, vec![2, -1, -1]);
        assert_eq!(tree.threshold[0], 1.5);
        assert_eq!(tree.value[1], vec![vec![2.0, 0.0]]);
        assert_eq!(tree.max_depth, Some(1));
    }

    #[test]
    fn max_depth_is_respected() {
        let x = random_features(80, 5, 1);
        let y = random_labels(80, &[0, 1, 2], 2);

        for depth in [1, 3, 5] {
            let model = fit_decision_tree_classifier(x.view(), &y, Some(depth));
            let ensemble = model.to_ensemble().unwrap();
            assert!(ensemble.tree(0).depth() <= depth);
        }
    }

    #[test]
    fn unconstrained_tree_fits_training_data() {
        let x = random_features(60, 4, 3);
        let y = random_labels(60, &[0, 1], 4);

        let model = fit_decision_tree_classifier(x.view(), &y, None);
        let crate::compat::sklearn::ReferencePrediction::Labels(pred) = model.predict(x.view()).unwrap() else {
            panic!("classifier must predict labels");
        };
        assert_eq!(pred.to_vec(), y);
    }

    #[test]
    fn ensembles_have_requested_size() {
        let x = random_features(50, 9, 5);
        let y = random_targets(50, 6, -1.0, 1.0);
        let params = FitParams::builder().n_estimators(4).max_depth(3).seed(11).build();

        for family in [ModelFamily::RandomForest, ModelFamily::ExtraTrees] {
            let model = fit(family, x.view(), Target::Values(&y), &params);
            assert_eq!(model.n_trees(), 4);
            assert_eq!(model.task(), TaskKind::Regression);
            assert_eq!(model.kind().family, family);
        }
    }

    #[test]
    fn fitting_is_deterministic() {
        let x = random_features(40, 6, 7);
        let y = random_labels(40, &[0, 1], 8);
        let params = FitParams::builder().n_estimators(3).seed(42).build();

        let a = fit(ModelFamily::ExtraTrees, x.view(), Target::Classes(&y), &params);
        let b = fit(ModelFamily::ExtraTrees, x.view(), Target::Classes(&y), &params);
        assert_eq!(a.trees(), b.trees());
    }
}
