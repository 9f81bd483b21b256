//! Shared fixtures for integration tests.
//!
//! For assertion helpers, use `forest_tensor::testing`.

#![allow(dead_code)]

use forest_tensor::compat::sklearn::ReferencePrediction;
use forest_tensor::testing::assert_allclose;
use forest_tensor::testing::data::{random_features, random_labels, random_targets};
use forest_tensor::testing::fit::{FitParams, Target, fit};
use forest_tensor::{CompiledModel, ConversionConfig, ModelFamily, SklearnModel, StrategyChoice, TensorType};
use ndarray::{Array2, ArrayView2};

pub const N_ROWS: usize = 100;
pub const N_FEATURES: usize = 200;

/// Task of a fixture model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Binary,
    Multiclass,
    Regression,
}

impl Task {
    pub fn labels(self) -> &'static [i64] {
        match self {
            Task::Binary => &[0, 1],
            Task::Multiclass => &[0, 1, 2],
            Task::Regression => &[],
        }
    }
}

/// Random `[N_ROWS, N_FEATURES]` features.
pub fn features(seed: u64) -> Array2<f32> {
    random_features(N_ROWS, N_FEATURES, seed)
}

/// Fit a fixture model on `x`.
///
/// Regression targets are positive, so ensemble means carry no cancellation
/// and the default relative tolerance applies.
pub fn fit_model(
    family: ModelFamily,
    task: Task,
    x: ArrayView2<'_, f32>,
    max_depth: Option<usize>,
    seed: u64,
) -> SklearnModel {
    let params = FitParams::builder()
        .n_estimators(5)
        .maybe_max_depth(max_depth)
        .seed(seed)
        .build();

    match task {
        Task::Regression => {
            let y = random_targets(x.nrows(), seed + 1, 1.0, 10.0);
            fit(family, x, Target::Values(&y), &params)
        }
        _ => {
            let y = random_labels(x.nrows(), task.labels(), seed + 1);
            fit(family, x, Target::Classes(&y), &params)
        }
    }
}

/// Single float32 `[batch, n_features]` input declaration.
pub fn input_spec(n_features: usize) -> Vec<(String, TensorType)> {
    vec![("input".to_string(), TensorType::float32([None, Some(n_features)]))]
}

/// Convert with the given strategy choice, single-threaded.
pub fn compile(model: &SklearnModel, strategy: StrategyChoice) -> CompiledModel {
    let config = ConversionConfig::builder()
        .strategy(strategy)
        .n_threads(1)
        .build()
        .expect("valid config");
    forest_tensor::convert_with_config(model, &input_spec(model.n_features()), &config)
        .expect("conversion succeeds")
}

/// Largest minus second-largest probability.
pub fn top2_margin(row: &[f64]) -> f64 {
    let mut sorted = row.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    match sorted.as_slice() {
        [first, second, ..] => first - second,
        _ => f64::INFINITY,
    }
}

/// Compare a compiled model against the reference evaluation on `x`.
///
/// Probabilities and values must agree within the default tolerances.
/// Labels must equal the argmax of the compiled probabilities, and equal the
/// reference label wherever the reference top-2 margin rules out a rounding
/// tie.
pub fn assert_matches_reference(
    model: &SklearnModel,
    compiled: &CompiledModel,
    x: ArrayView2<'_, f32>,
    context: &str,
) {
    match model.predict(x).expect("reference prediction") {
        ReferencePrediction::Values(expected) => {
            let actual = compiled.predict_values(x).expect("regressor predicts values");
            assert_allclose(
                &actual.to_vec(),
                &expected.to_vec(),
                context,
            );
        }
        ReferencePrediction::Labels(expected_labels) => {
            let expected_proba = model.predict_proba(x).expect("classifier has probabilities");
            let proba = compiled.predict_proba(x).expect("classifier predicts probabilities");
            assert_eq!(proba.dim(), expected_proba.dim(), "{context}: probability shape");
            assert_allclose(
                &proba.iter().copied().collect::<Vec<_>>(),
                &expected_proba.iter().copied().collect::<Vec<_>>(),
                context,
            );

            let labels = compiled.predict_labels(x).expect("classifier predicts labels");
            assert_eq!(labels.len(), x.nrows(), "{context}: label count");
            for (row, (&label, &expected)) in labels.iter().zip(&expected_labels).enumerate() {
                let compiled_row = proba.row(row);
                let best = (0..compiled_row.len())
                    .fold(0, |best, j| if compiled_row[j] > compiled_row[best] { j } else { best });
                assert_eq!(label, compiled.classes()[best], "{context}: row {row} label vs probabilities");

                let reference_row = expected_proba.row(row).to_vec();
                if top2_margin(&reference_row) > 1e-5 {
                    assert_eq!(label, expected, "{context}: row {row} label vs reference");
                }
            }
        }
    }
}
