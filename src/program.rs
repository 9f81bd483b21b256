//! Callable compiled model.
//!
//! [`CompiledModel`] wraps an [`EnsembleProgram`] with input validation and
//! block-wise (optionally parallel) execution. Prediction never mutates the
//! model, so one instance can serve concurrent callers.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::compile::Strategy;
use crate::compose::EnsembleProgram;
use crate::config::ConversionConfig;
use crate::repr::{ModelKind, TaskKind};
use crate::utils::{Parallelism, run_with_threads};

/// Errors returned by prediction calls.
///
/// A failed call leaves the model untouched and usable. Non-finite input is
/// always rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PredictError {
    /// Input feature width differs from the model's.
    #[error("X has {actual} features, model expects {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
    /// Input contains NaN or an infinity.
    #[error("X contains a non-finite value at row {row}, column {col}")]
    NonFiniteInput { row: usize, col: usize },
    /// The requested output does not exist for this model's task.
    #[error("{output} is not available for {task} models")]
    UnsupportedOutput {
        output: &'static str,
        task: &'static str,
    },
}

/// Model predictions for a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// Classifier output.
    Classification {
        /// Predicted label per row, `[batch]`.
        labels: Array1<i64>,
        /// Class probabilities, `[batch, n_classes]`.
        probabilities: Array2<f32>,
    },
    /// Regressor output, `[batch]`.
    Regression(Array1<f32>),
}

/// A converted model, callable on `[batch, n_features]` f32 arrays.
#[derive(Debug, Clone)]
pub struct CompiledModel {
    program: EnsembleProgram,
    n_threads: usize,
    block_size: usize,
}

impl CompiledModel {
    /// Wrap a compiled ensemble with execution settings from `config`.
    pub fn new(program: EnsembleProgram, config: &ConversionConfig) -> Self {
        Self {
            program,
            n_threads: config.n_threads,
            block_size: config.block_size.max(1),
        }
    }

    /// Override the thread count used by prediction calls
    /// (0 = auto, 1 = sequential, >1 = exact).
    pub fn with_n_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads;
        self
    }

    /// Input feature count.
    #[inline]
    pub fn n_features(&self) -> usize {
        self.program.n_features()
    }

    #[inline]
    pub fn kind(&self) -> ModelKind {
        self.program.kind()
    }

    /// Number of trees.
    #[inline]
    pub fn n_trees(&self) -> usize {
        self.program.n_trees()
    }

    /// Class labels (empty for regressors).
    #[inline]
    pub fn classes(&self) -> &[i64] {
        self.program.classes()
    }

    /// Strategy used for each tree.
    pub fn strategies(&self) -> Vec<Strategy> {
        self.program.strategies()
    }

    /// Thread count for prediction calls.
    #[inline]
    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    /// Parallelism implied by [`n_threads`](Self::n_threads).
    #[inline]
    pub fn parallelism(&self) -> Parallelism {
        Parallelism::from_threads(self.n_threads)
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Underlying ensemble program.
    pub fn program(&self) -> &EnsembleProgram {
        &self.program
    }

    fn check_input(&self, x: &ArrayView2<'_, f32>) -> Result<(), PredictError> {
        if x.ncols() != self.n_features() {
            return Err(PredictError::ShapeMismatch {
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }
        if let Some(((row, col), _)) = x.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(PredictError::NonFiniteInput { row, col });
        }
        Ok(())
    }

    /// Mean per-tree output, `[batch, output_width]`.
    ///
    /// Class probabilities for classifiers, a single column for regressors.
    pub fn raw_output(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, PredictError> {
        self.check_input(&x)?;

        let mut output = Array2::<f32>::zeros((x.nrows(), self.program.output_width()));

        run_with_threads(self.n_threads, |parallelism| {
            let x_chunks = x.axis_chunks_iter(Axis(0), self.block_size);
            let out_chunks = output.axis_chunks_iter_mut(Axis(0), self.block_size);
            parallelism.maybe_par_bridge_for_each(x_chunks.zip(out_chunks), |(x_block, out_block)| {
                self.program.raw_output_into(x_block, out_block);
            });
        });

        Ok(output)
    }

    /// Predict a batch.
    pub fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Prediction, PredictError> {
        let raw = self.raw_output(x)?;

        Ok(match self.kind().task {
            TaskKind::Classification { .. } => Prediction::Classification {
                labels: self.program.labels(raw.view()),
                probabilities: raw,
            },
            TaskKind::Regression => Prediction::Regression(raw.index_axis_move(Axis(1), 0)),
        })
    }

    /// Class probabilities, `[batch, n_classes]`.
    pub fn predict_proba(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, PredictError> {
        match self.predict(x)? {
            Prediction::Classification { probabilities, .. } => Ok(probabilities),
            Prediction::Regression(_) => Err(PredictError::UnsupportedOutput {
                output: "predict_proba",
                task: "regression",
            }),
        }
    }

    /// Predicted class labels, `[batch]`.
    pub fn predict_labels(&self, x: ArrayView2<'_, f32>) -> Result<Array1<i64>, PredictError> {
        match self.predict(x)? {
            Prediction::Classification { labels, .. } => Ok(labels),
            Prediction::Regression(_) => Err(PredictError::UnsupportedOutput {
                output: "predict_labels",
                task: "regression",
            }),
        }
    }

    /// Regression values, `[batch]`.
    pub fn predict_values(&self, x: ArrayView2<'_, f32>) -> Result<Array1<f32>, PredictError> {
        match self.predict(x)? {
            Prediction::Regression(values) => Ok(values),
            Prediction::Classification { .. } => Err(PredictError::UnsupportedOutput {
                output: "predict_values",
                task: "classification",
            }),
        }
    }
}
