//! forest-tensor: compile decision-tree ensembles into tensor programs.
//!
//! Fitted scikit-learn tree models (decision trees, random forests and extra
//! trees, classifiers and regressors) are extracted into a canonical tree
//! representation and compiled per tree into one of three batch evaluation
//! strategies:
//!
//! - **GEMM**: split decisions as matrix products, for shallow trees.
//! - **Traversal table**: node-indexed lookups advanced level by level.
//! - **Perfect tree**: implicit complete-tree layout, one comparison per level.
//!
//! The resulting [`CompiledModel`] predicts labels, probabilities or values
//! for `[batch, n_features]` f32 arrays.

pub mod compat;
pub mod compile;
pub mod compose;
pub mod config;
pub mod convert;
pub mod program;
pub mod repr;
pub mod testing;
pub mod utils;

pub use approx;

pub use compat::SklearnModel;
pub use compile::{Strategy, StrategyChoice};
pub use config::{ConfigError, ConversionConfig};
pub use convert::{ConvertError, DType, TensorType, convert, convert_ensemble, convert_with_config};
pub use program::{CompiledModel, PredictError, Prediction};
pub use repr::{Ensemble, ModelFamily, ModelKind, SplitRule, TaskKind, TreeIr};
pub use utils::Parallelism;
