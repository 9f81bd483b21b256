//! scikit-learn tree model support.
//!
//! This module provides parsing of scikit-learn fitted-estimator JSON,
//! conversion to native forest-tensor types, and a reference branching
//! predictor reproducing the library's own `predict` / `predict_proba`.

mod convert;
mod json;
mod predict;

pub use convert::{ConversionError, SklearnModel};
pub(crate) use convert::estimator_type_name;
pub use json::*;
pub use predict::ReferencePrediction;
