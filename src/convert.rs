//! Conversion entry points.
//!
//! ```no_run
//! use forest_tensor::compat::SklearnModel;
//! use forest_tensor::convert::{TensorType, convert};
//!
//! let model = SklearnModel::from_reader(std::fs::File::open("forest.json").unwrap()).unwrap();
//! let compiled = convert(&model, &[("input".to_string(), TensorType::float32([None, Some(20)]))]).unwrap();
//! ```

use crate::compat::sklearn::{ConversionError, SklearnModel};
use crate::compile::Strategy;
use crate::compose::EnsembleProgram;
use crate::config::{ConfigError, ConversionConfig};
use crate::program::CompiledModel;
use crate::repr::{Ensemble, EnsembleValidationError};

// =============================================================================
// Input spec
// =============================================================================

/// Element type of a declared input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Float32,
    Float64,
    Int32,
    Int64,
}

/// Declared input tensor: element type and shape.
///
/// `None` marks an unconstrained dimension (typically the batch size).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorType {
    pub dtype: DType,
    pub shape: Vec<Option<usize>>,
}

impl TensorType {
    pub fn new(dtype: DType, shape: impl Into<Vec<Option<usize>>>) -> Self {
        Self {
            dtype,
            shape: shape.into(),
        }
    }

    /// A float32 tensor of the given shape.
    pub fn float32(shape: impl Into<Vec<Option<usize>>>) -> Self {
        Self::new(DType::Float32, shape)
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Error type for model conversion.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),
    #[error("invalid ensemble: {0}")]
    InvalidEnsemble(#[from] EnsembleValidationError),
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
}

// =============================================================================
// Entry points
// =============================================================================

/// Convert a scikit-learn model with the default configuration.
///
/// `input_spec` must hold exactly one `[batch, n_features]` float32 entry.
pub fn convert(model: &SklearnModel, input_spec: &[(String, TensorType)]) -> Result<CompiledModel, ConvertError> {
    convert_with_config(model, input_spec, &ConversionConfig::default())
}

/// Convert a scikit-learn model.
pub fn convert_with_config(
    model: &SklearnModel,
    input_spec: &[(String, TensorType)],
    config: &ConversionConfig,
) -> Result<CompiledModel, ConvertError> {
    check_input_spec(input_spec, model.n_features())?;
    let ensemble = model.to_ensemble()?;
    convert_ensemble(&ensemble, config)
}

/// Compile an already-extracted ensemble.
///
/// For callers providing trees through their own
/// [`TreeSource`](crate::compat::TreeSource) implementations.
pub fn convert_ensemble(ensemble: &Ensemble, config: &ConversionConfig) -> Result<CompiledModel, ConvertError> {
    config.validate()?;
    ensemble.validate()?;

    let program = EnsembleProgram::compile(ensemble, config.strategy);
    let model = CompiledModel::new(program, config);

    log::info!(
        "converted {} model: {} trees, {} features, output width {}, strategies {}",
        ensemble.kind().family.name(),
        ensemble.n_trees(),
        ensemble.n_features(),
        ensemble.output_width(),
        strategy_summary(&model),
    );

    Ok(model)
}

/// Check the declared input against the model.
///
/// The declared feature width is advisory; the model's own feature count is
/// used and a mismatch is only logged.
fn check_input_spec(input_spec: &[(String, TensorType)], n_features: usize) -> Result<(), ConvertError> {
    let [(name, tensor)] = input_spec else {
        return Err(ConvertError::UnsupportedInput(format!(
            "expected exactly one input, got {}",
            input_spec.len()
        )));
    };

    if tensor.dtype != DType::Float32 {
        return Err(ConvertError::UnsupportedInput(format!(
            "input `{name}` has element type {:?}, only Float32 is supported",
            tensor.dtype
        )));
    }
    if tensor.shape.len() != 2 {
        return Err(ConvertError::UnsupportedInput(format!(
            "input `{name}` has rank {}, expected [batch, n_features]",
            tensor.shape.len()
        )));
    }

    if let Some(declared) = tensor.shape[1] {
        if declared != n_features {
            log::warn!(
                "input `{name}` declares {declared} features but the model was fitted on {n_features}; using {n_features}"
            );
        }
    }

    Ok(())
}

/// Count of trees per strategy, e.g. `gemm=3 traversal_table=1`.
fn strategy_summary(model: &CompiledModel) -> String {
    let strategies = model.strategies();
    [
        Strategy::Gemm,
        Strategy::PerfectTreeTraversal,
        Strategy::TraversalTable,
    ]
    .into_iter()
    .filter_map(|s| {
        let count = strategies.iter().filter(|&&t| t == s).count();
        (count > 0).then(|| format!("{s}={count}"))
    })
    .collect::<Vec<_>>()
    .join(" ")
}
