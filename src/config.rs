//! Conversion configuration with builder pattern.
//!
//! [`ConversionConfig`] controls how trees are compiled and how the resulting
//! program executes. It uses the `bon` crate for builder generation with
//! validation at build time.
//!
//! # Example
//!
//! ```
//! use forest_tensor::config::ConversionConfig;
//! use forest_tensor::compile::{Strategy, StrategyChoice};
//!
//! // All defaults
//! let config = ConversionConfig::builder().build().unwrap();
//!
//! // Force the GEMM encoding on every tree, single-threaded
//! let config = ConversionConfig::builder()
//!     .strategy(StrategyChoice::Fixed(Strategy::Gemm))
//!     .n_threads(1)
//!     .block_size(1024)
//!     .build()
//!     .unwrap();
//! ```

use bon::Builder;

use crate::compile::StrategyChoice;
use crate::utils::Parallelism;

/// Default number of rows per block.
pub const DEFAULT_BLOCK_SIZE: usize = 256;

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Block size must be at least 1.
    InvalidBlockSize,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBlockSize => write!(f, "block_size must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

// =============================================================================
// ConversionConfig
// =============================================================================

/// Configuration for model conversion and prediction.
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct ConversionConfig {
    /// How tree encodings are chosen. Default: per-tree automatic selection.
    #[builder(default)]
    pub strategy: StrategyChoice,

    /// Number of threads for prediction.
    ///
    /// - 0: auto (the current rayon pool, if it has more than one thread)
    /// - 1: sequential
    /// - >1: a dedicated pool of exactly `n_threads` threads per call
    #[builder(default)]
    pub n_threads: usize,

    /// Rows per prediction block. Default: 256.
    #[builder(default = DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,
}

/// Custom finishing function that validates the config.
impl<S: conversion_config_builder::IsComplete> ConversionConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBlockSize`] if `block_size == 0`.
    pub fn build(self) -> Result<ConversionConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl ConversionConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::InvalidBlockSize);
        }
        Ok(())
    }

    /// Parallelism implied by `n_threads`.
    pub fn parallelism(&self) -> Parallelism {
        Parallelism::from_threads(self.n_threads)
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self::builder().build().expect("default config is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::Strategy;

    #[test]
    fn default_config() {
        let config = ConversionConfig::default();
        assert_eq!(config.strategy, StrategyChoice::Auto);
        assert_eq!(config.n_threads, 0);
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn builder_overrides() {
        let config = ConversionConfig::builder()
            .strategy(StrategyChoice::Fixed(Strategy::PerfectTreeTraversal))
            .n_threads(1)
            .block_size(7)
            .build()
            .unwrap();

        assert_eq!(config.strategy, StrategyChoice::Fixed(Strategy::PerfectTreeTraversal));
        assert_eq!(config.parallelism(), Parallelism::Sequential);
        assert_eq!(config.block_size, 7);
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let result = ConversionConfig::builder().block_size(0).build();
        assert_eq!(result.unwrap_err(), ConfigError::InvalidBlockSize);
        assert_eq!(
            ConfigError::InvalidBlockSize.to_string(),
            "block_size must be at least 1"
        );
    }
}
