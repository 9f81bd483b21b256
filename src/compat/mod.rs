//! External format compatibility.
//!
//! - [`extract`]: the [`TreeSource`] seam any training library can implement,
//!   and the extractor turning it into [`TreeIr`](crate::repr::TreeIr)
//! - [`sklearn`]: scikit-learn fitted-estimator JSON and reference prediction

pub mod extract;
pub mod sklearn;

pub use extract::{ExtractError, SourceNode, TreeSource, extract_tree};
pub use sklearn::{ConversionError, SklearnModel};
