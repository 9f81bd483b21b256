//! Canonical intermediate representation of decision trees and ensembles.
//!
//! - [`TreeIr`]: one tree as a flat node table (arena), root at index 0
//! - [`Ensemble`]: ordered trees plus the model family and task
//!
//! Both are plain data: they derive `serde` traits and are never mutated once
//! handed to the compiler.

/// Canonical node identifier.
///
/// Internally this is just an index into the tree's node table.
pub type NodeId = u32;

pub mod ensemble;
pub mod node;
pub mod tree;

pub use ensemble::{Ensemble, EnsembleValidationError, ModelFamily, ModelKind, TaskKind};
pub use node::{Node, SplitRule};
pub use tree::{TreeBuilder, TreeIr, TreeValidationError};
