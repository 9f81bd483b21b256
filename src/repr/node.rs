//! Tree node types.

use serde::{Deserialize, Serialize};

use super::NodeId;

/// Boundary convention of the library that trained the tree.
///
/// Decides which child an input exactly equal to the threshold goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SplitRule {
    /// Go left iff `x <= threshold`; the right branch is taken iff `x > threshold`.
    ///
    /// This is the scikit-learn convention.
    #[default]
    LessOrEqual,
    /// Go left iff `x < threshold`; the right branch is taken iff `x >= threshold`.
    Less,
}

impl SplitRule {
    /// Evaluate the split. Returns true for right, false for left.
    #[inline]
    pub fn goes_right(self, value: f32, threshold: f32) -> bool {
        match self {
            SplitRule::LessOrEqual => value > threshold,
            SplitRule::Less => value >= threshold,
        }
    }
}

/// A node in a decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Internal split node.
    Split {
        feature: u32,
        threshold: f32,
        left: NodeId,
        right: NodeId,
    },
    /// Leaf node with its value distribution.
    ///
    /// Class probabilities for classifiers, a single value for regressors.
    Leaf { value: Vec<f32> },
}

impl Node {
    /// Create a new split node.
    pub fn split(feature: u32, threshold: f32, left: NodeId, right: NodeId) -> Self {
        Self::Split {
            feature,
            threshold,
            left,
            right,
        }
    }

    /// Create a new leaf node.
    pub fn leaf(value: Vec<f32>) -> Self {
        Self::Leaf { value }
    }

    /// Returns true if this is a leaf node.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf { .. })
    }

    /// Get the leaf value, if this is a leaf.
    #[inline]
    pub fn leaf_value(&self) -> Option<&[f32]> {
        match self {
            Self::Leaf { value } => Some(value),
            Self::Split { .. } => None,
        }
    }

    /// Get `(feature, threshold)`, if this is a split node.
    #[inline]
    pub fn condition(&self) -> Option<(u32, f32)> {
        match self {
            Self::Split {
                feature, threshold, ..
            } => Some((*feature, *threshold)),
            Self::Leaf { .. } => None,
        }
    }

    /// Get child indices, if this is a split node.
    #[inline]
    pub fn children(&self) -> Option<(NodeId, NodeId)> {
        match self {
            Self::Split { left, right, .. } => Some((*left, *right)),
            Self::Leaf { .. } => None,
        }
    }
}
