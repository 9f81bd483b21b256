//! Canonical tree representation (flat node table) and structural validation.
//!
//! This module provides:
//! - [`TreeIr`]: Immutable tree with root at node 0 and cached shape statistics
//! - [`TreeBuilder`]: Incremental construction from individual nodes
//! - [`TreeValidationError`]: Structural validation errors

use serde::{Deserialize, Serialize};

use super::NodeId;
use super::node::{Node, SplitRule};

// ============================================================================
// TreeValidationError
// ============================================================================

/// Structural validation errors for [`TreeIr`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeValidationError {
    /// Tree has no nodes.
    #[error("tree has no nodes")]
    EmptyTree,
    /// Node count does not fit in [`NodeId`].
    #[error("tree has {n_nodes} nodes, more than a node id can address")]
    TooManyNodes { n_nodes: usize },
    /// A child pointer references an out-of-bounds node.
    #[error("node {node} has {side} child {child} but tree has {n_nodes} nodes")]
    ChildOutOfBounds {
        node: NodeId,
        side: &'static str,
        child: NodeId,
        n_nodes: usize,
    },
    /// A node references itself as a child.
    #[error("node {node} references itself as a child")]
    SelfLoop { node: NodeId },
    /// A node was reached by more than one path (DAG).
    #[error("node {node} is reachable by more than one path")]
    DuplicateVisit { node: NodeId },
    /// A cycle was detected during traversal.
    #[error("cycle detected at node {node}")]
    CycleDetected { node: NodeId },
    /// A node exists in storage but is unreachable from the root.
    #[error("node {node} is unreachable from the root")]
    UnreachableNode { node: NodeId },
    /// A split references a feature the tree was not trained on.
    #[error("node {node} splits on feature {feature} but tree has {n_features} features")]
    FeatureOutOfRange {
        node: NodeId,
        feature: u32,
        n_features: usize,
    },
    /// A split threshold is NaN or infinite.
    #[error("node {node} has a non-finite threshold")]
    NonFiniteThreshold { node: NodeId },
    /// A leaf has an empty value vector.
    #[error("leaf {node} has an empty value vector")]
    EmptyLeafValue { node: NodeId },
    /// Leaves disagree on the value vector length.
    #[error("leaf {node} has {actual} values, expected {expected}")]
    LeafWidthMismatch {
        node: NodeId,
        expected: usize,
        actual: usize,
    },
}

// ============================================================================
// TreeIr
// ============================================================================

/// Normalized decision tree.
///
/// Nodes live in a flat table addressed by [`NodeId`]; node 0 is the root.
/// Construction validates that the table forms a proper binary tree, so every
/// `TreeIr` in existence satisfies:
///
/// - every internal node has exactly two in-bounds children
/// - every node is reachable from the root by exactly one path
/// - every root-to-leaf path has at most `depth` edges
/// - every leaf value has exactly `output_width` entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TreeIrData", into = "TreeIrData")]
pub struct TreeIr {
    nodes: Vec<Node>,
    depth: usize,
    n_leaves: usize,
    n_features: usize,
    output_width: usize,
    split_rule: SplitRule,
}

/// Serialized form: only the inputs, the statistics are recomputed on load.
#[derive(Serialize, Deserialize)]
struct TreeIrData {
    nodes: Vec<Node>,
    n_features: usize,
    split_rule: SplitRule,
}

impl TryFrom<TreeIrData> for TreeIr {
    type Error = TreeValidationError;

    fn try_from(data: TreeIrData) -> Result<Self, Self::Error> {
        TreeIr::new(data.nodes, data.n_features, data.split_rule)
    }
}

impl From<TreeIr> for TreeIrData {
    fn from(tree: TreeIr) -> Self {
        Self {
            nodes: tree.nodes,
            n_features: tree.n_features,
            split_rule: tree.split_rule,
        }
    }
}

/// Shape statistics gathered while validating.
struct TreeShape {
    depth: usize,
    n_leaves: usize,
    output_width: usize,
}

impl TreeIr {
    /// Create a tree from its node table.
    ///
    /// `nodes[0]` is the root. Returns an error if the table is not a
    /// well-formed binary tree over `n_features` input features.
    pub fn new(
        nodes: Vec<Node>,
        n_features: usize,
        split_rule: SplitRule,
    ) -> Result<Self, TreeValidationError> {
        let shape = validate_nodes(&nodes, n_features)?;
        Ok(Self {
            nodes,
            depth: shape.depth,
            n_leaves: shape.n_leaves,
            n_features,
            output_width: shape.output_width,
            split_rule,
        })
    }

    /// Re-check the structural invariants.
    ///
    /// Always succeeds for a tree obtained from [`TreeIr::new`]; kept for
    /// callers that want an explicit check before compiling.
    pub fn validate(&self) -> Result<(), TreeValidationError> {
        validate_nodes(&self.nodes, self.n_features).map(|_| ())
    }

    /// All nodes in table order.
    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Get a node by id.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    /// Number of nodes.
    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaves.
    #[inline]
    pub fn n_leaves(&self) -> usize {
        self.n_leaves
    }

    /// Number of internal (split) nodes.
    #[inline]
    pub fn n_internal(&self) -> usize {
        self.nodes.len() - self.n_leaves
    }

    /// Length of the longest root-to-leaf path in edges (0 for a lone leaf).
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Input feature count the tree was trained on.
    #[inline]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Length of every leaf value vector.
    #[inline]
    pub fn output_width(&self) -> usize {
        self.output_width
    }

    /// Boundary convention for threshold-equal inputs.
    #[inline]
    pub fn split_rule(&self) -> SplitRule {
        self.split_rule
    }

    /// Ids of split nodes in table order.
    pub fn split_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.is_leaf())
            .map(|(i, _)| i as NodeId)
    }

    /// Ids of leaf nodes in table order.
    pub fn leaf_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_leaf())
            .map(|(i, _)| i as NodeId)
    }

    /// Traverse the tree by branching and return the reached leaf.
    ///
    /// This is the reference evaluation compiled programs are checked against.
    /// Features beyond the end of `features` read as NaN and go left.
    pub fn leaf_for_row(&self, features: &[f32]) -> NodeId {
        let mut idx: NodeId = 0;

        loop {
            match &self.nodes[idx as usize] {
                Node::Leaf { .. } => return idx,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let fvalue = features.get(*feature as usize).copied().unwrap_or(f32::NAN);
                    idx = if self.split_rule.goes_right(fvalue, *threshold) {
                        *right
                    } else {
                        *left
                    };
                }
            }
        }
    }

    /// Leaf value reached by a single row.
    pub fn predict_row(&self, features: &[f32]) -> &[f32] {
        let leaf = self.leaf_for_row(features);
        self.nodes[leaf as usize]
            .leaf_value()
            .unwrap_or_default()
    }
}

/// Iterative DFS over the node table with color marking.
///
/// 0 = unvisited, 1 = visiting, 2 = done
fn validate_nodes(nodes: &[Node], n_features: usize) -> Result<TreeShape, TreeValidationError> {
    let n_nodes = nodes.len();
    if n_nodes == 0 {
        return Err(TreeValidationError::EmptyTree);
    }
    if n_nodes > NodeId::MAX as usize {
        return Err(TreeValidationError::TooManyNodes { n_nodes });
    }

    let mut color = vec![0u8; n_nodes];
    let mut stack: Vec<(NodeId, u8, usize)> = vec![(0, 0, 0)];
    let mut depth = 0usize;
    let mut n_leaves = 0usize;
    let mut output_width: Option<usize> = None;

    while let Some((node, phase, node_depth)) = stack.pop() {
        let node_usize = node as usize;

        if phase == 1 {
            color[node_usize] = 2;
            continue;
        }

        match color[node_usize] {
            0 => {}
            1 => return Err(TreeValidationError::CycleDetected { node }),
            _ => return Err(TreeValidationError::DuplicateVisit { node }),
        }
        color[node_usize] = 1;
        stack.push((node, 1, node_depth));
        depth = depth.max(node_depth);

        match &nodes[node_usize] {
            Node::Leaf { value } => {
                if value.is_empty() {
                    return Err(TreeValidationError::EmptyLeafValue { node });
                }
                let expected = *output_width.get_or_insert(value.len());
                if value.len() != expected {
                    return Err(TreeValidationError::LeafWidthMismatch {
                        node,
                        expected,
                        actual: value.len(),
                    });
                }
                n_leaves += 1;
            }
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if *feature as usize >= n_features {
                    return Err(TreeValidationError::FeatureOutOfRange {
                        node,
                        feature: *feature,
                        n_features,
                    });
                }
                if !threshold.is_finite() {
                    return Err(TreeValidationError::NonFiniteThreshold { node });
                }
                for (side, child) in [("left", *left), ("right", *right)] {
                    if child == node {
                        return Err(TreeValidationError::SelfLoop { node });
                    }
                    if child as usize >= n_nodes {
                        return Err(TreeValidationError::ChildOutOfBounds {
                            node,
                            side,
                            child,
                            n_nodes,
                        });
                    }
                }

                // Visit children, left first
                stack.push((*right, 0, node_depth + 1));
                stack.push((*left, 0, node_depth + 1));
            }
        }
    }

    if let Some(i) = color.iter().position(|&c| c == 0) {
        return Err(TreeValidationError::UnreachableNode { node: i as NodeId });
    }

    Ok(TreeShape {
        depth,
        n_leaves,
        // Non-empty and fully reachable, so at least one leaf was seen.
        output_width: output_width.unwrap_or(0),
    })
}

// ============================================================================
// TreeBuilder
// ============================================================================

/// Builder for constructing a [`TreeIr`] from individual nodes.
///
/// Nodes are numbered in insertion order; the first node added is the root.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a split node. Returns the node index.
    pub fn add_split(&mut self, feature: u32, threshold: f32, left: NodeId, right: NodeId) -> NodeId {
        let idx = self.nodes.len() as NodeId;
        self.nodes.push(Node::split(feature, threshold, left, right));
        idx
    }

    /// Add a leaf node. Returns the node index.
    pub fn add_leaf(&mut self, value: Vec<f32>) -> NodeId {
        let idx = self.nodes.len() as NodeId;
        self.nodes.push(Node::leaf(value));
        idx
    }

    /// Validate and build the tree.
    pub fn build(self, n_features: usize, split_rule: SplitRule) -> Result<TreeIr, TreeValidationError> {
        TreeIr::new(self.nodes, n_features, split_rule)
    }
}
