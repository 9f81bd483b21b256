//! Extraction of foreign tree node arrays into [`TreeIr`].
//!
//! A training library exposes each fitted tree through [`TreeSource`]; the
//! extractor walks it from the root, renumbers nodes in preorder, narrows
//! thresholds to `f32` and normalizes classifier leaves.

use crate::repr::{Node, NodeId, SplitRule, TaskKind, TreeIr, TreeValidationError};
use crate::utils::{narrow_down, narrow_up};

// =============================================================================
// Source trait
// =============================================================================

/// A node as stored by the source library.
///
/// Indices are signed because foreign formats use negative sentinels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceNode<'a> {
    Split {
        feature: i64,
        threshold: f64,
        left: i64,
        right: i64,
    },
    Leaf {
        /// Raw leaf value: class counts or fractions for classifiers,
        /// a single value for regressors.
        value: &'a [f64],
    },
}

/// Read access to a fitted tree's native node arrays.
///
/// Node 0 is the root. Implementations only need to describe nodes; all
/// structural checks happen in [`extract_tree`].
pub trait TreeSource {
    /// Number of nodes in storage.
    fn n_nodes(&self) -> usize;

    /// Number of input features the tree was trained on.
    fn n_features(&self) -> usize;

    /// Node at storage index `idx`.
    fn node(&self, idx: usize) -> SourceNode<'_>;
}

// =============================================================================
// Errors
// =============================================================================

/// Error type for tree extraction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractError {
    #[error("tree has no nodes")]
    EmptyTree,
    #[error("tree has {n_nodes} nodes, node indices cannot be represented")]
    TreeTooLarge { n_nodes: usize },
    #[error("node {node} has {side} child {child} but tree has {n_nodes} nodes")]
    ChildOutOfBounds {
        node: usize,
        side: &'static str,
        child: i64,
        n_nodes: usize,
    },
    #[error("node {node} references itself as a child")]
    SelfLoop { node: usize },
    #[error("cycle detected at node {node}")]
    CycleDetected { node: usize },
    #[error("node {node} is reachable by more than one path")]
    DuplicateVisit { node: usize },
    #[error("node {node} is unreachable from the root")]
    UnreachableNode { node: usize },
    #[error("node {node} splits on feature {feature} but tree has {n_features} features")]
    FeatureOutOfRange {
        node: usize,
        feature: i64,
        n_features: usize,
    },
    #[error("leaf {node} has {actual} values, expected {expected}")]
    LeafWidthMismatch {
        node: usize,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Invalid(#[from] TreeValidationError),
}

// =============================================================================
// Extraction
// =============================================================================

enum Visit {
    Enter {
        src: usize,
        /// Already-emitted parent and whether this node is its right child.
        parent: Option<(NodeId, bool)>,
    },
    Exit {
        src: usize,
    },
}

/// Extract a tree into the canonical representation.
///
/// `split_rule` is the source library's boundary convention and decides the
/// rounding direction of threshold narrowing. For classification, leaf
/// distributions are scaled to sum to 1 (all-zero leaves stay zero).
pub fn extract_tree<S: TreeSource + ?Sized>(
    source: &S,
    split_rule: SplitRule,
    task: TaskKind,
) -> Result<TreeIr, ExtractError> {
    let n_nodes = source.n_nodes();
    let n_features = source.n_features();
    if n_nodes == 0 {
        return Err(ExtractError::EmptyTree);
    }
    if n_nodes > NodeId::MAX as usize {
        return Err(ExtractError::TreeTooLarge { n_nodes });
    }

    let expected_width = task.output_width();
    let mut nodes: Vec<Node> = Vec::with_capacity(n_nodes);
    // 0 = unvisited, 1 = on current path, 2 = done
    let mut color = vec![0u8; n_nodes];
    let mut stack = vec![Visit::Enter { src: 0, parent: None }];

    while let Some(visit) = stack.pop() {
        let (src, parent) = match visit {
            Visit::Exit { src } => {
                color[src] = 2;
                continue;
            }
            Visit::Enter { src, parent } => (src, parent),
        };

        match color[src] {
            0 => {}
            1 => return Err(ExtractError::CycleDetected { node: src }),
            _ => return Err(ExtractError::DuplicateVisit { node: src }),
        }
        color[src] = 1;

        let new_id = nodes.len() as NodeId;
        if let Some((parent_id, is_right)) = parent {
            if let Node::Split { left, right, .. } = &mut nodes[parent_id as usize] {
                if is_right {
                    *right = new_id;
                } else {
                    *left = new_id;
                }
            }
        }

        match source.node(src) {
            SourceNode::Leaf { value } => {
                if value.len() != expected_width {
                    return Err(ExtractError::LeafWidthMismatch {
                        node: src,
                        expected: expected_width,
                        actual: value.len(),
                    });
                }
                nodes.push(Node::leaf(leaf_value(value, task)));
                color[src] = 2;
            }
            SourceNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if feature < 0 || feature as usize >= n_features {
                    return Err(ExtractError::FeatureOutOfRange {
                        node: src,
                        feature,
                        n_features,
                    });
                }
                let left = child_index(src, "left", left, n_nodes)?;
                let right = child_index(src, "right", right, n_nodes)?;

                let threshold = match split_rule {
                    SplitRule::LessOrEqual => narrow_down(threshold),
                    SplitRule::Less => narrow_up(threshold),
                };
                // Children are patched in once they get their preorder ids.
                nodes.push(Node::split(feature as u32, threshold, 0, 0));

                stack.push(Visit::Exit { src });
                stack.push(Visit::Enter {
                    src: right,
                    parent: Some((new_id, true)),
                });
                stack.push(Visit::Enter {
                    src: left,
                    parent: Some((new_id, false)),
                });
            }
        }
    }

    if let Some(i) = color.iter().position(|&c| c == 0) {
        return Err(ExtractError::UnreachableNode { node: i });
    }

    Ok(TreeIr::new(nodes, n_features, split_rule)?)
}

fn child_index(node: usize, side: &'static str, child: i64, n_nodes: usize) -> Result<usize, ExtractError> {
    if child < 0 || child as usize >= n_nodes {
        return Err(ExtractError::ChildOutOfBounds {
            node,
            side,
            child,
            n_nodes,
        });
    }
    let child = child as usize;
    if child == node {
        return Err(ExtractError::SelfLoop { node });
    }
    Ok(child)
}

/// Convert a raw leaf value to its prediction-ready form.
fn leaf_value(raw: &[f64], task: TaskKind) -> Vec<f32> {
    match task {
        TaskKind::Regression => raw.iter().map(|&v| v as f32).collect(),
        TaskKind::Classification { .. } => {
            let total: f64 = raw.iter().sum();
            if total == 0.0 {
                raw.iter().map(|&v| v as f32).collect()
            } else {
                raw.iter().map(|&v| (v / total) as f32).collect()
            }
        }
    }
}
