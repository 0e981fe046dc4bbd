//! Regression trees and their greedy growth
//!
//! Trees are stored as a flat node list. Children always come after their
//! parent, which lets [`RegressionTree::check`] reject cyclic artifacts.

use serde::{Deserialize, Serialize};

use crate::features::FEATURE_COUNT;

/// Smallest loss reduction accepted for a split
const MIN_SPLIT_GAIN: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Rows with `features[feature] < threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Leaf output, already scaled by the learning rate
    Leaf { value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Single-leaf tree
    #[must_use]
    pub fn leaf(value: f64) -> Self {
        Self {
            nodes: vec![Node::Leaf { value }],
        }
    }

    /// Build a tree from nodes, rejecting malformed layouts
    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self, String> {
        let tree = Self { nodes };
        tree.check()?;
        Ok(tree)
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[must_use]
    pub fn predict(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if features[feature] < threshold { left } else { right };
                }
            }
        }
    }

    /// Structural check run on every deserialized artifact
    pub fn check(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (index, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Leaf { value } if !value.is_finite() => {
                    return Err(format!("leaf {index} holds a non-finite value"));
                }
                Node::Leaf { .. } => {}
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if feature >= FEATURE_COUNT {
                        return Err(format!("node {index} splits on unknown feature {feature}"));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {index} has a non-finite threshold"));
                    }
                    let len = self.nodes.len();
                    if left <= index || right <= index || left >= len || right >= len {
                        return Err(format!("node {index} has out-of-order children"));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Per-tree growth settings derived from the booster parameters
#[derive(Debug, Clone, Copy)]
pub(crate) struct GrowthParams {
    pub max_depth: usize,
    pub min_child_weight: f64,
    pub reg_alpha: f64,
    pub reg_lambda: f64,
    pub learning_rate: f64,
}

impl GrowthParams {
    /// L1 soft-thresholding of a gradient sum
    fn threshold_l1(&self, grad: f64) -> f64 {
        if grad > self.reg_alpha {
            grad - self.reg_alpha
        } else if grad < -self.reg_alpha {
            grad + self.reg_alpha
        } else {
            0.0
        }
    }

    fn structure_score(&self, grad: f64, hess: f64) -> f64 {
        let g = self.threshold_l1(grad);
        g * g / (hess + self.reg_lambda)
    }

    fn leaf_value(&self, grad: f64, hess: f64) -> f64 {
        -self.threshold_l1(grad) / (hess + self.reg_lambda) * self.learning_rate
    }
}

#[derive(Debug, Clone, Copy)]
struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Grow one tree on the sampled rows for a squared-error objective.
///
/// Hessians are 1 per row, so a child's hessian sum is its row count.
pub(crate) fn grow(
    rows: &[[f64; FEATURE_COUNT]],
    gradients: &[f64],
    sample: &mut [usize],
    features: &[usize],
    params: &GrowthParams,
) -> RegressionTree {
    let mut grower = Grower {
        rows,
        gradients,
        features,
        params,
        nodes: Vec::new(),
    };
    grower.grow_node(sample, 0);
    RegressionTree {
        nodes: grower.nodes,
    }
}

struct Grower<'a> {
    rows: &'a [[f64; FEATURE_COUNT]],
    gradients: &'a [f64],
    features: &'a [usize],
    params: &'a GrowthParams,
    nodes: Vec<Node>,
}

impl Grower<'_> {
    fn grow_node(&mut self, sample: &mut [usize], depth: usize) -> usize {
        let grad: f64 = sample.iter().map(|&i| self.gradients[i]).sum();
        let hess = sample.len() as f64;

        let index = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.params.leaf_value(grad, hess),
        });

        if depth >= self.params.max_depth {
            return index;
        }
        let Some(split) = self.best_split(sample, grad, hess) else {
            return index;
        };

        let rows = self.rows;
        sample.sort_by_key(|&i| rows[i][split.feature] >= split.threshold);
        let boundary = sample
            .iter()
            .take_while(|&&i| rows[i][split.feature] < split.threshold)
            .count();
        let (left_rows, right_rows) = sample.split_at_mut(boundary);

        let left = self.grow_node(left_rows, depth + 1);
        let right = self.grow_node(right_rows, depth + 1);
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    fn best_split(&self, sample: &[usize], grad: f64, hess: f64) -> Option<Split> {
        let parent = self.params.structure_score(grad, hess);
        let mut best: Option<Split> = None;
        let mut order = sample.to_vec();

        for &feature in self.features {
            order.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let mut grad_left = 0.0;
            for k in 1..order.len() {
                grad_left += self.gradients[order[k - 1]];

                let previous = self.rows[order[k - 1]][feature];
                let next = self.rows[order[k]][feature];
                if previous == next {
                    continue;
                }

                let hess_left = k as f64;
                let hess_right = hess - hess_left;
                if hess_left < self.params.min_child_weight
                    || hess_right < self.params.min_child_weight
                {
                    continue;
                }

                let gain = self.params.structure_score(grad_left, hess_left)
                    + self.params.structure_score(grad - grad_left, hess_right)
                    - parent;
                if gain > best.map_or(MIN_SPLIT_GAIN, |b| b.gain) {
                    best = Some(Split {
                        feature,
                        threshold: next,
                        gain,
                    });
                }
            }
        }
        best
    }
}
