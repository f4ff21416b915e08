//! Gradient boosted regression trees.
//!
//! Trees use the sklearn/XGBoost node-array export: internal nodes carry a
//! `feature` index and `threshold`, leaves carry `feature = -1` and a `value`.
//! Prediction is `base_score + learning_rate * Σ tree(x)`.

use super::predictor::Estimator;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RegressionNode {
    /// Feature index to split on (-1 for leaves).
    pub feature: i32,
    #[serde(default)]
    pub threshold: f64,
    /// Left child index (-1 for leaves). Taken when `x[feature] <= threshold`.
    #[serde(default = "leaf_marker")]
    pub left: i32,
    #[serde(default = "leaf_marker")]
    pub right: i32,
    #[serde(default)]
    pub value: Option<f64>,
}

fn leaf_marker() -> i32 {
    -1
}

impl RegressionNode {
    fn is_leaf(&self) -> bool {
        self.feature < 0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<RegressionNode>,
}

impl RegressionTree {
    fn evaluate(&self, features: &[f64]) -> Result<f64, String> {
        let mut idx = 0usize;
        // Children always point forward, so the walk is bounded by the node count.
        for _ in 0..self.nodes.len() {
            let node = &self.nodes[idx];
            if node.is_leaf() {
                return node.value.ok_or_else(|| format!("leaf {} has no value", idx));
            }
            let x = features[node.feature as usize];
            idx = if x <= node.threshold {
                node.left as usize
            } else {
                node.right as usize
            };
        }
        Err("tree walk did not reach a leaf".to_string())
    }

    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty tree".to_string());
        }
        let n = self.nodes.len() as i32;
        for (i, node) in self.nodes.iter().enumerate() {
            let i = i as i32;
            if node.is_leaf() {
                match node.value {
                    Some(v) if v.is_finite() => {}
                    _ => return Err(format!("leaf {} has no finite value", i)),
                }
                continue;
            }
            if node.feature as usize >= n_features {
                return Err(format!(
                    "node {} splits on feature {} but n_features is {}",
                    i, node.feature, n_features
                ));
            }
            if node.left <= i || node.left >= n || node.right <= i || node.right >= n {
                return Err(format!("node {} has invalid children ({}, {})", i, node.left, node.right));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoostedHead {
    pub n_features: usize,
    #[serde(default)]
    pub base_score: f64,
    pub learning_rate: f64,
    pub trees: Vec<RegressionTree>,
}

impl Estimator for BoostedHead {
    fn input_width(&self) -> usize {
        self.n_features
    }

    fn estimate(&self, features: &[f64]) -> Result<f64, String> {
        let mut score = self.base_score;
        for tree in &self.trees {
            score += self.learning_rate * tree.evaluate(features)?;
        }
        Ok(score)
    }

    fn validate(&self) -> Result<(), String> {
        if self.n_features == 0 {
            return Err("n_features must be positive".to_string());
        }
        if self.learning_rate <= 0.0 || self.learning_rate > 1.0 {
            return Err(format!(
                "Invalid learning_rate: {} (should be 0 < lr <= 1)",
                self.learning_rate
            ));
        }
        if self.trees.is_empty() {
            return Err("no trees".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(())
    }
}
