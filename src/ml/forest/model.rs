use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// One node of a decision tree, stored in a flat arena.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        /// Feature index used for the split.
        feature_index: u16,
        /// Rows with `feature <= threshold` go left.
        threshold: f32,
        left: u32,
        right: u32,
    },
    /// Class distribution of the training rows that reached this leaf.
    Leaf { distribution: Vec<f32> },
}

/// A single CART classification tree; node 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionTree {
    pub nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn leaf_distribution(&self, features: &[f32]) -> Option<&[f32]> {
        let mut idx = 0usize;
        // A well-formed tree reaches a leaf in at most `nodes.len()` steps.
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(idx)? {
                Node::Leaf { distribution } => return Some(distribution),
                Node::Split {
                    feature_index,
                    threshold,
                    left,
                    right,
                } => {
                    let value = features.get(*feature_index as usize).copied().unwrap_or(0.0);
                    idx = if value <= *threshold { *left } else { *right } as usize;
                }
            }
        }
        None
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(Node::Split { left, right, .. }) => {
                    1 + walk(nodes, *left as usize).max(walk(nodes, *right as usize))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    fn validate(&self, n_classes: usize, feature_len: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { distribution } if distribution.len() != n_classes => {
                    return Err(format!(
                        "leaf {idx} has {} classes, expected {n_classes}",
                        distribution.len()
                    ));
                }
                Node::Split {
                    feature_index,
                    left,
                    right,
                    ..
                } => {
                    let (left, right) = (*left as usize, *right as usize);
                    if *feature_index as usize >= feature_len {
                        return Err(format!("node {idx} splits on feature {feature_index}"));
                    }
                    // Children are always appended after their parent.
                    if left <= idx || right <= idx || left >= self.nodes.len() || right >= self.nodes.len()
                    {
                        return Err(format!("node {idx} has invalid children"));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Bagged ensemble of decision trees over window feature vectors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomForestModel {
    /// Feature vector version expected by this model.
    pub feat_version: u32,
    /// Number of `f32` values per feature vector.
    pub feature_len_f32: usize,
    /// Ordered list of class identifiers.
    pub classes: Vec<String>,
    pub trees: Vec<DecisionTree>,
}

impl RandomForestModel {
    /// Validate structural invariants of the model.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| PipelineError::Training(format!("invalid forest: {message}"));
        if self.classes.len() < 2 {
            return Err(invalid("model must contain at least 2 classes".into()));
        }
        if self.trees.is_empty() {
            return Err(invalid("model has no trees".into()));
        }
        for (tree_idx, tree) in self.trees.iter().enumerate() {
            tree.validate(self.classes.len(), self.feature_len_f32)
                .map_err(|err| invalid(format!("tree {tree_idx}: {err}")))?;
        }
        Ok(())
    }

    /// Mean of the leaf distributions reached in every tree.
    pub fn predict_proba(&self, features: &[f32]) -> Vec<f32> {
        let n_classes = self.classes.len();
        let mut proba = vec![0.0f32; n_classes];
        let mut voters = 0usize;
        for tree in &self.trees {
            if let Some(distribution) = tree.leaf_distribution(features) {
                for (acc, &p) in proba.iter_mut().zip(distribution) {
                    *acc += p;
                }
                voters += 1;
            }
        }
        if voters == 0 {
            return vec![1.0 / n_classes.max(1) as f32; n_classes];
        }
        for p in &mut proba {
            *p /= voters as f32;
        }
        proba
    }

    /// Predict the best class index for a feature vector.
    pub fn predict_class_index(&self, features: &[f32]) -> usize {
        argmax(&self.predict_proba(features))
    }
}

pub(crate) fn argmax(values: &[f32]) -> usize {
    let mut best_idx = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (idx, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = idx;
        }
    }
    best_idx
}
