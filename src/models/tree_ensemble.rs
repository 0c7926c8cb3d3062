//! Decision-tree ensembles stored as pickled scikit-learn `tree_` arrays
//!
//! The `.pkl` payload is a pickled dict of plain containers:
//!
//! ```text
//! {
//!     "task": "classification" | "regression",   # optional, default classification
//!     "aggregation": "average" | "sum",          # optional, default average
//!     "n_features": 6,
//!     "trees": [
//!         {"children_left": [...], "children_right": [...], "feature": [...],
//!          "threshold": [...], "value": [[...], ...]},
//!     ],
//! }
//! ```
//!
//! Arrays follow scikit-learn's layout: node `i` is a leaf when
//! `children_left[i] == -1`, otherwise samples with
//! `x[feature[i]] <= threshold[i]` go left. `value[i]` holds the class counts
//! (classification) or regression targets of node `i`.

use crate::error::{InferenceError, Result};
use crate::models::backend::{LoadOptions, ModelBackend, ModelKind};
use crate::types::CanonicalTensor;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use serde_pickle::DeOptions;
use std::path::Path;
use tracing::debug;

const LEAF: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    #[default]
    Classification,
    Regression,
}

/// How per-tree outputs are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Random-forest style mean
    #[default]
    Average,
    /// Boosting style sum
    Sum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    #[serde(default)]
    pub task: Task,
    #[serde(default)]
    pub aggregation: Aggregation,
    pub n_features: usize,
    pub trees: Vec<DecisionTree>,
}

impl DecisionTree {
    fn n_nodes(&self) -> usize {
        self.children_left.len()
    }

    fn is_leaf(&self, node: usize) -> bool {
        self.children_left[node] == LEAF
    }

    /// Check array lengths and node links.
    ///
    /// Children must come after their parent (scikit-learn's depth-first
    /// order), which also rules out cycles.
    fn validate(&self, tree_idx: usize, n_features: usize) -> std::result::Result<usize, String> {
        let n_nodes = self.n_nodes();
        if n_nodes == 0 {
            return Err(format!("tree {} has no nodes", tree_idx));
        }
        let lengths = [
            self.children_right.len(),
            self.feature.len(),
            self.threshold.len(),
            self.value.len(),
        ];
        if lengths.iter().any(|&len| len != n_nodes) {
            return Err(format!(
                "tree {} has mismatched array lengths (children_left={}, children_right={}, feature={}, threshold={}, value={})",
                tree_idx, n_nodes, lengths[0], lengths[1], lengths[2], lengths[3]
            ));
        }

        let mut leaf_width = None;
        for node in 0..n_nodes {
            let (left, right) = (self.children_left[node], self.children_right[node]);
            if left == LEAF {
                if right != LEAF {
                    return Err(format!("tree {} node {} has only one child", tree_idx, node));
                }
                let width = self.value[node].len();
                if width == 0 || leaf_width.is_some_and(|w| w != width) {
                    return Err(format!(
                        "tree {} leaf {} has {} outputs, expected {}",
                        tree_idx,
                        node,
                        width,
                        leaf_width.unwrap_or(1)
                    ));
                }
                leaf_width = Some(width);
                continue;
            }

            for child in [left, right] {
                if child <= node as i64 || child >= n_nodes as i64 {
                    return Err(format!(
                        "tree {} node {} references child {} but tree has {} nodes",
                        tree_idx, node, child, n_nodes
                    ));
                }
            }
            let feature = self.feature[node];
            if feature < 0 || feature >= n_features as i64 {
                return Err(format!(
                    "tree {} node {} splits on feature {} of {}",
                    tree_idx, node, feature, n_features
                ));
            }
        }

        leaf_width.ok_or_else(|| format!("tree {} has no leaves", tree_idx))
    }

    /// Walk from the root to the leaf for one sample.
    ///
    /// NaN compares false and therefore goes right.
    fn leaf_for(&self, row: ArrayView1<'_, f32>) -> &[f64] {
        let mut node = 0usize;
        while !self.is_leaf(node) {
            let value = f64::from(row[self.feature[node] as usize]);
            node = if value <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        &self.value[node]
    }

    /// Turn class counts at every leaf into probabilities.
    fn normalize_leaves(&mut self) {
        for node in 0..self.n_nodes() {
            if !self.is_leaf(node) {
                continue;
            }
            let total: f64 = self.value[node].iter().sum();
            if total > 0.0 {
                self.value[node].iter_mut().for_each(|v| *v /= total);
            }
        }
    }
}

/// Backend for `.pkl` tree ensembles
#[derive(Debug)]
pub struct TreeEnsembleBackend {
    model: TreeEnsemble,
    n_outputs: usize,
}

impl TreeEnsembleBackend {
    /// Validate a parsed ensemble and prepare it for prediction.
    pub fn from_model(mut model: TreeEnsemble) -> std::result::Result<Self, String> {
        if model.n_features == 0 {
            return Err("model declares zero input features".to_string());
        }
        if model.trees.is_empty() {
            return Err("ensemble contains no trees".to_string());
        }

        let mut n_outputs = None;
        for (idx, tree) in model.trees.iter().enumerate() {
            let width = tree.validate(idx, model.n_features)?;
            if n_outputs.is_some_and(|w| w != width) {
                return Err(format!(
                    "tree {} has {} outputs, previous trees have {}",
                    idx,
                    width,
                    n_outputs.unwrap_or(0)
                ));
            }
            n_outputs = Some(width);
        }

        if model.task == Task::Classification {
            model.trees.iter_mut().for_each(DecisionTree::normalize_leaves);
        }

        Ok(Self {
            n_outputs: n_outputs.unwrap_or(1),
            model,
        })
    }

    pub fn n_features(&self) -> usize {
        self.model.n_features
    }

    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }
}

impl ModelBackend for TreeEnsembleBackend {
    fn load(path: &Path, bytes: &[u8], _options: &LoadOptions) -> Result<Self> {
        let model: TreeEnsemble = serde_pickle::from_slice(bytes, DeOptions::new())
            .map_err(|e| InferenceError::deserialization(path, e))?;
        let backend =
            Self::from_model(model).map_err(|reason| InferenceError::deserialization(path, reason))?;

        debug!(
            trees = backend.model.trees.len(),
            features = backend.model.n_features,
            outputs = backend.n_outputs,
            task = ?backend.model.task,
            "Tree ensemble parsed"
        );
        Ok(backend)
    }

    fn kind(&self) -> ModelKind {
        ModelKind::TreeEnsemble
    }

    fn describe(&self) -> String {
        let task = match self.model.task {
            Task::Classification => format!("classifier, {} classes", self.n_outputs),
            Task::Regression => format!("regressor, {} outputs", self.n_outputs),
        };
        format!(
            "TreeEnsemble({}, {} trees, {} features)",
            task,
            self.model.trees.len(),
            self.model.n_features
        )
    }

    fn predict(&mut self, input: &CanonicalTensor) -> Result<Array2<f64>> {
        let rows = input.as_matrix().ok_or_else(|| {
            InferenceError::Prediction(format!(
                "tree ensemble expects a 2-D [batch, features] input, got shape {:?}",
                input.shape()
            ))
        })?;
        if rows.ncols() != self.model.n_features {
            return Err(InferenceError::Prediction(format!(
                "X has {} features, but model is expecting {} features as input",
                rows.ncols(),
                self.model.n_features
            )));
        }

        let mut output = Array2::<f64>::zeros((rows.nrows(), self.n_outputs));
        for (row, mut target) in rows.outer_iter().zip(output.outer_iter_mut()) {
            for tree in &self.model.trees {
                for (acc, &leaf) in target.iter_mut().zip(tree.leaf_for(row)) {
                    *acc += leaf;
                }
            }
        }
        if self.model.aggregation == Aggregation::Average {
            output /= self.model.trees.len() as f64;
        }

        Ok(output)
    }
}
