//! Deterministic random-forest classifier over window feature vectors.
//!
//! Lightweight in-tree implementation:
//! - Bootstrap rows per tree and a random feature subset per split.
//! - Histogram split search over binned features (gini impurity).
//! - Reproducible JSON model export/load.

mod model;
mod train;

pub use model::{DecisionTree, Node, RandomForestModel};
pub use train::{ForestOptions, TrainDataset, train_random_forest};

pub(crate) use model::argmax;
