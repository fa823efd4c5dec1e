//! Machine learning building blocks: model families, training and evaluation.

mod classifier;
pub mod forest;
pub mod history;
pub mod metrics;
pub mod nn;
pub mod report;

pub use classifier::{Classifier, ForestClassifier, NetworkClassifier};
pub use history::{EpochStats, TrainingHistory};
pub use report::EvaluationReport;
