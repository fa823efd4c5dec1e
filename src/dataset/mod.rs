//! Turning recordings into labeled, split and normalized training tensors.

mod normalize;
mod split;
mod windowing;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use ndarray::Array2;

use crate::error::{PipelineError, Result};

pub use normalize::NormalizationState;
pub use split::{LabeledDataset, partition_sizes, split};
pub use windowing::{AUGMENT_STEP, build, build_from_signal, required_signal_len, window_starts};

/// A fixed-length slice of one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    label: Arc<str>,
    start: usize,
    values: Vec<f32>,
}

impl SampleWindow {
    pub fn new(label: Arc<str>, start: usize, values: Vec<f32>) -> Self {
        Self {
            label,
            start,
            values,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Offset of the first sample within the source recording.
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Windows grouped by class label, in class-index order.
pub type LabeledWindows = BTreeMap<String, Vec<SampleWindow>>;

/// Features and class indices of one partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub x: Array2<f32>,
    pub y: Vec<usize>,
}

impl Partition {
    /// Stack windows row-wise and resolve their labels against `classes`.
    pub fn from_windows(windows: &[SampleWindow], classes: &[String]) -> Result<Self> {
        let index: HashMap<&str, usize> = classes
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.as_str(), idx))
            .collect();
        let width = windows.first().map(SampleWindow::len).unwrap_or(0);
        let mut flat = Vec::with_capacity(windows.len() * width);
        let mut y = Vec::with_capacity(windows.len());
        for window in windows {
            if window.len() != width {
                return Err(PipelineError::Config(format!(
                    "window length {} differs from {width} within one partition",
                    window.len()
                )));
            }
            let class_idx = index.get(window.label()).copied().ok_or_else(|| {
                PipelineError::Config(format!("unknown class label '{}'", window.label()))
            })?;
            flat.extend_from_slice(window.values());
            y.push(class_idx);
        }
        let x = Array2::from_shape_vec((windows.len(), width), flat)
            .map_err(|err| PipelineError::Config(format!("partition shape: {err}")))?;
        Ok(Self { x, y })
    }

    /// Unlabeled windows, used at diagnosis time.
    pub fn unlabeled(windows: &[SampleWindow]) -> Result<Array2<f32>> {
        let width = windows.first().map(SampleWindow::len).unwrap_or(0);
        let flat: Vec<f32> = windows
            .iter()
            .flat_map(|window| window.values().iter().copied())
            .collect();
        Array2::from_shape_vec((windows.len(), width), flat)
            .map_err(|err| PipelineError::Config(format!("window matrix shape: {err}")))
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Number of samples per class index.
    pub fn class_counts(&self, n_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; n_classes];
        for &label in &self.y {
            if label < n_classes {
                counts[label] += 1;
            }
        }
        counts
    }
}

/// The six tensors of one training run plus the normalization fit on train.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub classes: Vec<String>,
    pub train: Partition,
    pub valid: Partition,
    pub test: Partition,
    pub normalization: Option<NormalizationState>,
}
