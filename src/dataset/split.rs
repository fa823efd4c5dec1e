use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use super::{LabeledWindows, SampleWindow};
use crate::error::{PipelineError, Result};
use crate::family::SplitRatios;

/// Stratified train/validation/test partitions of one build.
#[derive(Debug, Clone, Default)]
pub struct LabeledDataset {
    /// Class names in index order.
    pub classes: Vec<String>,
    pub train: Vec<SampleWindow>,
    pub valid: Vec<SampleWindow>,
    pub test: Vec<SampleWindow>,
}

impl LabeledDataset {
    pub fn len(&self) -> usize {
        self.train.len() + self.valid.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-class partition sizes `(train, valid, test)` for `n` windows.
pub fn partition_sizes(n: usize, ratios: &SplitRatios) -> (usize, usize, usize) {
    let train = ((n as f64) * ratios.train).round() as usize;
    let train = train.min(n);
    let valid = (((n as f64) * ratios.valid).round() as usize).min(n - train);
    (train, valid, n - train - valid)
}

/// Split each class independently, then shuffle each partition with `seed`.
///
/// Within a class the earliest offsets go to train, so overlapping windows
/// only ever straddle one partition boundary.
pub fn split(windows: LabeledWindows, ratios: &SplitRatios, seed: u64) -> Result<LabeledDataset> {
    ratios.validate()?;
    if windows.is_empty() {
        return Err(PipelineError::Config("cannot split an empty dataset".into()));
    }
    let mut dataset = LabeledDataset {
        classes: windows.keys().cloned().collect(),
        ..LabeledDataset::default()
    };
    for (label, mut class_windows) in windows {
        class_windows.sort_by_key(SampleWindow::start);
        let (train_n, valid_n, test_n) = partition_sizes(class_windows.len(), ratios);
        debug!("{label}: {train_n}/{valid_n}/{test_n}");
        let mut rest = class_windows.split_off(train_n);
        let test = rest.split_off(valid_n);
        dataset.train.extend(class_windows);
        dataset.valid.extend(rest);
        dataset.test.extend(test);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    dataset.train.shuffle(&mut rng);
    dataset.valid.shuffle(&mut rng);
    dataset.test.shuffle(&mut rng);
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn class(label: &str, n: usize) -> Vec<SampleWindow> {
        let label: Arc<str> = Arc::from(label);
        (0..n)
            .map(|i| SampleWindow::new(label.clone(), i * 10, vec![i as f32; 4]))
            .collect()
    }

    fn two_classes(n: usize) -> LabeledWindows {
        let mut windows = LabeledWindows::new();
        windows.insert("inner".into(), class("inner", n));
        windows.insert("normal".into(), class("normal", n));
        windows
    }

    fn count(windows: &[SampleWindow], label: &str) -> usize {
        windows.iter().filter(|w| w.label() == label).count()
    }

    #[test]
    fn two_hundred_per_class_splits_120_40_40() {
        let ratios = SplitRatios::new(0.6, 0.2, 0.2);
        let dataset = split(two_classes(200), &ratios, 42).unwrap();
        assert_eq!(dataset.len(), 400);
        for label in ["inner", "normal"] {
            assert_eq!(count(&dataset.train, label), 120);
            assert_eq!(count(&dataset.valid, label), 40);
            assert_eq!(count(&dataset.test, label), 40);
        }
        assert_eq!(dataset.classes, vec!["inner", "normal"]);
    }

    #[test]
    fn partitions_are_disjoint() {
        let ratios = SplitRatios::new(0.7, 0.2, 0.1);
        let dataset = split(two_classes(50), &ratios, 3).unwrap();
        let mut seen = std::collections::HashSet::new();
        for window in dataset.train.iter().chain(&dataset.valid).chain(&dataset.test) {
            assert!(seen.insert((window.label().to_string(), window.start())));
        }
        assert_eq!(seen.len(), 100);
    }

    #[test]
    fn same_seed_gives_same_order() {
        let ratios = SplitRatios::new(0.6, 0.2, 0.2);
        let a = split(two_classes(30), &ratios, 9).unwrap();
        let b = split(two_classes(30), &ratios, 9).unwrap();
        assert_eq!(a.train, b.train);
        assert_eq!(a.test, b.test);
    }

    #[test]
    fn sizes_always_sum_to_input() {
        let ratios = SplitRatios::new(0.7, 0.2, 0.1);
        for n in [0, 1, 2, 3, 7, 15, 1000] {
            let (train, valid, test) = partition_sizes(n, &ratios);
            assert_eq!(train + valid + test, n);
        }
    }

    #[test]
    fn invalid_ratios_are_rejected() {
        let ratios = SplitRatios::new(0.5, 0.5, 0.5);
        let err = split(two_classes(10), &ratios, 1).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
