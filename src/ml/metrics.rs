//! Evaluation metrics for classification models.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Confusion matrix for a `K`-class classifier.
pub struct ConfusionMatrix {
    /// Number of classes.
    pub n_classes: usize,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    /// Create an empty `KxK` confusion matrix.
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![0; n_classes * n_classes],
        }
    }

    pub fn from_predictions(n_classes: usize, truth: &[usize], predicted: &[usize]) -> Self {
        let mut cm = Self::new(n_classes);
        for (&t, &p) in truth.iter().zip(predicted) {
            cm.add(t, p);
        }
        cm
    }

    pub fn add(&mut self, truth: usize, predicted: usize) {
        if truth >= self.n_classes || predicted >= self.n_classes {
            return;
        }
        let idx = truth * self.n_classes + predicted;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes + predicted]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    /// Largest single cell, used to scale heatmaps.
    pub fn max_count(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Precision/recall statistics for a single class.
pub struct PerClassStats {
    /// `TP / (TP + FP)`.
    pub precision: f32,
    /// `TP / (TP + FN)`.
    pub recall: f32,
    /// Harmonic mean of precision and recall.
    pub f1: f32,
    /// Total number of true examples for the class.
    pub support: u32,
}

/// Compute per-class precision, recall and F1 from a confusion matrix.
pub fn precision_recall_by_class(cm: &ConfusionMatrix) -> Vec<PerClassStats> {
    let k = cm.n_classes;
    let mut stats = Vec::with_capacity(k);
    for class_idx in 0..k {
        let tp = cm.get(class_idx, class_idx) as f32;
        let mut fp = 0f32;
        let mut fn_ = 0f32;
        let mut support = 0u32;
        for j in 0..k {
            let v = cm.get(class_idx, j);
            support = support.saturating_add(v);
            if j != class_idx {
                fn_ += v as f32;
            }
        }
        for i in 0..k {
            if i != class_idx {
                fp += cm.get(i, class_idx) as f32;
            }
        }
        let precision = if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) };
        let recall = if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) };
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        stats.push(PerClassStats {
            precision,
            recall,
            f1,
            support,
        });
    }
    stats
}

/// Compute overall accuracy from a confusion matrix.
pub fn accuracy(cm: &ConfusionMatrix) -> f32 {
    let mut correct = 0u64;
    for class_idx in 0..cm.n_classes {
        correct += cm.get(class_idx, class_idx) as u64;
    }
    let total = cm.total();
    if total == 0 {
        0.0
    } else {
        (correct as f32) / (total as f32)
    }
}

/// Per-class table plus accuracy and macro/weighted averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<String>,
    pub per_class: Vec<PerClassStats>,
    pub accuracy: f32,
    pub macro_avg: PerClassStats,
    pub weighted_avg: PerClassStats,
}

impl ClassificationReport {
    pub fn from_confusion(classes: &[String], cm: &ConfusionMatrix) -> Self {
        let per_class = precision_recall_by_class(cm);
        let total_support: u32 = per_class.iter().map(|s| s.support).sum();
        let k = per_class.len().max(1) as f32;
        let macro_avg = PerClassStats {
            precision: per_class.iter().map(|s| s.precision).sum::<f32>() / k,
            recall: per_class.iter().map(|s| s.recall).sum::<f32>() / k,
            f1: per_class.iter().map(|s| s.f1).sum::<f32>() / k,
            support: total_support,
        };
        let weight = |pick: fn(&PerClassStats) -> f32| {
            if total_support == 0 {
                return 0.0;
            }
            per_class
                .iter()
                .map(|s| pick(s) * s.support as f32)
                .sum::<f32>()
                / total_support as f32
        };
        let weighted_avg = PerClassStats {
            precision: weight(|s| s.precision),
            recall: weight(|s| s.recall),
            f1: weight(|s| s.f1),
            support: total_support,
        };
        Self {
            classes: classes.to_vec(),
            per_class,
            accuracy: accuracy(cm),
            macro_avg,
            weighted_avg,
        }
    }

    /// Fixed-width text table.
    pub fn render(&self) -> String {
        let name_width = self
            .classes
            .iter()
            .map(String::len)
            .chain(["weighted avg".len()])
            .max()
            .unwrap_or(12);
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>name_width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        );
        out.push('\n');
        for (name, stats) in self.classes.iter().zip(&self.per_class) {
            write_row(&mut out, name, stats, name_width);
        }
        out.push('\n');
        let _ = writeln!(
            out,
            "{:>name_width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        );
        write_row(&mut out, "macro avg", &self.macro_avg, name_width);
        write_row(&mut out, "weighted avg", &self.weighted_avg, name_width);
        out
    }
}

fn write_row(out: &mut String, name: &str, stats: &PerClassStats, name_width: usize) {
    let _ = writeln!(
        out,
        "{:>name_width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
        name, stats.precision, stats.recall, stats.f1, stats.support
    );
}
