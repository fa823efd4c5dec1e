//! Test-set evaluation: classification report, confusion matrix and one-vs-rest curves.

use serde::{Deserialize, Serialize};

use super::forest::argmax;
use super::metrics::{ClassificationReport, ConfusionMatrix};
use crate::error::{PipelineError, Result};

/// A polyline in unit space: `(x, y)` points sorted along the threshold sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub points: Vec<(f32, f32)>,
    /// Area under the ROC curve or average precision, depending on the curve.
    pub area: f32,
}

/// ROC and precision-recall curves of one class against the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassCurves {
    pub class_name: String,
    /// `(false positive rate, true positive rate)`.
    pub roc: Curve,
    /// `(recall, precision)`.
    pub precision_recall: Curve,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub score: f32,
    pub classification: ClassificationReport,
    pub confusion: ConfusionMatrix,
    pub curves: Vec<ClassCurves>,
}

impl EvaluationReport {
    /// Evaluate predicted class probabilities (one row per test window) against truth.
    pub fn from_probabilities(
        classes: &[String],
        truth: &[usize],
        probabilities: &[Vec<f32>],
    ) -> Result<Self> {
        if truth.len() != probabilities.len() {
            return Err(PipelineError::Training(format!(
                "{} labels but {} predictions",
                truth.len(),
                probabilities.len()
            )));
        }
        if truth.is_empty() {
            return Err(PipelineError::Training("empty test partition".into()));
        }
        let k = classes.len();
        if let Some(row) = probabilities.iter().find(|row| row.len() != k) {
            return Err(PipelineError::Training(format!(
                "prediction has {} scores for {k} classes",
                row.len()
            )));
        }
        let predicted: Vec<usize> = probabilities.iter().map(|row| argmax(row)).collect();
        let confusion = ConfusionMatrix::from_predictions(k, truth, &predicted);
        let classification = ClassificationReport::from_confusion(classes, &confusion);
        let curves = (0..k)
            .map(|class_idx| {
                let scores: Vec<f32> = probabilities.iter().map(|row| row[class_idx]).collect();
                let positives: Vec<bool> = truth.iter().map(|&t| t == class_idx).collect();
                ClassCurves {
                    class_name: classes[class_idx].clone(),
                    roc: roc_curve(&scores, &positives),
                    precision_recall: precision_recall_curve(&scores, &positives),
                }
            })
            .collect();
        Ok(Self {
            score: classification.accuracy,
            classification,
            confusion,
            curves,
        })
    }
}

/// Distinct thresholds in descending score order with cumulative `(tp, fp)` at each.
fn sweep(scores: &[f32], positives: &[bool]) -> Vec<(usize, usize)> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    let mut out = Vec::new();
    let (mut tp, mut fp) = (0usize, 0usize);
    for (pos, &idx) in order.iter().enumerate() {
        if positives[idx] {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_tie = order
            .get(pos + 1)
            .is_none_or(|&next| scores[next] != scores[idx]);
        if last_of_tie {
            out.push((tp, fp));
        }
    }
    out
}

pub fn roc_curve(scores: &[f32], positives: &[bool]) -> Curve {
    let total_pos = positives.iter().filter(|&&p| p).count();
    let total_neg = positives.len() - total_pos;
    let rate = |count: usize, total: usize| {
        if total == 0 { 0.0 } else { count as f32 / total as f32 }
    };
    let mut points = vec![(0.0f32, 0.0f32)];
    points.extend(
        sweep(scores, positives)
            .into_iter()
            .map(|(tp, fp)| (rate(fp, total_neg), rate(tp, total_pos))),
    );
    let area = points
        .windows(2)
        .map(|pair| (pair[1].0 - pair[0].0) * (pair[1].1 + pair[0].1) * 0.5)
        .sum();
    Curve { points, area }
}

pub fn precision_recall_curve(scores: &[f32], positives: &[bool]) -> Curve {
    let total_pos = positives.iter().filter(|&&p| p).count();
    let mut points = vec![(0.0f32, 1.0f32)];
    let mut average_precision = 0.0f32;
    let mut prev_recall = 0.0f32;
    for (tp, fp) in sweep(scores, positives) {
        let recall = if total_pos == 0 {
            0.0
        } else {
            tp as f32 / total_pos as f32
        };
        let precision = tp as f32 / (tp + fp).max(1) as f32;
        average_precision += (recall - prev_recall) * precision;
        prev_recall = recall;
        points.push((recall, precision));
    }
    Curve {
        points,
        area: average_precision,
    }
}
