//! PNG rendering of evaluation diagnostics and signal previews.

mod canvas;

use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::ml::TrainingHistory;
use crate::ml::metrics::ConfusionMatrix;
use crate::ml::report::ClassCurves;

use canvas::{AXIS, Canvas, PALETTE, heat_color};

pub const PLOT_WIDTH: u32 = 800;
pub const PLOT_HEIGHT: u32 = 600;
const PREVIEW_HEIGHT: u32 = 300;
const CELL_GAP: u32 = 2;

const TRAIN_COLOR: Rgb<u8> = PALETTE[0];
const VALID_COLOR: Rgb<u8> = PALETTE[1];
const REFERENCE_COLOR: Rgb<u8> = Rgb([150, 150, 150]);

fn save(image: &RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| PipelineError::io(parent, source))?;
    }
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|err| PipelineError::io(path, std::io::Error::other(err)))?;
    debug!("Rendered {}", path.display());
    Ok(())
}

/// Line plot of the first samples of a recording.
pub fn render_signal_preview(values: &[f32], path: &Path) -> Result<()> {
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let x_max = values.len().saturating_sub(1).max(1) as f32;
    let mut canvas = Canvas::new(PLOT_WIDTH * 2, PREVIEW_HEIGHT, (0.0, x_max), (lo, hi));
    canvas.draw_axes(4);
    let points: Vec<(f32, f32)> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f32, v))
        .collect();
    canvas.polyline(&points, TRAIN_COLOR);
    save(&canvas.into_image(), path)
}

/// One ROC curve per class against the chance diagonal.
pub fn render_roc_curves(curves: &[ClassCurves], path: &Path) -> Result<()> {
    let mut canvas = Canvas::new(PLOT_WIDTH, PLOT_HEIGHT, (0.0, 1.0), (0.0, 1.0));
    canvas.draw_axes(5);
    canvas.dashed((0.0, 0.0), (1.0, 1.0), REFERENCE_COLOR);
    for (idx, class) in curves.iter().enumerate() {
        canvas.polyline(&class.roc.points, PALETTE[idx % PALETTE.len()]);
    }
    save(&canvas.into_image(), path)
}

/// One precision/recall curve per class; x is recall, y is precision.
pub fn render_precision_recall_curves(curves: &[ClassCurves], path: &Path) -> Result<()> {
    let mut canvas = Canvas::new(PLOT_WIDTH, PLOT_HEIGHT, (0.0, 1.0), (0.0, 1.05));
    canvas.draw_axes(5);
    for (idx, class) in curves.iter().enumerate() {
        canvas.polyline(&class.precision_recall.points, PALETTE[idx % PALETTE.len()]);
    }
    save(&canvas.into_image(), path)
}

fn render_pair(train: &[f32], valid: &[f32], y_range: (f32, f32), path: &Path) -> Result<()> {
    let epochs = train.len().max(valid.len());
    let x_range = (1.0, epochs.max(2) as f32);
    let mut canvas = Canvas::new(PLOT_WIDTH, PLOT_HEIGHT, x_range, y_range);
    canvas.draw_axes(5);
    let series = |values: &[f32]| -> Vec<(f32, f32)> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| ((i + 1) as f32, v))
            .collect()
    };
    canvas.polyline(&series(train), TRAIN_COLOR);
    canvas.polyline(&series(valid), VALID_COLOR);
    save(&canvas.into_image(), path)
}

/// Training and validation loss per epoch.
pub fn render_loss_curves(history: &TrainingHistory, path: &Path) -> Result<()> {
    let train = history.train_loss();
    let valid = history.valid_loss();
    let hi = train
        .iter()
        .chain(&valid)
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0f32, f32::max);
    render_pair(&train, &valid, (0.0, hi.max(f32::EPSILON) * 1.05), path)
}

/// Training and validation accuracy per epoch.
pub fn render_accuracy_curves(history: &TrainingHistory, path: &Path) -> Result<()> {
    render_pair(
        &history.train_accuracy(),
        &history.valid_accuracy(),
        (0.0, 1.0),
        path,
    )
}

/// Heatmap of a confusion matrix, rows are true classes and columns predictions.
///
/// Cells are shaded by their share of the row so that unbalanced test sets
/// stay readable.
pub fn render_confusion_matrix(matrix: &ConfusionMatrix, path: &Path) -> Result<()> {
    let n = matrix.n_classes.max(1) as u32;
    let mut canvas = Canvas::new(PLOT_HEIGHT, PLOT_HEIGHT, (0.0, 1.0), (0.0, 1.0));
    let (left, top, right, bottom) = canvas.plot_bounds();
    let cell_w = ((right - left) / n).max(1);
    let cell_h = ((bottom - top) / n).max(1);
    for truth in 0..matrix.n_classes {
        let row_total: u32 = (0..matrix.n_classes).map(|p| matrix.get(truth, p)).sum();
        for predicted in 0..matrix.n_classes {
            let share = if row_total == 0 {
                0.0
            } else {
                matrix.get(truth, predicted) as f32 / row_total as f32
            };
            let x0 = left + predicted as u32 * cell_w;
            let y0 = top + truth as u32 * cell_h;
            canvas.fill_rect(x0, y0, x0 + cell_w, y0 + cell_h, AXIS);
            canvas.fill_rect(
                x0 + CELL_GAP / 2,
                y0 + CELL_GAP / 2,
                x0 + cell_w - CELL_GAP / 2,
                y0 + cell_h - CELL_GAP / 2,
                heat_color(share),
            );
        }
    }
    save(&canvas.into_image(), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::EpochStats;
    use crate::ml::report::Curve;

    #[test]
    fn confusion_matrix_renders_to_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cm.png");
        let cm = ConfusionMatrix::from_predictions(3, &[0, 1, 2, 2], &[0, 1, 2, 1]);
        render_confusion_matrix(&cm, &path).unwrap();
        let image = image::open(&path).unwrap().to_rgb8();
        assert_eq!(image.dimensions(), (PLOT_HEIGHT, PLOT_HEIGHT));
        // Top-left cell is a perfect row and gets the darkest shade.
        assert_eq!(*image.get_pixel(60, 60), heat_color(1.0));
    }

    #[test]
    fn curves_and_history_render() {
        let dir = tempfile::tempdir().unwrap();
        let curves = vec![ClassCurves {
            class_name: "ball".to_string(),
            roc: Curve {
                points: vec![(0.0, 0.0), (0.0, 1.0), (1.0, 1.0)],
                area: 1.0,
            },
            precision_recall: Curve {
                points: vec![(0.0, 1.0), (1.0, 1.0)],
                area: 1.0,
            },
        }];
        render_roc_curves(&curves, &dir.path().join("roc.png")).unwrap();
        render_precision_recall_curves(&curves, &dir.path().join("pr.png")).unwrap();

        let mut history = TrainingHistory::default();
        for epoch in 1..=3 {
            history.push(EpochStats {
                epoch,
                train_loss: 1.0 / epoch as f64,
                valid_loss: 1.2 / epoch as f64,
                train_accuracy: 0.3 * epoch as f64,
                valid_accuracy: 0.25 * epoch as f64,
                elapsed_ms: 1,
            });
        }
        render_loss_curves(&history, &dir.path().join("loss.png")).unwrap();
        render_accuracy_curves(&history, &dir.path().join("acc.png")).unwrap();
        for name in ["roc.png", "pr.png", "loss.png", "acc.png"] {
            assert!(image::open(dir.path().join(name)).is_ok(), "{name}");
        }
    }

    #[test]
    fn flat_preview_still_renders() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.png");
        render_signal_preview(&[0.5; 16], &path).unwrap();
        render_signal_preview(&[], &dir.path().join("empty.png")).unwrap();
        assert!(path.is_file());
    }
}
