use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Per-feature standardization fit on the train partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationState {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl NormalizationState {
    /// Fit column means and standard deviations. Zero-variance columns get scale 1.
    pub fn fit(train: &Array2<f32>) -> Result<Self> {
        let rows = train.nrows();
        if rows == 0 {
            return Err(PipelineError::Config(
                "cannot fit normalization on an empty partition".into(),
            ));
        }
        let mut mean = Vec::with_capacity(train.ncols());
        let mut scale = Vec::with_capacity(train.ncols());
        for column in train.axis_iter(Axis(1)) {
            let mu = column.iter().map(|&v| v as f64).sum::<f64>() / rows as f64;
            let var = column
                .iter()
                .map(|&v| {
                    let d = v as f64 - mu;
                    d * d
                })
                .sum::<f64>()
                / rows as f64;
            let std = var.sqrt();
            mean.push(mu as f32);
            scale.push(if std > f64::EPSILON && std.is_finite() {
                std as f32
            } else {
                1.0
            });
        }
        Ok(Self { mean, scale })
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    /// Standardize a copy of `data`.
    pub fn apply(&self, data: &Array2<f32>) -> Result<Array2<f32>> {
        let mut out = data.clone();
        self.apply_in_place(&mut out)?;
        Ok(out)
    }

    pub fn apply_in_place(&self, data: &mut Array2<f32>) -> Result<()> {
        if data.ncols() != self.width() {
            return Err(PipelineError::Config(format!(
                "normalization fit on {} features, got {}",
                self.width(),
                data.ncols()
            )));
        }
        for mut row in data.axis_iter_mut(Axis(0)) {
            for ((value, mean), scale) in row.iter_mut().zip(&self.mean).zip(&self.scale) {
                *value = (*value - mean) / scale;
            }
        }
        Ok(())
    }
}
