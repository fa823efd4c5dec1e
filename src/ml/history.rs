use serde::{Deserialize, Serialize};

/// Training statistics of one completed epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Mean training loss over all batches in this epoch.
    pub train_loss: f64,
    pub valid_loss: f64,
    /// Fractions in [0, 1].
    pub train_accuracy: f64,
    pub valid_accuracy: f64,
    /// Wall-clock duration of this epoch in milliseconds.
    pub elapsed_ms: u64,
}

/// Per-epoch loss/accuracy history of a neural fit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochStats>,
}

impl TrainingHistory {
    pub fn push(&mut self, stats: EpochStats) {
        self.epochs.push(stats);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochStats> {
        self.epochs.last()
    }

    pub fn train_loss(&self) -> Vec<f32> {
        self.series(|s| s.train_loss)
    }

    pub fn valid_loss(&self) -> Vec<f32> {
        self.series(|s| s.valid_loss)
    }

    pub fn train_accuracy(&self) -> Vec<f32> {
        self.series(|s| s.train_accuracy)
    }

    pub fn valid_accuracy(&self) -> Vec<f32> {
        self.series(|s| s.valid_accuracy)
    }

    fn series(&self, pick: impl Fn(&EpochStats) -> f64) -> Vec<f32> {
        self.epochs.iter().map(|s| pick(s) as f32).collect()
    }
}
