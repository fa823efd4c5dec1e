use ndarray::Array2;

use super::forest::{
    ForestOptions, RandomForestModel, TrainDataset, argmax, train_random_forest,
};
use super::nn::{NetworkSpec, TrainedNetwork};
use super::report::EvaluationReport;
use crate::analysis::{FEATURE_COUNT, FEATURE_VERSION, FeatureExtractor};
use crate::dataset::Partition;
use crate::error::{PipelineError, Result};

/// Uniform predict/evaluate capability over every model family.
///
/// Inputs are windows as rows, already normalized when the family requires it.
pub trait Classifier {
    fn classes(&self) -> &[String];

    fn predict_proba(&self, windows: &Array2<f32>) -> Result<Vec<Vec<f32>>>;

    fn predict(&self, windows: &Array2<f32>) -> Result<Vec<usize>> {
        Ok(self
            .predict_proba(windows)?
            .iter()
            .map(|row| argmax(row))
            .collect())
    }

    /// Score on a labeled partition and build the full evaluation report.
    fn evaluate(&self, test: &Partition) -> Result<EvaluationReport> {
        let probabilities = self.predict_proba(&test.x)?;
        EvaluationReport::from_probabilities(self.classes(), &test.y, &probabilities)
    }
}

/// Random forest over per-window feature vectors.
#[derive(Debug, Clone)]
pub struct ForestClassifier {
    model: RandomForestModel,
    window_length: usize,
}

impl ForestClassifier {
    pub fn new(model: RandomForestModel, window_length: usize) -> Self {
        Self {
            model,
            window_length,
        }
    }

    /// Extract features from `train` windows and fit the ensemble.
    pub fn fit(classes: &[String], train: &Partition, options: &ForestOptions) -> Result<Self> {
        let window_length = train.x.ncols();
        let features = FeatureExtractor::new(window_length).extract_matrix(&train.x);
        let dataset = TrainDataset {
            feature_len_f32: FEATURE_COUNT,
            feat_version: FEATURE_VERSION,
            classes: classes.to_vec(),
            x: features.rows().into_iter().map(|row| row.to_vec()).collect(),
            y: train.y.clone(),
        };
        let model = train_random_forest(&dataset, options)?;
        Ok(Self::new(model, window_length))
    }

    pub fn model(&self) -> &RandomForestModel {
        &self.model
    }

    pub fn window_length(&self) -> usize {
        self.window_length
    }
}

impl Classifier for ForestClassifier {
    fn classes(&self) -> &[String] {
        &self.model.classes
    }

    fn predict_proba(&self, windows: &Array2<f32>) -> Result<Vec<Vec<f32>>> {
        if windows.ncols() != self.window_length {
            return Err(PipelineError::Config(format!(
                "forest expects windows of {}, got {}",
                self.window_length,
                windows.ncols()
            )));
        }
        let features = FeatureExtractor::new(self.window_length).extract_matrix(windows);
        Ok(features
            .rows()
            .into_iter()
            .map(|row| self.model.predict_proba(&row.to_vec()))
            .collect())
    }
}

/// A neural family over raw windows.
#[derive(Debug)]
pub struct NetworkClassifier {
    spec: NetworkSpec,
    classes: Vec<String>,
    network: TrainedNetwork,
}

impl NetworkClassifier {
    pub fn new(spec: NetworkSpec, classes: Vec<String>, network: TrainedNetwork) -> Self {
        Self {
            spec,
            classes,
            network,
        }
    }

    pub fn spec(&self) -> &NetworkSpec {
        &self.spec
    }

    pub fn network(&self) -> &TrainedNetwork {
        &self.network
    }
}

impl Classifier for NetworkClassifier {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn predict_proba(&self, windows: &Array2<f32>) -> Result<Vec<Vec<f32>>> {
        if windows.ncols() != self.spec.window_length {
            return Err(PipelineError::Config(format!(
                "{} expects windows of {}, got {}",
                self.spec.family,
                self.spec.window_length,
                windows.ncols()
            )));
        }
        self.network.predict_proba(windows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tones(n_per_class: usize, len: usize) -> Partition {
        let mut flat = Vec::new();
        let mut y = Vec::new();
        for i in 0..n_per_class {
            let phase = i as f32 * 0.37;
            flat.extend((0..len).map(|t| (t as f32 * 0.05 + phase).sin()));
            y.push(0);
            flat.extend((0..len).map(|t| (t as f32 * 1.1 + phase).sin() * 3.0));
            y.push(1);
        }
        Partition {
            x: Array2::from_shape_vec((n_per_class * 2, len), flat).unwrap(),
            y,
        }
    }

    #[test]
    fn forest_separates_low_and_high_tones() {
        let classes = vec!["low".to_string(), "high".to_string()];
        let options = ForestOptions {
            n_trees: 8,
            ..ForestOptions::default()
        };
        let forest = ForestClassifier::fit(&classes, &tones(20, 256), &options).unwrap();
        let report = forest.evaluate(&tones(5, 256)).unwrap();
        assert!(report.score > 0.99, "score {}", report.score);
        assert_eq!(forest.predict(&tones(1, 256).x).unwrap(), vec![0, 1]);
    }

    #[test]
    fn wrong_window_length_is_rejected() {
        let classes = vec!["low".to_string(), "high".to_string()];
        let options = ForestOptions {
            n_trees: 2,
            ..ForestOptions::default()
        };
        let forest = ForestClassifier::fit(&classes, &tones(4, 64), &options).unwrap();
        assert!(forest.predict(&tones(1, 32).x).is_err());
    }
}
