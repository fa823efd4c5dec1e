//! Applying a saved model to a new recording.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::artifact::ModelArtifact;
use crate::dataset::{Partition, build_from_signal};
use crate::error::{PipelineError, Result};
use crate::family::{ArtifactKind, ModelFamily};
use crate::signal::SignalLoader;

/// Windows classified per diagnosis, whatever the family.
pub const DIAGNOSIS_WINDOWS: usize = 500;
pub const FOREST_WINDOW: usize = 500;
pub const NETWORK_WINDOW: usize = 2048;

/// Preprocessing implied by an artifact's file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosisPlan {
    pub kind: ArtifactKind,
    pub window_length: usize,
    pub windows: usize,
    /// Whether the artifact's stored normalization is applied.
    pub normalize: bool,
}

impl DiagnosisPlan {
    pub fn for_kind(kind: ArtifactKind) -> Self {
        match kind {
            ArtifactKind::Forest => Self {
                kind,
                window_length: FOREST_WINDOW,
                windows: DIAGNOSIS_WINDOWS,
                normalize: false,
            },
            ArtifactKind::Network => Self {
                kind,
                window_length: NETWORK_WINDOW,
                windows: DIAGNOSIS_WINDOWS,
                normalize: true,
            },
        }
    }

    pub fn for_artifact(path: &Path) -> Self {
        Self::for_kind(ArtifactKind::from_path(path))
    }

    /// Reject artifacts whose header disagrees with the suffix-selected path.
    pub fn check(&self, artifact: &ModelArtifact, path: &Path) -> Result<()> {
        let header = artifact.header();
        let is_forest = header.family == ModelFamily::RandomForest;
        if is_forest != (self.kind == ArtifactKind::Forest) {
            return Err(PipelineError::artifact(
                path,
                format!("{} model stored under a {:?} suffix", header.family, self.kind),
            ));
        }
        if header.window_length != self.window_length {
            return Err(PipelineError::artifact(
                path,
                format!(
                    "model was trained on windows of {} but this path uses {}",
                    header.window_length, self.window_length
                ),
            ));
        }
        if header.normalization.is_some() != self.normalize {
            let detail = if self.normalize {
                "model carries no normalization state"
            } else {
                "tree model unexpectedly carries a normalization state"
            };
            return Err(PipelineError::artifact(path, detail));
        }
        Ok(())
    }
}

/// Predicted class per window plus the overall verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisResult {
    pub model: PathBuf,
    pub signal: PathBuf,
    pub family: ModelFamily,
    pub labels: Vec<String>,
    pub counts: BTreeMap<String, usize>,
    /// Most frequent label; ties go to the class listed first in the model.
    pub majority: String,
}

impl DiagnosisResult {
    fn from_predictions(
        model: &Path,
        signal: &Path,
        family: ModelFamily,
        classes: &[String],
        predicted: &[usize],
    ) -> Result<Self> {
        let mut per_class = vec![0usize; classes.len()];
        let mut labels = Vec::with_capacity(predicted.len());
        for &idx in predicted {
            let label = classes.get(idx).ok_or_else(|| {
                PipelineError::Training(format!("predicted class {idx} out of range"))
            })?;
            per_class[idx] += 1;
            labels.push(label.clone());
        }
        let mut best = 0usize;
        for (idx, &count) in per_class.iter().enumerate() {
            if count > per_class[best] {
                best = idx;
            }
        }
        let majority = classes.get(best).cloned().unwrap_or_default();
        let counts = classes
            .iter()
            .zip(&per_class)
            .filter(|(_, count)| **count > 0)
            .map(|(name, count)| (name.clone(), *count))
            .collect();
        Ok(Self {
            model: model.to_path_buf(),
            signal: signal.to_path_buf(),
            family,
            labels,
            counts,
            majority,
        })
    }

    /// Share of windows that agree with the majority label.
    pub fn agreement(&self) -> f32 {
        if self.labels.is_empty() {
            return 0.0;
        }
        let agreeing = self.counts.get(&self.majority).copied().unwrap_or(0);
        agreeing as f32 / self.labels.len() as f32
    }
}

/// Classify [`DIAGNOSIS_WINDOWS`] windows of `signal_path` with the model at `artifact_path`.
pub fn diagnose(
    loader: &SignalLoader,
    artifact_path: &Path,
    signal_path: &Path,
) -> Result<DiagnosisResult> {
    let plan = DiagnosisPlan::for_artifact(artifact_path);
    let artifact = ModelArtifact::load(artifact_path)?;
    plan.check(&artifact, artifact_path)?;

    let signal = loader.load(signal_path)?;
    let windows = build_from_signal(&signal, plan.window_length, plan.windows)?;
    let x = Partition::unlabeled(&windows)?;
    let predicted = artifact.predict_raw(&x)?;
    let result = DiagnosisResult::from_predictions(
        artifact_path,
        signal_path,
        artifact.family(),
        &artifact.header().classes,
        &predicted,
    )?;
    info!(
        "Diagnosed {} with {}: {} ({:.0}% of windows)",
        signal_path.display(),
        artifact.family(),
        result.majority,
        result.agreement() * 100.0
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_follow_suffix() {
        assert_eq!(
            DiagnosisPlan::for_artifact(Path::new("m/random_forest.forest")),
            DiagnosisPlan {
                kind: ArtifactKind::Forest,
                window_length: 500,
                windows: 500,
                normalize: false
            }
        );
        let plan = DiagnosisPlan::for_artifact(Path::new("m/GRU.network"));
        assert_eq!((plan.window_length, plan.windows, plan.normalize), (2048, 500, true));
        let plan = DiagnosisPlan::for_artifact(Path::new("m/legacy.h5"));
        assert_eq!(plan.kind, ArtifactKind::Network);
    }

    #[test]
    fn majority_prefers_first_class_on_ties() {
        let classes = vec!["ball".to_string(), "inner".to_string(), "normal".to_string()];
        let result = DiagnosisResult::from_predictions(
            Path::new("a.forest"),
            Path::new("s.mat"),
            ModelFamily::RandomForest,
            &classes,
            &[2, 1, 2, 1],
        )
        .unwrap();
        assert_eq!(result.majority, "inner");
        assert_eq!(result.counts.len(), 2);
        assert_eq!(result.agreement(), 0.5);
        assert_eq!(result.labels, vec!["normal", "inner", "normal", "inner"]);
    }

    #[test]
    fn out_of_range_prediction_is_rejected() {
        let classes = vec!["ball".to_string()];
        let err = DiagnosisResult::from_predictions(
            Path::new("a.forest"),
            Path::new("s.mat"),
            ModelFamily::RandomForest,
            &classes,
            &[1],
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Training);
    }
}
