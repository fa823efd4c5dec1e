//! Persisted fitted models.
//!
//! An artifact is a JSON document holding a header (family, class names,
//! window length, optional normalization) and the model payload: the tree
//! ensemble itself, or a network's architecture description plus its
//! base64-encoded weight record. A blake3 checksum over header and payload
//! detects truncated or edited files.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;

use crate::analysis::{FEATURE_COUNT, FEATURE_VERSION};
use crate::dataset::NormalizationState;
use crate::error::{PipelineError, Result};
use crate::family::ModelFamily;
use crate::fs_util::atomic_write;
use crate::ml::forest::RandomForestModel;
use crate::ml::nn::{NetworkSpec, TrainedNetwork};
use crate::ml::{Classifier, ForestClassifier, NetworkClassifier};

/// Artifact layout version.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Everything diagnosis needs to reproduce training-time preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub format_version: u32,
    pub family: ModelFamily,
    pub classes: Vec<String>,
    pub window_length: usize,
    pub normalization: Option<NormalizationState>,
    /// RFC 3339 timestamp.
    pub created_at: String,
    /// Test-set accuracy at training time, when known.
    pub score: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum StoredModel {
    Forest { model: RandomForestModel },
    Network { spec: NetworkSpec, weights: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactFile {
    header: ArtifactHeader,
    model: StoredModel,
    checksum: String,
}

fn checksum(header: &ArtifactHeader, model: &StoredModel) -> Result<String> {
    let bytes = serde_json::to_vec(&(header, model))
        .map_err(|err| PipelineError::Training(format!("serialize artifact: {err}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[derive(Debug)]
enum LoadedModel {
    Forest(ForestClassifier),
    Network(NetworkClassifier),
}

/// A fitted model plus the preprocessing state it was trained with.
#[derive(Debug)]
pub struct ModelArtifact {
    header: ArtifactHeader,
    model: LoadedModel,
}

fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

impl ModelArtifact {
    pub fn from_forest(classifier: ForestClassifier, score: Option<f32>) -> Self {
        let header = ArtifactHeader {
            format_version: ARTIFACT_FORMAT_VERSION,
            family: ModelFamily::RandomForest,
            classes: classifier.classes().to_vec(),
            window_length: classifier.window_length(),
            normalization: None,
            created_at: timestamp(),
            score,
        };
        Self {
            header,
            model: LoadedModel::Forest(classifier),
        }
    }

    pub fn from_network(
        classifier: NetworkClassifier,
        normalization: Option<NormalizationState>,
        score: Option<f32>,
    ) -> Self {
        let spec = classifier.spec();
        let header = ArtifactHeader {
            format_version: ARTIFACT_FORMAT_VERSION,
            family: spec.family,
            classes: classifier.classes().to_vec(),
            window_length: spec.window_length,
            normalization,
            created_at: timestamp(),
            score,
        };
        Self {
            header,
            model: LoadedModel::Network(classifier),
        }
    }

    pub fn header(&self) -> &ArtifactHeader {
        &self.header
    }

    pub fn family(&self) -> ModelFamily {
        self.header.family
    }

    pub fn window_length(&self) -> usize {
        self.header.window_length
    }

    pub fn normalization(&self) -> Option<&NormalizationState> {
        self.header.normalization.as_ref()
    }

    pub fn default_file_name(&self) -> String {
        self.family().default_artifact_file_name()
    }

    /// Normalize raw windows exactly as at training time.
    pub fn prepare(&self, windows: &Array2<f32>) -> Result<Array2<f32>> {
        match self.normalization() {
            Some(state) => state.apply(windows),
            None => Ok(windows.clone()),
        }
    }

    fn classifier(&self) -> &dyn Classifier {
        match &self.model {
            LoadedModel::Forest(classifier) => classifier,
            LoadedModel::Network(classifier) => classifier,
        }
    }

    /// Class index per raw window.
    pub fn predict_raw(&self, windows: &Array2<f32>) -> Result<Vec<usize>> {
        self.classifier().predict(&self.prepare(windows)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let model = match &self.model {
            LoadedModel::Forest(classifier) => StoredModel::Forest {
                model: classifier.model().clone(),
            },
            LoadedModel::Network(classifier) => StoredModel::Network {
                spec: classifier.spec().clone(),
                weights: STANDARD.encode(classifier.network().to_bytes()?),
            },
        };
        let checksum = checksum(&self.header, &model)?;
        let file = ArtifactFile {
            header: self.header.clone(),
            model,
            checksum,
        };
        let bytes = serde_json::to_vec(&file)
            .map_err(|err| PipelineError::Training(format!("serialize artifact: {err}")))?;
        atomic_write(path, &bytes).map_err(|source| PipelineError::io(path, source))?;
        info!("Saved {} artifact to {}", self.family(), path.display());
        Ok(())
    }

    /// Save under `dir` with the family's default file name.
    pub fn save_in_dir(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.default_file_name());
        self.save(&path)?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|source| PipelineError::io(path, source))?;
        let file: ArtifactFile = serde_json::from_slice(&bytes)
            .map_err(|err| PipelineError::artifact(path, format!("not a model artifact: {err}")))?;
        let expected = checksum(&file.header, &file.model)?;
        if expected != file.checksum {
            return Err(PipelineError::artifact(path, "checksum mismatch"));
        }
        let header = file.header;
        if header.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(PipelineError::artifact(
                path,
                format!("unsupported format version {}", header.format_version),
            ));
        }
        if let Some(state) = &header.normalization {
            if state.width() != header.window_length {
                return Err(PipelineError::artifact(
                    path,
                    format!(
                        "normalization covers {} samples but windows have {}",
                        state.width(),
                        header.window_length
                    ),
                ));
            }
        }
        let model = match file.model {
            StoredModel::Forest { model } => {
                if header.family != ModelFamily::RandomForest {
                    return Err(PipelineError::artifact(path, "forest payload under a network header"));
                }
                model
                    .validate()
                    .map_err(|err| PipelineError::artifact(path, err.to_string()))?;
                if model.classes != header.classes {
                    return Err(PipelineError::artifact(path, "class list mismatch"));
                }
                if model.feat_version != FEATURE_VERSION || model.feature_len_f32 != FEATURE_COUNT {
                    return Err(PipelineError::artifact(
                        path,
                        format!(
                            "forest expects feature layout v{} with {} values, this build extracts v{FEATURE_VERSION} with {FEATURE_COUNT}",
                            model.feat_version, model.feature_len_f32
                        ),
                    ));
                }
                LoadedModel::Forest(ForestClassifier::new(model, header.window_length))
            }
            StoredModel::Network { spec, weights } => {
                if spec.family != header.family
                    || spec.window_length != header.window_length
                    || spec.n_classes != header.classes.len()
                {
                    return Err(PipelineError::artifact(path, "network spec contradicts header"));
                }
                let weights = STANDARD
                    .decode(weights.as_bytes())
                    .map_err(|err| PipelineError::artifact(path, format!("weights: {err}")))?;
                let network = TrainedNetwork::from_bytes(&spec, weights)
                    .map_err(|message| PipelineError::artifact(path, message))?;
                LoadedModel::Network(NetworkClassifier::new(spec, header.classes.clone(), network))
            }
        };
        Ok(Self { header, model })
    }
}

impl Classifier for ModelArtifact {
    fn classes(&self) -> &[String] {
        &self.header.classes
    }

    /// Probabilities for windows that are already prepared; see [`ModelArtifact::prepare`].
    fn predict_proba(&self, windows: &Array2<f32>) -> Result<Vec<Vec<f32>>> {
        self.classifier().predict_proba(windows)
    }
}
