//! Supported classifier families and their fixed training policy.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::ml::forest::ForestOptions;

/// File extension of tree-ensemble artifacts.
pub const FOREST_EXTENSION: &str = "forest";
/// File extension of neural-network artifacts.
pub const NETWORK_EXTENSION: &str = "network";

/// Closed set of classifier families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    RandomForest,
    Cnn1d,
    Lstm,
    Gru,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 4] = [
        ModelFamily::RandomForest,
        ModelFamily::Cnn1d,
        ModelFamily::Lstm,
        ModelFamily::Gru,
    ];

    /// Name used for cache keys and default artifact file names.
    pub fn model_name(self) -> &'static str {
        match self {
            Self::RandomForest => "random_forest",
            Self::Cnn1d => "1D_CNN",
            Self::Lstm => "LSTM",
            Self::Gru => "GRU",
        }
    }

    pub fn is_neural(self) -> bool {
        !matches!(self, Self::RandomForest)
    }

    pub fn artifact_extension(self) -> &'static str {
        if self.is_neural() {
            NETWORK_EXTENSION
        } else {
            FOREST_EXTENSION
        }
    }

    pub fn default_artifact_file_name(self) -> String {
        format!("{}.{}", self.model_name(), self.artifact_extension())
    }

    /// Fixed preprocessing and fit policy for this family.
    pub fn hyperparams(self) -> HyperParams {
        match self {
            Self::RandomForest => HyperParams {
                window_length: 500,
                samples_per_class: 1000,
                normalize: false,
                split: SplitRatios::new(0.6, 0.2, 0.2),
                augment: false,
                seed: DEFAULT_SEED,
                fit: FitParams::Forest(ForestOptions::default()),
            },
            Self::Cnn1d => HyperParams::sequence(20),
            Self::Lstm | Self::Gru => HyperParams::sequence(60),
        }
    }

    /// Parse a family from a user-facing token (`rf`, `cnn`, `lstm`, `gru`, or a model name).
    pub fn parse(token: &str) -> Option<Self> {
        let lowered = token.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "rf" | "forest" | "random_forest" | "random-forest" => Some(Self::RandomForest),
            "cnn" | "1d_cnn" | "1d-cnn" | "cnn1d" => Some(Self::Cnn1d),
            "lstm" => Some(Self::Lstm),
            "gru" => Some(Self::Gru),
            _ => None,
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_name())
    }
}

/// Preprocessing path implied by an artifact's file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Forest,
    Network,
}

impl ArtifactKind {
    /// Forest suffix selects the tree path; any other suffix the network path.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case(FOREST_EXTENSION) => Self::Forest,
            _ => Self::Network,
        }
    }
}

pub const DEFAULT_SEED: u64 = 42;

/// Train/validation/test fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    pub train: f64,
    pub valid: f64,
    pub test: f64,
}

impl SplitRatios {
    pub const TOLERANCE: f64 = 1e-6;

    pub const fn new(train: f64, valid: f64, test: f64) -> Self {
        Self { train, valid, test }
    }

    pub fn validate(&self) -> Result<()> {
        let parts = [self.train, self.valid, self.test];
        if parts.iter().any(|r| !r.is_finite() || *r < 0.0 || *r > 1.0) {
            return Err(PipelineError::Config(format!(
                "split ratios must lie in [0, 1], got {:?}",
                parts
            )));
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > Self::TOLERANCE {
            return Err(PipelineError::Config(format!(
                "split ratios must sum to 1.0, got {sum:.6}"
            )));
        }
        Ok(())
    }
}

/// Fit parameters for neural families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkOptions {
    pub batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FitParams {
    Forest(ForestOptions),
    Network(NetworkOptions),
}

/// Full preprocessing and fit policy for one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    pub window_length: usize,
    pub samples_per_class: usize,
    pub normalize: bool,
    pub split: SplitRatios,
    pub augment: bool,
    pub seed: u64,
    pub fit: FitParams,
}

impl HyperParams {
    fn sequence(epochs: usize) -> Self {
        Self {
            window_length: 2048,
            samples_per_class: 1000,
            normalize: true,
            split: SplitRatios::new(0.7, 0.2, 0.1),
            augment: false,
            seed: DEFAULT_SEED,
            fit: FitParams::Network(NetworkOptions {
                batch_size: 128,
                epochs,
                learning_rate: 1e-3,
            }),
        }
    }

    /// Check the policy is internally consistent for `family`.
    pub fn validate_for(&self, family: ModelFamily) -> Result<()> {
        self.split.validate()?;
        if self.window_length == 0 {
            return Err(PipelineError::Config("window length must be positive".into()));
        }
        if self.samples_per_class == 0 {
            return Err(PipelineError::Config(
                "samples per class must be positive".into(),
            ));
        }
        match (&self.fit, family.is_neural()) {
            (FitParams::Forest(options), false) => options.validate(),
            (FitParams::Network(options), true) => {
                if options.batch_size == 0 || options.epochs == 0 {
                    return Err(PipelineError::Config(
                        "batch size and epochs must be positive".into(),
                    ));
                }
                if !self.normalize {
                    return Err(PipelineError::Config(format!(
                        "{family} requires normalized inputs"
                    )));
                }
                Ok(())
            }
            _ => Err(PipelineError::Config(format!(
                "fit parameters do not match family {family}"
            ))),
        }
    }
}
