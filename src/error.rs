use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while preparing data, fitting models or diagnosing signals.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input container is unreadable or lacks the expected channel.
    #[error("Unsupported recording {path}: {message}")]
    Format { path: PathBuf, message: String },
    /// A recording is too short to provide the requested windows.
    #[error(
        "Recording '{source_id}' has {available} samples but {required} are needed for {windows} windows of length {window_length}"
    )]
    InsufficientData {
        source_id: String,
        available: usize,
        required: usize,
        windows: usize,
        window_length: usize,
    },
    /// Invalid split ratios, hyperparameters or request arguments.
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// Model artifact is corrupt or does not match the expected format.
    #[error("Failed to load model artifact {path}: {message}")]
    ArtifactLoad { path: PathBuf, message: String },
    /// A job of the same kind is already running.
    #[error("A {0} job is already running")]
    Busy(&'static str),
    /// Filesystem failure with path context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The OS refused to start a worker thread.
    #[error("Failed to start worker '{name}': {source}")]
    Spawn {
        name: String,
        source: std::io::Error,
    },
    /// The model library failed while fitting or predicting.
    #[error("Training failed: {0}")]
    Training(String),
}

/// Category of a failure, carried across the job channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Format,
    InsufficientData,
    Config,
    ArtifactLoad,
    Busy,
    Io,
    Training,
    /// The worker terminated without reporting a result.
    WorkerLost,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Format { .. } => ErrorKind::Format,
            Self::InsufficientData { .. } => ErrorKind::InsufficientData,
            Self::Config(_) => ErrorKind::Config,
            Self::ArtifactLoad { .. } => ErrorKind::ArtifactLoad,
            Self::Busy(_) => ErrorKind::Busy,
            Self::Io { .. } | Self::Spawn { .. } => ErrorKind::Io,
            Self::Training(_) => ErrorKind::Training,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn artifact(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ArtifactLoad {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
