//! Orchestration of training, diagnosis and previews over the data layers.

pub mod diagnosis;
pub mod preview;
pub mod training;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::cache::DiagnosticsCache;
use crate::error::{PipelineError, Result};
use crate::signal::SignalLoader;

pub use diagnosis::{DIAGNOSIS_WINDOWS, DiagnosisPlan, DiagnosisResult, diagnose};
pub use preview::render_preview;
pub use training::{TrainingResult, prepare, train};

/// Shared, cheaply cloned inputs every pipeline call needs.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub loader: SignalLoader,
    pub cache: DiagnosticsCache,
    pub preview_points: usize,
}

impl PipelineContext {
    pub fn new(loader: SignalLoader, cache: DiagnosticsCache, preview_points: usize) -> Self {
        Self {
            loader,
            cache,
            preview_points,
        }
    }
}

/// Lifecycle of one training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrainingStage {
    #[default]
    Idle,
    Preparing,
    Fitting,
    Evaluating,
    Reporting,
    Done,
}

impl fmt::Display for TrainingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Fitting => "fitting",
            Self::Evaluating => "evaluating",
            Self::Reporting => "reporting",
            Self::Done => "done",
        };
        f.write_str(label)
    }
}

/// Snapshot of a training run as seen from the interactive thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrainingProgress {
    pub stage: TrainingStage,
    /// Completed epochs, neural families only.
    pub epochs_done: usize,
}

/// Progress cell written by the worker and read by the scheduler.
#[derive(Debug, Clone, Default)]
pub struct StageTracker {
    inner: Arc<Mutex<TrainingProgress>>,
    trail: Arc<Mutex<Vec<TrainingStage>>>,
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> TrainingProgress {
        *self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn stage(&self) -> TrainingStage {
        self.progress().stage
    }

    /// Stages entered so far, in order.
    pub fn trail(&self) -> Vec<TrainingStage> {
        self.trail
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn enter(&self, stage: TrainingStage) {
        let mut progress = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        progress.stage = stage;
        self.trail
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(stage);
    }

    pub(crate) fn epoch_finished(&self, epoch: usize) {
        let mut progress = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        progress.epochs_done = epoch;
    }
}

/// Folder holding the class recordings for `data_path`.
///
/// Selecting any file inside the folder trains on the whole folder.
pub fn resolve_data_folder(data_path: &Path) -> Result<PathBuf> {
    if data_path.is_dir() {
        return Ok(data_path.to_path_buf());
    }
    if data_path.is_file() {
        return match data_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.to_path_buf()),
            _ => Ok(PathBuf::from(".")),
        };
    }
    Err(PipelineError::io(
        data_path,
        std::io::Error::new(std::io::ErrorKind::NotFound, "data folder does not exist"),
    ))
}

/// A model or signal file that must exist before a job is dispatched.
pub(crate) fn require_file(path: &Path, what: &str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PipelineError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("{what} not found")),
        ))
    }
}
