//! On-disk directory of rendered diagnostics and signal previews.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::family::ModelFamily;
use crate::signal::label_for_path;

pub const IMAGE_EXTENSION: &str = "png";

/// One rendered diagnostic of a trained family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticView {
    ConfusionMatrix,
    RocCurves,
    PrecisionRecallCurves,
    Loss,
    Accuracy,
}

impl DiagnosticView {
    pub const ALL: [DiagnosticView; 5] = [
        DiagnosticView::ConfusionMatrix,
        DiagnosticView::RocCurves,
        DiagnosticView::PrecisionRecallCurves,
        DiagnosticView::Loss,
        DiagnosticView::Accuracy,
    ];

    /// File-name suffix after `<model_name>_`.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::ConfusionMatrix => "confusion_matrix",
            Self::RocCurves => "ROC_Curves",
            Self::PrecisionRecallCurves => "Precision_Recall_Curves",
            Self::Loss => "train_valid_loss",
            Self::Accuracy => "train_valid_acc",
        }
    }

    /// Loss and accuracy curves only exist for neural families.
    pub fn applies_to(self, family: ModelFamily) -> bool {
        family.is_neural() || !matches!(self, Self::Loss | Self::Accuracy)
    }

    pub fn for_family(family: ModelFamily) -> Vec<DiagnosticView> {
        Self::ALL
            .into_iter()
            .filter(|view| view.applies_to(family))
            .collect()
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "confusion" | "confusion_matrix" | "cm" => Some(Self::ConfusionMatrix),
            "roc" | "roc_curves" => Some(Self::RocCurves),
            "pr" | "precision_recall" | "precision_recall_curves" => {
                Some(Self::PrecisionRecallCurves)
            }
            "loss" | "train_valid_loss" => Some(Self::Loss),
            "acc" | "accuracy" | "train_valid_acc" => Some(Self::Accuracy),
            _ => None,
        }
    }
}

impl fmt::Display for DiagnosticView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Cache directory keyed by family model name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticsCache {
    root: PathBuf,
}

impl DiagnosticsCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|source| PipelineError::io(&self.root, source))
    }

    /// `<cache>/<model_name>_<suffix>.png`.
    pub fn diagnostic_path(&self, family: ModelFamily, view: DiagnosticView) -> PathBuf {
        self.root.join(format!(
            "{}_{}.{IMAGE_EXTENSION}",
            family.model_name(),
            view.suffix()
        ))
    }

    /// `<cache>/<recording stem>.png`.
    pub fn preview_path(&self, recording: &Path) -> PathBuf {
        self.root
            .join(format!("{}.{IMAGE_EXTENSION}", label_for_path(recording)))
    }

    /// Cached image for `family` and `view`, if the family was trained in this cache.
    pub fn lookup(&self, family: ModelFamily, view: DiagnosticView) -> Result<PathBuf> {
        if !view.applies_to(family) {
            return Err(PipelineError::Config(format!(
                "{family} has no {view} diagnostic"
            )));
        }
        let path = self.diagnostic_path(family, view);
        if !path.is_file() {
            return Err(PipelineError::io(
                &path,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{family} has not been trained yet"),
                ),
            ));
        }
        Ok(path)
    }

    /// Delete every image in the cache directory; returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => return Err(PipelineError::io(&self.root, source)),
        };
        let mut removed = 0usize;
        for entry in entries {
            let entry = entry.map_err(|source| PipelineError::io(&self.root, source))?;
            let path = entry.path();
            let is_image = path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(IMAGE_EXTENSION));
            if !is_image {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => warn!("Failed to remove cached {}: {err}", path.display()),
            }
        }
        info!("Cleared {removed} cached images from {}", self.root.display());
        Ok(removed)
    }
}
