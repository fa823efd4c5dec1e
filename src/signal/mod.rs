//! Vibration recordings and drive-end channel extraction.
//!
//! Recordings are MATLAB level-5 containers holding one named array per
//! sensor channel (`X097_DE_time`, `X097_FE_time`, `X097RPM`, ...). Only the
//! drive-end channel feeds the pipeline.

mod mat;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::error::{PipelineError, Result};

pub use mat::{ChannelInfo, list_channels};

/// Default token identifying the drive-end accelerometer channel.
pub const DEFAULT_DRIVE_END_MARKER: &str = "DE";
/// File extension of recordings.
pub const RECORDING_EXTENSION: &str = "mat";

/// One channel of one recording, immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSignal {
    source_id: String,
    label: String,
    values: Arc<[f32]>,
}

impl RawSignal {
    pub fn new(source_id: impl Into<String>, label: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            source_id: source_id.into(),
            label: label.into(),
            values: values.into(),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Class label derived from the recording's file stem.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Reads the drive-end channel out of recording containers.
#[derive(Debug, Clone)]
pub struct SignalLoader {
    marker: String,
    pattern: Regex,
}

impl SignalLoader {
    /// Match channel names containing `marker` as an `_`-delimited token.
    ///
    /// A blank marker selects [`DEFAULT_DRIVE_END_MARKER`].
    pub fn new(marker: &str) -> Result<Self> {
        let marker = marker.trim();
        let marker = if marker.is_empty() {
            DEFAULT_DRIVE_END_MARKER
        } else {
            marker
        };
        let pattern = Regex::new(&format!(
            r"(?:^|[^A-Za-z0-9]){}(?:[^A-Za-z0-9]|$)",
            regex::escape(marker)
        ))
        .map_err(|err| PipelineError::Config(format!("drive-end marker '{marker}': {err}")))?;
        Ok(Self {
            marker: marker.to_string(),
            pattern,
        })
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn is_drive_end(&self, channel_name: &str) -> bool {
        self.pattern.is_match(channel_name)
    }

    /// Load the full drive-end channel of `path`.
    pub fn load(&self, path: &Path) -> Result<RawSignal> {
        let values = mat::read_channel(path, |name| self.is_drive_end(name))?.ok_or_else(|| {
            PipelineError::format(
                path,
                format!("no channel matching drive-end marker '{}'", self.marker),
            )
        })?;
        if values.is_empty() {
            return Err(PipelineError::format(path, "drive-end channel is empty"));
        }
        let label = label_for_path(path);
        debug!(
            "Loaded {} drive-end samples from {}",
            values.len(),
            path.display()
        );
        Ok(RawSignal::new(path.display().to_string(), label, values))
    }

    /// First `points` samples of the drive-end channel, for visualization only.
    pub fn preview(&self, path: &Path, points: usize) -> Result<Vec<f32>> {
        let signal = self.load(path)?;
        let end = points.min(signal.len());
        Ok(signal.values()[..end].to_vec())
    }
}

/// Class label for a recording: its file stem.
pub fn label_for_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

/// Recordings in `folder`, sorted by file name so class indices are stable.
pub fn recordings_in(folder: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(folder).map_err(|source| PipelineError::io(folder, source))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| PipelineError::io(folder, source))?;
        let path = entry.path();
        let is_recording = path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(RECORDING_EXTENSION));
        if is_recording {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}
