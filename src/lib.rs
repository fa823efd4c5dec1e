//! Bearing fault diagnosis from vibration recordings.
//!
//! Recordings are sliced into labeled windows, split and normalized, then fed
//! to one of four model families. Training and diagnosis run as background
//! jobs whose results flow back through [`jobs::JobScheduler::dispatch`].

/// Feature extraction for the tree ensemble.
pub mod analysis;
/// Application directory helpers.
pub mod app_dirs;
/// Saved models with their preprocessing state.
pub mod artifact;
/// Cache of rendered diagnostics.
pub mod cache;
/// Persistent settings.
pub mod config;
/// Windowing, splitting and normalization.
pub mod dataset;
/// Error taxonomy shared by every layer.
pub mod error;
/// Model families and their fixed policies.
pub mod family;
pub(crate) mod fs_util;
/// Background job scheduling.
pub mod jobs;
/// Tracing setup.
pub mod logging;
/// Classifiers, training loops and evaluation.
pub mod ml;
/// Training, diagnosis and preview orchestration.
pub mod pipeline;
/// PNG rendering of diagnostics.
pub mod plots;
/// Recording loaders.
pub mod signal;

pub use error::{ErrorKind, PipelineError, Result};
pub use family::{HyperParams, ModelFamily};
