//! Persistent application settings stored as TOML under the app root.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs::{self, AppDirError};
use crate::family::DEFAULT_SEED;
use crate::fs_util::atomic_write;
use crate::signal::DEFAULT_DRIVE_END_MARKER;

/// File name of the settings file inside the app root.
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_PREVIEW_POINTS: usize = 2500;

/// Errors that may occur while loading or saving settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
    #[error("No suitable config directory found")]
    NoConfigDir,
}

fn map_app_dir_error(error: AppDirError) -> ConfigError {
    match error {
        AppDirError::NoBaseDir => ConfigError::NoConfigDir,
        AppDirError::CreateDir { path, source } => ConfigError::CreateDir { path, source },
    }
}

/// User-tunable settings; every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Where diagnostic images and previews are written; `<app root>/cache` when unset.
    pub cache_dir: Option<PathBuf>,
    pub seed: u64,
    pub drive_end_marker: String,
    pub preview_points: usize,
    pub clear_cache_on_exit: bool,
    /// Recording replayed by the real-time diagnosis command.
    pub realtime_signal: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            cache_dir: None,
            seed: DEFAULT_SEED,
            drive_end_marker: DEFAULT_DRIVE_END_MARKER.to_string(),
            preview_points: DEFAULT_PREVIEW_POINTS,
            clear_cache_on_exit: true,
            realtime_signal: None,
        }
    }
}

impl AppSettings {
    /// Replace empty or zero values with their defaults.
    pub fn normalized(mut self) -> Self {
        let marker = self.drive_end_marker.trim();
        self.drive_end_marker = if marker.is_empty() {
            DEFAULT_DRIVE_END_MARKER.to_string()
        } else {
            marker.to_string()
        };
        if self.preview_points == 0 {
            self.preview_points = DEFAULT_PREVIEW_POINTS;
        }
        if self
            .cache_dir
            .as_ref()
            .is_some_and(|dir| dir.as_os_str().is_empty())
        {
            self.cache_dir = None;
        }
        self
    }

    /// Configured cache directory, or the default under the app root.
    pub fn resolved_cache_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => app_dirs::default_cache_dir().map_err(map_app_dir_error),
        }
    }
}

/// `<app root>/config.toml`.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let dir = app_dirs::app_root_dir().map_err(map_app_dir_error)?;
    Ok(dir.join(CONFIG_FILE_NAME))
}

/// Load settings from the default location, returning defaults if missing.
pub fn load_or_default() -> Result<AppSettings, ConfigError> {
    load_settings_from(&config_path()?)
}

pub fn load_settings_from(path: &Path) -> Result<AppSettings, ConfigError> {
    if !path.exists() {
        return Ok(AppSettings::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<AppSettings>(&text)
        .map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
        .map(AppSettings::normalized)
}

/// Write the TOML settings file atomically.
pub fn save_settings_to(settings: &AppSettings, path: &Path) -> Result<(), ConfigError> {
    let data = toml::to_string_pretty(settings).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write(path, data.as_bytes()).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save(settings: &AppSettings) -> Result<(), ConfigError> {
    save_settings_to(settings, &config_path()?)
}
