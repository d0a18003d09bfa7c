//! JSON Configuration Management
//!
//! Handles reading and writing the diagnosis settings file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::models::settings::{DiagnosisSettings, SettingsUpdate};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{config_path, ensure_dir};

/// Configuration service for managing diagnosis settings
#[derive(Debug)]
pub struct ConfigService {
    config_path: PathBuf,
    config: DiagnosisSettings,
}

impl ConfigService {
    /// Load `~/.netdiag/config.json`, creating it with defaults if missing.
    pub fn new() -> AppResult<Self> {
        Self::with_path(config_path()?)
    }

    /// Load the settings file at `path`, creating it with defaults if missing.
    pub fn with_path(path: impl Into<PathBuf>) -> AppResult<Self> {
        let config_path = path.into();
        if let Some(parent) = config_path.parent() {
            ensure_dir(parent)?;
        }

        let config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            let default_config = DiagnosisSettings::default();
            Self::save_to_file(&config_path, &default_config)?;
            default_config
        };

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> AppResult<DiagnosisSettings> {
        let content = fs::read_to_string(path)?;
        let config: DiagnosisSettings = serde_json::from_str(&content)?;
        config.validate().map_err(AppError::validation)?;
        Ok(config)
    }

    /// Save configuration to a file with pretty formatting
    fn save_to_file(path: &Path, config: &DiagnosisSettings) -> AppResult<()> {
        config.validate().map_err(AppError::validation)?;
        let content = serde_json::to_string_pretty(config)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the current settings
    pub fn get_config(&self) -> &DiagnosisSettings {
        &self.config
    }

    /// Update the settings with a partial update. Invalid updates are
    /// rejected and leave the stored settings untouched.
    pub fn update_config(&mut self, update: SettingsUpdate) -> AppResult<DiagnosisSettings> {
        let mut next = self.config.clone();
        next.apply_update(update);
        Self::save_to_file(&self.config_path, &next)?;
        self.config = next;
        Ok(self.config.clone())
    }

    /// Reload configuration from disk
    pub fn reload(&mut self) -> AppResult<()> {
        self.config = Self::load_from_file(&self.config_path)?;
        Ok(())
    }

    /// Reset configuration to defaults
    pub fn reset(&mut self) -> AppResult<()> {
        self.config = DiagnosisSettings::default();
        Self::save_to_file(&self.config_path, &self.config)
    }
}
