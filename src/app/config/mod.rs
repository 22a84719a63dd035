use std::path::{Path, PathBuf};

pub mod persistence;

pub use persistence::{SessionSettings, Settings};

use crate::error::ConfigError;

pub struct AppConfig;

impl AppConfig {
    pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("tame"))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn get_settings_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::get_config_dir()?.join("settings.toml"))
    }

    pub fn get_log_dir() -> Result<PathBuf, ConfigError> {
        Ok(Self::get_config_dir()?.join("logs"))
    }

    /// Per-user runtime dir when there is one, temp dir otherwise
    pub fn get_lock_path() -> PathBuf {
        dirs::runtime_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("tame.lock")
    }

    /// Load settings, falling back to defaults.
    ///
    /// A missing file is created with defaults so there is something to edit.
    /// An unreadable or corrupt file is left alone and defaults are used.
    pub fn load(path: &Path) -> Settings {
        if !path.exists() {
            let settings = Settings::default();
            match settings.save(path) {
                Ok(()) => tracing::info!(path = %path.display(), "created default settings"),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not create settings file"),
            }
            return settings;
        }

        match Settings::load(path) {
            Ok(settings) => {
                tracing::info!(path = %path.display(), "loaded settings");
                settings.sanitized()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid settings, using defaults");
                Settings::default()
            }
        }
    }
}
