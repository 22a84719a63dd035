use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::limiter::{LimiterConfig, LimiterHandle};

/// Persisted settings, stored flat in `settings.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Reserved. Persisted and exposed, no effect on limiting.
    #[serde(default)]
    pub voice_mode: bool,
    #[serde(flatten)]
    pub limiter: LimiterConfig,
}

fn default_enabled() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            voice_mode: false,
            limiter: LimiterConfig::default(),
        }
    }
}

impl Settings {
    /// Current live values from a running limiter
    pub fn from_handle(handle: &LimiterHandle, voice_mode: bool) -> Self {
        Self {
            enabled: handle.is_enabled(),
            voice_mode,
            limiter: handle.config().snapshot(),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Same settings with every limiter field clamped into its domain.
    /// Logs the fields that had to change.
    pub fn sanitized(mut self) -> Self {
        let invalid = self.limiter.invalid_fields();
        if !invalid.is_empty() {
            tracing::warn!(fields = ?invalid, "settings out of range, clamping");
            self.limiter = self.limiter.sanitized();
        }
        self
    }
}

/// The parts of [`Settings`] owned by the session rather than the live limiter.
///
/// `enabled` is what gets written back on exit: the stored value, changed only
/// by a runtime toggle or a settings edit. Start-up flags such as `--disabled`
/// apply to the limiter for this run and are not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub enabled: bool,
    pub voice_mode: bool,
}

impl SessionSettings {
    /// Seed from the settings as stored, before any command-line override
    pub fn from_stored(settings: &Settings) -> Self {
        Self {
            enabled: settings.enabled,
            voice_mode: settings.voice_mode,
        }
    }

    /// The user flipped the enable flag while running
    pub fn toggled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// The settings file was edited and re-applied
    pub fn reloaded(&mut self, settings: &Settings) {
        *self = Self::from_stored(settings);
    }

    /// Settings to save: live limiter values plus the session's own fields
    pub fn to_save(&self, handle: &LimiterHandle) -> Settings {
        Settings {
            enabled: self.enabled,
            ..Settings::from_handle(handle, self.voice_mode)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let s = Settings::from_toml("volume_cap = 0.35\nhold_time = 0.3\n").unwrap();
        assert_eq!(s.limiter.volume_cap, 0.35);
        assert_eq!(s.limiter.hold_time, 0.3);
        assert_eq!(s.limiter.attack_time, 0.05);
        assert!(s.enabled);
        assert!(!s.voice_mode);
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn test_toml_roundtrip() {
        let s = Settings {
            enabled: false,
            voice_mode: true,
            limiter: LimiterConfig::recommended(0.4),
        };
        let text = s.to_toml().unwrap();
        assert!(text.contains("dampening = 2.0"));
        assert_eq!(Settings::from_toml(&text).unwrap(), s);
    }

    #[test]
    fn test_corrupt_file_is_error() {
        assert!(Settings::from_toml("volume_cap = \"loud\"").is_err());
        assert!(Settings::from_toml("[[[").is_err());
    }

    #[test]
    fn test_sanitized_clamps_bad_values() {
        let s = Settings::from_toml("dampening = 0.5\nrelease_time = -2\n")
            .unwrap()
            .sanitized();
        assert_eq!(s.limiter.dampening, 1.0);
        assert_eq!(s.limiter.release_time, 0.0);
    }

    #[test]
    fn test_startup_disable_is_not_saved() {
        use crate::limiter::SharedConfig;

        let stored = Settings::default();
        let session = SessionSettings::from_stored(&stored);
        // Launched with --disabled
        let handle = LimiterHandle::new(SharedConfig::new(stored.limiter), false);
        handle.config().set_volume_cap(0.3);

        let saved = session.to_save(&handle);
        assert!(saved.enabled);
        assert_eq!(saved.limiter.volume_cap, 0.3);
    }

    #[test]
    fn test_runtime_changes_are_saved() {
        use crate::limiter::SharedConfig;

        let handle = LimiterHandle::new(SharedConfig::default(), false);
        let mut session = SessionSettings::from_stored(&Settings::default());

        session.toggled(false);
        assert!(!session.to_save(&handle).enabled);

        let edited = Settings {
            enabled: true,
            voice_mode: true,
            ..Settings::default()
        };
        session.reloaded(&edited);
        let saved = session.to_save(&handle);
        assert!(saved.enabled);
        assert!(saved.voice_mode);
    }

    #[test]
    fn test_save_then_load() {
        let dir = std::env::temp_dir().join(format!("tame-settings-{}", std::process::id()));
        let path = dir.join("settings.toml");

        let mut s = Settings::default();
        s.limiter.volume_cap = 0.5;
        s.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), s);

        let _ = fs::remove_dir_all(&dir);
    }
}
