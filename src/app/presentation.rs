//! Headless presentation refresh
//!
//! Runs at 10 Hz next to the control loop. Only reads telemetry and writes
//! settings through the [`LimiterHandle`]; never drives the algorithm.

use std::fs;
use std::path::PathBuf;

use super::config::Settings;
use crate::limiter::{LimiterHandle, TelemetrySnapshot};

/// One-line meter, e.g. `peak  45% | vol  40% / 100% | limiting`
pub fn format_meter(snapshot: &TelemetrySnapshot) -> String {
    format!(
        "peak {:>3}% | vol {:>3}% / {:>3}% | {}",
        (snapshot.peak * 100.0) as u32,
        (snapshot.volume * 100.0) as u32,
        (snapshot.original_volume * 100.0) as u32,
        snapshot.phase
    )
}

/// Logs limiting start/stop edges and a trace-level meter every refresh
#[derive(Debug, Default)]
pub struct TelemetryReporter {
    was_limiting: bool,
    deepest_volume: f32,
}

impl TelemetryReporter {
    /// Returns true when the limiting state flipped
    pub fn report(&mut self, snapshot: &TelemetrySnapshot) -> bool {
        tracing::trace!("{}", format_meter(snapshot));

        if snapshot.limiting {
            self.deepest_volume = if self.was_limiting {
                self.deepest_volume.min(snapshot.volume)
            } else {
                snapshot.volume
            };
        }

        if snapshot.limiting == self.was_limiting {
            return false;
        }
        self.was_limiting = snapshot.limiting;

        if snapshot.limiting {
            tracing::info!(
                peak = snapshot.peak,
                volume = snapshot.volume,
                baseline = snapshot.original_volume,
                "too loud, limiting"
            );
        } else {
            tracing::info!(
                deepest = self.deepest_volume,
                volume = snapshot.volume,
                "released"
            );
        }
        true
    }
}

/// Re-applies `settings.toml` when it is edited while running
#[derive(Debug)]
pub struct SettingsWatcher {
    path: PathBuf,
    last_content: Option<String>,
}

impl SettingsWatcher {
    /// The file's current content counts as already applied
    pub fn new(path: PathBuf) -> Self {
        let last_content = fs::read_to_string(&path).ok();
        Self { path, last_content }
    }

    /// Read the file; if it changed and parses, push it into the limiter.
    /// Returns the applied settings.
    pub fn poll(&mut self, handle: &LimiterHandle) -> Option<Settings> {
        let content = fs::read_to_string(&self.path).ok()?;
        if self.last_content.as_deref() == Some(content.as_str()) {
            return None;
        }
        self.last_content = Some(content.clone());

        match Settings::from_toml(&content) {
            Ok(settings) => {
                let settings = settings.sanitized();
                handle.config().apply(settings.limiter);
                handle.set_enabled(settings.enabled);
                tracing::info!(path = %self.path.display(), "settings reloaded");
                Some(settings)
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring invalid settings edit");
                None
            }
        }
    }
}
