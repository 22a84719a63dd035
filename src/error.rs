//! Error types for Tame
//!
//! Device errors are transient and never leave the control loop; config and
//! engine errors surface to the binary.

use thiserror::Error;

/// A single audio device call failed
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Peak meter unavailable: {0}")]
    Meter(String),

    #[error("Volume control failed: {0}")]
    Volume(String),

    #[error("Unexpected device output: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings could not be loaded or saved
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No config directory available on this system")]
    NoConfigDir,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Limiter engine lifecycle errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Limiter is already running")]
    AlreadyRunning,

    #[error("Limiter thread could not be spawned: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Result type alias for device calls
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;
