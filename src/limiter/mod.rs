pub mod atomic;
pub mod config;
pub mod controller;
pub mod engine;
pub mod telemetry;

pub use config::{LimiterConfig, SharedConfig};
pub use controller::{ControllerState, LimiterController};
pub use engine::{LimiterEngine, LimiterHandle, STOP_TIMEOUT, TICK_PERIOD};
pub use telemetry::{LimiterPhase, SharedTelemetry, TelemetrySnapshot};
