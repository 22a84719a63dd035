//! Latest-value telemetry for the presentation layer
//!
//! One writer (the control loop), any number of readers. Fields are stored
//! independently; a reader may see values from two adjacent ticks, which is
//! fine for a meter refreshed at 10 Hz.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use super::atomic::AtomicF32;

/// What the controller is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LimiterPhase {
    #[default]
    Idle = 0,
    /// Over threshold, waiting out the attack time
    Attacking = 1,
    Limiting = 2,
    /// Signal dropped, holding the limited volume
    Holding = 3,
    Releasing = 4,
    /// User changed the volume; hands off until the cooldown passes
    Override = 5,
    /// Administratively disabled, pass-through
    Paused = 6,
}

impl LimiterPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Attacking,
            2 => Self::Limiting,
            3 => Self::Holding,
            4 => Self::Releasing,
            5 => Self::Override,
            6 => Self::Paused,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for LimiterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Attacking => "attacking",
            Self::Limiting => "limiting",
            Self::Holding => "holding",
            Self::Releasing => "releasing",
            Self::Override => "override",
            Self::Paused => "paused",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetrySnapshot {
    /// Source peak as if volume were 100%
    pub peak: f32,
    /// Device volume after this tick's write
    pub volume: f32,
    pub limiting: bool,
    pub phase: LimiterPhase,
    /// Baseline the limiter restores toward
    pub original_volume: f32,
    /// Raw peak above which limiting would start at the current baseline
    pub trigger_level: f32,
}

#[derive(Debug, Default)]
struct TelemetryFields {
    peak: AtomicF32,
    volume: AtomicF32,
    limiting: AtomicBool,
    phase: AtomicU8,
    original_volume: AtomicF32,
    trigger_level: AtomicF32,
}

/// Cloneable handle to the telemetry fields
#[derive(Clone, Debug, Default)]
pub struct SharedTelemetry {
    fields: Arc<TelemetryFields>,
}

impl SharedTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: &TelemetrySnapshot) {
        let f = &self.fields;
        f.peak.store(snapshot.peak);
        f.volume.store(snapshot.volume);
        f.limiting.store(snapshot.limiting, Ordering::Relaxed);
        f.phase.store(snapshot.phase as u8, Ordering::Relaxed);
        f.original_volume.store(snapshot.original_volume);
        f.trigger_level.store(snapshot.trigger_level);
    }

    pub fn read(&self) -> TelemetrySnapshot {
        let f = &self.fields;
        TelemetrySnapshot {
            peak: f.peak.load(),
            volume: f.volume.load(),
            limiting: f.limiting.load(Ordering::Relaxed),
            phase: LimiterPhase::from_u8(f.phase.load(Ordering::Relaxed)),
            original_volume: f.original_volume.load(),
            trigger_level: f.trigger_level.load(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_then_read() {
        let writer = SharedTelemetry::new();
        let reader = writer.clone();
        let snap = TelemetrySnapshot {
            peak: 0.5,
            volume: 0.4,
            limiting: true,
            phase: LimiterPhase::Holding,
            original_volume: 1.0,
            trigger_level: 0.2,
        };
        writer.publish(&snap);
        assert_eq!(reader.read(), snap);
    }

    #[test]
    fn test_phase_roundtrip() {
        for phase in [
            LimiterPhase::Idle,
            LimiterPhase::Attacking,
            LimiterPhase::Limiting,
            LimiterPhase::Holding,
            LimiterPhase::Releasing,
            LimiterPhase::Override,
            LimiterPhase::Paused,
        ] {
            assert_eq!(LimiterPhase::from_u8(phase as u8), phase);
        }
    }
}
