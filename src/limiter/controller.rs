//! The limiter control loop body
//!
//! One [`LimiterController::tick`] per period: detect user overrides, sample
//! the device, decide over/under threshold, then attack, hold or release.
//! The controller is the only writer of [`ControllerState`].

use std::time::Instant;

use super::config::LimiterConfig;
use super::telemetry::{LimiterPhase, TelemetrySnapshot};
use crate::audio::traits::{normalize_peak, VolumeDevice};

/// Raw peaks at or below this are silence
pub const NEGLIGIBLE_PEAK: f32 = 0.001;
/// The limiter never turns the volume below this
pub const MIN_LIMITED_VOLUME: f32 = 0.01;
/// Release is done once within this distance of the baseline
pub const RELEASE_TOLERANCE: f32 = 0.005;
/// Dampening speeds at or below this jump straight to full dampening
const INSTANT_DAMPENING: f32 = 0.001;

/// Control-loop state. Lives for the process, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    /// Baseline volume: the user's last manual choice
    pub original_volume: f32,
    pub is_limiting: bool,
    /// Seconds the signal has been continuously over threshold
    pub time_over_threshold: f32,
    pub last_over_threshold_at: Option<Instant>,
    /// Last value we wrote; anything else on the device came from the user
    pub last_written_volume: f32,
    pub user_override_at: Option<Instant>,
    /// Last successfully read (or written) device volume
    pub last_volume: f32,
    /// Last raw peak sampled
    pub last_peak: f32,
}

impl ControllerState {
    pub fn new(volume: f32) -> Self {
        let volume = volume.clamp(0.0, 1.0);
        Self {
            original_volume: volume,
            is_limiting: false,
            time_over_threshold: 0.0,
            last_over_threshold_at: None,
            last_written_volume: volume,
            user_override_at: None,
            last_volume: volume,
            last_peak: 0.0,
        }
    }
}

/// Position inside the soft knee: 0 at the cap, 1 at (or beyond) cap + leeway
pub fn leeway_ratio(config: &LimiterConfig, potential_output: f32) -> f32 {
    let soft_threshold = config.volume_cap * config.leeway_factor();
    let span = soft_threshold - config.volume_cap;
    if potential_output >= soft_threshold || span <= f32::EPSILON {
        1.0
    } else {
        ((potential_output - config.volume_cap) / span).clamp(0.0, 1.0)
    }
}

/// Extra attenuation divisor, ramping 1 → `dampening` over `dampening_speed`
/// seconds once the attack time has passed
pub fn sustained_factor(config: &LimiterConfig, time_over_threshold: f32) -> f32 {
    let dampening = config.dampening.max(1.0);
    let since_attack = (time_over_threshold - config.attack_time).max(0.0);
    let progress = if config.dampening_speed > INSTANT_DAMPENING {
        (since_attack / config.dampening_speed).min(1.0)
    } else {
        1.0
    };
    (1.0 + (dampening - 1.0) * progress).clamp(1.0, dampening)
}

/// Volume to write while limiting
pub fn target_volume(
    config: &LimiterConfig,
    raw_peak: f32,
    original_volume: f32,
    time_over_threshold: f32,
) -> f32 {
    let potential_output = raw_peak * original_volume;
    let ratio = leeway_ratio(config, potential_output);
    // Gain that puts the output exactly at the cap
    let base_target = config.volume_cap / raw_peak.max(NEGLIGIBLE_PEAK);
    let blended = original_volume * (1.0 - ratio) + base_target * ratio;
    (blended / sustained_factor(config, time_over_threshold)).clamp(MIN_LIMITED_VOLUME, 1.0)
}

pub struct LimiterController<D> {
    device: D,
    state: ControllerState,
    phase: LimiterPhase,
}

impl<D: VolumeDevice> LimiterController<D> {
    /// Baseline from the device's current volume
    pub fn new(mut device: D) -> Self {
        let volume = match device.volume() {
            Ok(v) if v.is_finite() => v,
            Ok(v) => {
                tracing::warn!(volume = v, "device reported a non-finite volume, assuming 100%");
                1.0
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not read initial volume, assuming 100%");
                1.0
            }
        };
        tracing::info!(volume, "limiter baseline");
        Self::with_state(device, ControllerState::new(volume))
    }

    pub fn with_state(device: D, state: ControllerState) -> Self {
        Self {
            device,
            state,
            phase: LimiterPhase::Idle,
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn phase(&self) -> LimiterPhase {
        self.phase
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    /// Put the baseline volume back if we are holding it down. Used on
    /// shutdown so the output is never left attenuated.
    pub fn restore_baseline(&mut self) -> bool {
        if !self.state.is_limiting {
            return false;
        }
        let baseline = self.state.original_volume;
        if self.write_volume(baseline) {
            self.state.is_limiting = false;
            self.state.time_over_threshold = 0.0;
            self.set_phase(LimiterPhase::Idle);
            tracing::info!(volume = baseline, "restored volume");
            true
        } else {
            false
        }
    }

    /// Run one control period. `dt` is seconds since the previous tick.
    pub fn tick(
        &mut self,
        config: &LimiterConfig,
        enabled: bool,
        now: Instant,
        dt: f32,
    ) -> TelemetrySnapshot {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        // The user always wins, even while paused
        self.detect_user_override(now);

        let phase = if !enabled {
            self.state.time_over_threshold = 0.0;
            LimiterPhase::Paused
        } else if self.in_cooldown(config, now) {
            LimiterPhase::Override
        } else {
            self.regulate(config, now, dt)
        };
        self.set_phase(phase);

        self.snapshot(config)
    }

    /// Latest values for the presentation layer
    pub fn snapshot(&self, config: &LimiterConfig) -> TelemetrySnapshot {
        let original = self.state.original_volume;
        let trigger_level = if original > 0.0 {
            (config.volume_cap / original).min(1.0)
        } else {
            1.0
        };
        TelemetrySnapshot {
            peak: self.state.last_peak,
            volume: self.state.last_volume,
            limiting: self.state.is_limiting,
            phase: self.phase,
            original_volume: original,
            trigger_level,
        }
    }

    fn detect_user_override(&mut self, now: Instant) {
        match self.device.user_changed_volume(self.state.last_written_volume) {
            Ok(Some(volume)) => {
                let volume = volume.clamp(0.0, 1.0);
                tracing::info!(
                    from = self.state.original_volume,
                    to = volume,
                    "user changed volume, rebaselining"
                );
                let s = &mut self.state;
                s.original_volume = volume;
                s.is_limiting = false;
                s.time_over_threshold = 0.0;
                s.last_written_volume = volume;
                s.last_volume = volume;
                s.user_override_at = Some(now);
            }
            Ok(None) => {}
            Err(e) => tracing::trace!(error = %e, "override check failed"),
        }
    }

    fn in_cooldown(&self, config: &LimiterConfig, now: Instant) -> bool {
        self.state.user_override_at.is_some_and(|at| {
            now.saturating_duration_since(at).as_secs_f32() < config.user_cooldown
        })
    }

    fn regulate(&mut self, config: &LimiterConfig, now: Instant, dt: f32) -> LimiterPhase {
        let current_volume = self.read_volume();
        let raw_peak = self.read_raw_peak(current_volume);
        let potential_output = raw_peak * self.state.original_volume;

        if potential_output <= config.volume_cap || raw_peak <= NEGLIGIBLE_PEAK {
            self.state.time_over_threshold = 0.0;
            if self.state.is_limiting {
                self.release(config, now, dt)
            } else {
                LimiterPhase::Idle
            }
        } else {
            self.state.time_over_threshold += dt;
            self.state.last_over_threshold_at = Some(now);

            if self.state.time_over_threshold >= config.attack_time {
                self.state.is_limiting = true;
                let target = target_volume(
                    config,
                    raw_peak,
                    self.state.original_volume,
                    self.state.time_over_threshold,
                );
                self.write_volume(target);
                LimiterPhase::Limiting
            } else if self.state.is_limiting {
                // Re-attacking from a hold; stay at the limited volume
                LimiterPhase::Limiting
            } else {
                LimiterPhase::Attacking
            }
        }
    }

    fn release(&mut self, config: &LimiterConfig, now: Instant, dt: f32) -> LimiterPhase {
        let holding = self.state.last_over_threshold_at.is_some_and(|at| {
            now.saturating_duration_since(at).as_secs_f32() <= config.hold_time
        });
        if holding {
            return LimiterPhase::Holding;
        }

        // Ramp from our own last write; device reads may be coarser than a step
        let from = self.state.last_written_volume;
        let target = self.state.original_volume;
        if from < target - RELEASE_TOLERANCE {
            let next = (from + config.release_rate() * dt).min(target);
            if next < target - RELEASE_TOLERANCE {
                self.write_volume(next);
                return LimiterPhase::Releasing;
            }
        }

        if self.write_volume(target) {
            self.state.is_limiting = false;
            tracing::debug!(volume = target, "release complete");
            LimiterPhase::Idle
        } else {
            LimiterPhase::Releasing
        }
    }

    fn read_volume(&mut self) -> f32 {
        match self.device.volume() {
            Ok(v) if v.is_finite() => {
                self.state.last_volume = v.clamp(0.0, 1.0);
            }
            Ok(_) => {}
            Err(e) => tracing::trace!(error = %e, "volume read failed, keeping last known"),
        }
        self.state.last_volume
    }

    fn read_raw_peak(&mut self, volume: f32) -> f32 {
        let raw = match self.device.peak() {
            Ok(p) if p.is_finite() => normalize_peak(p.clamp(0.0, 1.0), volume),
            Ok(_) => 0.0,
            Err(e) => {
                tracing::trace!(error = %e, "peak read failed, treating as silence");
                0.0
            }
        };
        self.state.last_peak = raw;
        raw
    }

    fn write_volume(&mut self, level: f32) -> bool {
        let level = level.clamp(0.0, 1.0);
        match self.device.set_volume(level) {
            Ok(()) => {
                self.state.last_written_volume = level;
                self.state.last_volume = level;
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, level, "volume write failed");
                false
            }
        }
    }

    fn set_phase(&mut self, phase: LimiterPhase) {
        if phase != self.phase {
            tracing::debug!(from = %self.phase, to = %phase, "limiter phase");
            self.phase = phase;
        }
    }
}
