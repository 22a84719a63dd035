//! Limiter tuning parameters
//!
//! [`LimiterConfig`] is the plain per-tick snapshot the controller reads.
//! [`SharedConfig`] is the live, per-field atomic copy the presentation layer
//! writes while the control loop runs.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;

use super::atomic::AtomicF32;

pub const DEFAULT_VOLUME_CAP: f32 = 0.2;
pub const DEFAULT_ATTACK_TIME: f32 = 0.05; // 50ms - wait for sustained peak
pub const DEFAULT_RELEASE_TIME: f32 = 0.5;
pub const DEFAULT_HOLD_TIME: f32 = 0.15;
pub const DEFAULT_USER_COOLDOWN: f32 = 2.0;
pub const DEFAULT_LEEWAY_DB: f32 = 3.0; // ~1.41x over the cap before full limiting
pub const DEFAULT_DAMPENING: f32 = 1.0; // 1x = no dampening
pub const DEFAULT_DAMPENING_SPEED: f32 = 0.0; // instant

/// Smallest cap accepted; a cap of zero would mute everything
pub const MIN_VOLUME_CAP: f32 = 0.01;

/// Slider ranges for a control panel. Advisory, the core only enforces the domains.
pub mod ranges {
    use std::ops::RangeInclusive;

    pub const VOLUME_CAP: RangeInclusive<f32> = 0.05..=1.0;
    pub const ATTACK_TIME: RangeInclusive<f32> = 0.001..=0.1;
    pub const RELEASE_TIME: RangeInclusive<f32> = 0.1..=3.0;
    pub const HOLD_TIME: RangeInclusive<f32> = 0.0..=0.5;
    pub const USER_COOLDOWN: RangeInclusive<f32> = 0.5..=5.0;
    pub const LEEWAY_DB: RangeInclusive<f32> = 0.0..=12.0;
    pub const DAMPENING: RangeInclusive<f32> = 1.0..=5.0;
    pub const DAMPENING_SPEED: RangeInclusive<f32> = 0.0..=2.0;
}

/// Tunable limiter parameters (times in seconds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Loudest perceived output allowed, `(0, 1]`
    #[serde(default = "default_volume_cap")]
    pub volume_cap: f32,
    /// How long a peak must last before limiting engages
    #[serde(default = "default_attack_time")]
    pub attack_time: f32,
    /// Time for a full 0→1 volume restore
    #[serde(default = "default_release_time")]
    pub release_time: f32,
    /// Quiet time required before releasing
    #[serde(default = "default_hold_time")]
    pub hold_time: f32,
    /// Hands-off window after the user touches the volume
    #[serde(default = "default_user_cooldown")]
    pub user_cooldown: f32,
    /// Soft-knee width above the cap, in dB
    #[serde(default = "default_leeway_db")]
    pub leeway_db: f32,
    /// Extra attenuation divisor for sustained peaks, `>= 1`
    #[serde(default = "default_dampening")]
    pub dampening: f32,
    /// Time for dampening to ramp from 1x to `dampening`
    #[serde(default = "default_dampening_speed")]
    pub dampening_speed: f32,
}

fn default_volume_cap() -> f32 {
    DEFAULT_VOLUME_CAP
}
fn default_attack_time() -> f32 {
    DEFAULT_ATTACK_TIME
}
fn default_release_time() -> f32 {
    DEFAULT_RELEASE_TIME
}
fn default_hold_time() -> f32 {
    DEFAULT_HOLD_TIME
}
fn default_user_cooldown() -> f32 {
    DEFAULT_USER_COOLDOWN
}
fn default_leeway_db() -> f32 {
    DEFAULT_LEEWAY_DB
}
fn default_dampening() -> f32 {
    DEFAULT_DAMPENING
}
fn default_dampening_speed() -> f32 {
    DEFAULT_DAMPENING_SPEED
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            volume_cap: DEFAULT_VOLUME_CAP,
            attack_time: DEFAULT_ATTACK_TIME,
            release_time: DEFAULT_RELEASE_TIME,
            hold_time: DEFAULT_HOLD_TIME,
            user_cooldown: DEFAULT_USER_COOLDOWN,
            leeway_db: DEFAULT_LEEWAY_DB,
            dampening: DEFAULT_DAMPENING,
            dampening_speed: DEFAULT_DAMPENING_SPEED,
        }
    }
}

/// Clamp into `range`, replacing NaN/inf with `fallback`
fn clamp_or(value: f32, range: RangeInclusive<f32>, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(*range.start(), *range.end())
    } else {
        fallback
    }
}

/// Non-negative, finite
fn non_negative_or(value: f32, fallback: f32) -> f32 {
    clamp_or(value, 0.0..=f32::MAX, fallback)
}

impl LimiterConfig {
    /// Recommended advanced settings, keeping the given cap
    pub fn recommended(volume_cap: f32) -> Self {
        Self {
            volume_cap,
            dampening: 2.0,
            dampening_speed: 0.1,
            ..Self::default()
        }
        .sanitized()
    }

    /// Every field clamped into its domain
    pub fn sanitized(self) -> Self {
        Self {
            volume_cap: clamp_or(self.volume_cap, MIN_VOLUME_CAP..=1.0, DEFAULT_VOLUME_CAP),
            attack_time: non_negative_or(self.attack_time, DEFAULT_ATTACK_TIME),
            release_time: non_negative_or(self.release_time, DEFAULT_RELEASE_TIME),
            hold_time: non_negative_or(self.hold_time, DEFAULT_HOLD_TIME),
            user_cooldown: non_negative_or(self.user_cooldown, DEFAULT_USER_COOLDOWN),
            leeway_db: non_negative_or(self.leeway_db, DEFAULT_LEEWAY_DB),
            dampening: clamp_or(self.dampening, 1.0..=f32::MAX, DEFAULT_DAMPENING),
            dampening_speed: non_negative_or(self.dampening_speed, DEFAULT_DAMPENING_SPEED),
        }
    }

    /// Names of fields that [`sanitized`](Self::sanitized) would change
    pub fn invalid_fields(&self) -> Vec<&'static str> {
        let clean = self.sanitized();
        let mut fields = Vec::new();
        // `!=` is true for NaN, which is what we want here
        if clean.volume_cap != self.volume_cap {
            fields.push("volume_cap");
        }
        if clean.attack_time != self.attack_time {
            fields.push("attack_time");
        }
        if clean.release_time != self.release_time {
            fields.push("release_time");
        }
        if clean.hold_time != self.hold_time {
            fields.push("hold_time");
        }
        if clean.user_cooldown != self.user_cooldown {
            fields.push("user_cooldown");
        }
        if clean.leeway_db != self.leeway_db {
            fields.push("leeway_db");
        }
        if clean.dampening != self.dampening {
            fields.push("dampening");
        }
        if clean.dampening_speed != self.dampening_speed {
            fields.push("dampening_speed");
        }
        fields
    }

    /// Linear factor of the leeway band, `10^(dB/20)`
    pub fn leeway_factor(&self) -> f32 {
        10f32.powf(self.leeway_db / 20.0)
    }

    /// Volume units per second restored during release
    pub fn release_rate(&self) -> f32 {
        if self.release_time > 0.0 {
            1.0 / self.release_time
        } else {
            10.0
        }
    }
}

#[derive(Debug)]
struct ConfigFields {
    volume_cap: AtomicF32,
    attack_time: AtomicF32,
    release_time: AtomicF32,
    hold_time: AtomicF32,
    user_cooldown: AtomicF32,
    leeway_db: AtomicF32,
    dampening: AtomicF32,
    dampening_speed: AtomicF32,
}

/// Live limiter settings shared between the control loop and the UI.
///
/// Each field is independently atomic. Setters sanitize, so the controller
/// never sees a value outside its domain.
#[derive(Clone, Debug)]
pub struct SharedConfig {
    fields: Arc<ConfigFields>,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(LimiterConfig::default())
    }
}

macro_rules! config_field {
    ($get:ident, $set:ident) => {
        pub fn $get(&self) -> f32 {
            self.fields.$get.load()
        }

        pub fn $set(&self, value: f32) {
            let clean = LimiterConfig {
                $get: value,
                ..self.snapshot()
            }
            .sanitized();
            self.fields.$get.store(clean.$get);
        }
    };
}

impl SharedConfig {
    pub fn new(config: LimiterConfig) -> Self {
        let c = config.sanitized();
        Self {
            fields: Arc::new(ConfigFields {
                volume_cap: AtomicF32::new(c.volume_cap),
                attack_time: AtomicF32::new(c.attack_time),
                release_time: AtomicF32::new(c.release_time),
                hold_time: AtomicF32::new(c.hold_time),
                user_cooldown: AtomicF32::new(c.user_cooldown),
                leeway_db: AtomicF32::new(c.leeway_db),
                dampening: AtomicF32::new(c.dampening),
                dampening_speed: AtomicF32::new(c.dampening_speed),
            }),
        }
    }

    /// Current values, one atomic load per field
    pub fn snapshot(&self) -> LimiterConfig {
        let f = &self.fields;
        LimiterConfig {
            volume_cap: f.volume_cap.load(),
            attack_time: f.attack_time.load(),
            release_time: f.release_time.load(),
            hold_time: f.hold_time.load(),
            user_cooldown: f.user_cooldown.load(),
            leeway_db: f.leeway_db.load(),
            dampening: f.dampening.load(),
            dampening_speed: f.dampening_speed.load(),
        }
    }

    /// Overwrite every field
    pub fn apply(&self, config: LimiterConfig) {
        let c = config.sanitized();
        let f = &self.fields;
        f.volume_cap.store(c.volume_cap);
        f.attack_time.store(c.attack_time);
        f.release_time.store(c.release_time);
        f.hold_time.store(c.hold_time);
        f.user_cooldown.store(c.user_cooldown);
        f.leeway_db.store(c.leeway_db);
        f.dampening.store(c.dampening);
        f.dampening_speed.store(c.dampening_speed);
    }

    /// Reset advanced settings to the recommended preset (keeps the cap)
    pub fn reset_advanced(&self) {
        self.apply(LimiterConfig::recommended(self.volume_cap()));
    }

    config_field!(volume_cap, set_volume_cap);
    config_field!(attack_time, set_attack_time);
    config_field!(release_time, set_release_time);
    config_field!(hold_time, set_hold_time);
    config_field!(user_cooldown, set_user_cooldown);
    config_field!(leeway_db, set_leeway_db);
    config_field!(dampening, set_dampening);
    config_field!(dampening_speed, set_dampening_speed);
}
