//! System audio endpoint
//!
//! Volume goes through `pactl` on the default sink (PulseAudio / PipeWire),
//! the peak comes from the cpal meter on the default input.

use std::process::Command;

use crate::error::{DeviceError, DeviceResult};

#[cfg(feature = "system")]
use super::{meter::MeterHandle, traits::VolumeDevice};

const DEFAULT_SINK: &str = "@DEFAULT_SINK@";

/// Native sink volume for 100% (`PA_VOLUME_NORM`)
pub const VOLUME_NORM: u32 = 0x10000;

/// A sink's master volume, `[0, 1]`
pub trait SinkVolume: Send {
    fn get(&self) -> DeviceResult<f32>;
    fn set(&self, level: f32) -> DeviceResult<()>;
}

/// Master volume of the default sink via `pactl`
#[derive(Clone, Debug)]
pub struct PactlVolume {
    sink: String,
}

impl Default for PactlVolume {
    fn default() -> Self {
        Self {
            sink: DEFAULT_SINK.to_string(),
        }
    }
}

impl PactlVolume {
    pub fn new(sink: &str) -> Self {
        Self {
            sink: sink.to_string(),
        }
    }

    pub fn sink(&self) -> &str {
        &self.sink
    }
}

impl SinkVolume for PactlVolume {
    fn get(&self) -> DeviceResult<f32> {
        let output = Command::new("pactl")
            .arg("get-sink-volume")
            .arg(&self.sink)
            .output()?;

        if !output.status.success() {
            return Err(DeviceError::Volume(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        parse_sink_volume(&String::from_utf8_lossy(&output.stdout))
    }

    fn set(&self, level: f32) -> DeviceResult<()> {
        let output = Command::new("pactl")
            .arg("set-sink-volume")
            .arg(&self.sink)
            .arg(format_sink_volume(level))
            .output()?;

        if output.status.success() {
            Ok(())
        } else {
            Err(DeviceError::Volume(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

/// `set-sink-volume` argument in native units. A bare integer is taken as a
/// raw volume, which reads back exactly.
pub fn format_sink_volume(level: f32) -> String {
    let raw = (level.clamp(0.0, 1.0) * VOLUME_NORM as f32).round() as u32;
    raw.to_string()
}

/// Pure function to parse `pactl get-sink-volume` output 🧪
///
/// `Volume: front-left: 32768 /  50% / -18.06 dB,   front-right: ...`
/// Uses the first channel's raw value; the percentage is rounded to whole
/// numbers and only used when no raw value is printed. Over-amplified
/// sinks (>100%) clamp to 1.0.
pub fn parse_sink_volume(output: &str) -> DeviceResult<f32> {
    let tokens: Vec<&str> = output.split_whitespace().collect();

    let raw = tokens
        .windows(2)
        .find(|pair| pair[1] == "/")
        .and_then(|pair| pair[0].parse::<u32>().ok())
        .map(|raw| raw as f32 / VOLUME_NORM as f32);

    let percent = || {
        tokens
            .iter()
            .find_map(|token| token.strip_suffix('%'))
            .and_then(|pct| pct.parse::<f32>().ok())
            .map(|pct| pct / 100.0)
    };

    raw.or_else(percent)
        .map(|level| level.clamp(0.0, 1.0))
        .ok_or_else(|| DeviceError::Parse(format!("no volume in {:?}", output.trim())))
}

/// The real endpoint: sink volume plus the capture meter
#[cfg(feature = "system")]
pub struct SystemDevice<V = PactlVolume> {
    volume: V,
    meter: MeterHandle,
    // One sink read serves both the override check and the tick
    pending_read: Option<f32>,
}

#[cfg(feature = "system")]
impl<V: SinkVolume> SystemDevice<V> {
    pub fn new(volume: V, meter: MeterHandle) -> Self {
        Self {
            volume,
            meter,
            pending_read: None,
        }
    }
}

#[cfg(feature = "system")]
impl<V: SinkVolume> VolumeDevice for SystemDevice<V> {
    fn peak(&mut self) -> DeviceResult<f32> {
        Ok(self.meter.take_peak())
    }

    fn volume(&mut self) -> DeviceResult<f32> {
        match self.pending_read.take() {
            Some(level) => Ok(level),
            None => self.volume.get(),
        }
    }

    fn set_volume(&mut self, level: f32) -> DeviceResult<()> {
        self.pending_read = None;
        self.volume.set(level)
    }

    fn user_changed_volume(&mut self, last_written: f32) -> DeviceResult<Option<f32>> {
        let current = self.volume.get()?;
        self.pending_read = Some(current);
        if (current - last_written).abs() > super::traits::USER_CHANGE_THRESHOLD {
            Ok(Some(current))
        } else {
            Ok(None)
        }
    }
}


#[cfg(all(test, feature = "system"))]
mod system_tests {
    use super::*;
    use crate::limiter::{LimiterConfig, LimiterController};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    /// In-memory sink speaking pactl's formats: takes `set-sink-volume`
    /// arguments and prints `get-sink-volume` lines.
    #[derive(Clone, Default)]
    struct FakeSink {
        raw: Arc<Mutex<u32>>,
        gets: Arc<AtomicUsize>,
        sets: Arc<AtomicUsize>,
    }

    impl FakeSink {
        fn at(level: f32) -> Self {
            let sink = Self::default();
            *sink.raw.lock().unwrap() = format_sink_volume(level).parse().unwrap();
            sink
        }

        fn level(&self) -> f32 {
            *self.raw.lock().unwrap() as f32 / VOLUME_NORM as f32
        }
    }

    impl SinkVolume for FakeSink {
        fn get(&self) -> DeviceResult<f32> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            let raw = *self.raw.lock().unwrap();
            let pct = (raw as f32 * 100.0 / VOLUME_NORM as f32).round();
            parse_sink_volume(&format!(
                "Volume: front-left: {raw} / {pct}% / 0.00 dB,   front-right: {raw} / {pct}% / 0.00 dB"
            ))
        }

        fn set(&self, level: f32) -> DeviceResult<()> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            let arg = format_sink_volume(level);
            *self.raw.lock().unwrap() = arg
                .parse()
                .map_err(|_| DeviceError::Parse(arg.clone()))?;
            Ok(())
        }
    }

    fn hard_knee() -> LimiterConfig {
        LimiterConfig {
            volume_cap: 0.2,
            attack_time: 0.0,
            hold_time: 0.0,
            leeway_db: 0.0,
            ..LimiterConfig::default()
        }
    }

    #[test]
    fn test_one_sink_read_per_tick() {
        let sink = FakeSink::at(1.0);
        let meter = MeterHandle::default();
        let mut ctl = LimiterController::new(SystemDevice::new(sink.clone(), meter.clone()));
        let config = hard_knee();
        let start = Instant::now();

        sink.gets.store(0, Ordering::SeqCst);
        for i in 1..=10u32 {
            meter.record([0.1 * sink.level()]);
            ctl.tick(&config, true, start + Duration::from_millis(20 * i as u64), 0.02);
        }
        assert_eq!(sink.gets.load(Ordering::SeqCst), 10);
        assert_eq!(sink.sets.load(Ordering::SeqCst), 0);

        // Limiting adds the write, not another read
        meter.record([0.5 * sink.level()]);
        ctl.tick(&config, true, start + Duration::from_millis(220), 0.02);
        assert_eq!(sink.gets.load(Ordering::SeqCst), 11);
        assert_eq!(sink.sets.load(Ordering::SeqCst), 1);
        assert!((sink.level() - 0.4).abs() < 1e-4);
    }

    #[test]
    fn test_slow_release_completes_through_pactl_formats() {
        // 1/5 per second: 0.004 per 20ms tick, finer than a whole percent
        let config = LimiterConfig {
            release_time: 5.0,
            ..hard_knee()
        };
        let sink = FakeSink::at(1.0);
        let meter = MeterHandle::default();
        let mut ctl = LimiterController::new(SystemDevice::new(sink.clone(), meter.clone()));
        let start = Instant::now();

        meter.record([0.5 * sink.level()]);
        ctl.tick(&config, true, start + Duration::from_millis(20), 0.02);
        assert!(ctl.state().is_limiting);
        assert!((sink.level() - 0.4).abs() < 1e-4);

        let mut previous = sink.level();
        let mut ticks = 0u64;
        while ctl.state().is_limiting {
            ticks += 1;
            ctl.tick(&config, true, start + Duration::from_millis(20 * (ticks + 1)), 0.02);
            let now = sink.level();
            assert!(now >= previous, "release went down: {now} < {previous}");
            assert!(now - previous <= 0.004 + 1e-4);
            previous = now;
            assert!(ticks < 250, "release stalled at {now}");
        }

        assert_eq!(sink.level(), 1.0);
        assert!(ctl.state().user_override_at.is_none());
        assert!((148..=152).contains(&ticks), "took {ticks} ticks");
    }
}
