//! Scripted in-memory device
//!
//! Stands in for a real endpoint in tests, benches and `--simulate` runs.
//! The script describes the *source* level (what the meter would read at 100%
//! volume); `peak()` returns it scaled by the current volume the way a real
//! post-volume meter does.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::VolumeDevice;
use crate::error::{DeviceError, DeviceResult};

#[derive(Debug, Default)]
struct Script {
    levels: VecDeque<f32>,
    current_level: f32,
    volume: f32,
    writes: Vec<f32>,
    failing_reads: u32,
    failing_writes: u32,
}

/// Cloneable handle; every clone drives the same device
#[derive(Clone, Debug)]
pub struct ScriptedDevice {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedDevice {
    pub fn new(volume: f32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Script {
                volume: volume.clamp(0.0, 1.0),
                ..Script::default()
            })),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        // A panicked test thread must not wedge the others
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hold the source at a constant level until the next script change
    pub fn set_source_level(&self, level: f32) {
        let mut s = self.script();
        s.levels.clear();
        s.current_level = level.clamp(0.0, 1.0);
    }

    /// Queue source levels, one consumed per `peak()` call. The last one repeats.
    pub fn push_source_levels<I: IntoIterator<Item = f32>>(&self, levels: I) {
        let mut s = self.script();
        s.levels
            .extend(levels.into_iter().map(|l| l.clamp(0.0, 1.0)));
    }

    /// Simulate the user dragging the system volume slider
    pub fn user_sets_volume(&self, level: f32) {
        self.script().volume = level.clamp(0.0, 1.0);
    }

    /// Next `count` reads (peak or volume) fail
    pub fn fail_reads(&self, count: u32) {
        self.script().failing_reads = count;
    }

    /// Next `count` writes fail
    pub fn fail_writes(&self, count: u32) {
        self.script().failing_writes = count;
    }

    pub fn current_volume(&self) -> f32 {
        self.script().volume
    }

    /// Every volume the limiter wrote, oldest first
    pub fn writes(&self) -> Vec<f32> {
        self.script().writes.clone()
    }

    pub fn last_write(&self) -> Option<f32> {
        self.script().writes.last().copied()
    }

    pub fn clear_writes(&self) {
        self.script().writes.clear();
    }
}

impl VolumeDevice for ScriptedDevice {
    fn peak(&mut self) -> DeviceResult<f32> {
        let mut s = self.script();
        if s.failing_reads > 0 {
            s.failing_reads -= 1;
            return Err(DeviceError::Meter("scripted failure".to_string()));
        }
        if let Some(level) = s.levels.pop_front() {
            s.current_level = level;
        }
        Ok(s.current_level * s.volume)
    }

    fn volume(&mut self) -> DeviceResult<f32> {
        let mut s = self.script();
        if s.failing_reads > 0 {
            s.failing_reads -= 1;
            return Err(DeviceError::Volume("scripted failure".to_string()));
        }
        Ok(s.volume)
    }

    fn set_volume(&mut self, level: f32) -> DeviceResult<()> {
        let mut s = self.script();
        if s.failing_writes > 0 {
            s.failing_writes -= 1;
            return Err(DeviceError::Volume("scripted failure".to_string()));
        }
        let level = level.clamp(0.0, 1.0);
        s.volume = level;
        s.writes.push(level);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_follows_volume() {
        let mut dev = ScriptedDevice::new(0.5);
        dev.set_source_level(0.8);
        assert!((dev.peak().unwrap() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_script_last_level_repeats() {
        let mut dev = ScriptedDevice::new(1.0);
        dev.push_source_levels([0.1, 0.7]);
        assert_eq!(dev.peak().unwrap(), 0.1);
        assert_eq!(dev.peak().unwrap(), 0.7);
        assert_eq!(dev.peak().unwrap(), 0.7);
    }

    #[test]
    fn test_failures_are_counted() {
        let mut dev = ScriptedDevice::new(1.0);
        dev.fail_reads(1);
        assert!(dev.volume().is_err());
        assert!(dev.volume().is_ok());

        dev.fail_writes(1);
        assert!(dev.set_volume(0.3).is_err());
        assert_eq!(dev.current_volume(), 1.0);
        dev.set_volume(0.3).unwrap();
        assert_eq!(dev.writes(), vec![0.3]);
    }

    #[test]
    fn test_user_change_detection() {
        let mut dev = ScriptedDevice::new(0.6);
        assert!(dev.user_changed_volume(0.6).unwrap().is_none());
        // Within the noise threshold
        assert!(dev.user_changed_volume(0.605).unwrap().is_none());
        dev.user_sets_volume(0.3);
        assert_eq!(dev.user_changed_volume(0.6).unwrap(), Some(0.3));
    }
}
