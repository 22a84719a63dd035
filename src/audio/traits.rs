use crate::error::DeviceResult;

/// Drift between our last write and the device volume that counts as a user change
pub const USER_CHANGE_THRESHOLD: f32 = 0.01;

/// The single logical output endpoint the limiter controls 🔊
///
/// All levels are normalized to `[0, 1]` regardless of the platform's native range.
pub trait VolumeDevice: Send {
    /// Current output peak (post-volume), `[0, 1]`
    fn peak(&mut self) -> DeviceResult<f32>;

    /// Current master volume, `[0, 1]`
    fn volume(&mut self) -> DeviceResult<f32>;

    fn set_volume(&mut self, level: f32) -> DeviceResult<()>;

    /// Returns the device volume if it moved away from `last_written` by more
    /// than [`USER_CHANGE_THRESHOLD`], i.e. someone other than us changed it.
    fn user_changed_volume(&mut self, last_written: f32) -> DeviceResult<Option<f32>> {
        let current = self.volume()?;
        if (current - last_written).abs() > USER_CHANGE_THRESHOLD {
            Ok(Some(current))
        } else {
            Ok(None)
        }
    }
}

impl<D: VolumeDevice + ?Sized> VolumeDevice for Box<D> {
    fn peak(&mut self) -> DeviceResult<f32> {
        (**self).peak()
    }

    fn volume(&mut self) -> DeviceResult<f32> {
        (**self).volume()
    }

    fn set_volume(&mut self, level: f32) -> DeviceResult<()> {
        (**self).set_volume(level)
    }

    fn user_changed_volume(&mut self, last_written: f32) -> DeviceResult<Option<f32>> {
        (**self).user_changed_volume(last_written)
    }
}

/// Peak as if the volume were at 100%.
///
/// A meter reading of 0.25 at 50% volume means the source itself peaks at 0.5.
/// Near-silent volumes can't be inverted reliably, so the peak is used as-is.
pub fn normalize_peak(peak: f32, volume: f32) -> f32 {
    if volume > 0.01 {
        (peak / volume).min(1.0)
    } else {
        peak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_peak() {
        assert_eq!(normalize_peak(0.25, 0.5), 0.5);
        assert_eq!(normalize_peak(0.8, 0.5), 1.0);
        // Muted / near-zero volume passes the peak through
        assert_eq!(normalize_peak(0.3, 0.005), 0.3);
    }
}
