//! Output peak meter
//!
//! Opens a cpal input stream on the default input device. On PulseAudio and
//! PipeWire systems point that at the sink monitor (`pactl set-default-source
//! <sink>.monitor`) so the meter sees what the speakers play.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::{DeviceError, DeviceResult};

/// Owns the capture stream. Keep it alive for as long as the handle is read.
///
/// `cpal::Stream` is not `Send` on every host, so the stream stays on the
/// thread that opened it and only the [`MeterHandle`] crosses threads.
pub struct PeakMeter {
    _stream: cpal::Stream,
    handle: MeterHandle,
    device_name: String,
}

/// Send-able reader for the running peak
#[derive(Clone, Debug, Default)]
pub struct MeterHandle {
    level: Arc<AtomicU32>,
}

impl MeterHandle {
    /// Record a block of samples. Non-negative f32 bit patterns sort like the
    /// floats themselves, so an integer max is a float max.
    pub fn record<I: IntoIterator<Item = f32>>(&self, samples: I) {
        let block_peak = samples
            .into_iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()));
        if block_peak.is_finite() {
            self.level
                .fetch_max(block_peak.min(1.0).to_bits(), Ordering::Relaxed);
        }
    }

    /// Peak since the previous call, then reset
    pub fn take_peak(&self) -> f32 {
        f32::from_bits(self.level.swap(0, Ordering::Relaxed))
    }
}

impl PeakMeter {
    pub fn open() -> DeviceResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| DeviceError::Meter("no default input device".to_string()))?;
        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string());

        let supported = device
            .default_input_config()
            .map_err(|e| DeviceError::Meter(format!("no input config: {}", e)))?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();

        let handle = MeterHandle::default();
        let stream = build_meter_stream(&device, &config, sample_format, handle.clone())?;
        stream
            .play()
            .map_err(|e| DeviceError::Meter(format!("failed to start capture: {}", e)))?;

        tracing::info!(
            device = %device_name,
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            ?sample_format,
            "peak meter started"
        );

        Ok(Self {
            _stream: stream,
            handle,
            device_name,
        })
    }

    pub fn handle(&self) -> MeterHandle {
        self.handle.clone()
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

fn build_meter_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    handle: MeterHandle,
) -> DeviceResult<cpal::Stream> {
    let err_fn = |err: cpal::StreamError| tracing::error!("peak meter stream error: {err}");

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                handle.record(data.iter().copied());
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                handle.record(data.iter().map(|&s| s as f32 / i16::MAX as f32));
            },
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                handle.record(data.iter().map(|&s| (s as f32 - 32768.0) / 32768.0));
            },
            err_fn,
            None,
        ),
        other => {
            return Err(DeviceError::Meter(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    };

    stream.map_err(|e| DeviceError::Meter(format!("failed to build input stream: {}", e)))
}
