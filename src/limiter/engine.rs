//! Periodic limiter task
//!
//! Runs the controller on its own thread at a fixed period. The stop flag is
//! checked at the top of every iteration; the only suspension point is the
//! sleep at the end of the period.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use super::config::SharedConfig;
use super::controller::{ControllerState, LimiterController};
use super::telemetry::{SharedTelemetry, TelemetrySnapshot};
use crate::audio::traits::VolumeDevice;
use crate::error::EngineError;

/// 50 Hz control loop
pub const TICK_PERIOD: Duration = Duration::from_millis(20);
/// How long `stop()` waits for the loop to finish its current tick
pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything a presentation layer may touch
#[derive(Clone, Debug)]
pub struct LimiterHandle {
    config: SharedConfig,
    enabled: Arc<AtomicBool>,
    telemetry: SharedTelemetry,
}

impl LimiterHandle {
    pub fn new(config: SharedConfig, enabled: bool) -> Self {
        Self {
            config,
            enabled: Arc::new(AtomicBool::new(enabled)),
            telemetry: SharedTelemetry::new(),
        }
    }

    /// Read/write access to the live settings
    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.read()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Flip enabled/disabled, returning the new state
    pub fn toggle_enabled(&self) -> bool {
        !self.enabled.fetch_xor(true, Ordering::Relaxed)
    }
}

/// Owns the controller and the thread that ticks it
pub struct LimiterEngine<D> {
    controller: Option<LimiterController<D>>,
    handle: LimiterHandle,
    period: Duration,
    running: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<LimiterController<D>>>,
    done_rx: Option<mpsc::Receiver<()>>,
}

impl<D: VolumeDevice + 'static> LimiterEngine<D> {
    /// Baseline is taken from the device right away
    pub fn new(device: D, config: SharedConfig, enabled: bool) -> Self {
        let controller = LimiterController::new(device);
        let handle = LimiterHandle::new(config, enabled);
        handle
            .telemetry
            .publish(&controller.snapshot(&handle.config.snapshot()));

        Self {
            controller: Some(controller),
            handle,
            period: TICK_PERIOD,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            done_rx: None,
        }
    }

    /// Override the tick period
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn handle(&self) -> LimiterHandle {
        self.handle.clone()
    }

    /// Controller state, available while stopped
    pub fn state(&self) -> Option<&ControllerState> {
        self.controller.as_ref().map(|c| c.state())
    }

    /// The device, available while stopped
    pub fn device(&self) -> Option<&D> {
        self.controller.as_ref().map(|c| c.device())
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some() && self.running.load(Ordering::SeqCst)
    }

    /// Start the control loop thread
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.thread_handle.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        let mut controller = self.controller.take().ok_or(EngineError::AlreadyRunning)?;

        let running = self.running.clone();
        let handle = self.handle.clone();
        let period = self.period;
        let (done_tx, done_rx) = mpsc::channel();

        running.store(true, Ordering::SeqCst);

        let spawned = thread::Builder::new()
            .name("tame-limiter".to_string())
            .spawn(move || {
                tracing::debug!(period_ms = period.as_millis() as u64, "limiter loop started");
                let mut last = Instant::now();

                while running.load(Ordering::SeqCst) {
                    let started = Instant::now();
                    let dt = started.duration_since(last).as_secs_f32();
                    last = started;

                    let config = handle.config.snapshot();
                    let snapshot = controller.tick(&config, handle.is_enabled(), started, dt);
                    handle.telemetry.publish(&snapshot);

                    if let Some(rest) = period.checked_sub(started.elapsed()) {
                        thread::sleep(rest);
                    }
                }

                tracing::debug!("limiter loop stopped");
                let _ = done_tx.send(());
                controller
            });

        match spawned {
            Ok(join) => {
                self.thread_handle = Some(join);
                self.done_rx = Some(done_rx);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                // The closure (and the controller in it) is gone with the failed spawn
                Err(EngineError::Spawn(e))
            }
        }
    }

    /// Signal the loop and wait up to [`STOP_TIMEOUT`] for it to finish.
    /// A volume held down by limiting is put back to the baseline.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        let Some(join) = self.thread_handle.take() else {
            return;
        };
        let finished = match self.done_rx.take() {
            Some(rx) => !matches!(
                rx.recv_timeout(STOP_TIMEOUT),
                Err(mpsc::RecvTimeoutError::Timeout)
            ),
            None => true,
        };

        if !finished {
            tracing::warn!(
                timeout_ms = STOP_TIMEOUT.as_millis() as u64,
                "limiter loop did not stop in time, detaching"
            );
            return;
        }

        match join.join() {
            Ok(mut controller) => {
                if controller.restore_baseline() {
                    let config = self.handle.config.snapshot();
                    self.handle.telemetry.publish(&controller.snapshot(&config));
                }
                self.controller = Some(controller);
            }
            Err(_) => tracing::error!("limiter loop panicked"),
        }
    }
}

impl<D> Drop for LimiterEngine<D> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(join) = self.thread_handle.take() {
            let _ = join.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::scripted::ScriptedDevice;
    use crate::limiter::config::LimiterConfig;
    use crate::limiter::telemetry::LimiterPhase;

    #[test]
    fn test_handle_toggle() {
        let handle = LimiterHandle::new(SharedConfig::default(), true);
        assert!(!handle.toggle_enabled());
        assert!(!handle.is_enabled());
        assert!(handle.toggle_enabled());
        assert!(handle.is_enabled());
    }

    #[test]
    fn test_initial_telemetry_published() {
        let dev = ScriptedDevice::new(0.6);
        let engine = LimiterEngine::new(dev, SharedConfig::default(), true);
        let snap = engine.handle().telemetry();
        assert_eq!(snap.volume, 0.6);
        assert_eq!(snap.original_volume, 0.6);
        assert_eq!(snap.phase, LimiterPhase::Idle);
    }

    #[test]
    fn test_start_twice_fails() {
        let dev = ScriptedDevice::new(0.5);
        let mut engine = LimiterEngine::new(dev, SharedConfig::default(), true)
            .with_period(Duration::from_millis(5));
        engine.start().unwrap();
        assert!(engine.is_running());
        assert!(matches!(engine.start(), Err(EngineError::AlreadyRunning)));
        engine.stop();
        assert!(!engine.is_running());
        assert!(engine.state().is_some());
    }

    #[test]
    fn test_stop_is_prompt_and_restartable() {
        let dev = ScriptedDevice::new(1.0);
        let config = SharedConfig::new(LimiterConfig {
            attack_time: 0.0,
            leeway_db: 0.0,
            ..LimiterConfig::default()
        });
        let mut engine =
            LimiterEngine::new(dev.clone(), config, true).with_period(Duration::from_millis(5));
        dev.set_source_level(0.5);

        engine.start().unwrap();
        thread::sleep(Duration::from_millis(60));
        let begin = Instant::now();
        engine.stop();
        assert!(begin.elapsed() < STOP_TIMEOUT);
        assert!(!dev.writes().is_empty());
        assert!(!engine.state().unwrap().is_limiting);
        assert_eq!(dev.current_volume(), 1.0);
        assert!(!engine.handle().telemetry().limiting);

        engine.start().unwrap();
        engine.stop();
        assert!(engine.state().is_some());
    }
}
