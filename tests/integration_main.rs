use std::thread;
use std::time::{Duration, Instant};

use tame::app::config::{AppConfig, Settings};
use tame::audio::ScriptedDevice;
use tame::limiter::{LimiterConfig, LimiterEngine, LimiterHandle, LimiterPhase, SharedConfig};

/// Poll telemetry until `check` passes or `timeout` runs out
fn wait_until<F>(handle: &LimiterHandle, timeout: Duration, check: F) -> bool
where
    F: Fn(&tame::limiter::TelemetrySnapshot) -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check(&handle.telemetry()) {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn fast_config() -> SharedConfig {
    SharedConfig::new(LimiterConfig {
        volume_cap: 0.2,
        attack_time: 0.0,
        leeway_db: 0.0,
        user_cooldown: 0.3,
        ..LimiterConfig::default()
    })
}

#[test]
fn test_limits_releases_and_respects_user() {
    let dev = ScriptedDevice::new(1.0);
    let mut engine = LimiterEngine::new(dev.clone(), fast_config(), true)
        .with_period(Duration::from_millis(5));
    let handle = engine.handle();
    engine.start().unwrap();

    // Loud source: 0.8 * 1.0 is well over the 0.2 cap
    dev.set_source_level(0.8);
    assert!(wait_until(&handle, Duration::from_secs(2), |s| s.limiting));
    assert!(dev.current_volume() <= 0.26, "volume {}", dev.current_volume());

    // Quiet again: hold, then ramp back to the baseline
    dev.set_source_level(0.0);
    assert!(wait_until(&handle, Duration::from_secs(3), |s| !s.limiting));
    assert!((dev.current_volume() - 1.0).abs() < 0.01);

    // User picks a new level; it becomes the baseline
    dev.user_sets_volume(0.5);
    assert!(wait_until(&handle, Duration::from_secs(1), |s| {
        (s.original_volume - 0.5).abs() < f32::EPSILON
    }));

    // Loud again once the cooldown has passed: 0.2 / 0.8
    dev.set_source_level(0.8);
    assert!(wait_until(&handle, Duration::from_secs(2), |s| s.limiting));
    assert!(dev.current_volume() <= 0.26);

    // Stopping mid-limit hands the user's level back
    engine.stop();
    assert!(!engine.is_running());
    assert_eq!(engine.state().unwrap().original_volume, 0.5);
    assert_eq!(dev.current_volume(), 0.5);
}

#[test]
fn test_disabled_engine_never_writes() {
    let dev = ScriptedDevice::new(1.0);
    let mut engine = LimiterEngine::new(dev.clone(), fast_config(), false)
        .with_period(Duration::from_millis(5));
    let handle = engine.handle();
    dev.set_source_level(1.0);

    engine.start().unwrap();
    assert!(wait_until(&handle, Duration::from_secs(1), |s| {
        s.phase == LimiterPhase::Paused
    }));
    thread::sleep(Duration::from_millis(50));
    assert!(dev.writes().is_empty());

    // Enabling at runtime picks it up on the next tick
    handle.set_enabled(true);
    assert!(wait_until(&handle, Duration::from_secs(2), |s| s.limiting));
    assert!(!dev.writes().is_empty());

    engine.stop();
}

#[test]
fn test_live_settings_persist() {
    let path = std::env::temp_dir()
        .join(format!("tame-integration-{}", std::process::id()))
        .join("settings.toml");

    let handle = LimiterHandle::new(SharedConfig::default(), true);
    handle.config().set_volume_cap(0.35);
    handle.config().reset_advanced();
    handle.set_enabled(false);

    Settings::from_handle(&handle, true).save(&path).unwrap();
    let loaded = AppConfig::load(&path);

    assert!(!loaded.enabled);
    assert!(loaded.voice_mode);
    assert_eq!(loaded.limiter, LimiterConfig::recommended(0.35));

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}
