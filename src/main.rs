use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};

use tame::app::cli::Args;
use tame::app::config::{AppConfig, SessionSettings, Settings};
use tame::app::lock::InstanceLock;
use tame::app::presentation::{SettingsWatcher, TelemetryReporter};
use tame::audio::{ScriptedDevice, VolumeDevice};
use tame::limiter::{LimiterConfig, LimiterEngine, SharedConfig};

/// Presentation refresh, decoupled from the 50 Hz control loop
const REFRESH_PERIOD: Duration = Duration::from_millis(100);
/// Settings file is checked every this many refreshes
const SETTINGS_POLL_EVERY: u32 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    human_panic::setup_panic!();

    let args = Args::parse();

    if args.generate_config {
        print!("{}", Settings::default().to_toml()?);
        return Ok(());
    }

    let log_dir = if args.log_file {
        Some(AppConfig::get_log_dir()?)
    } else {
        None
    };
    let _log_guard = tame::logging::init(args.verbose, log_dir.as_deref());

    let settings_path = match &args.config {
        Some(path) => path.clone(),
        None => AppConfig::get_settings_path()?,
    };
    let mut settings = AppConfig::load(&settings_path);
    let session = SessionSettings::from_stored(&settings);
    if args.reset_advanced {
        settings.limiter = LimiterConfig::recommended(settings.limiter.volume_cap);
        tracing::info!("applied recommended preset");
    }
    if args.disabled {
        settings.enabled = false;
    }

    let lock_path = AppConfig::get_lock_path();
    let Some(_lock) = InstanceLock::try_acquire(&lock_path)
        .with_context(|| format!("could not open lock file {}", lock_path.display()))?
    else {
        bail!(
            "another tame instance is already running (lock: {})",
            lock_path.display()
        );
    };

    if let Some(level) = args.simulate {
        let device = ScriptedDevice::new(1.0);
        device.set_source_level(level.clamp(0.0, 1.0));
        tracing::info!(level, "using simulated device");
        return run(device, settings, session, &settings_path).await;
    }

    run_system(args.sink.as_deref(), settings, session, &settings_path).await
}

#[cfg(feature = "system")]
async fn run_system(
    sink: Option<&str>,
    settings: Settings,
    session: SessionSettings,
    settings_path: &Path,
) -> Result<()> {
    use tame::audio::meter::PeakMeter;
    use tame::audio::{PactlVolume, SinkVolume, SystemDevice};

    let volume = sink.map(PactlVolume::new).unwrap_or_default();
    volume
        .get()
        .with_context(|| format!("could not read volume of sink {}", volume.sink()))?;

    // Stream stops when dropped, so the meter lives until run() returns
    let meter = PeakMeter::open().context("could not open the input meter")?;
    tracing::info!(input = meter.device_name(), sink = volume.sink(), "audio backend ready");

    let device = SystemDevice::new(volume, meter.handle());
    let result = run(device, settings, session, settings_path).await;
    drop(meter);
    result
}

#[cfg(not(feature = "system"))]
async fn run_system(
    _sink: Option<&str>,
    _settings: Settings,
    _session: SessionSettings,
    _settings_path: &Path,
) -> Result<()> {
    bail!("built without the system backend, run with --simulate <LEVEL>")
}

async fn run<D: VolumeDevice + 'static>(
    device: D,
    settings: Settings,
    mut session: SessionSettings,
    settings_path: &Path,
) -> Result<()> {
    let mut engine = LimiterEngine::new(device, SharedConfig::new(settings.limiter), settings.enabled);
    let handle = engine.handle();
    engine.start()?;
    tracing::info!(
        cap = settings.limiter.volume_cap,
        enabled = settings.enabled,
        "tame running"
    );

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut toggle = signal(SignalKind::user_defined1())?;

    let mut refresh = tokio::time::interval(REFRESH_PERIOD);
    refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut reporter = TelemetryReporter::default();
    let mut watcher = SettingsWatcher::new(settings_path.to_path_buf());
    let mut refreshes: u32 = 0;

    loop {
        tokio::select! {
            _ = refresh.tick() => {
                reporter.report(&handle.telemetry());
                refreshes = refreshes.wrapping_add(1);
                if refreshes % SETTINGS_POLL_EVERY == 0 {
                    if let Some(applied) = watcher.poll(&handle) {
                        session.reloaded(&applied);
                    }
                }
            }
            _ = toggle.recv() => {
                let enabled = handle.toggle_enabled();
                session.toggled(enabled);
                tracing::info!(enabled, "toggled");
            }
            _ = interrupt.recv() => break,
            _ = terminate.recv() => break,
        }
    }

    tracing::info!("shutting down");
    engine.stop();

    let final_settings = session.to_save(&handle);
    match final_settings.save(settings_path) {
        Ok(()) => tracing::info!(path = %settings_path.display(), "settings saved"),
        Err(e) => tracing::error!(path = %settings_path.display(), error = %e, "could not save settings"),
    }

    Ok(())
}
