//! NadiIO - Kobuki sensor monitor daemon
//!
//! Connects to the base, logs contact events (bumper, cliff, wheel drop,
//! buttons) and battery changes, and reports driver diagnostics until
//! interrupted.

use nadi_io::core::types::{BatteryVoltage, Bumper, Buttons, ChargeState, Cliff, SoundPreset, WheelsDrop};
use nadi_io::error::{Error, Result};
use nadi_io::{Config, Diagnostic, Driver};
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/nadi-io.toml";

/// Parse config path from command line arguments.
///
/// Supports:
/// - `nadi-io <path>` (positional)
/// - `nadi-io --config <path>` (flag-based)
/// - `nadi-io -c <path>` (short flag)
///
/// Defaults to `/etc/nadi-io.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    DEFAULT_CONFIG_PATH.to_string()
}

fn load_config(path: &str) -> Result<Config> {
    if Path::new(path).exists() {
        Config::load(path)
    } else if path == DEFAULT_CONFIG_PATH {
        Ok(Config::default())
    } else {
        Err(Error::Config(format!("config file not found: {}", path)))
    }
}

fn subscribe_monitors(driver: &Driver) {
    driver.subscribe_to::<Bumper, _>(|b| {
        if b.left || b.center || b.right {
            log::info!("Bumper pressed: {:?}", b);
        }
    });
    driver.subscribe_to::<Cliff, _>(|c| {
        if c.left || c.center || c.right {
            log::warn!("Cliff detected: {:?}", c);
        }
    });
    driver.subscribe_to::<WheelsDrop, _>(|w| {
        if w.left || w.right {
            log::warn!("Wheel drop: {:?}", w);
        }
    });
    driver.subscribe_to::<Buttons, _>(|b| {
        if b.b0 || b.b1 || b.b2 {
            log::info!("Button pressed: {:?}", b);
        }
    });

    let last_charge = AtomicU8::new(u8::MAX);
    driver.subscribe_to::<ChargeState, _>(move |c| {
        if last_charge.swap(c.raw, Ordering::Relaxed) != c.raw {
            log::info!("Charge state: {:?} (charging={})", c.source(), c.is_charging());
        }
    });

    let last_voltage = AtomicU8::new(0);
    driver.subscribe_to::<BatteryVoltage, _>(move |v| {
        if last_voltage.swap(v.decivolts, Ordering::Relaxed) != v.decivolts {
            log::debug!("Battery: {:.1} V", v.volts());
        }
    });

    driver.subscribe_all(|feedback| log::trace!("{}: {:?}", feedback.name, feedback.record));
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config = load_config(&config_path);
    let level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    log::info!("NadiIO v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", config_path);
    let config = config?;

    let mut driver = Driver::from_config(config)?;
    subscribe_monitors(&driver);
    driver.on_start(|commands| {
        if let Err(e) = commands.play_sound(SoundPreset::On) {
            log::warn!("Failed to play start sound: {}", e);
        }
    });

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    driver.start()?;
    let diagnostics = driver.diagnostics();

    while running.load(Ordering::Relaxed) && driver.is_running() {
        match diagnostics.recv_timeout(Duration::from_millis(200)) {
            Ok(Diagnostic::DecodeFailed(e)) => log::debug!("Decode error: {}", e),
            Ok(Diagnostic::SubscriberPanicked { event, message, .. }) => {
                log::error!("Subscriber on {} panicked: {}", event, message)
            }
            Ok(Diagnostic::TransportFailed(e)) => log::error!("Transport failed: {}", e),
            Ok(Diagnostic::DispatchStopped(stats)) => log::info!("Dispatch stopped: {:?}", stats),
            Err(_) => {}
        }
    }

    let commands = driver.commands();
    if driver.is_running() {
        let _ = commands.stop_motion();
        let _ = commands.play_sound(SoundPreset::Off);
    }
    if driver.dropped_diagnostics() > 0 {
        log::warn!("{} diagnostics dropped", driver.dropped_diagnostics());
    }

    log::info!("Shutting down...");
    driver.shutdown()?;
    log::info!("Shutdown complete");
    Ok(())
}
