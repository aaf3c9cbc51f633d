//! Configuration for NadiIO
//!
//! Loads configuration from a TOML file. Every section is optional and falls
//! back to the defaults for a Kobuki base on `/dev/ttyUSB0`.

use crate::core::types::ToleranceKind;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub transport: TransportConfig,
    pub dispatch: DispatchConfig,
    pub motion: MotionConfig,
    pub tolerances: TolerancesConfig,
    pub logging: LoggingConfig,
}

/// Which byte stream the driver talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Serial,
    Tcp,
}

/// Whether reads and writes may overlap on the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplexMode {
    /// Reader and writer take turns on a single handle
    Half,
    /// Reader and writer each own a cloned handle
    Full,
}

/// Connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// Serial device path (`kind = "serial"`)
    pub port: String,
    pub baud_rate: u32,
    /// Remote `host:port` (`kind = "tcp"`), e.g. a simulator or ser2net bridge
    pub address: String,
    pub duplex: DuplexMode,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Serial,
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            address: "127.0.0.1:5555".to_string(),
            duplex: DuplexMode::Full,
        }
    }
}

/// Dispatch loop timing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Longest a single read waits before the loop re-checks for shutdown
    pub read_timeout_ms: u64,
    /// Slice length for polling the transport while waiting
    pub poll_interval_ms: u64,
    /// Bytes requested per read
    pub read_chunk_size: usize,
    /// Diagnostics buffered before new ones are dropped
    pub diagnostics_capacity: usize,
}

impl DispatchConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 100,
            poll_interval_ms: 10,
            read_chunk_size: 256,
            diagnostics_capacity: 64,
        }
    }
}

/// Motion configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Distance between the wheels in meters
    ///
    /// Used for converting (linear, angular) velocity into the base's
    /// (speed, radius) command.
    pub wheel_base_m: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self { wheel_base_m: 0.23 }
    }
}

/// Change thresholds below which sensor updates are suppressed (0 = publish all)
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TolerancesConfig {
    /// Raw ADC counts
    pub cliff_adc: f64,
    /// Raw gyro counts on any axis
    pub gyro: f64,
    /// Motor current units
    pub current_wheels: f64,
}

impl TolerancesConfig {
    pub fn get(&self, kind: ToleranceKind) -> f64 {
        match kind {
            ToleranceKind::CliffAdc => self.cliff_adc,
            ToleranceKind::Gyro => self.gyro,
            ToleranceKind::CurrentWheels => self.current_wheels,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use nadi_io::config::Config;
    ///
    /// let config = Config::load("nadi-io.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    /// Parse and validate configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the driver cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.poll_interval_ms == 0 {
            return Err(Error::Config("dispatch.poll_interval_ms must be > 0".into()));
        }
        if self.dispatch.read_chunk_size == 0 {
            return Err(Error::Config("dispatch.read_chunk_size must be > 0".into()));
        }
        if self.dispatch.diagnostics_capacity == 0 {
            return Err(Error::Config(
                "dispatch.diagnostics_capacity must be > 0".into(),
            ));
        }
        if !(self.motion.wheel_base_m.is_finite() && self.motion.wheel_base_m > 0.0) {
            return Err(Error::Config(format!(
                "motion.wheel_base_m must be positive, got {}",
                self.motion.wheel_base_m
            )));
        }
        for kind in [
            ToleranceKind::CliffAdc,
            ToleranceKind::Gyro,
            ToleranceKind::CurrentWheels,
        ] {
            let value = self.tolerances.get(kind);
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::InvalidTolerance { kind, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport.kind, TransportKind::Serial);
        assert_eq!(config.transport.port, "/dev/ttyUSB0");
        assert_eq!(config.transport.baud_rate, 115_200);
        assert_eq!(config.transport.duplex, DuplexMode::Full);
        assert_eq!(config.dispatch.read_timeout(), Duration::from_millis(100));
        assert_eq!(config.motion.wheel_base_m, 0.23);
        assert_eq!(config.tolerances, TolerancesConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let toml_string = toml::to_string_pretty(&Config::default()).unwrap();

        assert!(toml_string.contains("[transport]"));
        assert!(toml_string.contains("[dispatch]"));
        assert!(toml_string.contains("[motion]"));
        assert!(toml_string.contains("[tolerances]"));
        assert!(toml_string.contains("[logging]"));

        assert!(toml_string.contains("kind = \"serial\""));
        assert!(toml_string.contains("duplex = \"full\""));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[transport]
kind = "tcp"
address = "192.168.1.20:7000"
duplex = "half"

[dispatch]
read_timeout_ms = 50

[tolerances]
gyro = 12.5

[logging]
level = "debug"
"#;

        let config = Config::from_str(toml_content).unwrap();
        assert_eq!(config.transport.kind, TransportKind::Tcp);
        assert_eq!(config.transport.address, "192.168.1.20:7000");
        assert_eq!(config.transport.duplex, DuplexMode::Half);
        assert_eq!(config.dispatch.read_timeout_ms, 50);
        // Unset keys keep their defaults
        assert_eq!(config.dispatch.poll_interval_ms, 10);
        assert_eq!(config.tolerances.gyro, 12.5);
        assert_eq!(config.tolerances.cliff_adc, 0.0);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            Config::from_str("[tolerances]\ncliff_adc = -1.0\n"),
            Err(Error::InvalidTolerance {
                kind: ToleranceKind::CliffAdc,
                ..
            })
        ));
        assert!(matches!(
            Config::from_str("[dispatch]\npoll_interval_ms = 0\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_str("[motion]\nwheel_base_m = 0.0\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_str("[transport]\nkind = \"usb\"\n"),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[transport]\nport = \"/dev/ttyACM0\"\nbaud_rate = 57600").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.transport.port, "/dev/ttyACM0");
        assert_eq!(config.transport.baud_rate, 57_600);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nadi-io.toml");

        let mut config = Config::default();
        config.tolerances.current_wheels = 3.0;
        config.to_file(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.tolerances.current_wheels, 3.0);
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = Config::from_str(include_str!("../nadi-io.toml")).unwrap();
        assert_eq!(config.transport.kind, TransportKind::Serial);
        assert_eq!(config.dispatch.diagnostics_capacity, 64);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/nadi-io.toml"),
            Err(Error::Io(_))
        ));
    }
}
