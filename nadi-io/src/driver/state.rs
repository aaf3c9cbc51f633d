//! Shared tolerance state read by the decoder on every analog record.
//!
//! Values are stored as `f64` bit patterns in atomics so the dispatch thread
//! never takes a lock to read them.

use crate::config::TolerancesConfig;
use crate::core::types::ToleranceKind;
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};

/// Change-detection tolerances
///
/// A value of `0.0` disables filtering for that record type.
#[derive(Debug)]
pub struct Tolerances {
    cliff_adc: AtomicU64,
    gyro: AtomicU64,
    current_wheels: AtomicU64,
}

impl Tolerances {
    pub fn new() -> Self {
        Self {
            cliff_adc: AtomicU64::new(0f64.to_bits()),
            gyro: AtomicU64::new(0f64.to_bits()),
            current_wheels: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Build from config, validating every value
    pub fn from_config(config: &TolerancesConfig) -> Result<Self> {
        let tolerances = Self::new();
        tolerances.apply(config)?;
        Ok(tolerances)
    }

    /// Overwrite all values from config
    pub fn apply(&self, config: &TolerancesConfig) -> Result<()> {
        self.set(ToleranceKind::CliffAdc, config.cliff_adc)?;
        self.set(ToleranceKind::Gyro, config.gyro)?;
        self.set(ToleranceKind::CurrentWheels, config.current_wheels)?;
        Ok(())
    }

    #[inline]
    pub fn get(&self, kind: ToleranceKind) -> f64 {
        f64::from_bits(self.slot(kind).load(Ordering::Relaxed))
    }

    /// Set a tolerance; negative and non-finite values are rejected
    pub fn set(&self, kind: ToleranceKind, value: f64) -> Result<()> {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::InvalidTolerance { kind, value });
        }
        self.slot(kind).store(value.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    fn slot(&self, kind: ToleranceKind) -> &AtomicU64 {
        match kind {
            ToleranceKind::CliffAdc => &self.cliff_adc,
            ToleranceKind::Gyro => &self.gyro,
            ToleranceKind::CurrentWheels => &self.current_wheels,
        }
    }
}

impl Default for Tolerances {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_disable_filtering() {
        let t = Tolerances::default();
        assert_eq!(t.get(ToleranceKind::CliffAdc), 0.0);
        assert_eq!(t.get(ToleranceKind::Gyro), 0.0);
        assert_eq!(t.get(ToleranceKind::CurrentWheels), 0.0);
    }

    #[test]
    fn test_set_and_get() {
        let t = Tolerances::new();
        t.set(ToleranceKind::Gyro, 0.25).unwrap();
        assert_eq!(t.get(ToleranceKind::Gyro), 0.25);
        assert_eq!(t.get(ToleranceKind::CliffAdc), 0.0);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let t = Tolerances::new();
        assert!(matches!(
            t.set(ToleranceKind::CliffAdc, -1.0),
            Err(Error::InvalidTolerance { .. })
        ));
        assert!(t.set(ToleranceKind::CliffAdc, f64::NAN).is_err());
        assert_eq!(t.get(ToleranceKind::CliffAdc), 0.0);
    }

    #[test]
    fn test_from_config() {
        let config = TolerancesConfig {
            cliff_adc: 12.0,
            gyro: 3.0,
            current_wheels: 1.0,
        };
        let t = Tolerances::from_config(&config).unwrap();
        assert_eq!(t.get(ToleranceKind::CliffAdc), 12.0);
        assert_eq!(t.get(ToleranceKind::CurrentWheels), 1.0);
    }
}
