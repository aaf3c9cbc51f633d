//! Command path: encode and write through the transport guard
//!
//! Every operation fails with [`Error::NotStarted`](crate::error::Error::NotStarted)
//! before the driver is started and with
//! [`Error::Closed`](crate::error::Error::Closed) after it is stopped.

use super::state::Tolerances;
use crate::core::types::{Command, SoundPreset, ToleranceKind, Tone};
use crate::error::Result;
use crate::protocol::CommandEncoder;
use crate::transport::TransportGuard;
use std::sync::Arc;

/// Cloneable handle for issuing commands from any thread
#[derive(Clone)]
pub struct CommandPath {
    guard: Arc<TransportGuard>,
    tolerances: Arc<Tolerances>,
    encoder: CommandEncoder,
}

impl CommandPath {
    pub(crate) fn new(
        guard: Arc<TransportGuard>,
        tolerances: Arc<Tolerances>,
        encoder: CommandEncoder,
    ) -> Self {
        Self {
            guard,
            tolerances,
            encoder,
        }
    }

    /// Encode and send one command
    pub fn send(&self, cmd: &Command) -> Result<()> {
        self.guard.ensure_open()?;
        match self.encoder.encode(cmd)? {
            Some(mut frame) => {
                log::debug!("Sending {:?}", cmd);
                self.guard.write(frame.as_bytes())
            }
            None => {
                if let Command::SetTolerance { kind, value } = cmd {
                    self.tolerances.set(*kind, *value)?;
                    log::info!("Tolerance {:?} set to {}", kind, value);
                }
                Ok(())
            }
        }
    }

    /// Drive at `linear` m/s while turning at `angular` rad/s
    pub fn move_velocity(&self, linear: f64, angular: f64) -> Result<()> {
        self.send(&Command::MoveVelocity { linear, angular })
    }

    /// Drive with raw base units: speed mm/s, radius mm
    pub fn move_raw(&self, speed: i16, radius: i16) -> Result<()> {
        self.send(&Command::MoveRaw { speed, radius })
    }

    pub fn stop_motion(&self) -> Result<()> {
        self.move_raw(0, 0)
    }

    /// Play tones back to back (sent as a single frame)
    pub fn play_sound_sequence(&self, tones: &[Tone]) -> Result<()> {
        self.send(&Command::SoundSequence(tones.to_vec()))
    }

    pub fn play_sound(&self, preset: SoundPreset) -> Result<()> {
        self.send(&Command::PlaySound(preset))
    }

    /// Change a decoder tolerance; takes effect on the next decoded record
    pub fn set_tolerance(&self, kind: ToleranceKind, value: f64) -> Result<()> {
        self.send(&Command::SetTolerance { kind, value })
    }

    pub fn tolerance(&self, kind: ToleranceKind) -> f64 {
        self.tolerances.get(kind)
    }

    pub fn wheel_base_m(&self) -> f64 {
        self.encoder.wheel_base_m()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DuplexMode;
    use crate::error::Error;
    use crate::protocol::constants::{CMD_BASE_CONTROL, CMD_SOUND_SEQUENCE};
    use crate::transport::MockTransport;
    use std::time::Duration;

    fn path() -> (CommandPath, Arc<TransportGuard>, MockTransport) {
        let mock = MockTransport::new();
        let guard = Arc::new(TransportGuard::new(
            Box::new(mock.clone()),
            DuplexMode::Full,
            Duration::from_millis(5),
        ));
        let path = CommandPath::new(
            Arc::clone(&guard),
            Arc::new(Tolerances::new()),
            CommandEncoder::new(0.23),
        );
        (path, guard, mock)
    }

    #[test]
    fn test_not_started() {
        let (path, _guard, mock) = path();
        assert!(matches!(path.move_raw(100, 0), Err(Error::NotStarted)));
        assert!(matches!(
            path.set_tolerance(ToleranceKind::Gyro, 2.0),
            Err(Error::NotStarted)
        ));
        assert_eq!(path.tolerance(ToleranceKind::Gyro), 0.0);
        assert!(mock.get_written().is_empty());
    }

    #[test]
    fn test_commands_reach_transport() {
        let (path, guard, mock) = path();
        guard.open().unwrap();

        path.move_raw(100, -1).unwrap();
        let written = mock.get_written();
        assert_eq!(&written[..5], &[0xAA, 0x55, 0x06, CMD_BASE_CONTROL, 0x04]);
        assert_eq!(i16::from_le_bytes([written[5], written[6]]), 100);
        assert_eq!(i16::from_le_bytes([written[7], written[8]]), -1);

        mock.clear_written();
        path.play_sound(SoundPreset::Button).unwrap();
        assert_eq!(&mock.get_written()[3..6], &[CMD_SOUND_SEQUENCE, 1, 3]);
    }

    #[test]
    fn test_set_tolerance_after_open() {
        let (path, guard, mock) = path();
        guard.open().unwrap();

        path.set_tolerance(ToleranceKind::CliffAdc, 25.0).unwrap();
        assert_eq!(path.tolerance(ToleranceKind::CliffAdc), 25.0);
        assert!(mock.get_written().is_empty());

        assert!(matches!(
            path.set_tolerance(ToleranceKind::CliffAdc, -3.0),
            Err(Error::InvalidTolerance { .. })
        ));
        assert_eq!(path.tolerance(ToleranceKind::CliffAdc), 25.0);
    }

    #[test]
    fn test_closed_and_write_failure() {
        let (path, guard, mock) = path();
        guard.open().unwrap();

        mock.fail_writes(Some("unplugged"));
        let err = path.stop_motion().unwrap_err();
        assert!(err.is_transport());

        guard.close().unwrap();
        assert!(matches!(path.move_velocity(0.1, 0.0), Err(Error::Closed)));
    }
}
