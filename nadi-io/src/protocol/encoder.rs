//! Outbound frame encoding
//!
//! This module provides:
//! - `TxFrame`: Fixed-size buffer holding one outbound frame
//! - `CommandEncoder`: Maps [`Command`]s onto sub-payloads
//! - `checksum`: The XOR checksum shared by the encode and decode paths
//!
//! # Unit Conversions
//!
//! Base control takes speed in mm/s and turning radius in mm. Velocity
//! commands arrive in m/s and rad/s and are converted with the differential
//! drive rule in [`velocity_to_raw`]:
//!
//! - angular ≈ 0: radius 0 (straight line)
//! - linear ≈ 0: radius ±1 (spin in place), speed from the outer wheel
//! - otherwise: radius = linear / angular, speed from the faster wheel

use super::constants::*;
use crate::core::types::{Command, SoundPreset, Tone};
use crate::error::{Error, Result};

/// Below this magnitude a velocity component counts as zero
const VELOCITY_EPSILON: f64 = 1e-4;

/// Conversion factor from m/s to base units (mm/s)
const VELOCITY_TO_DEVICE_UNITS: f64 = 1000.0;

/// XOR checksum over `LEN` + payload
#[inline]
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Wrap a payload in header, length and checksum
///
/// Payloads longer than [`MAX_PAYLOAD_SIZE`] are truncated.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let len = payload.len().min(MAX_PAYLOAD_SIZE);
    let mut out = Vec::with_capacity(HEADER_SIZE + len + CHECKSUM_SIZE);
    out.extend_from_slice(&[HEADER_BYTE_1, HEADER_BYTE_2, len as u8]);
    out.extend_from_slice(&payload[..len]);
    out.push(checksum(&out[2..]));
    out
}

/// One outbound frame assembled in place
pub struct TxFrame {
    data: [u8; MAX_FRAME_SIZE],
    len: usize,
}

impl TxFrame {
    /// Create an empty frame with header bytes pre-filled
    pub const fn new() -> Self {
        let mut data = [0u8; MAX_FRAME_SIZE];
        data[0] = HEADER_BYTE_1;
        data[1] = HEADER_BYTE_2;
        Self {
            data,
            len: HEADER_SIZE,
        }
    }

    /// Payload bytes written so far
    pub fn payload_len(&self) -> usize {
        self.len - HEADER_SIZE
    }

    /// Append one sub-payload
    pub fn push_sub_payload(&mut self, id: u8, body: &[u8]) -> Result<()> {
        let needed = SUB_HEADER_SIZE + body.len();
        if self.payload_len() + needed > MAX_PAYLOAD_SIZE {
            return Err(Error::InvalidParameter(format!(
                "sub-payload 0x{:02X} does not fit in frame ({} + {} bytes)",
                id,
                self.payload_len(),
                needed
            )));
        }
        self.data[self.len] = id;
        self.data[self.len + 1] = body.len() as u8;
        self.data[self.len + 2..self.len + needed].copy_from_slice(body);
        self.len += needed;
        Ok(())
    }

    /// Complete frame: header, payload and checksum
    pub fn as_bytes(&mut self) -> &[u8] {
        self.data[2] = self.payload_len() as u8;
        self.data[self.len] = checksum(&self.data[2..self.len]);
        &self.data[..self.len + CHECKSUM_SIZE]
    }

    /// Base control sub-payload (CMD 0x01)
    pub fn set_base_control(&mut self, speed: i16, radius: i16) -> Result<()> {
        let mut body = [0u8; BASE_CONTROL_SIZE as usize];
        body[0..2].copy_from_slice(&speed.to_le_bytes());
        body[2..4].copy_from_slice(&radius.to_le_bytes());
        self.push_sub_payload(CMD_BASE_CONTROL, &body)
    }

    /// Single tone sub-payload (CMD 0x03)
    pub fn push_tone(&mut self, tone: Tone) -> Result<()> {
        let mut body = [0u8; SOUND_SIZE as usize];
        body[0..2].copy_from_slice(&tone.note.to_le_bytes());
        body[2] = tone.duration_ms;
        self.push_sub_payload(CMD_SOUND, &body)
    }

    /// Stored sound sequence sub-payload (CMD 0x04)
    pub fn set_sound_preset(&mut self, preset: SoundPreset) -> Result<()> {
        self.push_sub_payload(CMD_SOUND_SEQUENCE, &[preset as u8])
    }
}

impl Default for TxFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert (m/s, rad/s) to (speed mm/s, radius mm)
///
/// Results are rounded; out-of-range values saturate at the `i16` limits.
pub fn velocity_to_raw(linear: f64, angular: f64, wheel_base_m: f64) -> (i16, i16) {
    let radius = if angular.abs() < VELOCITY_EPSILON {
        0.0
    } else if linear.abs() < VELOCITY_EPSILON {
        angular.signum()
    } else {
        linear * VELOCITY_TO_DEVICE_UNITS / angular
    };

    let half_turn = wheel_base_m * angular / 2.0;
    let speed = if linear < 0.0 {
        (linear + half_turn).min(linear - half_turn)
    } else {
        (linear + half_turn).max(linear - half_turn)
    } * VELOCITY_TO_DEVICE_UNITS;

    (speed.round() as i16, radius.round() as i16)
}

/// Encodes [`Command`]s into frames
#[derive(Debug, Clone, Copy)]
pub struct CommandEncoder {
    wheel_base_m: f64,
}

impl CommandEncoder {
    pub fn new(wheel_base_m: f64) -> Self {
        Self { wheel_base_m }
    }

    pub fn wheel_base_m(&self) -> f64 {
        self.wheel_base_m
    }

    /// Encode a command, or `None` for commands that carry no wire bytes
    pub fn encode(&self, cmd: &Command) -> Result<Option<TxFrame>> {
        let mut frame = TxFrame::new();
        match cmd {
            Command::MoveVelocity { linear, angular } => {
                if !linear.is_finite() || !angular.is_finite() {
                    return Err(Error::InvalidParameter(format!(
                        "non-finite velocity: linear={}, angular={}",
                        linear, angular
                    )));
                }
                let (speed, radius) = velocity_to_raw(*linear, *angular, self.wheel_base_m);
                log::debug!(
                    "MoveVelocity: linear={:.3} m/s, angular={:.3} rad/s -> speed={} mm/s, radius={} mm",
                    linear,
                    angular,
                    speed,
                    radius
                );
                frame.set_base_control(speed, radius)?;
            }
            Command::MoveRaw { speed, radius } => {
                frame.set_base_control(*speed, *radius)?;
            }
            Command::SoundSequence(tones) => {
                if tones.is_empty() {
                    return Err(Error::InvalidParameter("empty sound sequence".to_string()));
                }
                for tone in tones {
                    frame.push_tone(*tone)?;
                }
            }
            Command::PlaySound(preset) => {
                frame.set_sound_preset(*preset)?;
            }
            Command::SetTolerance { .. } => return Ok(None),
        }
        Ok(Some(frame))
    }
}
