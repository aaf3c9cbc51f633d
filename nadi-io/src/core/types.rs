//! Core data types for sensor records, event names and commands.
//!
//! Key types:
//! - [`SensorRecord`]: Immutable decoded sensor reading, one variant per event
//! - [`EventName`]: Closed set of publish channels (one per variant + `Feedback`)
//! - [`Command`]: Outbound motion/sound/tolerance commands
//! - [`SensorPayload`]: Typed access used by per-variant subscriptions

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum raw gyro samples carried by a single frame
pub const MAX_GYRO_SAMPLES: usize = 4;

/// Kobuki sound period constant: `note = 1 / (frequency * SOUND_PERIOD_FACTOR)`
const SOUND_PERIOD_FACTOR: f64 = 0.000_002_75;

// ============================================================================
// Sensor payloads
// ============================================================================

/// Bumper contacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Bumper {
    pub left: bool,
    pub center: bool,
    pub right: bool,
}

/// Cliff detectors (digital)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Cliff {
    pub left: bool,
    pub center: bool,
    pub right: bool,
}

/// Raw cliff sensor ADC readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CliffAdc {
    pub right: u16,
    pub center: u16,
    pub left: u16,
}

/// Wheel drop switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WheelsDrop {
    pub left: bool,
    pub right: bool,
}

/// Wheel encoder ticks with the base's millisecond timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WheelsEncoder {
    pub timestamp_ms: u16,
    pub left: u16,
    pub right: u16,
}

/// Wheel motor PWM duty and overcurrent flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WheelsPwm {
    pub left: i8,
    pub right: i8,
    pub overcurrent_left: bool,
    pub overcurrent_right: bool,
}

/// Function buttons B0..B2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Buttons {
    pub b0: bool,
    pub b1: bool,
    pub b2: bool,
}

/// Where charging power comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChargeSource {
    None,
    Dock,
    Adapter,
}

/// Charger state byte as reported by the base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ChargeState {
    pub raw: u8,
}

impl ChargeState {
    const FLAG_CONNECTED: u8 = 0x02;
    const FLAG_CHARGING: u8 = 0x04;
    const FLAG_ADAPTER: u8 = 0x10;

    /// Charging current is flowing
    pub fn is_charging(&self) -> bool {
        self.raw & Self::FLAG_CHARGING != 0
    }

    /// Connected to power and battery full
    pub fn is_charged(&self) -> bool {
        self.raw & Self::FLAG_CONNECTED != 0 && !self.is_charging()
    }

    pub fn source(&self) -> ChargeSource {
        if self.raw & Self::FLAG_CONNECTED == 0 {
            ChargeSource::None
        } else if self.raw & Self::FLAG_ADAPTER != 0 {
            ChargeSource::Adapter
        } else {
            ChargeSource::Dock
        }
    }
}

/// Docking station IR receivers (bitmask of detected beacon regions)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DockingIr {
    pub right: u8,
    pub center: u8,
    pub left: u8,
}

/// Fused heading from the base's onboard IMU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Inertial {
    /// Heading in hundredths of a degree
    pub angle: i16,
    /// Heading rate in hundredths of a degree per second
    pub angle_rate: i16,
}

impl Inertial {
    pub fn heading_rad(&self) -> f64 {
        (self.angle as f64 / 100.0).to_radians()
    }

    pub fn rate_rad_s(&self) -> f64 {
        (self.angle_rate as f64 / 100.0).to_radians()
    }
}

/// Raw 3-axis gyro samples
///
/// Samples live in a fixed array so the record stays `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Gyro {
    pub frame_id: u8,
    samples: [[i16; 3]; MAX_GYRO_SAMPLES],
    count: u8,
}

impl Gyro {
    /// Build from decoded samples; extra samples beyond capacity are ignored
    pub fn new(frame_id: u8, samples: &[[i16; 3]]) -> Self {
        let count = samples.len().min(MAX_GYRO_SAMPLES);
        let mut buf = [[0i16; 3]; MAX_GYRO_SAMPLES];
        buf[..count].copy_from_slice(&samples[..count]);
        Self {
            frame_id,
            samples: buf,
            count: count as u8,
        }
    }

    /// Angular velocity samples (x, y, z) in raw units
    pub fn samples(&self) -> &[[i16; 3]] {
        &self.samples[..self.count as usize]
    }

    /// Most recent sample, if any
    pub fn latest(&self) -> Option<[i16; 3]> {
        self.samples().last().copied()
    }
}

/// Battery voltage in tenths of a volt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BatteryVoltage {
    pub decivolts: u8,
}

impl BatteryVoltage {
    pub fn volts(&self) -> f32 {
        self.decivolts as f32 / 10.0
    }
}

/// Wheel motor current in units of 10mA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CurrentWheels {
    pub left: u8,
    pub right: u8,
}

// ============================================================================
// SensorRecord
// ============================================================================

/// One decoded sensor reading
///
/// Records are immutable values; subscribers receive them by reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum SensorRecord {
    Gyro(Gyro),
    Cliff(Cliff),
    CliffAdc(CliffAdc),
    WheelsDrop(WheelsDrop),
    WheelsEncoder(WheelsEncoder),
    WheelsPwm(WheelsPwm),
    Bumper(Bumper),
    Buttons(Buttons),
    ChargeState(ChargeState),
    DockingIr(DockingIr),
    Inertial(Inertial),
    BatteryVoltage(BatteryVoltage),
    CurrentWheels(CurrentWheels),
}

impl SensorRecord {
    /// Channel this record is published on
    pub fn event_name(&self) -> EventName {
        match self {
            SensorRecord::Gyro(_) => EventName::Gyro,
            SensorRecord::Cliff(_) => EventName::Cliff,
            SensorRecord::CliffAdc(_) => EventName::CliffAdc,
            SensorRecord::WheelsDrop(_) => EventName::WheelsDrop,
            SensorRecord::WheelsEncoder(_) => EventName::WheelsEncoder,
            SensorRecord::WheelsPwm(_) => EventName::WheelsPwm,
            SensorRecord::Bumper(_) => EventName::Bumper,
            SensorRecord::Buttons(_) => EventName::Buttons,
            SensorRecord::ChargeState(_) => EventName::ChargeState,
            SensorRecord::DockingIr(_) => EventName::DockingIr,
            SensorRecord::Inertial(_) => EventName::Inertial,
            SensorRecord::BatteryVoltage(_) => EventName::BatteryVoltage,
            SensorRecord::CurrentWheels(_) => EventName::CurrentWheels,
        }
    }
}

// ============================================================================
// EventName
// ============================================================================

/// Publish channel identifier
///
/// The set is closed: one channel per [`SensorRecord`] variant plus the
/// catch-all [`EventName::Feedback`] channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    Feedback,
    Gyro,
    Cliff,
    CliffAdc,
    WheelsDrop,
    WheelsEncoder,
    WheelsPwm,
    Bumper,
    Buttons,
    ChargeState,
    DockingIr,
    Inertial,
    BatteryVoltage,
    CurrentWheels,
}

impl EventName {
    /// Every per-record channel (excludes `Feedback`)
    pub const RECORDS: [EventName; 13] = [
        EventName::Gyro,
        EventName::Cliff,
        EventName::CliffAdc,
        EventName::WheelsDrop,
        EventName::WheelsEncoder,
        EventName::WheelsPwm,
        EventName::Bumper,
        EventName::Buttons,
        EventName::ChargeState,
        EventName::DockingIr,
        EventName::Inertial,
        EventName::BatteryVoltage,
        EventName::CurrentWheels,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            EventName::Feedback => "Feedback",
            EventName::Gyro => "Gyro",
            EventName::Cliff => "Cliff",
            EventName::CliffAdc => "CliffADC",
            EventName::WheelsDrop => "WheelsDrop",
            EventName::WheelsEncoder => "WheelsEncoder",
            EventName::WheelsPwm => "WheelsPWM",
            EventName::Bumper => "Bumper",
            EventName::Buttons => "Buttons",
            EventName::ChargeState => "ChargeState",
            EventName::DockingIr => "DockingIR",
            EventName::Inertial => "Inertial",
            EventName::BatteryVoltage => "BatteryVoltage",
            EventName::CurrentWheels => "CurrentWheels",
        }
    }

    /// Index into per-channel tables (`Feedback` is 0)
    pub(crate) const fn index(&self) -> usize {
        *self as usize
    }

    /// Number of channels including `Feedback`
    pub(crate) const COUNT: usize = 14;
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == EventName::Feedback.as_str() {
            return Ok(EventName::Feedback);
        }
        EventName::RECORDS
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| Error::UnknownEvent(s.to_string()))
    }
}

/// Catch-all delivery: the channel a record was published on plus the record
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Feedback {
    pub name: EventName,
    pub record: SensorRecord,
}

// ============================================================================
// Typed access
// ============================================================================

/// Payload types that can be subscribed to directly
///
/// Lets callers register `Fn(&Bumper)` instead of matching on [`SensorRecord`].
pub trait SensorPayload: Sized + Send + Sync + 'static {
    /// Channel carrying this payload
    const EVENT: EventName;

    /// Borrow the payload if `record` is of this type
    fn from_record(record: &SensorRecord) -> Option<&Self>;
}

macro_rules! sensor_payload {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl SensorPayload for $ty {
                const EVENT: EventName = EventName::$variant;

                fn from_record(record: &SensorRecord) -> Option<&Self> {
                    match record {
                        SensorRecord::$variant(payload) => Some(payload),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for SensorRecord {
                fn from(payload: $ty) -> Self {
                    SensorRecord::$variant(payload)
                }
            }
        )*
    };
}

sensor_payload! {
    Gyro => Gyro,
    Cliff => Cliff,
    CliffAdc => CliffAdc,
    WheelsDrop => WheelsDrop,
    WheelsEncoder => WheelsEncoder,
    WheelsPwm => WheelsPwm,
    Bumper => Bumper,
    Buttons => Buttons,
    ChargeState => ChargeState,
    DockingIr => DockingIr,
    Inertial => Inertial,
    BatteryVoltage => BatteryVoltage,
    CurrentWheels => CurrentWheels,
}

// ============================================================================
// Commands
// ============================================================================

/// One note of a sound sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tone {
    /// Note period in base units (see [`Tone::from_frequency`])
    pub note: u16,
    /// Duration in milliseconds
    pub duration_ms: u8,
}

impl Tone {
    pub fn new(note: u16, duration_ms: u8) -> Self {
        Self { note, duration_ms }
    }

    /// Build a tone from a frequency in Hz
    pub fn from_frequency(hz: f64, duration_ms: u8) -> Self {
        let note = if hz > 0.0 {
            (1.0 / (hz * SOUND_PERIOD_FACTOR)).round().clamp(0.0, u16::MAX as f64) as u16
        } else {
            0
        };
        Self { note, duration_ms }
    }
}

/// Built-in sound sequences stored on the base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SoundPreset {
    On = 0,
    Off = 1,
    Recharge = 2,
    Button = 3,
    Error = 4,
    CleaningStart = 5,
    CleaningEnd = 6,
}

/// Configurable change-detection tolerances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceKind {
    /// Minimum cliff ADC delta (raw counts) before a new CliffADC record is published
    CliffAdc,
    /// Minimum raw gyro delta before a new Gyro record is published
    Gyro,
    /// Minimum wheel current delta (10mA units) before a new CurrentWheels record is published
    CurrentWheels,
}

/// Commands to the base
///
/// Transient: built, encoded, written and dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Velocity mode: linear m/s (positive = forward), angular rad/s (positive = CCW)
    MoveVelocity { linear: f64, angular: f64 },
    /// Raw base control: speed mm/s, radius mm (0 = straight, ±1 = spin in place)
    MoveRaw { speed: i16, radius: i16 },
    /// Play a list of tones
    SoundSequence(Vec<Tone>),
    /// Play one of the built-in sound sequences
    PlaySound(SoundPreset),
    /// Reconfigure a change-detection tolerance (no wire bytes)
    SetTolerance { kind: ToleranceKind, value: f64 },
}
