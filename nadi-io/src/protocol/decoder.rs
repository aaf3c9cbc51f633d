//! Frame decoder: raw transport bytes in, typed sensor records out.
//!
//! Frame format: `[0xAA 0x55] [LEN] [PAYLOAD; LEN] [CS]`, where `CS` is the XOR
//! of `LEN` and every payload byte. The payload is a run of sub-payloads
//! `[ID] [SLEN] [DATA; SLEN]`, each mapping to one or more [`SensorRecord`]s.
//!
//! # Chunking
//!
//! Input may be split anywhere. Incomplete frames stay in the ring buffer until
//! the rest arrives, and parsing decisions depend only on bytes already
//! received, so feeding a stream in pieces yields exactly the output of
//! feeding it whole.
//!
//! # Resynchronization
//!
//! A frame whose checksum fails, or whose LEN exceeds
//! [`MAX_INBOUND_PAYLOAD`], is not trusted for its length: the decoder drops
//! one byte and scans for the next header. The failure is reported once,
//! as a [`DecodeError`] covering every byte dropped until the next header,
//! immediately before whatever that header yields.

use super::constants::*;
use super::encoder::checksum;
use super::ring_buffer::RingBuffer;
use crate::core::types::{
    BatteryVoltage, Bumper, Buttons, ChargeState, Cliff, CliffAdc, CurrentWheels, DockingIr, Gyro,
    Inertial, MAX_GYRO_SAMPLES, SensorRecord, ToleranceKind, WheelsDrop, WheelsEncoder, WheelsPwm,
};
use crate::driver::state::Tolerances;
use crate::error::{DecodeError, DecodeErrorKind};
use std::collections::VecDeque;
use std::collections::vec_deque::Drain;
use std::sync::Arc;

/// One decoder output: a record, or a report of discarded bytes
pub type Decoded = std::result::Result<SensorRecord, DecodeError>;

/// Running totals since construction or [`FrameDecoder::reset`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames that passed checksum
    pub frames: u64,
    /// Records emitted
    pub records: u64,
    /// Decode errors emitted
    pub errors: u64,
    /// Bytes dropped outside valid frames
    pub skipped_bytes: u64,
    /// Analog records suppressed by tolerances
    pub filtered: u64,
}

/// Incremental frame decoder
pub struct FrameDecoder {
    buffer: RingBuffer<DECODER_BUFFER_SIZE>,
    tolerances: Arc<Tolerances>,
    filter: ChangeFilter,
    output: VecDeque<Decoded>,
    /// Checksum failure waiting for the next header to close its span
    pending: Option<DecodeError>,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new(tolerances: Arc<Tolerances>) -> Self {
        Self {
            buffer: RingBuffer::new(),
            tolerances,
            filter: ChangeFilter::default(),
            output: VecDeque::new(),
            pending: None,
            stats: DecoderStats::default(),
        }
    }

    /// Feed raw bytes and drain everything they complete
    ///
    /// The returned iterator yields records and decode errors in stream order.
    /// Trailing bytes of an incomplete frame are kept for the next call.
    pub fn feed(&mut self, mut bytes: &[u8]) -> Drain<'_, Decoded> {
        while !bytes.is_empty() {
            let taken = self.buffer.extend(bytes);
            bytes = &bytes[taken..];
            while self.try_parse_frame() {}
        }
        self.output.drain(..)
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Drop buffered bytes, filter history and pending errors
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.filter = ChangeFilter::default();
        self.output.clear();
        self.pending = None;
        self.stats = DecoderStats::default();
    }

    /// Parse at most one frame; returns `true` if bytes were consumed and
    /// another attempt may make progress
    fn try_parse_frame(&mut self) -> bool {
        if self.buffer.len() < MIN_FRAME_SIZE {
            return false;
        }

        let Some(sync_idx) = self.buffer.find_pattern_2(HEADER_BYTE_1, HEADER_BYTE_2) else {
            // Keep last byte in case it's the first header byte
            self.skip(self.buffer.len() - 1);
            return false;
        };

        if sync_idx > 0 {
            self.skip(sync_idx);
        }

        if let Some(err) = self.pending.take() {
            self.push_error(err);
        }

        if self.buffer.len() < MIN_FRAME_SIZE {
            return false;
        }

        let Some(len) = self.buffer.get(2) else {
            return false;
        };
        if len as usize > MAX_INBOUND_PAYLOAD {
            log::warn!("Frame length {} exceeds {}", len, MAX_INBOUND_PAYLOAD);
            self.reject_header(DecodeErrorKind::Oversized { len });
            return true;
        }
        let len = len as usize;
        let total_len = HEADER_SIZE + len + CHECKSUM_SIZE;

        if self.buffer.len() < total_len {
            return false;
        }

        let expected = self.buffer.get(total_len - 1).unwrap_or(0);
        // Checksum covers LEN + PAYLOAD
        let actual = self.buffer.get_slice(2, len + 1).map(checksum).unwrap_or(!expected);

        if actual != expected {
            log::warn!(
                "Checksum mismatch (LEN={}): expected 0x{:02X}, got 0x{:02X}",
                len,
                expected,
                actual
            );
            self.reject_header(DecodeErrorKind::Checksum { expected, actual });
            return true;
        }

        let mut payload = [0u8; MAX_PAYLOAD_SIZE];
        if let Some(data) = self.buffer.get_slice(HEADER_SIZE, len) {
            payload[..len].copy_from_slice(data);
        }
        self.buffer.advance(total_len);
        self.stats.frames += 1;

        self.decode_payload(&payload[..len]);
        true
    }

    /// Don't trust a corrupted LEN: drop the first header byte and rescan
    fn reject_header(&mut self, kind: DecodeErrorKind) {
        self.buffer.advance(1);
        self.stats.skipped_bytes += 1;
        self.pending = Some(DecodeError { kind, discarded: 1 });
    }

    /// Drop `n` bytes that belong to no valid frame
    fn skip(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        log::trace!("Skipping {} bytes before frame header", n);
        self.buffer.advance(n);
        self.stats.skipped_bytes += n as u64;
        if let Some(ref mut pending) = self.pending {
            pending.discarded += n;
        }
    }

    fn decode_payload(&mut self, payload: &[u8]) {
        let mut pos = 0;
        while pos < payload.len() {
            let remaining = payload.len() - pos;
            if remaining < SUB_HEADER_SIZE {
                self.push_error(DecodeError {
                    kind: DecodeErrorKind::Truncated { id: payload[pos] },
                    discarded: remaining,
                });
                return;
            }

            let id = payload[pos];
            let sub_len = payload[pos + 1] as usize;
            let start = pos + SUB_HEADER_SIZE;
            let end = start + sub_len;
            if end > payload.len() {
                self.push_error(DecodeError {
                    kind: DecodeErrorKind::Truncated { id },
                    discarded: remaining,
                });
                return;
            }

            if let Err(kind) = self.decode_sub_payload(id, &payload[start..end]) {
                self.push_error(DecodeError {
                    kind,
                    discarded: end - pos,
                });
            }
            pos = end;
        }
    }

    fn decode_sub_payload(&mut self, id: u8, data: &[u8]) -> Result<(), DecodeErrorKind> {
        let bad_length = DecodeErrorKind::BadLength {
            id,
            len: data.len() as u8,
        };

        match id {
            FEEDBACK_BASIC_SENSOR => {
                if data.len() < BASIC_SENSOR_SIZE {
                    return Err(bad_length);
                }
                self.decode_basic_sensor(data);
            }
            FEEDBACK_DOCKING_IR => {
                if data.len() < DOCKING_IR_SIZE {
                    return Err(bad_length);
                }
                self.push_record(SensorRecord::DockingIr(DockingIr {
                    right: data[0],
                    center: data[1],
                    left: data[2],
                }));
            }
            FEEDBACK_INERTIAL => {
                if data.len() < INERTIAL_SIZE {
                    return Err(bad_length);
                }
                self.push_record(SensorRecord::Inertial(Inertial {
                    angle: read_i16(data, 0),
                    angle_rate: read_i16(data, 2),
                }));
            }
            FEEDBACK_CLIFF_ADC => {
                if data.len() < CLIFF_ADC_SIZE {
                    return Err(bad_length);
                }
                self.push_record(SensorRecord::CliffAdc(CliffAdc {
                    right: read_u16(data, 0),
                    center: read_u16(data, 2),
                    left: read_u16(data, 4),
                }));
            }
            FEEDBACK_CURRENT => {
                if data.len() < CURRENT_SIZE {
                    return Err(bad_length);
                }
                self.push_record(SensorRecord::CurrentWheels(CurrentWheels {
                    left: data[0],
                    right: data[1],
                }));
            }
            FEEDBACK_RAW_GYRO => {
                if data.len() < RAW_GYRO_HEADER_SIZE {
                    return Err(bad_length);
                }
                // Followed length counts i16 values: three per (x, y, z) sample
                let values = data[1] as usize;
                let count = values / 3;
                if values % 3 != 0
                    || count > MAX_GYRO_SAMPLES
                    || data.len() < RAW_GYRO_HEADER_SIZE + values * 2
                {
                    return Err(bad_length);
                }
                let mut samples = [[0i16; 3]; MAX_GYRO_SAMPLES];
                for (i, sample) in samples.iter_mut().take(count).enumerate() {
                    let base = RAW_GYRO_HEADER_SIZE + i * 6;
                    *sample = [
                        read_i16(data, base),
                        read_i16(data, base + 2),
                        read_i16(data, base + 4),
                    ];
                }
                self.push_record(SensorRecord::Gyro(Gyro::new(data[0], &samples[..count])));
            }
            other => {
                log::trace!("Ignoring sub-payload 0x{:02X} ({} bytes)", other, data.len());
            }
        }
        Ok(())
    }

    fn decode_basic_sensor(&mut self, data: &[u8]) {
        let bumper = data[OFFSET_BUMPER];
        let drop = data[OFFSET_WHEEL_DROP];
        let cliff = data[OFFSET_CLIFF];
        let buttons = data[OFFSET_BUTTONS];
        let overcurrent = data[OFFSET_OVERCURRENT];

        self.push_record(SensorRecord::Bumper(Bumper {
            left: bumper & FLAG_LEFT != 0,
            center: bumper & FLAG_CENTER != 0,
            right: bumper & FLAG_RIGHT != 0,
        }));
        self.push_record(SensorRecord::WheelsDrop(WheelsDrop {
            left: drop & FLAG_DROP_LEFT != 0,
            right: drop & FLAG_DROP_RIGHT != 0,
        }));
        self.push_record(SensorRecord::Cliff(Cliff {
            left: cliff & FLAG_LEFT != 0,
            center: cliff & FLAG_CENTER != 0,
            right: cliff & FLAG_RIGHT != 0,
        }));
        self.push_record(SensorRecord::WheelsEncoder(WheelsEncoder {
            timestamp_ms: read_u16(data, OFFSET_TIMESTAMP),
            left: read_u16(data, OFFSET_LEFT_ENCODER),
            right: read_u16(data, OFFSET_RIGHT_ENCODER),
        }));
        self.push_record(SensorRecord::WheelsPwm(WheelsPwm {
            left: data[OFFSET_LEFT_PWM] as i8,
            right: data[OFFSET_RIGHT_PWM] as i8,
            overcurrent_left: overcurrent & FLAG_OVERCURRENT_LEFT != 0,
            overcurrent_right: overcurrent & FLAG_OVERCURRENT_RIGHT != 0,
        }));
        self.push_record(SensorRecord::Buttons(Buttons {
            b0: buttons & FLAG_BUTTON_0 != 0,
            b1: buttons & FLAG_BUTTON_1 != 0,
            b2: buttons & FLAG_BUTTON_2 != 0,
        }));
        self.push_record(SensorRecord::ChargeState(ChargeState {
            raw: data[OFFSET_CHARGER],
        }));
        self.push_record(SensorRecord::BatteryVoltage(BatteryVoltage {
            decivolts: data[OFFSET_BATTERY],
        }));
    }

    fn push_record(&mut self, record: SensorRecord) {
        if !self.filter.passes(&record, &self.tolerances) {
            self.stats.filtered += 1;
            return;
        }
        self.stats.records += 1;
        self.output.push_back(Ok(record));
    }

    fn push_error(&mut self, err: DecodeError) {
        log::warn!("Discarding input: {}", err);
        self.stats.errors += 1;
        self.output.push_back(Err(err));
    }
}

/// Last emitted value per filtered record type
#[derive(Debug, Default)]
struct ChangeFilter {
    cliff_adc: Option<CliffAdc>,
    gyro: Option<[i16; 3]>,
    current: Option<CurrentWheels>,
}

impl ChangeFilter {
    fn passes(&mut self, record: &SensorRecord, tolerances: &Tolerances) -> bool {
        match record {
            SensorRecord::CliffAdc(adc) => {
                let delta = self.cliff_adc.map(|last| {
                    max_delta(
                        &[last.right, last.center, last.left].map(i32::from),
                        &[adc.right, adc.center, adc.left].map(i32::from),
                    )
                });
                let pass = exceeds(tolerances.get(ToleranceKind::CliffAdc), delta);
                if pass {
                    self.cliff_adc = Some(*adc);
                }
                pass
            }
            SensorRecord::Gyro(gyro) => {
                let Some(latest) = gyro.latest() else {
                    return true;
                };
                let delta = self
                    .gyro
                    .map(|last| max_delta(&last.map(i32::from), &latest.map(i32::from)));
                let pass = exceeds(tolerances.get(ToleranceKind::Gyro), delta);
                if pass {
                    self.gyro = Some(latest);
                }
                pass
            }
            SensorRecord::CurrentWheels(current) => {
                let delta = self.current.map(|last| {
                    max_delta(
                        &[last.left, last.right].map(i32::from),
                        &[current.left, current.right].map(i32::from),
                    )
                });
                let pass = exceeds(tolerances.get(ToleranceKind::CurrentWheels), delta);
                if pass {
                    self.current = Some(*current);
                }
                pass
            }
            _ => true,
        }
    }
}

fn exceeds(tolerance: f64, delta: Option<i32>) -> bool {
    match delta {
        None => true,
        Some(_) if tolerance <= 0.0 => true,
        Some(d) => d as f64 >= tolerance,
    }
}

fn max_delta(a: &[i32], b: &[i32]) -> i32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).max().unwrap_or(0)
}

#[inline]
fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
fn read_i16(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}
