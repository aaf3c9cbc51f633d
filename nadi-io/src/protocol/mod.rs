//! Wire protocol: frame decoding and command encoding.
//!
//! Frame format: `[0xAA 0x55] [LEN] [PAYLOAD] [CS]`
//!
//! - [`decoder::FrameDecoder`]: Byte stream → [`SensorRecord`](crate::core::types::SensorRecord)s
//! - [`encoder::CommandEncoder`]: [`Command`](crate::core::types::Command) → frame bytes

pub mod constants;
pub mod decoder;
pub mod encoder;
mod ring_buffer;

pub use decoder::{Decoded, DecoderStats, FrameDecoder};
pub use encoder::{CommandEncoder, TxFrame, checksum, frame, velocity_to_raw};
