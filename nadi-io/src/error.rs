//! Error types for NadiIO

use crate::core::types::ToleranceKind;
use std::fmt;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// NadiIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame could not be decoded (recoverable, never fatal to the dispatch loop)
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Transport failed while reading or writing
    #[error("Transport error: {0}")]
    Transport(String),

    /// Transport reached end of stream
    #[error("Transport reached end of stream")]
    EndOfStream,

    /// Operation issued before the connection was opened
    #[error("Driver not started")]
    NotStarted,

    /// Operation issued after the connection was closed
    #[error("Connection closed")]
    Closed,

    /// Subscription to an event name that does not exist
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    /// Driver is already running
    #[error("Driver already started")]
    AlreadyStarted,

    /// Tolerance value rejected
    #[error("Invalid tolerance for {kind:?}: {value}")]
    InvalidTolerance {
        /// Tolerance being configured
        kind: ToleranceKind,
        /// Rejected value
        value: f64,
    },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Worker thread panicked
    #[error("Thread panicked")]
    ThreadPanic,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Transport failures end the dispatch loop; everything else is per-call
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Io(_) | Error::Serial(_) | Error::EndOfStream
        )
    }
}

/// Why a span of inbound bytes was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Frame checksum did not match its contents
    Checksum {
        /// Checksum carried by the frame
        expected: u8,
        /// Checksum computed over LEN + payload
        actual: u8,
    },
    /// Frame LEN is larger than any feedback frame
    Oversized {
        /// Declared payload length
        len: u8,
    },
    /// Sub-payload declared more bytes than the frame holds
    Truncated {
        /// Sub-payload identifier
        id: u8,
    },
    /// Sub-payload length does not match the fixed layout for its id
    BadLength {
        /// Sub-payload identifier
        id: u8,
        /// Declared length
        len: u8,
    },
}

/// A discarded span of inbound bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeError {
    /// Failure reason
    pub kind: DecodeErrorKind,
    /// Number of bytes dropped from the stream because of this failure
    pub discarded: usize,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DecodeErrorKind::Checksum { expected, actual } => write!(
                f,
                "checksum mismatch: expected {:#04x}, got {:#04x} ({} bytes discarded)",
                expected, actual, self.discarded
            ),
            DecodeErrorKind::Oversized { len } => write!(
                f,
                "frame length {} out of range ({} bytes discarded)",
                len, self.discarded
            ),
            DecodeErrorKind::Truncated { id } => write!(
                f,
                "sub-payload {:#04x} overruns its frame ({} bytes discarded)",
                id, self.discarded
            ),
            DecodeErrorKind::BadLength { id, len } => write!(
                f,
                "sub-payload {:#04x} has invalid length {} ({} bytes discarded)",
                id, len, self.discarded
            ),
        }
    }
}

impl std::error::Error for DecodeError {}
