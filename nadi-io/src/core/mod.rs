//! Core data types shared by the decoder, registry and command path.
//!
//! - [`types`]: Sensor records, event names, and commands

pub mod types;
