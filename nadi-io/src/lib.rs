//! NadiIO - Kobuki mobile base driver
//!
//! Reads the base's sensor stream, decodes it into typed records and fans
//! them out to subscribers, while a command path writes motion and sound
//! commands onto the same connection.
//!
//! ```no_run
//! use nadi_io::core::types::Bumper;
//! use nadi_io::{Config, Driver};
//!
//! let mut driver = Driver::from_config(Config::default())?;
//! driver.subscribe_to::<Bumper, _>(|b| println!("bumper: {:?}", b));
//! driver.start()?;
//! driver.commands().move_velocity(0.1, 0.0)?;
//! driver.stop()?;
//! # Ok::<(), nadi_io::Error>(())
//! ```

pub mod config;
pub mod core;
pub mod driver;
pub mod error;
pub mod events;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use crate::core::types::{Command, EventName, Feedback, SensorRecord};
pub use driver::{CommandPath, Driver};
pub use error::{Error, Result};
pub use events::{Diagnostic, EventRegistry, SubscriptionHandle};
