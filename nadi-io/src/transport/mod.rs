//! Transport layer for I/O abstraction
//!
//! A [`Transport`] is any duplex byte stream. The driver never touches one
//! directly: [`TransportGuard`] owns it and arbitrates between the dispatch
//! loop (reader) and command callers (writers).

use crate::config::{TransportConfig, TransportKind};
use crate::error::{Error, Result};
use std::time::Duration;

mod guard;
mod mock;
mod serial;
mod tcp;

pub use guard::{GuardState, TransportGuard};
pub use mock::MockTransport;
pub use serial::SerialTransport;
pub use tcp::TcpTransport;

/// Transport trait for device communication
pub trait Transport: Send {
    /// Acquire the underlying connection
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release the underlying connection; closing twice is a no-op
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Upper bound on how long a single [`read`](Self::read) may block
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Read data into buffer, returns number of bytes read
    ///
    /// Returns `Ok(0)` when the read timeout elapses without data and
    /// [`Error::EndOfStream`] once the peer has gone away.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Write the whole buffer
    fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            match self.write(data)? {
                0 => return Err(Error::Transport("write returned zero bytes".to_string())),
                n => data = &data[n..],
            }
        }
        Ok(())
    }

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Second handle onto the same connection, for full-duplex operation
    fn try_clone(&self) -> Result<Box<dyn Transport>>;

    /// Human-readable endpoint, for logs
    fn describe(&self) -> String;
}

/// Build the (unopened) transport a config describes
pub fn from_config(config: &TransportConfig) -> Box<dyn Transport> {
    match config.kind {
        TransportKind::Serial => Box::new(SerialTransport::new(&config.port, config.baud_rate)),
        TransportKind::Tcp => Box::new(TcpTransport::new(&config.address)),
    }
}
