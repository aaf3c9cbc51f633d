//! TCP transport for simulators and serial-over-network bridges

use super::Transport;
use crate::error::{Error, Result};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// Client connection to a remote byte stream
pub struct TcpTransport {
    address: String,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Describe a remote endpoint; nothing is connected until [`Transport::open`]
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            timeout: Duration::from_millis(10),
            stream: None,
        }
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::Transport(format!("{} is not connected", self.address)))
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = TcpStream::connect(&self.address)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.timeout))?;
        log::info!("Connected to {}", self.address);
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            // Also wakes a reader blocked on a cloned handle
            match stream.shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotConnected => {}
                Err(e) => return Err(e.into()),
            }
            log::info!("Disconnected from {}", self.address);
        }
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        // A zero timeout means "block forever" to the socket API
        self.timeout = timeout.max(Duration::from_millis(1));
        if let Some(stream) = self.stream.as_ref() {
            stream.set_read_timeout(Some(self.timeout))?;
        }
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.stream()?.read(buffer) {
            Ok(0) if !buffer.is_empty() => Err(Error::EndOfStream),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.stream()?.write(data)?)
    }

    fn flush(&mut self) -> Result<()> {
        self.stream()?.flush()?;
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| Error::Transport(format!("{} is not connected", self.address)))?
            .try_clone()?;
        Ok(Box::new(TcpTransport {
            address: self.address.clone(),
            timeout: self.timeout,
            stream: Some(stream),
        }))
    }

    fn describe(&self) -> String {
        format!("tcp:{}", self.address)
    }
}
