//! Mock transport for testing
//!
//! Clones share one simulated connection: bytes injected with
//! [`MockTransport::inject_read`] come out of `read`, and everything written
//! is captured for [`MockTransport::get_written`].

use super::Transport;
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Mock transport for unit and integration testing
#[derive(Clone)]
pub struct MockTransport {
    shared: Arc<Shared>,
    timeout: Duration,
}

struct Shared {
    inner: Mutex<MockTransportInner>,
    readable: Condvar,
}

struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    open: bool,
    open_count: usize,
    eof: bool,
    read_error: Option<String>,
    write_error: Option<String>,
    /// `set_read_timeout` calls left to succeed before one fails
    timeout_error: Option<(usize, String)>,
    /// Max bytes accepted per `write` call (0 = unlimited)
    write_chunk: usize,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        MockTransport {
            shared: Arc::new(Shared {
                inner: Mutex::new(MockTransportInner {
                    read_buffer: VecDeque::new(),
                    write_buffer: Vec::new(),
                    open: false,
                    open_count: 0,
                    eof: false,
                    read_error: None,
                    write_error: None,
                    timeout_error: None,
                    write_chunk: 0,
                }),
                readable: Condvar::new(),
            }),
            timeout: Duration::from_millis(10),
        }
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.shared.inner.lock().read_buffer.extend(data);
        self.shared.readable.notify_all();
    }

    /// Report end of stream once buffered data has been read
    pub fn set_eof(&self) {
        self.shared.inner.lock().eof = true;
        self.shared.readable.notify_all();
    }

    /// Fail the next read with a transport error
    pub fn fail_next_read(&self, message: &str) {
        self.shared.inner.lock().read_error = Some(message.to_string());
        self.shared.readable.notify_all();
    }

    /// Fail every write with a transport error (`None` to recover)
    pub fn fail_writes(&self, message: Option<&str>) {
        self.shared.inner.lock().write_error = message.map(str::to_string);
    }

    /// Let `after` more `set_read_timeout` calls succeed on any clone, then
    /// fail one with a transport error
    pub fn fail_set_timeout(&self, after: usize, message: &str) {
        self.shared.inner.lock().timeout_error = Some((after, message.to_string()));
    }

    /// Accept at most `n` bytes per `write` call, forcing partial writes
    pub fn set_write_chunk(&self, n: usize) {
        self.shared.inner.lock().write_chunk = n;
    }

    /// Get all written data
    pub fn get_written(&self) -> Vec<u8> {
        self.shared.inner.lock().write_buffer.clone()
    }

    /// Clear written data
    pub fn clear_written(&self) {
        self.shared.inner.lock().write_buffer.clear();
    }

    pub fn is_open(&self) -> bool {
        self.shared.inner.lock().open
    }

    /// Times `open` has been called on any clone
    pub fn open_count(&self) -> usize {
        self.shared.inner.lock().open_count
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        inner.open = true;
        inner.open_count += 1;
        // A reopened link starts a fresh stream
        inner.eof = false;
        inner.read_error = None;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.shared.inner.lock().open = false;
        self.shared.readable.notify_all();
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        match inner.timeout_error.take() {
            Some((0, message)) => return Err(Error::Transport(message)),
            Some((after, message)) => inner.timeout_error = Some((after - 1, message)),
            None => {}
        }
        self.timeout = timeout;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let deadline = Instant::now() + self.timeout;
        let mut inner = self.shared.inner.lock();
        loop {
            if let Some(message) = inner.read_error.take() {
                return Err(Error::Transport(message));
            }
            if !inner.open {
                return Err(Error::Transport("mock transport is closed".to_string()));
            }
            if !inner.read_buffer.is_empty() {
                let n = inner.read_buffer.len().min(buffer.len());
                for (slot, byte) in buffer.iter_mut().zip(inner.read_buffer.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            if inner.eof {
                return Err(Error::EndOfStream);
            }
            if self
                .shared
                .readable
                .wait_until(&mut inner, deadline)
                .timed_out()
            {
                return Ok(0);
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let n = {
            let mut inner = self.shared.inner.lock();
            if let Some(message) = inner.write_error.as_ref() {
                return Err(Error::Transport(message.clone()));
            }
            if !inner.open {
                return Err(Error::Transport("mock transport is closed".to_string()));
            }
            let n = match inner.write_chunk {
                0 => data.len(),
                chunk => data.len().min(chunk),
            };
            inner.write_buffer.extend_from_slice(&data[..n]);
            n
        };
        // Give other writers a chance to interleave partial writes
        std::thread::yield_now();
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>> {
        Ok(Box::new(self.clone()))
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_inject_and_read() {
        let mut mock = MockTransport::new();
        mock.open().unwrap();
        mock.inject_read(&[1, 2, 3]);

        let mut buf = [0u8; 2];
        assert_eq!(mock.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(mock.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 3);
    }

    #[test]
    fn test_read_times_out_empty() {
        let mut mock = MockTransport::new();
        mock.open().unwrap();
        mock.set_read_timeout(Duration::from_millis(5)).unwrap();

        let start = Instant::now();
        let mut buf = [0u8; 4];
        assert_eq!(mock.read(&mut buf).unwrap(), 0);
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_read_wakes_on_inject() {
        let mut mock = MockTransport::new();
        mock.open().unwrap();
        mock.set_read_timeout(Duration::from_secs(5)).unwrap();

        let injector = mock.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            injector.inject_read(&[0xAA]);
        });

        let start = Instant::now();
        let mut buf = [0u8; 4];
        assert_eq!(mock.read(&mut buf).unwrap(), 1);
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_eof_after_drain() {
        let mut mock = MockTransport::new();
        mock.open().unwrap();
        mock.inject_read(&[7]);
        mock.set_eof();

        let mut buf = [0u8; 4];
        assert_eq!(mock.read(&mut buf).unwrap(), 1);
        assert!(matches!(mock.read(&mut buf), Err(Error::EndOfStream)));
    }

    #[test]
    fn test_reopen_clears_eof_and_read_error() {
        let mut mock = MockTransport::new();
        mock.open().unwrap();
        mock.set_read_timeout(Duration::from_millis(5)).unwrap();
        mock.set_eof();
        mock.fail_next_read("framing error");
        mock.close().unwrap();

        mock.open().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(mock.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_partial_writes_and_failures() {
        let mut mock = MockTransport::new();
        mock.open().unwrap();
        mock.set_write_chunk(2);
        assert_eq!(mock.write(b"abcd").unwrap(), 2);
        mock.write_all(b"efgh").unwrap();
        assert_eq!(mock.get_written(), b"abefgh");

        mock.fail_writes(Some("cable pulled"));
        assert!(matches!(mock.write_all(b"x"), Err(Error::Transport(_))));
        mock.fail_writes(None);
        mock.clear_written();
        mock.write_all(b"ok").unwrap();
        assert_eq!(mock.get_written(), b"ok");
    }

    #[test]
    fn test_closed_mock_rejects_io() {
        let mut mock = MockTransport::new();
        let mut buf = [0u8; 1];
        assert!(mock.read(&mut buf).is_err());
        assert!(mock.write(b"x").is_err());
        mock.open().unwrap();
        assert!(mock.is_open());
        assert_eq!(mock.open_count(), 1);
    }
}
