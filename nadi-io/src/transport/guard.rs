//! Exclusive owner of the connection
//!
//! The dispatch loop reads and command callers write, all through the guard.
//! Writes are serialized against each other. In half-duplex mode reads and
//! writes share one handle and take turns one poll slice at a time; in
//! full-duplex mode the reader owns a cloned handle and never waits on writers.
//!
//! `close` flips the state first, so a reader parked in
//! [`read_available`](TransportGuard::read_available) notices within one poll
//! slice and returns [`Error::Closed`].

use super::Transport;
use crate::config::DuplexMode;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GuardState {
    NotStarted = 0,
    Open = 1,
    Closed = 2,
}

impl GuardState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => GuardState::Open,
            2 => GuardState::Closed,
            _ => GuardState::NotStarted,
        }
    }
}

/// Serializes access to a single [`Transport`]
pub struct TransportGuard {
    /// Writer handle; also the reader in half-duplex mode
    primary: Mutex<Box<dyn Transport>>,
    /// Reader handle in full-duplex mode
    reader: Mutex<Option<Box<dyn Transport>>>,
    mode: DuplexMode,
    poll_interval: Duration,
    state: AtomicU8,
    description: String,
}

impl TransportGuard {
    pub fn new(transport: Box<dyn Transport>, mode: DuplexMode, poll_interval: Duration) -> Self {
        let description = transport.describe();
        Self {
            primary: Mutex::new(transport),
            reader: Mutex::new(None),
            mode,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            state: AtomicU8::new(GuardState::NotStarted as u8),
            description,
        }
    }

    pub fn state(&self) -> GuardState {
        GuardState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == GuardState::Open
    }

    pub fn mode(&self) -> DuplexMode {
        self.mode
    }

    pub fn describe(&self) -> &str {
        &self.description
    }

    /// Open the connection; allowed from `NotStarted` and after `close`
    pub fn open(&self) -> Result<()> {
        let mut primary = self.primary.lock();
        if self.is_open() {
            return Err(Error::AlreadyStarted);
        }

        primary.open()?;
        let reader = match self.configure(&mut **primary) {
            Ok(reader) => reader,
            Err(e) => {
                let _ = primary.close();
                return Err(e);
            }
        };
        *self.reader.lock() = reader;

        self.state.store(GuardState::Open as u8, Ordering::Release);
        log::info!("Transport open: {} ({:?} duplex)", self.description, self.mode);
        Ok(())
    }

    /// Apply the poll timeout and, in full-duplex mode, clone the reader
    fn configure(&self, primary: &mut dyn Transport) -> Result<Option<Box<dyn Transport>>> {
        primary.set_read_timeout(self.poll_interval)?;
        if self.mode == DuplexMode::Half {
            return Ok(None);
        }
        let mut reader = primary.try_clone()?;
        reader.set_read_timeout(self.poll_interval)?;
        Ok(Some(reader))
    }

    /// Close the connection; idempotent
    ///
    /// Any in-flight `read_available` returns [`Error::Closed`] within one
    /// poll slice, and later writes fail with [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        if self
            .state
            .compare_exchange(
                GuardState::Open as u8,
                GuardState::Closed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(());
        }

        let result = self.primary.lock().close();
        if let Some(mut reader) = self.reader.lock().take() {
            let _ = reader.close();
        }
        log::info!("Transport closed: {}", self.description);
        result
    }

    /// Read whatever arrives within `max_wait`
    ///
    /// Returns `Ok(0)` if nothing arrived. Only the dispatch loop reads.
    pub fn read_available(&self, buffer: &mut [u8], max_wait: Duration) -> Result<usize> {
        let deadline = Instant::now() + max_wait;
        loop {
            self.ensure_open()?;
            let n = match self.read_slice(buffer) {
                Ok(n) => n,
                // A transport torn down under us reports its own error
                Err(_) if self.state() == GuardState::Closed => return Err(Error::Closed),
                Err(e) => return Err(e),
            };
            if n > 0 || Instant::now() >= deadline {
                return Ok(n);
            }
        }
    }

    fn read_slice(&self, buffer: &mut [u8]) -> Result<usize> {
        match self.mode {
            DuplexMode::Half => self.primary.lock().read(buffer),
            DuplexMode::Full => match self.reader.lock().as_mut() {
                Some(reader) => reader.read(buffer),
                None => Err(Error::Closed),
            },
        }
    }

    /// Write one complete message
    ///
    /// The writer lock is held for the whole message, so concurrent writes
    /// never interleave on the wire.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let mut primary = self.primary.lock();
        // Closed while waiting for the lock
        self.ensure_open()?;
        primary.write_all(data)?;
        primary.flush()
    }

    /// `Ok` only while open
    pub fn ensure_open(&self) -> Result<()> {
        match self.state() {
            GuardState::Open => Ok(()),
            GuardState::NotStarted => Err(Error::NotStarted),
            GuardState::Closed => Err(Error::Closed),
        }
    }
}

impl Drop for TransportGuard {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use std::sync::Arc;
    use std::thread;

    fn guard(mode: DuplexMode) -> (Arc<TransportGuard>, MockTransport) {
        let mock = MockTransport::new();
        let guard = TransportGuard::new(Box::new(mock.clone()), mode, Duration::from_millis(5));
        (Arc::new(guard), mock)
    }

    #[test]
    fn test_lifecycle() {
        let (guard, mock) = guard(DuplexMode::Full);
        assert_eq!(guard.state(), GuardState::NotStarted);
        assert!(matches!(guard.write(b"x"), Err(Error::NotStarted)));
        let mut buf = [0u8; 4];
        assert!(matches!(
            guard.read_available(&mut buf, Duration::ZERO),
            Err(Error::NotStarted)
        ));

        guard.open().unwrap();
        assert!(guard.is_open());
        assert!(mock.is_open());
        assert!(matches!(guard.open(), Err(Error::AlreadyStarted)));

        guard.close().unwrap();
        guard.close().unwrap();
        assert_eq!(guard.state(), GuardState::Closed);
        assert!(!mock.is_open());
        assert!(matches!(guard.write(b"x"), Err(Error::Closed)));

        // Reopen after close
        guard.open().unwrap();
        assert_eq!(mock.open_count(), 2);
        guard.write(b"again").unwrap();
        assert_eq!(mock.get_written(), b"again");
    }

    #[test]
    fn test_close_before_open_stays_not_started() {
        let (guard, _mock) = guard(DuplexMode::Half);
        guard.close().unwrap();
        assert_eq!(guard.state(), GuardState::NotStarted);
    }

    #[test]
    fn test_failed_open_leaves_transport_closed() {
        // Primary accepts its timeout, the cloned reader rejects it
        let (guard, mock) = guard(DuplexMode::Full);
        mock.fail_set_timeout(1, "ioctl failed");
        assert!(matches!(guard.open(), Err(Error::Transport(_))));
        assert_eq!(guard.state(), GuardState::NotStarted);
        assert!(!mock.is_open());

        // Nothing left over; the next attempt succeeds
        guard.open().unwrap();
        assert!(mock.is_open());
        assert_eq!(mock.open_count(), 2);
    }

    #[test]
    fn test_read_available() {
        for mode in [DuplexMode::Half, DuplexMode::Full] {
            let (guard, mock) = guard(mode);
            guard.open().unwrap();

            let mut buf = [0u8; 8];
            assert_eq!(
                guard
                    .read_available(&mut buf, Duration::from_millis(15))
                    .unwrap(),
                0
            );

            mock.inject_read(&[1, 2, 3]);
            assert_eq!(
                guard
                    .read_available(&mut buf, Duration::from_millis(100))
                    .unwrap(),
                3
            );
            assert_eq!(&buf[..3], &[1, 2, 3]);
        }
    }

    #[test]
    fn test_close_unblocks_reader() {
        for mode in [DuplexMode::Half, DuplexMode::Full] {
            let (guard, _mock) = guard(mode);
            guard.open().unwrap();

            let reader = {
                let guard = Arc::clone(&guard);
                thread::spawn(move || {
                    let mut buf = [0u8; 8];
                    let start = Instant::now();
                    let result = guard.read_available(&mut buf, Duration::from_secs(30));
                    (result, start.elapsed())
                })
            };

            thread::sleep(Duration::from_millis(20));
            guard.close().unwrap();

            let (result, elapsed) = reader.join().unwrap();
            assert!(matches!(result, Err(Error::Closed)));
            assert!(elapsed < Duration::from_secs(5));
        }
    }

    #[test]
    fn test_concurrent_writes_do_not_interleave() {
        for mode in [DuplexMode::Half, DuplexMode::Full] {
            let (guard, mock) = guard(mode);
            mock.set_write_chunk(1);
            guard.open().unwrap();

            let writers: Vec<_> = [b"AAAA", b"BBBB"]
                .into_iter()
                .map(|msg| {
                    let guard = Arc::clone(&guard);
                    thread::spawn(move || {
                        for _ in 0..50 {
                            guard.write(msg).unwrap();
                        }
                    })
                })
                .collect();
            for w in writers {
                w.join().unwrap();
            }

            let written = mock.get_written();
            assert_eq!(written.len(), 400);
            for message in written.chunks(4) {
                assert!(message == b"AAAA" || message == b"BBBB", "interleaved: {:?}", message);
            }
        }
    }

    #[test]
    fn test_half_duplex_writer_not_starved() {
        let (guard, mock) = guard(DuplexMode::Half);
        guard.open().unwrap();

        let reader = {
            let guard = Arc::clone(&guard);
            thread::spawn(move || {
                let mut buf = [0u8; 8];
                let _ = guard.read_available(&mut buf, Duration::from_millis(200));
            })
        };

        thread::sleep(Duration::from_millis(10));
        let start = Instant::now();
        guard.write(b"cmd").unwrap();
        assert!(start.elapsed() < Duration::from_millis(150));
        assert_eq!(mock.get_written(), b"cmd");
        reader.join().unwrap();
    }

    #[test]
    fn test_transport_error_surfaces() {
        let (guard, mock) = guard(DuplexMode::Full);
        guard.open().unwrap();

        mock.fail_writes(Some("cable pulled"));
        assert!(matches!(guard.write(b"x"), Err(Error::Transport(_))));

        mock.fail_next_read("framing error");
        let mut buf = [0u8; 4];
        assert!(matches!(
            guard.read_available(&mut buf, Duration::from_millis(50)),
            Err(Error::Transport(_))
        ));
    }
}
