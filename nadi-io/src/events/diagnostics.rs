//! Side channel for recoverable failures
//!
//! The dispatch loop never blocks on diagnostics: when the channel is full the
//! newest diagnostic is dropped and counted.

use crate::core::types::EventName;
use crate::error::DecodeError;
use crate::protocol::DecoderStats;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Something the caller may want to know about but that did not stop the driver
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A span of inbound bytes was discarded
    DecodeFailed(DecodeError),
    /// A subscriber callback panicked; remaining subscribers still ran
    SubscriberPanicked {
        event: EventName,
        subscription: u64,
        message: String,
    },
    /// Transport failed; the dispatch loop is terminating
    TransportFailed(String),
    /// Dispatch loop exited, with decoder totals for the run
    DispatchStopped(DecoderStats),
}

/// Producer half of the diagnostics channel
#[derive(Clone)]
pub struct DiagnosticsSender {
    tx: Sender<Diagnostic>,
    dropped: Arc<AtomicU64>,
}

impl DiagnosticsSender {
    /// Queue a diagnostic without blocking
    pub fn report(&self, diagnostic: Diagnostic) {
        match self.tx.try_send(diagnostic) {
            Ok(()) => {}
            Err(TrySendError::Full(d)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::trace!("Diagnostics channel full, dropped {:?}", d);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Diagnostics lost to a full channel so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create a bounded diagnostics channel
pub fn channel(capacity: usize) -> (DiagnosticsSender, Receiver<Diagnostic>) {
    let (tx, rx) = bounded(capacity.max(1));
    (
        DiagnosticsSender {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}
