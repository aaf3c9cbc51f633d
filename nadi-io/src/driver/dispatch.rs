//! Dispatch loop: transport bytes → decoder → registry
//!
//! Runs on its own thread for as long as the connection is open. Decode
//! failures are reported and skipped. End of stream or a transport failure
//! closes the connection and ends the loop; the failure is returned through
//! the thread's join handle.

use crate::error::{Error, Result};
use crate::events::{Diagnostic, DiagnosticsSender, EventRegistry};
use crate::protocol::FrameDecoder;
use crate::transport::TransportGuard;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// The connection is dead; later commands must fail with `Closed`
fn close_after_failure(guard: &TransportGuard) {
    if let Err(e) = guard.close() {
        log::warn!("Failed to close {}: {}", guard.describe(), e);
    }
}

/// Everything the loop needs, moved onto the dispatch thread
pub(crate) struct DispatchContext {
    pub guard: Arc<TransportGuard>,
    pub registry: Arc<EventRegistry>,
    pub decoder: FrameDecoder,
    pub diagnostics: DiagnosticsSender,
    pub shutdown: Arc<AtomicBool>,
    pub read_timeout: Duration,
    pub chunk_size: usize,
}

/// Main dispatch loop
///
/// Returns `Ok(())` on halt, close or end of stream, and the transport error
/// otherwise.
pub(crate) fn dispatch_loop(ctx: DispatchContext) -> Result<()> {
    let DispatchContext {
        guard,
        registry,
        mut decoder,
        diagnostics,
        shutdown,
        read_timeout,
        chunk_size,
    } = ctx;

    log::info!("Dispatch loop started on {}", guard.describe());
    let mut buffer = vec![0u8; chunk_size.max(1)];

    let result = loop {
        if shutdown.load(Ordering::Relaxed) {
            break Ok(());
        }

        let n = match guard.read_available(&mut buffer, read_timeout) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(Error::Closed) => break Ok(()),
            Err(Error::EndOfStream) => {
                log::info!("Transport reached end of stream");
                close_after_failure(&guard);
                break Ok(());
            }
            Err(e) => {
                log::error!("Dispatch loop transport error: {}", e);
                diagnostics.report(Diagnostic::TransportFailed(e.to_string()));
                close_after_failure(&guard);
                break Err(e);
            }
        };

        for decoded in decoder.feed(&buffer[..n]) {
            match decoded {
                Ok(record) => {
                    registry.publish(&record);
                }
                Err(e) => diagnostics.report(Diagnostic::DecodeFailed(e)),
            }
        }
    };

    let stats = decoder.stats();
    log::info!(
        "Dispatch loop stopped: {} frames, {} records, {} errors, {} bytes skipped",
        stats.frames,
        stats.records,
        stats.errors,
        stats.skipped_bytes
    );
    diagnostics.report(Diagnostic::DispatchStopped(stats));
    result
}
