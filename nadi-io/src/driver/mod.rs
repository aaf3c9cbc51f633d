//! Kobuki base driver
//!
//! Ties the pieces together:
//!
//! ```text
//!                  ┌──────────────────┐
//!   Transport ───▶ │  TransportGuard  │ ◀─── CommandPath ◀─── callers
//!                  └────────┬─────────┘
//!                           │ read_available
//!                  ┌────────▼─────────┐
//!                  │  dispatch-loop   │  FrameDecoder
//!                  └────────┬─────────┘
//!                           │ publish
//!                  ┌────────▼─────────┐
//!                  │  EventRegistry   │ ───▶ subscribers
//!                  └──────────────────┘
//! ```
//!
//! # Thread Model
//!
//! One `dispatch-loop` thread per started connection. Commands, subscriptions
//! and tolerance changes run on the caller's thread.
//!
//! # Lifecycle
//!
//! `start` opens the transport, applies configured tolerances and spawns the
//! dispatch loop with a fresh decoder. `stop` signals the loop, closes the
//! transport (unblocking any read) and joins the thread; subscriptions
//! survive so the driver can be started again. `shutdown` additionally
//! clears the registry.

mod commands;
mod dispatch;
pub mod state;

pub use commands::CommandPath;
pub use state::Tolerances;

use crate::config::Config;
use crate::core::types::{EventName, Feedback, SensorPayload, ToleranceKind};
use crate::error::{Error, Result};
use crate::events::{Diagnostic, DiagnosticsSender, EventRegistry, SubscriptionHandle, diagnostics};
use crate::protocol::{CommandEncoder, FrameDecoder};
use crate::transport::{self, Transport, TransportGuard};
use crossbeam_channel::Receiver;
use dispatch::{DispatchContext, dispatch_loop};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// Driver name used when none is set
pub const DEFAULT_NAME: &str = "Kobuki";

type StartHook = Box<dyn Fn(&CommandPath) + Send + Sync>;

/// Kobuki base driver
pub struct Driver {
    name: String,
    config: Config,
    guard: Arc<TransportGuard>,
    registry: Arc<EventRegistry>,
    tolerances: Arc<Tolerances>,
    commands: CommandPath,
    diagnostics_tx: DiagnosticsSender,
    diagnostics_rx: Receiver<Diagnostic>,
    shutdown: Arc<AtomicBool>,
    dispatch_handle: Option<JoinHandle<Result<()>>>,
    start_hooks: Vec<StartHook>,
}

impl Driver {
    /// Create a driver over an unopened transport
    pub fn new(transport: Box<dyn Transport>, config: Config) -> Result<Self> {
        config.validate()?;

        let guard = Arc::new(TransportGuard::new(
            transport,
            config.transport.duplex,
            config.dispatch.poll_interval(),
        ));
        let tolerances = Arc::new(Tolerances::from_config(&config.tolerances)?);
        let (diagnostics_tx, diagnostics_rx) =
            diagnostics::channel(config.dispatch.diagnostics_capacity);
        let registry = Arc::new(EventRegistry::new(diagnostics_tx.clone()));
        let commands = CommandPath::new(
            Arc::clone(&guard),
            Arc::clone(&tolerances),
            CommandEncoder::new(config.motion.wheel_base_m),
        );

        Ok(Self {
            name: DEFAULT_NAME.to_string(),
            config,
            guard,
            registry,
            tolerances,
            commands,
            diagnostics_tx,
            diagnostics_rx,
            shutdown: Arc::new(AtomicBool::new(false)),
            dispatch_handle: None,
            start_hooks: Vec::new(),
        })
    }

    /// Create a driver with the transport described by `config`
    pub fn from_config(config: Config) -> Result<Self> {
        let transport = transport::from_config(&config.transport);
        Self::new(transport, config)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open the transport and start the dispatch loop
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyStarted);
        }
        // Reap a loop that ended on its own (EOF or transport error)
        if self.dispatch_handle.is_some() {
            if let Err(e) = self.stop() {
                log::warn!("[{}] Previous dispatch loop ended with: {}", self.name, e);
            }
        }

        log::info!("[{}] Starting driver on {}", self.name, self.guard.describe());
        self.tolerances.apply(&self.config.tolerances)?;
        self.guard.open()?;
        self.shutdown.store(false, Ordering::Relaxed);

        let ctx = DispatchContext {
            guard: Arc::clone(&self.guard),
            registry: Arc::clone(&self.registry),
            decoder: FrameDecoder::new(Arc::clone(&self.tolerances)),
            diagnostics: self.diagnostics_tx.clone(),
            shutdown: Arc::clone(&self.shutdown),
            read_timeout: self.config.dispatch.read_timeout(),
            chunk_size: self.config.dispatch.read_chunk_size,
        };
        let handle = thread::Builder::new()
            .name("dispatch-loop".to_string())
            .spawn(move || dispatch_loop(ctx));
        match handle {
            Ok(handle) => self.dispatch_handle = Some(handle),
            Err(e) => {
                let _ = self.guard.close();
                return Err(Error::Other(format!(
                    "Failed to spawn dispatch thread: {}",
                    e
                )));
            }
        }

        for hook in &self.start_hooks {
            hook(&self.commands);
        }
        log::info!("[{}] Driver started", self.name);
        Ok(())
    }

    /// Halt the dispatch loop and close the transport
    ///
    /// Returns the error the loop terminated with, if any. Subscriptions are
    /// kept. Stopping a stopped driver is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::Relaxed);
        let closed = self.guard.close();

        let Some(handle) = self.dispatch_handle.take() else {
            return closed;
        };
        log::info!("[{}] Stopping driver...", self.name);
        let loop_result = handle.join().map_err(|_| Error::ThreadPanic)?;
        log::info!("[{}] Driver stopped", self.name);
        loop_result.and(closed)
    }

    /// Stop and drop every subscription
    pub fn shutdown(&mut self) -> Result<()> {
        let result = self.stop();
        self.registry.clear();
        result
    }

    /// Whether the dispatch loop is alive
    pub fn is_running(&self) -> bool {
        self.guard.is_open()
            && self
                .dispatch_handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    /// Register a callback run after every successful `start`
    pub fn on_start<F>(&mut self, hook: F)
    where
        F: Fn(&CommandPath) + Send + Sync + 'static,
    {
        self.start_hooks.push(Box::new(hook));
    }

    pub fn registry(&self) -> Arc<EventRegistry> {
        Arc::clone(&self.registry)
    }

    /// Handle for sending commands; cheap to clone and share across threads
    pub fn commands(&self) -> CommandPath {
        self.commands.clone()
    }

    /// Receiver for decode failures, subscriber panics and loop termination
    pub fn diagnostics(&self) -> Receiver<Diagnostic> {
        self.diagnostics_rx.clone()
    }

    /// Diagnostics dropped because nobody drained the channel
    pub fn dropped_diagnostics(&self) -> u64 {
        self.diagnostics_tx.dropped()
    }

    pub fn tolerance(&self, kind: ToleranceKind) -> f64 {
        self.tolerances.get(kind)
    }

    /// Subscribe by event name (e.g. `"Bumper"`, `"Feedback"`)
    pub fn subscribe<F>(&self, name: &str, callback: F) -> Result<SubscriptionHandle>
    where
        F: Fn(&Feedback) + Send + Sync + 'static,
    {
        self.registry.subscribe(name, callback)
    }

    pub fn subscribe_event<F>(&self, event: EventName, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Feedback) + Send + Sync + 'static,
    {
        self.registry.subscribe_event(event, callback)
    }

    /// Subscribe with a callback typed by payload, e.g. `subscribe_to::<Bumper, _>`
    pub fn subscribe_to<T, F>(&self, callback: F) -> SubscriptionHandle
    where
        T: SensorPayload,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.registry.subscribe_to::<T, F>(callback)
    }

    pub fn subscribe_all<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Feedback) + Send + Sync + 'static,
    {
        self.registry.subscribe_all(callback)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.registry.unsubscribe(handle)
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("[{}] Error during drop: {}", self.name, e);
        }
    }
}
