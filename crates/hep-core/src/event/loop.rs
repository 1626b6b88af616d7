// Hep Event Loop
// Ties discovery, readiness polling, matching and dispatch together

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::RuleSet;
use crate::dispatch::{DispatchOutcome, Dispatcher, Launch};
use crate::input::{DeviceSource, RawEvent};
use crate::matching::MatchEngine;
use crate::placeholder::resolve_command;
use crate::registry::{DeviceRegistry, ResyncReport, SharedRegistry};

use super::multiplexer::{Multiplexer, Waker};

/// Interval between periodic hot-plug resyncs
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(5);

/// Result type for event loop operations
pub type EventLoopResult<T> = Result<T, EventLoopError>;

/// Errors that can stop the event loop
#[derive(Debug, thiserror::Error)]
pub enum EventLoopError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start resync timer: {0}")]
    Timer(std::io::Error),

    #[error("Failed to install signal handler: {0}")]
    Signal(std::io::Error),
}

/// Requests termination of a running [`Processor`] from any thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    waker: Waker,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.waker.wake();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Periodic resync on its own thread, stopped explicitly or on drop.
pub struct ResyncTimer {
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ResyncTimer {
    pub fn start(registry: SharedRegistry, interval: Duration) -> EventLoopResult<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name("hep-resync".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        registry.lock().resync();
                    }
                    // Explicit stop, or the timer handle was dropped
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(EventLoopError::Timer)?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the timer and wait for an in-flight resync to finish.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Resync timer thread panicked");
            }
        }
    }
}

impl Drop for ResyncTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The HID event processor: watches devices and runs commands for matching events.
pub struct Processor {
    registry: SharedRegistry,
    multiplexer: Multiplexer,
    matcher: MatchEngine,
    dispatcher: Dispatcher,
    resync_interval: Duration,
    shutdown: ShutdownHandle,
}

impl Processor {
    pub fn new(rules: RuleSet, source: Box<dyn DeviceSource>) -> EventLoopResult<Self> {
        let rules = Arc::new(rules);
        let registry = DeviceRegistry::new(source, Arc::clone(&rules)).into_shared();
        let multiplexer = Multiplexer::new(Arc::clone(&registry))?;
        let shutdown = ShutdownHandle {
            requested: Arc::new(AtomicBool::new(false)),
            waker: multiplexer.waker(),
        };

        Ok(Self {
            registry,
            multiplexer,
            matcher: MatchEngine::new(rules),
            dispatcher: Dispatcher::new(),
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            shutdown,
        })
    }

    pub fn with_resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Resync watched devices with present hardware now.
    pub fn discover(&self) -> ResyncReport {
        self.registry.lock().resync()
    }

    /// Watch devices and dispatch commands until shutdown is requested.
    pub fn run(&mut self) -> EventLoopResult<()> {
        self.discover();

        let mut timer = ResyncTimer::start(Arc::clone(&self.registry), self.resync_interval)?;
        log::debug!("Reading events...");

        let result = self.run_until_shutdown();

        timer.stop();
        result
    }

    fn run_until_shutdown(&mut self) -> EventLoopResult<()> {
        while !self.shutdown.is_requested() {
            for batch in self.multiplexer.wait(None)? {
                for event in batch.events {
                    if self.shutdown.is_requested() {
                        return Ok(());
                    }
                    self.handle_event(&batch.path, event);
                }
            }
        }
        Ok(())
    }

    /// Match, resolve and dispatch a single event from the device at `path`.
    pub fn handle_event(&self, path: &Path, event: RawEvent) -> Vec<DispatchOutcome> {
        log::trace!("Processing event...");

        // Resolve every firing under one short lock; dispatch runs unlocked.
        let commands = {
            let registry = self.registry.lock();
            let Some(device) = registry.identity(path) else {
                return Vec::new();
            };

            self.matcher
                .classify(device, &event)
                .into_iter()
                .map(|firing| {
                    let launch = Launch::for_template(&firing.command);
                    let command = resolve_command(&firing.command, device, &event, &*registry);
                    log::info!(
                        "Executing command for {}: {}, background={}, command={:?}",
                        path.display(),
                        event,
                        firing.background,
                        command
                    );
                    (command, launch, firing.background)
                })
                .collect::<Vec<_>>()
        };

        commands
            .into_iter()
            .filter_map(|(command, launch, background)| {
                match self.dispatcher.dispatch(&command, launch, background) {
                    Ok(outcome) => Some(outcome),
                    Err(e) => {
                        log::error!("{}", e);
                        None
                    }
                }
            })
            .collect()
    }
}
