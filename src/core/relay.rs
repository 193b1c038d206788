//! Stream relay
//!
//! A [`StreamRelay`] copies everything from a [`Source`] into a [`Sink`] on a
//! dedicated worker thread. Callers configure it while idle, `start()` it,
//! and later `stop()`, `wait_for()` it, and read back the captured fault.
//!
//! Two scheduling policies share one outer loop:
//!
//! - **Blocking**: read until the source reports end of stream. Any
//!   zero-length read ends the relay.
//! - **Polling**: ask the source how much is available, copy that, then sleep
//!   the poll interval. `stop()` cuts the sleep short, and one last pass
//!   picks up whatever arrived meanwhile.
//!
//! After each pass the worker checks the stop flag once. Whatever ends the
//! loop, cleanup (flush, then optional close) runs exactly once before the
//! relay is marked finished.
//!
//! A read that is blocked inside the source cannot be interrupted. To stop a
//! blocking relay promptly, also make the source return (close its writer,
//! kill the child process).

use super::cancel::CancellationToken;
use super::state::{RelaySettings, RelayState, Shared, WorkerIdentity};
use super::stats::RelayStats;
use crate::config::{RelayConfig, RelayMode};
use crate::endpoint::{Sink, Source};
use crate::error::{RelayError, RelayFault, Result};
use crossbeam::channel::{bounded, Receiver};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace, warn};

static NEXT_RELAY_ID: AtomicU64 = AtomicU64::new(1);

/// Background copy from a source to a sink
pub struct StreamRelay<S, K> {
    shared: Arc<Shared>,
    endpoints: Mutex<Option<(S, K)>>,
    worker: Mutex<Option<JoinHandle<Option<(S, K)>>>>,
    id: u64,
}

/// What `join()` hands back once the worker is gone
pub struct RelayOutcome<S, K> {
    /// The source, returned to the caller
    pub source: S,
    /// The sink, returned to the caller (already closed if so configured)
    pub sink: K,
    /// Final counters
    pub stats: RelayStats,
    /// Fault captured by the worker, if any
    pub fault: Option<RelayFault>,
}

impl<S, K> RelayOutcome<S, K> {
    /// Whether the relay ended without a fault
    pub fn is_success(&self) -> bool {
        self.fault.is_none()
    }

    /// Turn a captured fault into an error
    pub fn into_result(self) -> Result<Self> {
        match self.fault.clone() {
            Some(fault) => Err(RelayError::Fault(fault)),
            None => Ok(self),
        }
    }
}

impl<S, K> StreamRelay<S, K>
where
    S: Source + 'static,
    K: Sink + 'static,
{
    /// Create a relay that leaves the sink open when done
    pub fn new(source: S, sink: K) -> Self {
        Self::with_close(source, sink, false)
    }

    /// Create a relay; `close_sink_on_exhaustion` closes the sink during cleanup
    pub fn with_close(source: S, sink: K, close_sink_on_exhaustion: bool) -> Self {
        let settings = RelaySettings {
            close_sink_on_exhaustion,
            ..RelaySettings::default()
        };
        Self::from_settings(source, sink, settings)
    }

    /// Create a relay from a validated configuration
    pub fn from_config(source: S, sink: K, config: &RelayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_settings(source, sink, RelaySettings::from(config)))
    }

    fn from_settings(source: S, sink: K, settings: RelaySettings) -> Self {
        Self {
            shared: Arc::new(Shared::new(settings)),
            endpoints: Mutex::new(Some((source, sink))),
            worker: Mutex::new(None),
            id: NEXT_RELAY_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Flush after every non-empty write (default: only during cleanup)
    pub fn set_autoflush(&self, autoflush: bool) -> Result<()> {
        let mut control = self.shared.lock();
        control.ensure_idle("cannot change autoflush on a started relay")?;
        control.settings.autoflush = autoflush;
        Ok(())
    }

    /// Select the polling policy instead of blocking reads
    pub fn set_non_blocking(&self, non_blocking: bool) -> Result<()> {
        let mut control = self.shared.lock();
        control.ensure_idle("cannot change scheduling policy on a started relay")?;
        control.settings.mode = RelayMode::from_non_blocking(non_blocking);
        Ok(())
    }

    /// Size of the copy buffer; must be positive
    pub fn set_buffer_size(&self, buffer_size: usize) -> Result<()> {
        let mut control = self.shared.lock();
        control.ensure_idle("cannot set buffer size on a started relay")?;
        if buffer_size == 0 {
            return Err(RelayError::InvalidBufferSize(buffer_size));
        }
        control.settings.buffer_size = buffer_size;
        Ok(())
    }

    /// Sleep between availability checks under the polling policy
    pub fn set_poll_interval(&self, interval: Duration) -> Result<()> {
        let mut control = self.shared.lock();
        control.ensure_idle("cannot set poll interval on a started relay")?;
        if interval.is_zero() {
            return Err(RelayError::InvalidPollInterval(interval));
        }
        control.settings.poll_interval = interval;
        Ok(())
    }

    /// Spawn the worker. A relay can only be started once.
    pub fn start(&self) -> Result<()> {
        let mut control = self.shared.lock();
        control.ensure_idle("relay has already been started")?;

        let (source, sink) = lock_recover(&self.endpoints)
            .take()
            .ok_or(RelayError::IllegalState("relay endpoints are gone"))?;

        let name = format!("streamrelay-{}", self.id);
        let token = CancellationToken::new();
        let (handoff_tx, handoff_rx) = bounded::<Handoff<S, K>>(1);

        let spawned = {
            let shared = Arc::clone(&self.shared);
            let token = token.clone();
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_main(shared, handoff_rx, token))
        };
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                *lock_recover(&self.endpoints) = Some((source, sink));
                return Err(RelayError::Spawn(e));
            }
        };

        let identity = WorkerIdentity {
            name,
            id: handle.thread().id(),
        };
        control.begin(identity, token)?;

        let settings = control.settings.clone();
        debug!(
            relay = self.id,
            mode = settings.mode.name(),
            buffer_size = settings.buffer_size,
            autoflush = settings.autoflush,
            close_sink = settings.close_sink_on_exhaustion,
            "Starting relay worker"
        );

        // The receiver is parked in recv() and the channel has room for one.
        if handoff_tx
            .send(Handoff {
                source,
                sink,
                settings,
            })
            .is_err()
        {
            warn!(relay = self.id, "Relay worker exited before receiving its endpoints");
        }

        *lock_recover(&self.worker) = Some(handle);
        Ok(())
    }

    /// Ask the worker to stop. Idempotent, never blocks.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Block until the relay has finished and cleanup has run
    pub fn wait_for(&self) -> Result<()> {
        self.shared.wait_for()
    }

    /// Like `wait_for`, giving up after `timeout`. Returns whether the relay finished.
    pub fn wait_for_timeout(&self, timeout: Duration) -> Result<bool> {
        self.shared.wait_for_timeout(timeout)
    }

    /// Whether the relay has finished
    pub fn is_finished(&self) -> bool {
        self.state() == RelayState::Finished
    }

    /// Current lifecycle state
    pub fn state(&self) -> RelayState {
        self.shared.state()
    }

    /// Fault captured by the worker; always `None` until finished
    pub fn fault(&self) -> Option<RelayFault> {
        self.shared.fault()
    }

    /// Current copy buffer size
    pub fn buffer_size(&self) -> usize {
        self.shared.buffer_size()
    }

    /// Snapshot of the settings the relay runs (or will run) with
    pub fn settings(&self) -> RelaySettings {
        self.shared.lock().settings.clone()
    }

    /// Worker thread identity, once started
    pub fn worker(&self) -> Option<WorkerIdentity> {
        self.shared.worker()
    }

    /// Counters so far
    pub fn stats(&self) -> RelayStats {
        self.shared.stats()
    }

    /// Type-erased handle for other threads
    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Wait for the worker to finish and take back the endpoints
    pub fn join(self) -> Result<RelayOutcome<S, K>> {
        let handle = lock_recover(&self.worker)
            .take()
            .ok_or(RelayError::IllegalState("relay has not been started"))?;

        let (source, sink) = handle
            .join()
            .map_err(|_| RelayError::WorkerPanicked)?
            .ok_or(RelayError::IllegalState("relay worker never received its endpoints"))?;

        Ok(RelayOutcome {
            source,
            sink,
            stats: self.shared.stats(),
            fault: self.shared.fault(),
        })
    }
}

impl<S, K> std::fmt::Debug for StreamRelay<S, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let control = self.shared.lock();
        f.debug_struct("StreamRelay")
            .field("id", &self.id)
            .field("state", &control.state)
            .field("settings", &control.settings)
            .finish()
    }
}

/// Cloneable handle to a relay, usable from any thread
#[derive(Clone)]
pub struct RelayHandle {
    shared: Arc<Shared>,
}

impl RelayHandle {
    /// Ask the worker to stop
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Block until the relay has finished
    pub fn wait_for(&self) -> Result<()> {
        self.shared.wait_for()
    }

    /// Block until finished or `timeout` elapses
    pub fn wait_for_timeout(&self, timeout: Duration) -> Result<bool> {
        self.shared.wait_for_timeout(timeout)
    }

    /// Whether the relay has finished
    pub fn is_finished(&self) -> bool {
        self.shared.state() == RelayState::Finished
    }

    /// Current lifecycle state
    pub fn state(&self) -> RelayState {
        self.shared.state()
    }

    /// Captured fault, once finished
    pub fn fault(&self) -> Option<RelayFault> {
        self.shared.fault()
    }

    /// Current copy buffer size
    pub fn buffer_size(&self) -> usize {
        self.shared.buffer_size()
    }

    /// Counters so far
    pub fn stats(&self) -> RelayStats {
        self.shared.stats()
    }
}

/// Builder that checks both endpoints were supplied
pub struct RelayBuilder<S, K> {
    source: Option<S>,
    sink: Option<K>,
    config: RelayConfig,
}

impl<S, K> Default for RelayBuilder<S, K> {
    fn default() -> Self {
        Self {
            source: None,
            sink: None,
            config: RelayConfig::default(),
        }
    }
}

impl<S, K> RelayBuilder<S, K>
where
    S: Source + 'static,
    K: Sink + 'static,
{
    /// Empty builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source
    pub fn source(mut self, source: S) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the sink
    pub fn sink(mut self, sink: K) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Start from a configuration
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Copy buffer size
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.config.buffer_size = buffer_size;
        self
    }

    /// Flush after every write
    pub fn autoflush(mut self, autoflush: bool) -> Self {
        self.config.autoflush = autoflush;
        self
    }

    /// Use the polling policy
    pub fn non_blocking(mut self, non_blocking: bool) -> Self {
        self.config.mode = RelayMode::from_non_blocking(non_blocking);
        self
    }

    /// Polling sleep
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.set_poll_interval(interval);
        self
    }

    /// Close the sink during cleanup
    pub fn close_sink_on_exhaustion(mut self, close: bool) -> Self {
        self.config.close_sink_on_exhaustion = close;
        self
    }

    /// Build the relay (not started)
    pub fn build(self) -> Result<StreamRelay<S, K>> {
        let source = self.source.ok_or(RelayError::MissingEndpoint("source"))?;
        let sink = self.sink.ok_or(RelayError::MissingEndpoint("sink"))?;
        StreamRelay::from_config(source, sink, &self.config)
    }
}

/// Endpoints and frozen settings sent to the worker once it is running
struct Handoff<S, K> {
    source: S,
    sink: K,
    settings: RelaySettings,
}

/// Why the copy loop ended without a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    EndOfStream,
    Stopped,
}

/// Result of one polling pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Drained,
    Idle,
    Exhausted,
}

fn worker_main<S, K>(
    shared: Arc<Shared>,
    handoff: Receiver<Handoff<S, K>>,
    token: CancellationToken,
) -> Option<(S, K)>
where
    S: Source,
    K: Sink,
{
    let Handoff {
        mut source,
        sink,
        settings,
    } = handoff.recv().ok()?;

    let mut cleanup = Cleanup::new(&shared, sink, settings.close_sink_on_exhaustion);
    let outcome = {
        let mut pump = Pump {
            source: &mut source,
            sink: cleanup.sink_mut(),
            buf: vec![0u8; settings.buffer_size].into_boxed_slice(),
            autoflush: settings.autoflush,
            shared: &shared,
        };
        pump.run(&settings, &token)
    };

    match &outcome {
        Ok(exit) => debug!(?exit, stats = ?shared.stats(), "Relay loop ended"),
        Err(fault) => warn!(%fault, "Relay loop halted by fault"),
    }

    let sink = cleanup.complete(outcome.err());
    Some((source, sink))
}

/// The copy loop. Runs without holding the control lock.
struct Pump<'a, S, K> {
    source: &'a mut S,
    sink: &'a mut K,
    buf: Box<[u8]>,
    autoflush: bool,
    shared: &'a Shared,
}

impl<S: Source, K: Sink> Pump<'_, S, K> {
    fn run(&mut self, settings: &RelaySettings, token: &CancellationToken) -> std::result::Result<Exit, RelayFault> {
        loop {
            let pass = match settings.mode {
                RelayMode::Blocking => {
                    self.drain_blocking()?;
                    Pass::Exhausted
                }
                RelayMode::Polling => self.drain_available(token)?,
            };

            // The stop flag is the only thing the loop reads under the lock.
            if self.shared.stop_requested() {
                return Ok(Exit::Stopped);
            }
            if pass == Pass::Exhausted {
                return Ok(Exit::EndOfStream);
            }

            // A stop during the sleep wakes it; the next pass drains what is
            // left and then observes the flag.
            token.sleep(settings.poll_interval);
        }
    }

    /// Read until the source reports end of stream
    fn drain_blocking(&mut self) -> std::result::Result<(), RelayFault> {
        loop {
            let n = self.source.read(&mut self.buf).map_err(RelayFault::read)?;
            if n == 0 {
                trace!("Source reached end of stream");
                return Ok(());
            }
            self.relay_chunk(n)?;
        }
    }

    /// Copy whatever is available right now without blocking on the source.
    /// Stops after the current chunk once the token is cancelled, so a source
    /// that never runs dry cannot hold the worker past `stop()`.
    fn drain_available(&mut self, token: &CancellationToken) -> std::result::Result<Pass, RelayFault> {
        let mut pass = Pass::Idle;
        loop {
            let available = self.source.available().map_err(RelayFault::read)?;
            if available == 0 {
                break;
            }
            let want = available.min(self.buf.len());
            let n = self.source.read(&mut self.buf[..want]).map_err(RelayFault::read)?;
            if n == 0 {
                trace!("Source reported data but returned end of stream");
                return Ok(Pass::Exhausted);
            }
            self.relay_chunk(n)?;
            pass = Pass::Drained;
            if token.is_cancelled() {
                break;
            }
        }
        if pass == Pass::Idle {
            self.shared.counters.record_idle_poll();
        }
        Ok(pass)
    }

    fn relay_chunk(&mut self, n: usize) -> std::result::Result<(), RelayFault> {
        self.sink.write_all(&self.buf[..n]).map_err(RelayFault::write)?;
        self.shared.counters.record_chunk(n);
        if self.autoflush {
            self.sink.flush().map_err(RelayFault::write)?;
            self.shared.counters.record_flush();
        }
        Ok(())
    }
}

/// Runs the final flush/close and publishes `Finished` exactly once,
/// including when the copy loop unwinds. Needs `panic = "unwind"`; under
/// `abort` the process dies before `drop` runs.
struct Cleanup<'a, K: Sink> {
    shared: &'a Shared,
    sink: Option<K>,
    close: bool,
}

impl<'a, K: Sink> Cleanup<'a, K> {
    fn new(shared: &'a Shared, sink: K, close: bool) -> Self {
        Self {
            shared,
            sink: Some(sink),
            close,
        }
    }

    fn sink_mut(&mut self) -> &mut K {
        // Only `complete` and `drop` take the sink, both after the loop.
        self.sink.as_mut().expect("sink taken before cleanup")
    }

    fn complete(mut self, fault: Option<RelayFault>) -> K {
        let mut sink = self.sink.take().expect("cleanup completed twice");
        finish_sink(&mut sink, self.close);
        self.shared.finish(fault);
        sink
    }
}

impl<K: Sink> Drop for Cleanup<'_, K> {
    fn drop(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            warn!("Relay worker unwinding, running cleanup");
            finish_sink(&mut sink, self.close);
            self.shared.finish(None);
        }
    }
}

/// Flush, then optionally close; both errors are suppressed
fn finish_sink<K: Sink>(sink: &mut K, close: bool) {
    if let Err(e) = sink.flush() {
        debug!(error = %e, "Ignoring flush error during cleanup");
    }
    if close {
        if let Err(e) = sink.close() {
            debug!(error = %e, "Ignoring close error during cleanup");
        }
    }
}

fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}
