//! Relay lifecycle state machine
//!
//! Everything the caller can touch while the worker runs lives in one
//! [`Control`] block behind a single mutex, paired with a condition variable
//! that releases `wait_for` callers when the relay finishes. The copy loop
//! itself never holds this lock while moving bytes.

use super::cancel::CancellationToken;
use super::stats::{RelayCounters, RelayStats};
use crate::config::{RelayConfig, RelayMode};
use crate::error::{RelayError, RelayFault, Result};
use serde::Serialize;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

/// Lifecycle state of a relay
///
/// `Idle -> Running -> Finished`, each transition exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RelayState {
    /// Configured but not started
    Idle,
    /// Worker is copying
    Running,
    /// Worker is done and cleanup has run; terminal
    Finished,
}

impl RelayState {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Finished => "finished",
        }
    }
}

/// Settings frozen when the worker starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// Copy buffer size in bytes
    pub buffer_size: usize,
    /// Flush after every non-empty write
    pub autoflush: bool,
    /// Scheduling policy
    pub mode: RelayMode,
    /// Polling sleep
    pub poll_interval: Duration,
    /// Close the sink during cleanup
    pub close_sink_on_exhaustion: bool,
}

impl From<&RelayConfig> for RelaySettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            buffer_size: config.buffer_size,
            autoflush: config.autoflush,
            mode: config.mode,
            poll_interval: config.poll_interval(),
            close_sink_on_exhaustion: config.close_sink_on_exhaustion,
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

/// Identity of the worker thread, recorded at start
#[derive(Debug, Clone)]
pub struct WorkerIdentity {
    /// Thread name
    pub name: String,
    /// Thread id
    pub id: ThreadId,
}

/// Guarded relay state
#[derive(Debug)]
pub(crate) struct Control {
    pub(crate) state: RelayState,
    pub(crate) stop_requested: bool,
    pub(crate) settings: RelaySettings,
    fault: Option<RelayFault>,
    worker: Option<WorkerIdentity>,
    cancel: Option<CancellationToken>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

impl Control {
    fn new(settings: RelaySettings) -> Self {
        Self {
            state: RelayState::Idle,
            stop_requested: false,
            settings,
            fault: None,
            worker: None,
            cancel: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Fail unless the relay has not been started yet
    pub(crate) fn ensure_idle(&self, what: &'static str) -> Result<()> {
        match self.state {
            RelayState::Idle => Ok(()),
            _ => Err(RelayError::IllegalState(what)),
        }
    }

    /// Idle -> Running
    pub(crate) fn begin(&mut self, worker: WorkerIdentity, cancel: CancellationToken) -> Result<()> {
        self.ensure_idle("relay has already been started")?;
        // A stop that arrived before start still applies to the first sleep.
        if self.stop_requested {
            cancel.cancel();
        }
        self.state = RelayState::Running;
        self.worker = Some(worker);
        self.cancel = Some(cancel);
        self.started_at = Some(Instant::now());
        Ok(())
    }

    /// Set the stop flag; wakes a polling sleeper. Returns true on the first request.
    pub(crate) fn request_stop(&mut self) -> bool {
        let first = !self.stop_requested;
        self.stop_requested = true;
        if self.state == RelayState::Running && self.settings.mode.is_polling() {
            if let Some(cancel) = &self.cancel {
                cancel.cancel();
            }
        }
        first
    }

    /// Running -> Finished. The first fault recorded wins.
    pub(crate) fn finish(&mut self, fault: Option<RelayFault>) {
        if self.fault.is_none() {
            self.fault = fault;
        }
        self.state = RelayState::Finished;
        self.finished_at = Some(Instant::now());
    }

    pub(crate) fn fault(&self) -> Option<RelayFault> {
        match self.state {
            RelayState::Finished => self.fault.clone(),
            _ => None,
        }
    }

    pub(crate) fn elapsed(&self) -> Option<Duration> {
        let started = self.started_at?;
        Some(match self.finished_at {
            Some(finished) => finished.duration_since(started),
            None => started.elapsed(),
        })
    }
}

/// State shared between a relay, its handles and its worker
#[derive(Debug)]
pub(crate) struct Shared {
    control: Mutex<Control>,
    finished: Condvar,
    pub(crate) counters: RelayCounters,
}

impl Shared {
    pub(crate) fn new(settings: RelaySettings) -> Self {
        Self {
            control: Mutex::new(Control::new(settings)),
            finished: Condvar::new(),
            counters: RelayCounters::default(),
        }
    }

    /// Lock the control block.
    ///
    /// Every critical section leaves `Control` consistent, so a poisoned lock
    /// is recovered rather than propagated.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn stop(&self) {
        let mut control = self.lock();
        if control.request_stop() {
            tracing::debug!(state = control.state.name(), "Relay stop requested");
        }
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.lock().stop_requested
    }

    pub(crate) fn finish(&self, fault: Option<RelayFault>) {
        let mut control = self.lock();
        control.finish(fault);
        self.finished.notify_all();
    }

    pub(crate) fn state(&self) -> RelayState {
        self.lock().state
    }

    pub(crate) fn fault(&self) -> Option<RelayFault> {
        self.lock().fault()
    }

    pub(crate) fn buffer_size(&self) -> usize {
        self.lock().settings.buffer_size
    }

    pub(crate) fn worker(&self) -> Option<WorkerIdentity> {
        self.lock().worker.clone()
    }

    pub(crate) fn stats(&self) -> RelayStats {
        let elapsed = self.lock().elapsed();
        self.counters.snapshot(elapsed)
    }

    pub(crate) fn wait_for(&self) -> Result<()> {
        let control = self.lock();
        if control.state == RelayState::Idle {
            return Err(RelayError::IllegalState("relay has not been started"));
        }
        let _control = self
            .finished
            .wait_while(control, |c| c.state != RelayState::Finished)
            .unwrap_or_else(|p| p.into_inner());
        Ok(())
    }

    pub(crate) fn wait_for_timeout(&self, timeout: Duration) -> Result<bool> {
        let control = self.lock();
        if control.state == RelayState::Idle {
            return Err(RelayError::IllegalState("relay has not been started"));
        }
        let (control, _) = self
            .finished
            .wait_timeout_while(control, timeout, |c| c.state != RelayState::Finished)
            .unwrap_or_else(|p| p.into_inner());
        Ok(control.state == RelayState::Finished)
    }
}
