//! Progress reporter implementation
//!
//! Uses an indicatif spinner that shows bytes relayed and throughput while
//! the caller waits for a relay to finish.

use crate::core::{RelayHandle, RelayStats};
use crate::error::Result;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// Default refresh interval for the spinner
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// Progress reporter for relays
pub struct ProgressReporter {
    /// Byte counter spinner
    bar: ProgressBar,
    /// Refresh interval
    tick: Duration,
}

impl ProgressReporter {
    /// Create a new progress reporter drawing to stderr
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {prefix:.bold.dim} {bytes} ({bytes_per_sec}) {msg}")
                .expect("Invalid template"),
        );
        bar.set_prefix("Relayed");

        Self {
            bar,
            tick: DEFAULT_TICK,
        }
    }

    /// Create a disabled progress reporter (for quiet mode)
    pub fn disabled() -> Self {
        let reporter = Self::new();
        reporter.bar.set_draw_target(ProgressDrawTarget::hidden());
        reporter
    }

    /// Change the refresh interval
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Show the latest counters
    pub fn update(&self, stats: &RelayStats) {
        self.bar.set_position(stats.bytes_relayed);
    }

    /// Wait for the relay to finish, refreshing the display every tick
    pub fn track(&self, relay: &RelayHandle) -> Result<RelayStats> {
        while !relay.wait_for_timeout(self.tick)? {
            self.update(&relay.stats());
            self.bar.tick();
        }

        let stats = relay.stats();
        self.update(&stats);
        match relay.fault() {
            None => self.finish_success("done"),
            Some(fault) => self.finish_error(&fault.to_string()),
        }
        Ok(stats)
    }

    /// Finish progress with success message
    pub fn finish_success(&self, message: &str) {
        self.bar.finish_with_message(format!("✓ {}", message));
    }

    /// Finish progress with error message
    pub fn finish_error(&self, message: &str) {
        self.bar.abandon_with_message(format!("✗ {}", message));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StreamRelay;
    use crate::endpoint::{SharedSink, SliceSource};

    #[test]
    fn test_track_reports_final_stats() {
        let sink = SharedSink::buffer();
        let relay = StreamRelay::new(SliceSource::new(vec![7u8; 1000]), sink.clone());
        relay.start().unwrap();

        let reporter = ProgressReporter::disabled().with_tick(Duration::from_millis(5));
        assert!(reporter.bar.is_hidden());

        let stats = reporter.track(&relay.handle()).unwrap();
        assert_eq!(stats.bytes_relayed, 1000);
        assert_eq!(sink.contents().len(), 1000);
    }
}
