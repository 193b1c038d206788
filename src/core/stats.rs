//! Relay statistics
//!
//! The worker bumps relaxed atomic counters on its hot path; callers read a
//! [`RelayStats`] snapshot at any time.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live counters updated by the worker
#[derive(Debug, Default)]
pub(crate) struct RelayCounters {
    bytes_relayed: AtomicU64,
    chunks_written: AtomicU64,
    flushes: AtomicU64,
    idle_polls: AtomicU64,
}

impl RelayCounters {
    pub(crate) fn record_chunk(&self, bytes: usize) {
        self.bytes_relayed.fetch_add(bytes as u64, Ordering::Relaxed);
        self.chunks_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_idle_poll(&self) {
        self.idle_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, elapsed: Option<Duration>) -> RelayStats {
        RelayStats {
            bytes_relayed: self.bytes_relayed.load(Ordering::Relaxed),
            chunks_written: self.chunks_written.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            idle_polls: self.idle_polls.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Point-in-time view of a relay's progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    /// Bytes written to the sink
    pub bytes_relayed: u64,
    /// Non-empty writes issued
    pub chunks_written: u64,
    /// Sink flushes issued by the copy loop (cleanup flush not counted)
    pub flushes: u64,
    /// Polling passes that found nothing available
    pub idle_polls: u64,
    /// Time since start; frozen once finished. `None` before start.
    pub elapsed: Option<Duration>,
}

impl RelayStats {
    /// Average throughput in bytes/second
    pub fn throughput(&self) -> f64 {
        match self.elapsed {
            Some(elapsed) if elapsed.as_secs_f64() > 0.0 => {
                self.bytes_relayed as f64 / elapsed.as_secs_f64()
            }
            _ => 0.0,
        }
    }

    /// Print summary to stderr
    pub fn print_summary(&self) {
        eprintln!("\n=== Relay Summary ===");
        eprintln!("Bytes relayed:   {}", humansize::format_size(self.bytes_relayed, humansize::BINARY));
        eprintln!("Chunks written:  {}", self.chunks_written);
        eprintln!("Flushes:         {}", self.flushes);
        if self.idle_polls > 0 {
            eprintln!("Idle polls:      {}", self.idle_polls);
        }
        if let Some(elapsed) = self.elapsed {
            eprintln!("Duration:        {:.2?}", elapsed);
            eprintln!("Throughput:      {}/s", humansize::format_size(self.throughput() as u64, humansize::BINARY));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = RelayCounters::default();
        counters.record_chunk(100);
        counters.record_chunk(28);
        counters.record_flush();
        counters.record_idle_poll();

        let stats = counters.snapshot(Some(Duration::from_secs(2)));
        assert_eq!(stats.bytes_relayed, 128);
        assert_eq!(stats.chunks_written, 2);
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.idle_polls, 1);
        assert_eq!(stats.throughput(), 64.0);
    }

    #[test]
    fn test_throughput_without_elapsed() {
        let stats = RelayStats {
            bytes_relayed: 10,
            ..Default::default()
        };
        assert_eq!(stats.throughput(), 0.0);
    }
}
