//! Core relay module
//!
//! Provides the stream relay worker, its lifecycle state machine,
//! cancellation and statistics.

mod cancel;
mod relay;
mod state;
mod stats;

pub use cancel::*;
pub use relay::*;
pub use state::{RelaySettings, RelayState, WorkerIdentity};
pub use stats::RelayStats;
