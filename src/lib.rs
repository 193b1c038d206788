//! # StreamRelay - Background Stream Copying
//!
//! StreamRelay copies every byte from a readable source into a writable sink
//! on a dedicated worker thread, with an explicit start/stop/wait lifecycle
//! and fault capture. It is the piece a shell or process runner uses to pump
//! a child's output somewhere else while it gets on with other work.
//!
//! ## Features
//!
//! - **Two scheduling policies**: blocking reads, or polling for available
//!   bytes with an interruptible sleep
//! - **Exactly-once cleanup**: flush, then optional close, on every exit path
//! - **Fault capture**: the first read/write failure is kept for the caller
//! - **Any number of waiters**: `wait_for` from as many threads as needed
//!
//! ## Quick Start
//!
//! ```no_run
//! use streamrelay::core::StreamRelay;
//! use streamrelay::endpoint::{SharedSink, SliceSource};
//!
//! let sink = SharedSink::buffer();
//! let relay = StreamRelay::new(SliceSource::new(b"ABC".to_vec()), sink.clone());
//! relay.set_buffer_size(1).unwrap();
//! relay.start().unwrap();
//! relay.wait_for().unwrap();
//!
//! assert!(relay.is_finished());
//! assert!(relay.fault().is_none());
//! assert_eq!(sink.contents(), b"ABC");
//! ```
//!
//! ## Relaying a Child Process
//!
//! ```no_run
//! use streamrelay::core::RelayBuilder;
//! use streamrelay::endpoint::{FdSource, WriterSink};
//! use std::process::{Command, Stdio};
//! use std::time::Duration;
//!
//! let mut child = Command::new("ls").stdout(Stdio::piped()).spawn().unwrap();
//! let stdout = child.stdout.take().unwrap();
//!
//! let relay = RelayBuilder::new()
//!     .source(FdSource::new(stdout))
//!     .sink(WriterSink::new(std::io::stdout()))
//!     .non_blocking(true)
//!     .poll_interval(Duration::from_millis(20))
//!     .autoflush(true)
//!     .build()
//!     .unwrap();
//!
//! relay.start().unwrap();
//! child.wait().unwrap();
//! relay.stop();
//! relay.wait_for().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod endpoint;
pub mod error;
pub mod progress;

// Re-export commonly used types
pub use crate::config::{RelayConfig, RelayMode};
pub use crate::core::{RelayBuilder, RelayHandle, RelayState, RelayStats, StreamRelay};
pub use crate::endpoint::{Sink, Source};
pub use crate::error::{RelayError, RelayFault, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use streamrelay::prelude::*;
    //! ```

    pub use crate::config::{RelayConfig, RelayMode};
    pub use crate::core::{RelayBuilder, RelayHandle, RelayOutcome, RelayState, RelayStats, StreamRelay};
    pub use crate::endpoint::{ChannelSource, ReaderSource, SharedSink, Sink, SliceSource, Source, WriterSink};
    pub use crate::error::{RelayError, RelayFault, Result};
}
