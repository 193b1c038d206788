//! Configuration module for StreamRelay
//!
//! Provides the relay configuration, its defaults and file format,
//! and the CLI arguments.

mod settings;

pub use settings::*;
