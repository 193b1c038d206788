//! Progress reporting module
//!
//! Provides a live byte counter for relays driven from the CLI.

mod reporter;

pub use reporter::*;
