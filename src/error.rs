//! Error types for StreamRelay
//!
//! Two layers live here: [`RelayFault`] is what a running worker captures when
//! the source or sink fails, and [`RelayError`] is what the public API returns
//! to callers (usage errors, spawn failures and, through `join`, the fault).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Fault captured by a relay worker.
///
/// Cloneable so it can be read back any number of times after the relay has
/// finished; the underlying I/O error is shared. The I/O message is part of
/// the display text, so it is not also exposed as a `source`.
#[derive(Error, Debug, Clone)]
pub enum RelayFault {
    /// Reading from the source, or asking it how much is available, failed
    #[error("read from source failed: {0}")]
    Read(Arc<std::io::Error>),

    /// Writing to or flushing the sink failed
    #[error("write to sink failed: {0}")]
    Write(Arc<std::io::Error>),
}

impl RelayFault {
    /// Wrap a source-side I/O error
    pub fn read(err: std::io::Error) -> Self {
        Self::Read(Arc::new(err))
    }

    /// Wrap a sink-side I/O error
    pub fn write(err: std::io::Error) -> Self {
        Self::Write(Arc::new(err))
    }

    /// The I/O error behind the fault
    pub fn io_error(&self) -> &std::io::Error {
        match self {
            Self::Read(err) | Self::Write(err) => err,
        }
    }

    /// Kind of the underlying I/O error
    pub fn kind(&self) -> std::io::ErrorKind {
        self.io_error().kind()
    }

    /// True for source-side faults
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read(_))
    }

    /// True for sink-side faults
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write(_))
    }
}

/// Main error type for StreamRelay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Operation not allowed in the relay's current lifecycle state
    #[error("Illegal state: {0}")]
    IllegalState(&'static str),

    /// Buffer size must be positive
    #[error("Invalid buffer size: {0} (must be greater than zero)")]
    InvalidBufferSize(usize),

    /// Poll interval must be non-zero
    #[error("Invalid poll interval: {0:?} (must be greater than zero)")]
    InvalidPollInterval(Duration),

    /// Builder was missing the source or the sink
    #[error("Missing endpoint: no {0} was supplied")]
    MissingEndpoint(&'static str),

    /// Worker thread could not be spawned
    #[error("Failed to spawn relay worker: {0}")]
    Spawn(std::io::Error),

    /// Worker thread panicked before handing back its endpoints
    #[error("Relay worker panicked")]
    WorkerPanicked,

    /// The relay finished with a captured fault
    #[error(transparent)]
    Fault(#[from] RelayFault),

    /// I/O error while opening an endpoint or a config file
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl RelayError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Check if this error is a usage error (wrong lifecycle state or bad argument)
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::IllegalState(_)
                | Self::InvalidBufferSize(_)
                | Self::InvalidPollInterval(_)
                | Self::MissingEndpoint(_)
        )
    }

    /// The captured fault, if this error carries one
    pub fn fault(&self) -> Option<&RelayFault> {
        match self {
            Self::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result type alias for StreamRelay operations
pub type Result<T> = std::result::Result<T, RelayError>;

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::ConfigError(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| RelayError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(ErrorKind::NotFound, "file not found");
        let err = RelayError::io("/test/path", io_err);
        assert_eq!(err.path().unwrap(), &PathBuf::from("/test/path"));
    }

    #[test]
    fn test_usage_errors() {
        assert!(RelayError::IllegalState("already started").is_usage_error());
        assert!(RelayError::InvalidBufferSize(0).is_usage_error());
        assert!(RelayError::MissingEndpoint("sink").is_usage_error());
        assert!(!RelayError::WorkerPanicked.is_usage_error());
    }

    #[test]
    fn test_fault_is_shared_on_clone() {
        let fault = RelayFault::write(std::io::Error::new(ErrorKind::BrokenPipe, "gone"));
        let copy = fault.clone();
        assert!(copy.is_write());
        assert!(!copy.is_read());
        assert_eq!(copy.kind(), ErrorKind::BrokenPipe);
        assert_eq!(fault.to_string(), copy.to_string());
    }

    #[test]
    fn test_fault_converts_into_error() {
        let err: RelayError = RelayFault::read(std::io::Error::other("boom")).into();
        assert!(err.fault().unwrap().is_read());
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_with_path() {
        let res: std::io::Result<()> = Err(std::io::Error::new(ErrorKind::PermissionDenied, "no"));
        let err = res.with_path("/etc/shadow").unwrap_err();
        assert_eq!(err.path().unwrap(), &PathBuf::from("/etc/shadow"));
    }

    fn error_chain(err: &dyn std::error::Error) -> String {
        let mut out = err.to_string();
        let mut cause = err.source();
        while let Some(inner) = cause {
            out.push_str(": ");
            out.push_str(&inner.to_string());
            cause = inner.source();
        }
        out
    }

    #[test]
    fn test_io_message_reported_once_in_chain() {
        let fault = RelayFault::read(std::io::Error::new(ErrorKind::ConnectionReset, "peer hung up"));
        assert_eq!(error_chain(&fault), "read from source failed: peer hung up");

        let err = RelayError::Fault(fault);
        assert_eq!(error_chain(&err).matches("peer hung up").count(), 1);

        let spawn = RelayError::Spawn(std::io::Error::new(ErrorKind::OutOfMemory, "no threads left"));
        assert_eq!(error_chain(&spawn).matches("no threads left").count(), 1);
    }
}
