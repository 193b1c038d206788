//! Source and sink endpoints
//!
//! A relay never depends on a concrete stream type. It reads through
//! [`Source`] and writes through [`Sink`]; the adapters in this module wrap
//! ordinary `Read`/`Write` types, raw descriptors and shared writers.

mod adapters;

pub use adapters::*;

use std::io;

/// Readable endpoint of a relay
pub trait Source: Send {
    /// Read up to `buf.len()` bytes. `Ok(0)` means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Number of bytes that can be read right now without blocking.
    ///
    /// Only the polling policy calls this.
    fn available(&mut self) -> io::Result<usize>;
}

/// Writable endpoint of a relay
pub trait Sink: Send {
    /// Write the whole chunk
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Push buffered data through
    fn flush(&mut self) -> io::Result<()>;

    /// Release the underlying stream. Called at most once, during cleanup.
    fn close(&mut self) -> io::Result<()>;
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn available(&mut self) -> io::Result<usize> {
        (**self).available()
    }
}

impl<K: Sink + ?Sized> Sink for Box<K> {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        (**self).write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}
