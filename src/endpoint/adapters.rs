//! Endpoint adapters
//!
//! Wrappers that turn standard library streams, descriptors, channels and
//! shared writers into relay endpoints.

use super::{Sink, Source};
use crossbeam::channel::{Receiver, TryRecvError};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// Source over any `Read` implementation
///
/// A plain reader cannot tell how much is ready without blocking, so
/// `available()` always reports zero. Use it with the blocking policy.
pub struct ReaderSource<R> {
    inner: R,
}

impl<R: Read + Send> ReaderSource<R> {
    /// Wrap a reader
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Unwrap the reader
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Send> Source for ReaderSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.inner.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn available(&mut self) -> io::Result<usize> {
        Ok(0)
    }
}

/// In-memory source; everything not yet read counts as available
#[derive(Debug, Clone, Default)]
pub struct SliceSource {
    data: Vec<u8>,
    pos: usize,
}

impl SliceSource {
    /// Source that yields `data` and then end of stream
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    /// Bytes not read yet
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl Source for SliceSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn available(&mut self) -> io::Result<usize> {
        Ok(self.remaining())
    }
}

/// Source fed by a channel of byte chunks
///
/// Reads block until a chunk arrives; the stream ends once every sender has
/// been dropped and the queue is drained. `available()` never blocks.
pub struct ChannelSource {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    pos: usize,
}

impl ChannelSource {
    /// Wrap the receiving half of a chunk channel
    pub fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            pos: 0,
        }
    }

    fn buffered(&self) -> usize {
        self.pending.len() - self.pos
    }

    fn refill(&mut self, chunk: Vec<u8>) {
        self.pending = chunk;
        self.pos = 0;
    }

    fn drain_into(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.buffered());
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        n
    }
}

impl Source for ChannelSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        // Empty chunks carry no data; skip them rather than reporting end of stream.
        while self.buffered() == 0 {
            match self.rx.recv() {
                Ok(chunk) => self.refill(chunk),
                Err(_) => return Ok(0),
            }
        }
        Ok(self.drain_into(buf))
    }

    fn available(&mut self) -> io::Result<usize> {
        while self.buffered() == 0 {
            match self.rx.try_recv() {
                Ok(chunk) => self.refill(chunk),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return Ok(0),
            }
        }
        Ok(self.buffered())
    }
}

/// Source over a raw descriptor (pipe, socket, tty, child process output)
///
/// `available()` asks the kernel via `FIONREAD`.
#[cfg(unix)]
pub struct FdSource<R> {
    inner: R,
}

#[cfg(unix)]
impl<R: Read + std::os::unix::io::AsRawFd + Send> FdSource<R> {
    /// Wrap a descriptor-backed reader
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Unwrap the reader
    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(unix)]
impl<R: Read + std::os::unix::io::AsRawFd + Send> Source for FdSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.inner.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn available(&mut self) -> io::Result<usize> {
        let fd = self.inner.as_raw_fd();
        let mut count: libc::c_int = 0;
        // SAFETY: fd is owned by `inner` and stays open for the call; FIONREAD
        // writes a single c_int into `count`.
        let ret = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut count as *mut libc::c_int) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(count.max(0) as usize)
    }
}

/// Sink over any `Write` implementation
///
/// `close()` flushes and drops the writer; later writes fail with
/// `BrokenPipe`.
pub struct WriterSink<W> {
    inner: Option<W>,
}

impl<W: Write + Send> WriterSink<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self { inner: Some(inner) }
    }

    /// Whether `close()` has run
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Unwrap the writer; `None` once closed
    pub fn into_inner(self) -> Option<W> {
        self.inner
    }

    fn writer(&mut self) -> io::Result<&mut W> {
        self.inner.as_mut().ok_or_else(closed_error)
    }
}

impl<W: Write + Send> Sink for WriterSink<W> {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.writer()?.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match self.inner.take() {
            Some(mut w) => w.flush(),
            None => Ok(()),
        }
    }
}

/// Sink around a writer the caller keeps a handle to
///
/// Clones share the same writer. `close()` only marks the sink closed; the
/// writer itself stays reachable through [`SharedSink::lock`].
pub struct SharedSink<W> {
    inner: Arc<Mutex<SharedState<W>>>,
}

struct SharedState<W> {
    writer: W,
    closed: bool,
}

impl<W> Clone for SharedSink<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: Write + Send> SharedSink<W> {
    /// Share a writer
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SharedState {
                writer,
                closed: false,
            })),
        }
    }

    /// Run `f` against the shared writer
    pub fn with<T>(&self, f: impl FnOnce(&mut W) -> T) -> T {
        let mut state = self.lock_state();
        f(&mut state.writer)
    }

    /// Whether the relay (or anyone) closed the sink
    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    /// Lock the shared writer
    pub fn lock(&self) -> SharedSinkGuard<'_, W> {
        SharedSinkGuard {
            guard: self.lock_state(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SharedState<W>> {
        // A panicking writer leaves nothing half-updated that we rely on.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SharedSink<Vec<u8>> {
    /// Shared in-memory buffer, handy for capturing output
    pub fn buffer() -> Self {
        Self::new(Vec::new())
    }

    /// Copy of everything written so far
    pub fn contents(&self) -> Vec<u8> {
        self.with(|buf| buf.clone())
    }
}

/// Lock guard returned by [`SharedSink::lock`]
pub struct SharedSinkGuard<'a, W> {
    guard: MutexGuard<'a, SharedState<W>>,
}

impl<W> std::ops::Deref for SharedSinkGuard<'_, W> {
    type Target = W;

    fn deref(&self) -> &W {
        &self.guard.writer
    }
}

impl<W> std::ops::DerefMut for SharedSinkGuard<'_, W> {
    fn deref_mut(&mut self) -> &mut W {
        &mut self.guard.writer
    }
}

impl<W: Write + Send> Sink for SharedSink<W> {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut state = self.lock_state();
        if state.closed {
            return Err(closed_error());
        }
        state.writer.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.lock_state();
        if state.closed {
            return Ok(());
        }
        state.writer.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        let mut state = self.lock_state();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.writer.flush()
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "sink is closed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    #[test]
    fn test_slice_source_reads_then_ends() {
        let mut src = SliceSource::new(b"hello".to_vec());
        let mut buf = [0u8; 3];

        assert_eq!(src.available().unwrap(), 5);
        assert_eq!(src.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"hel");
        assert_eq!(src.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"lo");
        assert_eq!(src.read(&mut buf).unwrap(), 0);
        assert_eq!(src.available().unwrap(), 0);
    }

    #[test]
    fn test_reader_source_has_nothing_available() {
        let mut src = ReaderSource::new(io::Cursor::new(vec![1u8, 2, 3]));
        assert_eq!(src.available().unwrap(), 0);

        let mut buf = [0u8; 8];
        assert_eq!(src.read(&mut buf).unwrap(), 3);
        assert_eq!(src.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_channel_source() {
        let (tx, rx) = unbounded();
        let mut src = ChannelSource::new(rx);
        assert_eq!(src.available().unwrap(), 0);

        tx.send(b"abc".to_vec()).unwrap();
        tx.send(Vec::new()).unwrap();
        tx.send(b"de".to_vec()).unwrap();
        assert_eq!(src.available().unwrap(), 3);

        let mut buf = [0u8; 2];
        assert_eq!(src.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"ab");
        assert_eq!(src.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'c');
        assert_eq!(src.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"de");

        drop(tx);
        assert_eq!(src.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_writer_sink_close() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write_all(b"data").unwrap();
        sink.close().unwrap();
        assert!(sink.is_closed());

        let err = sink.write_all(b"more").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(sink.flush().is_ok());
        assert!(sink.close().is_ok());
    }

    #[test]
    fn test_shared_sink_is_observable() {
        let observer = SharedSink::buffer();
        let mut sink = observer.clone();

        sink.write_all(b"abc").unwrap();
        assert_eq!(observer.contents(), b"abc");
        assert!(!observer.is_closed());

        sink.close().unwrap();
        assert!(observer.is_closed());
        assert!(sink.write_all(b"x").is_err());
        assert_eq!(observer.lock().len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_fd_source_reports_available() {
        use std::os::unix::net::UnixStream;

        let (mut tx, rx) = UnixStream::pair().unwrap();
        let mut src = FdSource::new(rx);
        assert_eq!(src.available().unwrap(), 0);

        tx.write_all(b"12345").unwrap();
        assert_eq!(src.available().unwrap(), 5);

        let mut buf = [0u8; 16];
        assert_eq!(src.read(&mut buf).unwrap(), 5);
        drop(tx);
        assert_eq!(src.read(&mut buf).unwrap(), 0);
    }
}
