//! Blocking data sources the pump reads from.

use std::io::{self, BufRead, BufReader, Read};

/// Default size of a chunk read when no hint is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Result of a single read from a [StreamSource].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Data that was read. An empty vector counts as end of stream.
    Data(Vec<u8>),
    /// Nothing available right now, but the stream is still open.
    TryAgain,
    /// The stream is exhausted.
    Eof,
}

/// A sequential source that may block on reads.
///
/// The pump calls [read](StreamSource::read) or
/// [read_line](StreamSource::read_line) in a loop on its own thread, and
/// checks [is_closed](StreamSource::is_closed) before every read.
pub trait StreamSource: Send {
    /// Read at most `size_hint` bytes (implementation-defined if `None`).
    fn read(&mut self, size_hint: Option<usize>) -> io::Result<Chunk>;

    /// Read up to and including the next line break.
    fn read_line(&mut self, size_hint: Option<usize>) -> io::Result<Chunk> {
        self.read(size_hint)
    }

    /// Release the underlying handle.
    fn close(&mut self) -> io::Result<()>;

    fn is_closed(&self) -> bool;
}

impl<S: StreamSource + ?Sized> StreamSource for Box<S> {
    fn read(&mut self, size_hint: Option<usize>) -> io::Result<Chunk> {
        (**self).read(size_hint)
    }

    fn read_line(&mut self, size_hint: Option<usize>) -> io::Result<Chunk> {
        (**self).read_line(size_hint)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// [StreamSource] over any buffered reader, e.g. a child's stdout pipe.
///
/// Chunk reads return whatever the reader has available, capped at the size
/// hint. Line reads stop at a line break or after `size_hint` bytes, and keep
/// a partially read line across `WouldBlock` errors, so a pipe switched to
/// non-blocking mode does not split lines. Closing drops the wrapped reader.
pub struct IoSource<R> {
    inner: Option<R>,
    pending: Vec<u8>,
}

impl<R: Read + Send> IoSource<BufReader<R>> {
    /// Wrap an unbuffered reader in a [BufReader].
    pub fn from_read(reader: R) -> Self {
        Self::new(BufReader::new(reader))
    }
}

impl<R: BufRead + Send> IoSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: Some(reader),
            pending: Vec::new(),
        }
    }

    /// The wrapped reader, `None` once closed.
    pub fn get_ref(&self) -> Option<&R> {
        self.inner.as_ref()
    }
}

impl<R: BufRead + Send> StreamSource for IoSource<R> {
    fn read(&mut self, size_hint: Option<usize>) -> io::Result<Chunk> {
        let limit = size_hint.unwrap_or(DEFAULT_CHUNK_SIZE).max(1);
        if !self.pending.is_empty() {
            let rest = self.pending.split_off(limit.min(self.pending.len()));
            return Ok(Chunk::Data(std::mem::replace(&mut self.pending, rest)));
        }

        let Some(inner) = self.inner.as_mut() else {
            return Ok(Chunk::Eof);
        };
        let available = inner.fill_buf()?;
        if available.is_empty() {
            return Ok(Chunk::Eof);
        }
        let n = available.len().min(limit);
        let data = available[..n].to_vec();
        inner.consume(n);
        Ok(Chunk::Data(data))
    }

    fn read_line(&mut self, size_hint: Option<usize>) -> io::Result<Chunk> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(Chunk::Eof);
        };
        let limit = size_hint.map(|hint| hint.max(1));
        if limit.is_some_and(|limit| self.pending.len() >= limit) {
            return Ok(Chunk::Data(std::mem::take(&mut self.pending)));
        }
        // read_until keeps what it appended before an error
        let read = match limit {
            Some(limit) => {
                let remaining = (limit - self.pending.len()) as u64;
                Read::take(&mut *inner, remaining).read_until(b'\n', &mut self.pending)
            }
            None => inner.read_until(b'\n', &mut self.pending),
        };
        match read {
            Ok(0) if self.pending.is_empty() => Ok(Chunk::Eof),
            Ok(_) => Ok(Chunk::Data(std::mem::take(&mut self.pending))),
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner = None;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

/// Switch a file descriptor (e.g. a pipe) to non-blocking mode.
///
/// Reads then fail with [io::ErrorKind::WouldBlock] instead of blocking, which
/// the pump treats like [Chunk::TryAgain].
#[cfg(unix)]
pub fn set_nonblocking<F: std::os::unix::io::AsRawFd>(fd: &F) -> io::Result<()> {
    let fd = fd.as_raw_fd();
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
