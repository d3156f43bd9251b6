//! Closeable, sized views of bytes.

use std::fmt;
use std::io::{self, Cursor, Read};
use std::sync::Arc;

use super::TrackerGuard;
use crate::storage::{self, SharedStorage};
use crate::{Error, READ_BUFFER_SIZE, Result};

enum Backing {
    Memory {
        data: Vec<u8>,
        _guard: Option<TrackerGuard>,
    },
    Range {
        storage: SharedStorage,
        offset: u64,
    },
}

/// An immutable, sized and closeable view of bytes.
///
/// A source is backed either by a buffer accounted on a
/// [`ByteTracker`](super::ByteTracker) or by a byte range of the archive
/// storage. Clones share the backing; the tracked bytes are given back
/// exactly once, when the last handle is closed or dropped.
///
/// [`close`](Self::close) is idempotent. Reading from a closed handle fails
/// with [`Error::Closed`], while [`size`](Self::size) keeps answering.
#[derive(Clone)]
pub struct ByteSource {
    size: u64,
    inner: Option<Arc<Backing>>,
}

impl ByteSource {
    pub(crate) fn from_tracked(data: Vec<u8>, guard: TrackerGuard) -> Self {
        Self {
            size: data.len() as u64,
            inner: Some(Arc::new(Backing::Memory {
                data,
                _guard: Some(guard),
            })),
        }
    }

    /// Creates an untracked source over `data`.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            size: data.len() as u64,
            inner: Some(Arc::new(Backing::Memory { data, _guard: None })),
        }
    }

    /// Creates an empty source.
    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    pub(crate) fn from_range(storage: SharedStorage, offset: u64, size: u64) -> Self {
        Self {
            size,
            inner: Some(Arc::new(Backing::Range { storage, offset })),
        }
    }

    /// Returns the number of bytes in the source.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns `true` if [`close`](Self::close) was called on this handle.
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Releases this handle's share of the backing.
    pub fn close(&mut self) {
        self.inner = None;
    }

    /// Reads every byte of the source.
    pub fn read(&self) -> Result<Vec<u8>> {
        match self.backing()? {
            Backing::Memory { data, .. } => Ok(data.clone()),
            Backing::Range { storage, offset } => {
                let len = usize::try_from(self.size).map_err(|_| {
                    Error::ResourceLimitExceeded(format!(
                        "{} bytes do not fit in memory",
                        self.size
                    ))
                })?;
                let mut buf = vec![0u8; len];
                storage::lock(storage)?.read_at(*offset, &mut buf)?;
                Ok(buf)
            }
        }
    }

    /// Opens a reader over the source.
    pub fn open(&self) -> Result<Box<dyn Read + Send + '_>> {
        match self.backing()? {
            Backing::Memory { data, .. } => Ok(Box::new(Cursor::new(data.as_slice()))),
            Backing::Range { storage, offset } => Ok(Box::new(RangeReader {
                storage,
                position: *offset,
                remaining: self.size,
            })),
        }
    }

    /// Runs `f` over the bytes without copying them when they are in memory.
    pub(crate) fn with_bytes<T>(&self, f: impl FnOnce(&[u8]) -> Result<T>) -> Result<T> {
        match self.backing()? {
            Backing::Memory { data, .. } => f(data),
            Backing::Range { .. } => f(&self.read()?),
        }
    }

    fn backing(&self) -> Result<&Backing> {
        self.inner.as_deref().ok_or(Error::Closed)
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.inner.as_deref() {
            Some(Backing::Memory { .. }) => "memory",
            Some(Backing::Range { .. }) => "range",
            None => "closed",
        };
        f.debug_struct("ByteSource")
            .field("size", &self.size)
            .field("backing", &kind)
            .finish()
    }
}

struct RangeReader<'a> {
    storage: &'a SharedStorage,
    position: u64,
    remaining: u64,
}

impl Read for RangeReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let n = buf
            .len()
            .min(READ_BUFFER_SIZE)
            .min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        storage::lock(self.storage)?.read_at(self.position, &mut buf[..n])?;
        self.position += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }
}
