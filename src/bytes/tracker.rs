//! Byte accounting for buffered entry data.
//!
//! This module provides [`ByteTracker`], which counts the bytes held in
//! memory by [`ByteSource`]s (new entry data, compression output) so a
//! caller can bound how much an archive edit buffers.

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::ByteSource;
use crate::{Error, READ_BUFFER_SIZE, Result};

/// Tracks the bytes held by in-memory byte sources.
///
/// The tracker is shared (`Arc<ByteTracker>`) between the archive, its
/// pending entries and compression tasks running on other threads, so all
/// counters are atomics.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use zfile::bytes::ByteTracker;
///
/// let tracker = Arc::new(ByteTracker::new(1024));
/// let mut source = tracker.from_bytes(vec![0u8; 100])?;
/// assert_eq!(tracker.bytes_used(), 100);
///
/// source.close();
/// assert_eq!(tracker.bytes_used(), 0);
/// assert_eq!(tracker.max_bytes_used(), 100);
/// # Ok::<(), zfile::Error>(())
/// ```
#[derive(Debug)]
pub struct ByteTracker {
    bytes_used: AtomicUsize,
    max_bytes_used: AtomicUsize,
    limit: usize,
}

impl ByteTracker {
    /// Creates a tracker that refuses to hold more than `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            bytes_used: AtomicUsize::new(0),
            max_bytes_used: AtomicUsize::new(0),
            limit,
        }
    }

    /// Creates a tracker that never refuses an allocation.
    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    /// Returns the ceiling.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the number of bytes currently held.
    pub fn bytes_used(&self) -> usize {
        self.bytes_used.load(Ordering::SeqCst)
    }

    /// Returns the highest value [`bytes_used`](Self::bytes_used) has reached.
    pub fn max_bytes_used(&self) -> usize {
        self.max_bytes_used.load(Ordering::SeqCst)
    }

    /// Returns how many more bytes can be held.
    pub fn available(&self) -> usize {
        self.limit.saturating_sub(self.bytes_used())
    }

    /// Accounts `bytes` on this tracker.
    ///
    /// The returned guard gives the bytes back when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceLimitExceeded`] if the allocation would take
    /// the tracker past its limit.
    pub fn allocate(self: &Arc<Self>, bytes: usize) -> Result<TrackerGuard> {
        self.reserve(bytes)?;
        Ok(TrackerGuard {
            tracker: Arc::clone(self),
            bytes,
        })
    }

    /// Creates a tracked in-memory source holding `data`.
    pub fn from_bytes(self: &Arc<Self>, data: Vec<u8>) -> Result<ByteSource> {
        let guard = self.allocate(data.len())?;
        Ok(ByteSource::from_tracked(data, guard))
    }

    /// Reads `reader` to the end into a tracked in-memory source.
    ///
    /// Bytes are accounted as they are read, so an oversized stream fails
    /// as soon as it crosses the limit rather than after being buffered.
    pub fn from_reader<R: Read>(self: &Arc<Self>, mut reader: R) -> Result<ByteSource> {
        let mut guard = self.allocate(0)?;
        let mut data = Vec::new();
        let mut chunk = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let n = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            };
            guard.grow(n)?;
            data.extend_from_slice(&chunk[..n]);
        }
        Ok(ByteSource::from_tracked(data, guard))
    }

    fn reserve(&self, bytes: usize) -> Result<()> {
        loop {
            let current = self.bytes_used.load(Ordering::SeqCst);
            let new_usage = current.checked_add(bytes).ok_or_else(|| {
                Error::ResourceLimitExceeded(format!(
                    "Byte count overflow: {} + {} bytes",
                    current, bytes
                ))
            })?;

            if new_usage > self.limit {
                return Err(Error::ResourceLimitExceeded(format!(
                    "Byte tracker limit exceeded: {} + {} = {} bytes (limit: {} bytes)",
                    current, bytes, new_usage, self.limit
                )));
            }

            if self
                .bytes_used
                .compare_exchange(current, new_usage, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.max_bytes_used.fetch_max(new_usage, Ordering::SeqCst);
                return Ok(());
            }
        }
    }

    fn release(&self, bytes: usize) {
        self.bytes_used.fetch_sub(bytes, Ordering::SeqCst);
    }
}

impl Default for ByteTracker {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// RAII guard that returns its bytes to the tracker when dropped.
#[derive(Debug)]
pub struct TrackerGuard {
    tracker: Arc<ByteTracker>,
    bytes: usize,
}

impl TrackerGuard {
    /// Returns the number of bytes held by this guard.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Accounts `additional` more bytes under this guard.
    pub fn grow(&mut self, additional: usize) -> Result<()> {
        self.tracker.reserve(additional)?;
        self.bytes += additional;
        Ok(())
    }
}

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        if self.bytes > 0 {
            self.tracker.release(self.bytes);
        }
    }
}
