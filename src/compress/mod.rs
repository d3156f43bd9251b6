//! Pluggable compression of entry data.
//!
//! A [`Compressor`] turns the raw bytes of a new entry into a
//! [`CompressionResult`]. Work is handed to an [`Executor`], so the call
//! returns a [`CompressionFuture`] immediately and the archive only waits for
//! it when the result is needed (at the latest, during an update).
//!
//! # Implementations
//!
//! | Compressor | Behavior |
//! |------------|----------|
//! | [`StoreCompressor`] | Always stores |
//! | [`DeflateExecutionCompressor`] | Deflates at one level, stores when deflate does not shrink the data |
//! | [`BestAndDefaultDeflateExecutorCompressor`] | Deflates at the default and best levels and keeps the default result unless best saves enough |
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use zfile::bytes::{ByteSource, ByteTracker};
//! use zfile::compress::{Compressor, DeflateExecutionCompressor, InlineExecutor};
//! use zfile::CompressionMethod;
//!
//! let tracker = Arc::new(ByteTracker::unlimited());
//! let compressor = DeflateExecutionCompressor::new(9, Arc::new(InlineExecutor))?;
//!
//! let source = ByteSource::from_vec(vec![b'a'; 1000]);
//! let result = compressor.compress(source, &tracker).wait()?;
//! assert_eq!(result.method(), CompressionMethod::Deflate);
//! assert!(result.size() < 1000);
//! # Ok::<(), zfile::Error>(())
//! ```

mod best;
mod deflate;
mod executor;
mod store;

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::sync::{Arc, Mutex};

use crate::bytes::{ByteSource, ByteTracker};
use crate::codec::CompressionMethod;
use crate::{Error, Result};

pub use best::{BestAndDefaultDeflate, BestAndDefaultDeflateExecutorCompressor};
pub use deflate::{BEST_LEVEL, DEFAULT_LEVEL, DeflateCompressor, DeflateExecutionCompressor};
#[cfg(feature = "parallel")]
pub use executor::ThreadPoolExecutor;
pub use executor::{Executor, InlineExecutor, Task, Threads};
pub use store::StoreCompressor;

/// The outcome of compressing one entry.
#[derive(Debug, Clone)]
pub struct CompressionResult {
    method: CompressionMethod,
    source: ByteSource,
    size: u64,
}

impl CompressionResult {
    /// Creates a result, checking that `size` matches the source.
    pub fn new(method: CompressionMethod, source: ByteSource, size: u64) -> Result<Self> {
        if size != source.size() {
            return Err(Error::invalid_argument(format!(
                "compression result size {} does not match source size {}",
                size,
                source.size()
            )));
        }
        Ok(Self {
            method,
            source,
            size,
        })
    }

    /// Creates a result whose size is taken from the source.
    pub fn from_source(method: CompressionMethod, source: ByteSource) -> Self {
        let size = source.size();
        Self {
            method,
            source,
            size,
        }
    }

    /// Returns the method the data is encoded with.
    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    /// Returns the encoded data.
    pub fn source(&self) -> &ByteSource {
        &self.source
    }

    /// Returns the size of the encoded data.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Consumes the result and returns the encoded data.
    pub fn into_source(self) -> ByteSource {
        self.source
    }
}

enum FutureState {
    Pending(Receiver<Result<CompressionResult>>),
    Ready(CompressionResult),
    Failed(Error),
}

/// A handle on a compression that may still be running.
///
/// Every [`wait`](Self::wait) on a failed compression returns an error of the
/// same variant and message as the one the compressor produced.
pub struct CompressionFuture {
    state: Mutex<FutureState>,
}

impl CompressionFuture {
    /// Creates a future that is already resolved.
    pub fn ready(result: Result<CompressionResult>) -> Self {
        let state = match result {
            Ok(r) => FutureState::Ready(r),
            Err(e) => FutureState::Failed(e),
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Creates a pending future and the sender that resolves it.
    pub fn channel() -> (SyncSender<Result<CompressionResult>>, Self) {
        let (tx, rx) = mpsc::sync_channel(1);
        (
            tx,
            Self {
                state: Mutex::new(FutureState::Pending(rx)),
            },
        )
    }

    /// Returns `true` once the compression has finished, successfully or not.
    pub fn is_done(&self) -> bool {
        let mut state = self.lock();
        if let FutureState::Pending(rx) = &*state {
            match rx.try_recv() {
                Ok(result) => *state = Self::resolved(result),
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => *state = Self::vanished(),
            }
        }
        true
    }

    /// Blocks until the compression finishes and returns its result.
    pub fn wait(&self) -> Result<CompressionResult> {
        let mut state = self.lock();
        if let FutureState::Pending(rx) = &*state {
            *state = match rx.recv() {
                Ok(result) => Self::resolved(result),
                Err(_) => Self::vanished(),
            };
        }
        match &*state {
            FutureState::Ready(result) => Ok(result.clone()),
            FutureState::Failed(error) => Err(error.replicate()),
            FutureState::Pending(_) => Err(Error::CompressionFailed(
                "compression still pending after wait".into(),
            )),
        }
    }

    fn resolved(result: Result<CompressionResult>) -> FutureState {
        match result {
            Ok(r) => FutureState::Ready(r),
            Err(e) => FutureState::Failed(e),
        }
    }

    fn vanished() -> FutureState {
        FutureState::Failed(Error::CompressionFailed(
            "compression task terminated without a result".into(),
        ))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FutureState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for CompressionFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.lock() {
            FutureState::Pending(_) => "pending",
            FutureState::Ready(_) => "ready",
            FutureState::Failed(_) => "failed",
        };
        f.debug_struct("CompressionFuture")
            .field("state", &state)
            .finish()
    }
}

/// Compresses entry data, possibly asynchronously.
pub trait Compressor: Send + Sync {
    /// Starts compressing `source`.
    ///
    /// Buffers produced by the compressor are accounted on `tracker`.
    fn compress(&self, source: ByteSource, tracker: &Arc<ByteTracker>) -> CompressionFuture;
}

/// A compressor that does its work on the calling thread.
pub trait ImmediateCompressor: Send + Sync + 'static {
    /// Compresses `source` and returns the result.
    fn immediate_compress(
        &self,
        source: ByteSource,
        tracker: &Arc<ByteTracker>,
    ) -> Result<CompressionResult>;
}

/// Runs an [`ImmediateCompressor`] on an [`Executor`].
///
/// A panic inside the compressor resolves the future with
/// [`Error::CompressionFailed`] instead of unwinding on the executor thread.
pub struct ExecutorCompressor<C> {
    inner: Arc<C>,
    executor: Arc<dyn Executor>,
}

impl<C: ImmediateCompressor> ExecutorCompressor<C> {
    /// Creates a compressor submitting `inner` to `executor`.
    pub fn new(inner: C, executor: Arc<dyn Executor>) -> Self {
        Self {
            inner: Arc::new(inner),
            executor,
        }
    }

    /// Returns the wrapped compressor.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: ImmediateCompressor> Compressor for ExecutorCompressor<C> {
    fn compress(&self, source: ByteSource, tracker: &Arc<ByteTracker>) -> CompressionFuture {
        let (tx, future) = CompressionFuture::channel();
        let inner = Arc::clone(&self.inner);
        let tracker = Arc::clone(tracker);
        self.executor.execute(Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                inner.immediate_compress(source, &tracker)
            }));
            let result = outcome.unwrap_or_else(|payload| {
                let detail = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(Error::CompressionFailed(format!(
                    "compression task panicked: {}",
                    detail
                )))
            });
            // The receiver is gone only if the entry was dropped meanwhile.
            let _ = tx.send(result);
        }));
        future
    }
}

impl<C> std::fmt::Debug for ExecutorCompressor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorCompressor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Exploding;

    impl ImmediateCompressor for Exploding {
        fn immediate_compress(
            &self,
            _source: ByteSource,
            _tracker: &Arc<ByteTracker>,
        ) -> Result<CompressionResult> {
            panic!("boom");
        }
    }

    struct Failing;

    impl ImmediateCompressor for Failing {
        fn immediate_compress(
            &self,
            _source: ByteSource,
            _tracker: &Arc<ByteTracker>,
        ) -> Result<CompressionResult> {
            Err(Error::invalid_argument("nope"))
        }
    }

    struct DiskFull;

    impl ImmediateCompressor for DiskFull {
        fn immediate_compress(
            &self,
            _source: ByteSource,
            _tracker: &Arc<ByteTracker>,
        ) -> Result<CompressionResult> {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "scratch space exhausted",
            )))
        }
    }

    #[test]
    fn test_result_size_checked() {
        let source = ByteSource::from_vec(vec![0u8; 4]);
        assert!(CompressionResult::new(CompressionMethod::Store, source.clone(), 4).is_ok());
        let err = CompressionResult::new(CompressionMethod::Store, source, 5).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_ready_future() {
        let result = CompressionResult::from_source(CompressionMethod::Store, ByteSource::empty());
        let future = CompressionFuture::ready(Ok(result));
        assert!(future.is_done());
        assert_eq!(future.wait().unwrap().size(), 0);
        // Waiting twice hands out the same result.
        assert_eq!(future.wait().unwrap().method(), CompressionMethod::Store);
    }

    #[test]
    fn test_pending_future_resolves() {
        let (tx, future) = CompressionFuture::channel();
        assert!(!future.is_done());
        tx.send(Ok(CompressionResult::from_source(
            CompressionMethod::Store,
            ByteSource::from_vec(vec![1, 2, 3]),
        )))
        .unwrap();
        assert!(future.is_done());
        assert_eq!(future.wait().unwrap().size(), 3);
    }

    #[test]
    fn test_dropped_sender_fails_future() {
        let (tx, future) = CompressionFuture::channel();
        drop(tx);
        assert!(matches!(future.wait(), Err(Error::CompressionFailed(_))));
    }

    #[test]
    fn test_panic_becomes_compression_failed() {
        let compressor = ExecutorCompressor::new(Exploding, Arc::new(InlineExecutor));
        let tracker = Arc::new(ByteTracker::unlimited());
        let future = compressor.compress(ByteSource::from_vec(vec![1]), &tracker);

        let err = future.wait().unwrap_err();
        assert!(matches!(err, Error::CompressionFailed(ref m) if m.contains("boom")));
    }

    #[test]
    fn test_error_is_propagated_unchanged() {
        let compressor = ExecutorCompressor::new(Failing, Arc::new(InlineExecutor));
        let tracker = Arc::new(ByteTracker::unlimited());
        let future = compressor.compress(ByteSource::from_vec(vec![1]), &tracker);

        assert!(matches!(future.wait(), Err(Error::InvalidArgument(_))));
        assert!(matches!(future.wait(), Err(Error::InvalidArgument(ref m)) if m.contains("nope")));
    }

    #[test]
    fn test_io_error_kind_survives_repeated_waits() {
        let compressor = ExecutorCompressor::new(DiskFull, Arc::new(InlineExecutor));
        let tracker = Arc::new(ByteTracker::unlimited());
        let future = compressor.compress(ByteSource::from_vec(vec![1]), &tracker);

        for _ in 0..3 {
            let err = future.wait().unwrap_err();
            assert!(matches!(err, Error::Io(ref e) if e.kind() == std::io::ErrorKind::StorageFull));
        }
    }
}
