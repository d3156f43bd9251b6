use std::sync::Arc;

use super::{
    CompressionFuture, CompressionResult, Compressor, Executor, ExecutorCompressor,
    ImmediateCompressor, InlineExecutor,
};
use crate::bytes::{ByteSource, ByteTracker};
use crate::codec::{self, CompressionMethod};
use crate::{Error, Result};

/// The zlib default compression level.
pub const DEFAULT_LEVEL: u32 = 6;

/// The highest compression level.
pub const BEST_LEVEL: u32 = 9;

/// Deflates on the calling thread, storing when deflate does not help.
#[derive(Debug, Clone, Copy)]
pub struct DeflateCompressor {
    level: u32,
}

impl DeflateCompressor {
    /// Creates a compressor for `level`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `level` is above 9.
    pub fn new(level: u32) -> Result<Self> {
        if level > BEST_LEVEL {
            return Err(Error::invalid_argument(format!(
                "deflate level must be 0-9, got {}",
                level
            )));
        }
        Ok(Self { level })
    }

    /// Returns the compression level.
    pub fn level(&self) -> u32 {
        self.level
    }
}

impl ImmediateCompressor for DeflateCompressor {
    fn immediate_compress(
        &self,
        source: ByteSource,
        tracker: &Arc<ByteTracker>,
    ) -> Result<CompressionResult> {
        let deflated = codec::deflate(source.open()?, self.level, source.size())?;
        if (deflated.len() as u64) < source.size() {
            let compressed = tracker.from_bytes(deflated)?;
            Ok(CompressionResult::from_source(
                CompressionMethod::Deflate,
                compressed,
            ))
        } else {
            Ok(CompressionResult::from_source(CompressionMethod::Store, source))
        }
    }
}

/// Deflates at a fixed level on an executor.
///
/// If the deflated data is not smaller than the input, the entry is stored
/// with the original bytes, so compression never grows an archive.
#[derive(Debug)]
pub struct DeflateExecutionCompressor {
    inner: ExecutorCompressor<DeflateCompressor>,
}

impl DeflateExecutionCompressor {
    /// Creates a compressor deflating at `level` on `executor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `level` is above 9.
    pub fn new(level: u32, executor: Arc<dyn Executor>) -> Result<Self> {
        Ok(Self {
            inner: ExecutorCompressor::new(DeflateCompressor::new(level)?, executor),
        })
    }

    /// Creates a compressor deflating at `level` on the calling thread.
    pub fn inline(level: u32) -> Result<Self> {
        Self::new(level, Arc::new(InlineExecutor))
    }

    /// Returns the compression level.
    pub fn level(&self) -> u32 {
        self.inner.inner().level()
    }
}

impl Default for DeflateExecutionCompressor {
    /// Deflates at [`DEFAULT_LEVEL`] on the calling thread.
    fn default() -> Self {
        Self {
            inner: ExecutorCompressor::new(
                DeflateCompressor {
                    level: DEFAULT_LEVEL,
                },
                Arc::new(InlineExecutor),
            ),
        }
    }
}

impl Compressor for DeflateExecutionCompressor {
    fn compress(&self, source: ByteSource, tracker: &Arc<ByteTracker>) -> CompressionFuture {
        self.inner.compress(source, tracker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_level_is_validated() {
        assert!(DeflateExecutionCompressor::inline(0).is_ok());
        assert!(DeflateExecutionCompressor::inline(BEST_LEVEL).is_ok());
        assert!(matches!(
            DeflateExecutionCompressor::inline(10),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_compressible_data_is_deflated() {
        let tracker = Arc::new(ByteTracker::unlimited());
        let compressor = DeflateExecutionCompressor::inline(BEST_LEVEL).unwrap();
        let result = compressor
            .compress(ByteSource::from_vec(vec![b'a'; 10]), &tracker)
            .wait()
            .unwrap();

        assert_eq!(result.method(), CompressionMethod::Deflate);
        assert!(result.size() < 10);
        assert_eq!(tracker.bytes_used() as u64, result.size());
    }

    #[test]
    fn test_random_data_falls_back_to_store() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut data = vec![0u8; 10];
        rng.fill(&mut data[..]);

        let tracker = Arc::new(ByteTracker::unlimited());
        let compressor = DeflateExecutionCompressor::inline(BEST_LEVEL).unwrap();
        let result = compressor
            .compress(ByteSource::from_vec(data.clone()), &tracker)
            .wait()
            .unwrap();

        assert_eq!(result.method(), CompressionMethod::Store);
        assert_eq!(result.size(), 10);
        assert_eq!(result.source().read().unwrap(), data);
    }

    #[test]
    fn test_empty_input_is_stored() {
        let tracker = Arc::new(ByteTracker::unlimited());
        let compressor = DeflateExecutionCompressor::inline(DEFAULT_LEVEL).unwrap();
        let result = compressor
            .compress(ByteSource::empty(), &tracker)
            .wait()
            .unwrap();
        assert_eq!(result.method(), CompressionMethod::Store);
        assert_eq!(result.size(), 0);
    }

    #[test]
    fn test_closed_source_fails_the_future() {
        let tracker = Arc::new(ByteTracker::unlimited());
        let mut source = ByteSource::from_vec(vec![0u8; 100]);
        source.close();
        let compressor = DeflateExecutionCompressor::inline(DEFAULT_LEVEL).unwrap();
        assert!(matches!(
            compressor.compress(source, &tracker).wait(),
            Err(Error::Closed)
        ));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_on_thread_pool() {
        use crate::compress::{ThreadPoolExecutor, Threads};

        let executor = Arc::new(ThreadPoolExecutor::new(Threads::Auto).unwrap());
        let compressor = DeflateExecutionCompressor::new(DEFAULT_LEVEL, executor).unwrap();
        let tracker = Arc::new(ByteTracker::unlimited());

        let futures: Vec<_> = (0..8)
            .map(|i| compressor.compress(ByteSource::from_vec(vec![i as u8; 4096]), &tracker))
            .collect();
        for future in futures {
            let result = future.wait().unwrap();
            assert_eq!(result.method(), CompressionMethod::Deflate);
        }
    }
}
