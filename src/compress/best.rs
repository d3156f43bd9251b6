use std::sync::Arc;

use super::{
    BEST_LEVEL, CompressionFuture, CompressionResult, Compressor, DEFAULT_LEVEL,
    DeflateCompressor, Executor, ExecutorCompressor, ImmediateCompressor,
};
use crate::bytes::{ByteSource, ByteTracker};
use crate::{Error, Result};

/// Deflates at both the default and the best level and picks one.
///
/// With `ratio = best_size / default_size`, the default result is kept when
/// `ratio >= min_ratio` and the best result otherwise. A `min_ratio` of 0.0
/// therefore always keeps the default result, and 1.0 keeps the best result
/// unless both have the same size.
#[derive(Debug, Clone, Copy)]
pub struct BestAndDefaultDeflate {
    min_ratio: f64,
    default: DeflateCompressor,
    best: DeflateCompressor,
}

impl BestAndDefaultDeflate {
    /// Creates the policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `min_ratio` is outside `[0.0, 1.0]`.
    pub fn new(min_ratio: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&min_ratio) {
            return Err(Error::invalid_argument(format!(
                "min_ratio must be between 0.0 and 1.0, got {}",
                min_ratio
            )));
        }
        Ok(Self {
            min_ratio,
            default: DeflateCompressor::new(DEFAULT_LEVEL)?,
            best: DeflateCompressor::new(BEST_LEVEL)?,
        })
    }

    /// Returns the minimum ratio.
    pub fn min_ratio(&self) -> f64 {
        self.min_ratio
    }
}

impl ImmediateCompressor for BestAndDefaultDeflate {
    fn immediate_compress(
        &self,
        source: ByteSource,
        tracker: &Arc<ByteTracker>,
    ) -> Result<CompressionResult> {
        let default = self.default.immediate_compress(source.clone(), tracker)?;
        if default.size() == 0 {
            return Ok(default);
        }
        let best = self.best.immediate_compress(source, tracker)?;

        let ratio = best.size() as f64 / default.size() as f64;
        log::trace!(
            "best deflate {} bytes, default {} bytes, ratio {:.4}",
            best.size(),
            default.size(),
            ratio
        );
        if ratio >= self.min_ratio {
            Ok(default)
        } else {
            Ok(best)
        }
    }
}

/// [`BestAndDefaultDeflate`] on an executor.
#[derive(Debug)]
pub struct BestAndDefaultDeflateExecutorCompressor {
    inner: ExecutorCompressor<BestAndDefaultDeflate>,
}

impl BestAndDefaultDeflateExecutorCompressor {
    /// Creates the compressor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `min_ratio` is outside `[0.0, 1.0]`.
    pub fn new(executor: Arc<dyn Executor>, min_ratio: f64) -> Result<Self> {
        Ok(Self {
            inner: ExecutorCompressor::new(BestAndDefaultDeflate::new(min_ratio)?, executor),
        })
    }

    /// Returns the minimum ratio.
    pub fn min_ratio(&self) -> f64 {
        self.inner.inner().min_ratio()
    }
}

impl Compressor for BestAndDefaultDeflateExecutorCompressor {
    fn compress(&self, source: ByteSource, tracker: &Arc<ByteTracker>) -> CompressionFuture {
        self.inner.compress(source, tracker)
    }
}
