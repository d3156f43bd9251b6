use std::sync::Arc;

use super::{CompressionFuture, CompressionResult, Compressor, ImmediateCompressor};
use crate::Result;
use crate::bytes::{ByteSource, ByteTracker};
use crate::codec::CompressionMethod;

/// A compressor that never compresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreCompressor;

impl ImmediateCompressor for StoreCompressor {
    fn immediate_compress(
        &self,
        source: ByteSource,
        _tracker: &Arc<ByteTracker>,
    ) -> Result<CompressionResult> {
        Ok(CompressionResult::from_source(CompressionMethod::Store, source))
    }
}

impl Compressor for StoreCompressor {
    fn compress(&self, source: ByteSource, tracker: &Arc<ByteTracker>) -> CompressionFuture {
        CompressionFuture::ready(self.immediate_compress(source, tracker))
    }
}
