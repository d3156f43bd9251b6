//! Options for opening archives.

use std::sync::Arc;

use crate::bytes::ByteTracker;
use crate::compress::{Compressor, DeflateExecutionCompressor};
use crate::layout::AlignmentRule;
use crate::verify::{VerifyLogFactory, VerifyLogs};

/// Options for a [`ZFile`](crate::ZFile).
///
/// Each archive clones the options when it is opened, so changing an options
/// value afterwards never affects archives that are already open. The byte
/// tracker is shared through an `Arc` so callers can watch memory use.
///
/// # Examples
///
/// ```rust
/// use zfile::ZFileOptions;
/// use zfile::layout::AlignmentRule;
///
/// let options = ZFileOptions::new()
///     .no_timestamps(true)
///     .auto_sort_files(true)
///     .alignment_rule(AlignmentRule::constant_for_suffix(".so", 4096)?);
/// assert!(options.no_timestamps);
/// # Ok::<(), zfile::Error>(())
/// ```
#[derive(Clone)]
pub struct ZFileOptions {
    /// Accounts for entry data buffered in memory.
    pub tracker: Arc<ByteTracker>,
    /// Compresses added entries.
    pub compressor: Arc<dyn Compressor>,
    /// Whether to write all timestamps as zero.
    pub no_timestamps: bool,
    /// Alignment of stored entries.
    pub alignment_rule: AlignmentRule,
    /// Whether to absorb gaps into extra fields instead of leaving them
    /// unreferenced.
    pub cover_empty_space_using_extra_field: bool,
    /// Whether to sort entries by name before each update.
    pub auto_sort_files: bool,
    /// Creates the verify logs of the archive and its entries.
    pub verify_log_factory: VerifyLogFactory,
    /// Whether to skip checking local headers against the central directory
    /// when opening.
    pub skip_validation: bool,
}

impl Default for ZFileOptions {
    fn default() -> Self {
        Self {
            tracker: Arc::new(ByteTracker::unlimited()),
            compressor: Arc::new(DeflateExecutionCompressor::default()),
            no_timestamps: false,
            alignment_rule: AlignmentRule::Constant(4),
            cover_empty_space_using_extra_field: false,
            auto_sort_files: false,
            verify_log_factory: VerifyLogs::devnull_factory(),
            skip_validation: false,
        }
    }
}

impl std::fmt::Debug for ZFileOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZFileOptions")
            .field("tracker", &self.tracker)
            .field("no_timestamps", &self.no_timestamps)
            .field("alignment_rule", &self.alignment_rule)
            .field(
                "cover_empty_space_using_extra_field",
                &self.cover_empty_space_using_extra_field,
            )
            .field("auto_sort_files", &self.auto_sort_files)
            .field("skip_validation", &self.skip_validation)
            .finish_non_exhaustive()
    }
}

impl ZFileOptions {
    /// Creates options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the byte tracker.
    pub fn tracker(mut self, tracker: Arc<ByteTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Sets the compressor.
    pub fn compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Zeroes every timestamp, for reproducible output.
    pub fn no_timestamps(mut self, no_timestamps: bool) -> Self {
        self.no_timestamps = no_timestamps;
        self
    }

    /// Sets the alignment rule.
    pub fn alignment_rule(mut self, rule: AlignmentRule) -> Self {
        self.alignment_rule = rule;
        self
    }

    /// Absorbs gaps into extra fields.
    pub fn cover_empty_space_using_extra_field(mut self, cover: bool) -> Self {
        self.cover_empty_space_using_extra_field = cover;
        self
    }

    /// Sorts entries by name before each update.
    pub fn auto_sort_files(mut self, sort: bool) -> Self {
        self.auto_sort_files = sort;
        self
    }

    /// Sets the verify log factory.
    pub fn verify_log_factory(mut self, factory: VerifyLogFactory) -> Self {
        self.verify_log_factory = factory;
        self
    }

    /// Skips local header validation when opening.
    pub fn skip_validation(mut self, skip: bool) -> Self {
        self.skip_validation = skip;
        self
    }
}
