//! Byte sources and byte accounting.
//!
//! Entry data that is not yet written to the archive lives in
//! [`ByteSource`]s. Sources holding memory are created through a
//! [`ByteTracker`], which keeps a running total so the amount of buffered
//! data can be bounded and observed.

mod source;
mod tracker;

pub use source::ByteSource;
pub use tracker::{ByteTracker, TrackerGuard};
