//! Placement of entries in the archive.
//!
//! [`FileUseMap`] knows which byte ranges are used and by what, and finds
//! room for new entries. [`AlignmentRule`] decides where stored entry data
//! has to start.

mod alignment;
mod file_use_map;

pub use alignment::{AlignmentRule, MAX_ALIGNMENT, NO_ALIGNMENT};
pub use file_use_map::{Block, BlockOwner, FileUseMap, Placement};
