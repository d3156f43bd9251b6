//! Map of which bytes of the archive are used by what.

use std::collections::BTreeMap;
use std::fmt;

use crate::format::extra::alignment_padding;

/// What a block of the archive holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockOwner {
    /// Unused bytes.
    Free,
    /// The local header, data and data descriptor of an entry.
    Entry(String),
    /// The central directory.
    CentralDirectory,
    /// The end of central directory record.
    Eocd,
}

impl fmt::Display for BlockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => f.write_str("free space"),
            Self::Entry(name) => f.write_str(name),
            Self::CentralDirectory => f.write_str("Central Directory"),
            Self::Eocd => f.write_str("End of Central Directory"),
        }
    }
}

/// A contiguous range of the archive with a single owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// First byte of the block.
    pub start: u64,
    /// One past the last byte of the block.
    pub end: u64,
    /// What the bytes hold.
    pub owner: BlockOwner,
}

impl Block {
    /// Returns the size of the block.
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    /// Returns `true` if the block is unused.
    pub fn is_free(&self) -> bool {
        self.owner == BlockOwner::Free
    }
}

/// Where a new entry should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Offset of the local header.
    pub offset: u64,
    /// Alignment padding to add to the local extra field.
    pub padding: usize,
}

/// Ordered map of blocks covering `[0, size)` of the archive.
///
/// Free blocks are never adjacent: they are merged as soon as a block is
/// freed, so the gap list is always exact.
#[derive(Debug, Clone, Default)]
pub struct FileUseMap {
    // Keyed by block start.
    blocks: BTreeMap<u64, Block>,
    size: u64,
}

impl FileUseMap {
    /// Creates a map of `size` free bytes.
    pub fn new(size: u64) -> Self {
        let mut map = Self::default();
        map.extend(size);
        map
    }

    /// Returns the size covered by the map.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the end of the last used block.
    pub fn used_size(&self) -> u64 {
        self.blocks
            .values()
            .rev()
            .find(|b| !b.is_free())
            .map_or(0, |b| b.end)
    }

    /// Grows the map to `new_size` bytes of which the added ones are free.
    ///
    /// Does nothing if the map is already that large.
    pub fn extend(&mut self, new_size: u64) {
        if new_size <= self.size {
            return;
        }
        let start = self.size;
        self.size = new_size;
        self.insert_free(start, new_size);
    }

    /// Drops trailing free space.
    pub fn truncate(&mut self) {
        let Some(last) = self.blocks.values().next_back().cloned() else {
            return;
        };
        if last.is_free() {
            self.blocks.remove(&last.start);
            self.size = last.start;
        }
    }

    /// Marks `[start, end)` as used by `owner`, growing the map if needed.
    ///
    /// # Errors
    ///
    /// Returns the owner of a used block overlapping the range.
    pub fn add(&mut self, start: u64, end: u64, owner: BlockOwner) -> Result<(), BlockOwner> {
        debug_assert!(start <= end);
        debug_assert!(owner != BlockOwner::Free);
        if start == end {
            return Ok(());
        }
        self.extend(end);

        let containing = self.block_at(start).cloned();
        let Some(free) = containing.filter(|b| b.is_free() && b.end >= end) else {
            let conflict = self
                .blocks
                .range(..end)
                .rev()
                .map(|(_, b)| b)
                .take_while(|b| b.end > start)
                .find(|b| !b.is_free())
                .map(|b| b.owner.clone())
                .unwrap_or(BlockOwner::Free);
            return Err(conflict);
        };

        self.blocks.remove(&free.start);
        if free.start < start {
            self.put(free.start, start, BlockOwner::Free);
        }
        self.put(start, end, owner);
        if end < free.end {
            self.put(end, free.end, BlockOwner::Free);
        }
        log::trace!("file map: [{}, {}) used", start, end);
        Ok(())
    }

    /// Frees the used block starting at `start` and merges it with free
    /// neighbours.
    ///
    /// Returns the owner the block had, or `None` if no used block starts at
    /// `start`.
    pub fn remove(&mut self, start: u64) -> Option<BlockOwner> {
        let block = self.blocks.get(&start).filter(|b| !b.is_free())?.clone();
        self.blocks.remove(&start);
        self.insert_free(block.start, block.end);
        log::trace!(
            "file map: [{}, {}) freed from {}",
            block.start,
            block.end,
            block.owner
        );
        Some(block.owner)
    }

    /// Frees the block owned by `owner`, if any.
    pub fn remove_owner(&mut self, owner: &BlockOwner) -> Option<u64> {
        let start = self.blocks.values().find(|b| &b.owner == owner)?.start;
        self.remove(start);
        Some(start)
    }

    /// Finds a place for an entry of `size` bytes (padding excluded) whose
    /// data starts `header_size` bytes after its local header.
    ///
    /// First fit: the gap with the lowest offset that can hold the entry
    /// wins. If none can, the entry goes right after the last used block.
    pub fn locate_free(&self, size: u64, header_size: u64, alignment: u64) -> Placement {
        let used_end = self.used_size();
        for block in self.blocks.values().filter(|b| b.is_free()) {
            if block.start >= used_end {
                break;
            }
            let padding = alignment_padding(block.start + header_size, alignment);
            if block.start + size + padding as u64 <= block.end {
                log::trace!(
                    "file map: {} bytes fit the gap [{}, {})",
                    size,
                    block.start,
                    block.end
                );
                return Placement {
                    offset: block.start,
                    padding,
                };
            }
        }
        Placement {
            offset: used_end,
            padding: alignment_padding(used_end + header_size, alignment),
        }
    }

    /// Returns the free blocks before the end of the used space, in offset
    /// order.
    pub fn gaps(&self) -> Vec<(u64, u64)> {
        let used_end = self.used_size();
        self.blocks
            .values()
            .filter(|b| b.is_free() && b.end <= used_end)
            .map(|b| (b.start, b.end))
            .collect()
    }

    /// Returns every block in offset order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// Returns the block containing `offset`.
    pub fn block_at(&self, offset: u64) -> Option<&Block> {
        self.blocks
            .range(..=offset)
            .next_back()
            .map(|(_, b)| b)
            .filter(|b| offset < b.end)
    }

    fn put(&mut self, start: u64, end: u64, owner: BlockOwner) {
        self.blocks.insert(start, Block { start, end, owner });
    }

    fn insert_free(&mut self, mut start: u64, mut end: u64) {
        if start == end {
            return;
        }
        if let Some(prev) = self
            .blocks
            .range(..start)
            .next_back()
            .map(|(_, b)| b.clone())
            .filter(|b| b.is_free() && b.end == start)
        {
            self.blocks.remove(&prev.start);
            start = prev.start;
        }
        if let Some(next) = self.blocks.get(&end).filter(|b| b.is_free()).cloned() {
            self.blocks.remove(&next.start);
            end = next.end;
        }
        self.put(start, end, BlockOwner::Free);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> BlockOwner {
        BlockOwner::Entry(name.to_string())
    }

    #[test]
    fn test_new_map_is_one_free_block() {
        let map = FileUseMap::new(100);
        assert_eq!(map.size(), 100);
        assert_eq!(map.used_size(), 0);
        assert_eq!(map.blocks().count(), 1);
        assert!(map.gaps().is_empty());
    }

    #[test]
    fn test_add_splits_free_block() {
        let mut map = FileUseMap::new(100);
        map.add(10, 20, entry("a")).unwrap();
        let blocks: Vec<_> = map.blocks().map(|b| (b.start, b.end, b.is_free())).collect();
        assert_eq!(blocks, vec![(0, 10, true), (10, 20, false), (20, 100, true)]);
        assert_eq!(map.gaps(), vec![(0, 10)]);
    }

    #[test]
    fn test_add_beyond_end_extends() {
        let mut map = FileUseMap::new(0);
        map.add(0, 30, entry("a")).unwrap();
        map.add(40, 50, BlockOwner::CentralDirectory).unwrap();
        assert_eq!(map.size(), 50);
        assert_eq!(map.gaps(), vec![(30, 40)]);
    }

    #[test]
    fn test_overlap_reports_owner() {
        let mut map = FileUseMap::new(0);
        map.add(0, 30, entry("a")).unwrap();
        assert_eq!(map.add(20, 40, entry("b")), Err(entry("a")));
        map.add(50, 60, BlockOwner::CentralDirectory).unwrap();
        assert_eq!(map.add(35, 55, entry("c")), Err(BlockOwner::CentralDirectory));
    }

    #[test]
    fn test_adjacent_gaps_coalesce() {
        let mut map = FileUseMap::new(0);
        map.add(0, 10, entry("a")).unwrap();
        map.add(10, 25, entry("b")).unwrap();
        map.add(25, 30, entry("c")).unwrap();

        map.remove(0);
        map.remove(10);
        assert_eq!(map.gaps(), vec![(0, 25)]);
        assert_eq!(map.blocks().count(), 2);
    }

    #[test]
    fn test_remove_merges_both_sides() {
        let mut map = FileUseMap::new(0);
        map.add(0, 10, entry("a")).unwrap();
        map.add(10, 20, entry("b")).unwrap();
        map.add(20, 30, entry("c")).unwrap();
        map.add(30, 40, entry("d")).unwrap();
        map.remove(0);
        map.remove(20);
        assert_eq!(map.remove(10), Some(entry("b")));
        assert_eq!(map.gaps(), vec![(0, 30)]);
        assert_eq!(map.remove(10), None);
    }

    #[test]
    fn test_first_fit() {
        let mut map = FileUseMap::new(0);
        map.add(0, 10, entry("a")).unwrap();
        map.add(10, 50, entry("b")).unwrap();
        map.add(50, 60, entry("c")).unwrap();
        map.add(60, 100, entry("d")).unwrap();
        map.add(100, 110, entry("e")).unwrap();
        map.remove(10);
        map.remove(60);

        // Both gaps fit 30 bytes: the lower one wins.
        assert_eq!(map.locate_free(30, 0, 1).offset, 10);
        // Nothing fits 45 bytes: append after the last used block.
        assert_eq!(map.locate_free(45, 0, 1).offset, 110);
    }

    #[test]
    fn test_locate_with_alignment() {
        let mut map = FileUseMap::new(0);
        map.add(0, 10, entry("a")).unwrap();
        map.add(10, 30, entry("b")).unwrap();
        map.add(30, 40, entry("c")).unwrap();
        map.remove(10);

        // Data at 10 + 30 = 40 is aligned to 4.
        let p = map.locate_free(20, 30, 4);
        assert_eq!(p, Placement { offset: 10, padding: 0 });

        // Data would start at 41; padding 7 makes it 48 but 27 bytes no longer fit.
        // At the end, data starts at 71 and needs 9 bytes to reach 80.
        let p = map.locate_free(20, 31, 4);
        assert_eq!(p, Placement { offset: 40, padding: 9 });
    }

    #[test]
    fn test_truncate() {
        let mut map = FileUseMap::new(0);
        map.add(0, 10, entry("a")).unwrap();
        map.add(10, 20, entry("b")).unwrap();
        map.remove(10);
        assert_eq!(map.size(), 20);
        map.truncate();
        assert_eq!(map.size(), 10);
        assert_eq!(map.used_size(), 10);
    }

    #[test]
    fn test_remove_owner() {
        let mut map = FileUseMap::new(0);
        map.add(0, 10, entry("a")).unwrap();
        map.add(10, 20, BlockOwner::CentralDirectory).unwrap();
        assert_eq!(map.remove_owner(&BlockOwner::CentralDirectory), Some(10));
        assert_eq!(map.remove_owner(&BlockOwner::Eocd), None);
    }
}
