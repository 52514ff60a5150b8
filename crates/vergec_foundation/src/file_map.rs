//! The preprocessor-produced file resolution map.
//!
//! Grounded on `original_source/floral/src/Lexer.hpp`'s `FileRegion`/
//! `FileLocation` pair: the preprocessor closes a range each time it enters
//! or leaves an `#include`, and every later diagnostic resolves a byte
//! offset back to the file that produced it through this map.

use std::sync::Arc;

/// One contiguous range of expanded-source bytes that came from a single
/// file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRange {
    /// First byte of the range, inclusive.
    pub start: usize,
    /// Last byte of the range, exclusive.
    pub end: usize,
    /// The file this range came from.
    pub file: Arc<str>,
}

impl FileRange {
    /// True if `pos` falls within this range.
    #[must_use]
    pub fn contains(&self, pos: usize) -> bool {
        pos >= self.start && pos < self.end
    }
}

/// An ordered sequence of file ranges covering the expanded source.
///
/// Ranges are appended in the order the preprocessor closes them and are
/// searched linearly; a translation unit rarely has more than a handful of
/// `#include`s, so this is simpler than a binary-search index for no
/// measurable cost.
#[derive(Clone, Debug, Default)]
pub struct FileResolutionMap {
    ranges: Vec<FileRange>,
}

impl FileResolutionMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a range to the map.
    pub fn push(&mut self, start: usize, end: usize, file: impl Into<Arc<str>>) {
        self.ranges.push(FileRange {
            start,
            end,
            file: file.into(),
        });
    }

    /// Resolves a byte offset to the file it came from, if any range covers
    /// it.
    #[must_use]
    pub fn resolve(&self, pos: usize) -> Option<&Arc<str>> {
        self.ranges.iter().find(|r| r.contains(pos)).map(|r| &r.file)
    }

    /// All ranges in the map, in append order.
    #[must_use]
    pub fn ranges(&self) -> &[FileRange] {
        &self.ranges
    }

    /// True if every byte in `[0, end)` falls in exactly one range (no gap,
    /// no overlap) — the universal invariant every preprocessor run must
    /// satisfy.
    #[must_use]
    pub fn is_contiguous_up_to(&self, end: usize) -> bool {
        let mut sorted: Vec<&FileRange> = self.ranges.iter().collect();
        sorted.sort_by_key(|r| r.start);
        let mut cursor = 0usize;
        for range in sorted {
            if range.start != cursor {
                return false;
            }
            cursor = range.end;
        }
        cursor == end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_within_range() {
        let mut map = FileResolutionMap::new();
        map.push(0, 10, "main.vg");
        map.push(10, 20, "lib.vg");
        assert_eq!(map.resolve(5).map(Arc::as_ref), Some("main.vg"));
        assert_eq!(map.resolve(15).map(Arc::as_ref), Some("lib.vg"));
        assert_eq!(map.resolve(25), None);
    }

    #[test]
    fn contiguity_check() {
        let mut map = FileResolutionMap::new();
        map.push(0, 10, "main.vg");
        map.push(10, 20, "lib.vg");
        assert!(map.is_contiguous_up_to(20));
        map.push(25, 30, "gap.vg");
        assert!(!map.is_contiguous_up_to(30));
    }
}
