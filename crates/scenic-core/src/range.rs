//! Half-open instance ranges.

use std::ops::Range;

/// Half-open `[start, end)` range of instances within one primitive's
/// instance block. An empty range hides the primitive. `start <= end`
/// always holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct InstanceRange {
    start: u32,
    end: u32,
}

impl InstanceRange {
    /// The empty range `[0, 0)`.
    pub const EMPTY: Self = Self { start: 0, end: 0 };

    /// Create a range; `end` is raised to `start` if it is smaller.
    #[inline]
    pub const fn new(start: u32, end: u32) -> Self {
        let end = if end < start { start } else { end };
        Self { start, end }
    }

    /// `[0, count)`.
    #[inline]
    pub const fn full(count: u32) -> Self {
        Self { start: 0, end: count }
    }

    #[inline]
    pub const fn start(&self) -> u32 {
        self.start
    }

    #[inline]
    pub const fn end(&self) -> u32 {
        self.end
    }

    #[inline]
    pub const fn len(&self) -> u32 {
        self.end - self.start
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Restrict the range to `[0, count)`.
    pub fn clamp(self, count: u32) -> Self {
        let start = self.start.min(count);
        Self::new(start, self.end.min(count))
    }
}

impl From<Range<u32>> for InstanceRange {
    fn from(range: Range<u32>) -> Self {
        Self::new(range.start, range.end)
    }
}

impl From<InstanceRange> for Range<u32> {
    fn from(range: InstanceRange) -> Self {
        range.start..range.end
    }
}
