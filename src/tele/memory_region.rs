use crate::util::Address;
use std::fmt;
use std::ops::Range;

/// A span of memory in the observed process.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct MemoryRegion {
    start: Address,
    size: usize,
}

impl MemoryRegion {
    pub const fn new(start: Address, size: usize) -> Self {
        MemoryRegion { start, size }
    }

    pub fn from_range(range: Range<Address>) -> Self {
        MemoryRegion::new(range.start, range.end - range.start)
    }

    pub const fn start(&self) -> Address {
        self.start
    }

    pub const fn size(&self) -> usize {
        self.size
    }

    pub fn end(&self) -> Address {
        self.start + self.size
    }

    pub fn range(&self) -> Range<Address> {
        self.start..self.end()
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.start <= addr && addr < self.end()
    }

    /// Do the two regions share at least one byte?
    pub fn overlaps(&self, other: &MemoryRegion) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end() && other.start < self.end()
    }

    /// The same size, at another start.
    pub fn moved_to(&self, start: Address) -> Self {
        MemoryRegion::new(start, self.size)
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end())
    }
}

impl fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
