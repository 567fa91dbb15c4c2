use crate::util::conversions::bytes_to_formatted_string;
use crate::util::memory;
use crate::util::Address;
use atomic::Atomic;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::Ordering;

/// A contiguous sub-range `[start, end)` of the heap with an allocation mark.
/// Memory below the mark is allocated, memory above it is free and zeroed.
///
/// Mutators only ever advance the mark, with a CAS. The bounds and the mark are
/// only moved backwards by the collector while mutators are stopped.
pub struct Belt {
    name: &'static str,
    index: usize,
    start: Atomic<Address>,
    end: Atomic<Address>,
    mark: Atomic<Address>,
}

impl Belt {
    pub fn new(name: &'static str, index: usize, start: Address, end: Address) -> Self {
        debug_assert!(start <= end);
        Belt {
            name,
            index,
            start: Atomic::new(start),
            end: Atomic::new(end),
            mark: Atomic::new(start),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The position of this belt, 0 being the youngest.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn start(&self) -> Address {
        self.start.load(Ordering::Relaxed)
    }

    pub fn end(&self) -> Address {
        self.end.load(Ordering::Relaxed)
    }

    pub fn allocation_mark(&self) -> Address {
        self.mark.load(Ordering::Acquire)
    }

    pub fn size(&self) -> usize {
        self.end() - self.start()
    }

    pub fn used(&self) -> usize {
        self.allocation_mark() - self.start()
    }

    pub fn remaining(&self) -> usize {
        self.end() - self.allocation_mark()
    }

    pub fn range(&self) -> Range<Address> {
        self.start()..self.end()
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.start() <= addr && addr < self.end()
    }

    /// Is the address inside the allocated part of the belt?
    pub fn contains_allocated(&self, addr: Address) -> bool {
        self.start() <= addr && addr < self.allocation_mark()
    }

    /// Allocate `size` bytes at the mark. Returns None if the belt has no room left.
    /// Safe to call from multiple threads.
    pub fn bump_allocate(&self, size: usize) -> Option<Address> {
        let end = self.end();
        let mut old = self.mark.load(Ordering::Relaxed);
        loop {
            let new = old + size;
            if new > end {
                return None;
            }
            match self
                .mark
                .compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return Some(old),
                Err(current) => old = current,
            }
        }
    }

    /// Move the mark. Only the collector does this, while mutators are stopped.
    pub fn set_allocation_mark(&self, mark: Address) {
        debug_assert!(self.start() <= mark && mark <= self.end());
        self.mark.store(mark, Ordering::Release);
    }

    /// Zero the allocated memory and move the mark back to the start.
    pub fn reset(&self) {
        let start = self.start();
        memory::zero(start, self.allocation_mark() - start);
        self.mark.store(start, Ordering::Release);
    }

    /// Zero `[mark, old_mark)`, the memory freed by sliding objects down.
    pub(crate) fn zero_above_mark(&self, old_mark: Address) {
        let mark = self.allocation_mark();
        if old_mark > mark {
            memory::zero(mark, old_mark - mark);
        }
    }

    pub(crate) fn set_bounds(&self, start: Address, end: Address) {
        debug_assert!(start <= end);
        self.start.store(start, Ordering::Relaxed);
        self.end.store(end, Ordering::Relaxed);
    }
}

impl fmt::Display for Belt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} [{}, {}) mark {} used {} free {}",
            self.name,
            self.start(),
            self.end(),
            self.allocation_mark(),
            bytes_to_formatted_string(self.used()),
            bytes_to_formatted_string(self.remaining())
        )
    }
}

impl fmt::Debug for Belt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
