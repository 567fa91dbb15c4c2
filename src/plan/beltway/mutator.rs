use super::global::BeltwayHeap;
use crate::util::alloc::TlabAllocator;
use crate::util::Address;
use crate::vm::VMBinding;

/// The per-thread allocation context of a mutator.
pub struct Mutator<'a, VM: VMBinding> {
    allocator: TlabAllocator<'a, VM>,
}

impl<'a, VM: VMBinding> Mutator<'a, VM> {
    pub fn new(heap: &'a BeltwayHeap<VM>) -> Self {
        Mutator {
            allocator: TlabAllocator::new(heap),
        }
    }

    pub fn heap(&self) -> &'a BeltwayHeap<VM> {
        self.allocator.heap()
    }

    /// Allocate zeroed memory. Returns `Address::ZERO` if a collection is needed.
    pub fn alloc(&mut self, size: usize) -> Address {
        self.allocator.alloc(size)
    }

    /// Give back the unused part of the current TLAB. Called when the thread exits
    /// or before the heap is walked.
    pub fn flush(&mut self) {
        self.allocator.retire_tlab();
    }
}
