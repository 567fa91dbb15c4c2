//! Allocators: a bump pointer, and the TLAB allocator each mutator owns.

pub(crate) mod allocator;
pub use allocator::AllocationError;

mod bumppointer;
pub use bumppointer::BumpPointer;

mod tlab_allocator;
pub use tlab_allocator::TlabAllocator;
