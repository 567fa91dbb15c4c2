//! VM-to-Beltway interface: safe Rust APIs.
//!
//! This module provides a safe Rust API for a language runtime to use the Beltway
//! heap. A runtime creates the heap once with [`beltway_init`], binds a
//! [`Mutator`] to each of its threads with [`bind_mutator`], and allocates through it.
//! Allocation never collects: when it returns `Address::ZERO` the runtime brings its
//! threads to a safepoint and calls [`handle_collection_request`], or uses
//! [`alloc_or_collect`], which does both.

use crate::plan::beltway::{BeltwayHeap, Mutator};
use crate::util::alloc::AllocationError;
use crate::util::options::Options;
use crate::util::{Address, ObjectReference};
use crate::vm::VMBinding;

/// Initialize the heap. The heap lives for the rest of the process.
///
/// A bad configuration is fatal: this panics with the reason.
///
/// Arguments:
/// * `options`: The heap options, usually `Options::default()`, which reads `BELTWAY_` environment variables.
pub fn beltway_init<VM: VMBinding>(options: Options) -> &'static BeltwayHeap<VM> {
    match crate::util::logger::try_init() {
        Ok(_) => debug!("Beltway initialized the logger."),
        Err(_) => debug!(
            "Beltway failed to initialize the logger. Possibly a logger has been initialized by user."
        ),
    }
    match BeltwayHeap::new(options) {
        Ok(heap) => Box::leak(Box::new(heap)),
        Err(e) => panic!("Invalid Beltway heap configuration: {}", e),
    }
}

/// Request the heap to create a mutator for the current thread. The returned mutator
/// must only be used by that thread.
pub fn bind_mutator<VM: VMBinding>(heap: &BeltwayHeap<VM>) -> Box<Mutator<'_, VM>> {
    Box::new(Mutator::new(heap))
}

/// Release the resources of a mutator when its thread exits.
pub fn destroy_mutator<VM: VMBinding>(mutator: &mut Mutator<VM>) {
    mutator.flush();
}

/// Allocate zeroed memory for an object. Returns `Address::ZERO` if the heap needs
/// a collection first. This never blocks and never collects.
///
/// Arguments:
/// * `mutator`: The mutator of the current thread.
/// * `size`: The number of bytes required, rounded up to the minimal object size.
pub fn alloc<VM: VMBinding>(mutator: &mut Mutator<VM>, size: usize) -> Address {
    mutator.alloc(size)
}

/// Allocate, collecting once if eden is exhausted. The caller must be at a point where
/// a collection is allowed, and every other mutator must be able to reach a safepoint.
pub fn alloc_or_collect<VM: VMBinding>(
    mutator: &mut Mutator<VM>,
    size: usize,
) -> Result<Address, AllocationError> {
    let result = mutator.alloc(size);
    if !result.is_zero() {
        return Ok(result);
    }
    mutator.heap().collect_garbage(size)?;
    let result = mutator.alloc(size);
    if result.is_zero() {
        Err(AllocationError::OutOfMemory { requested: size })
    } else {
        Ok(result)
    }
}

/// Run a collection cycle. See [`BeltwayHeap::collect_garbage`].
pub fn handle_collection_request<VM: VMBinding>(
    heap: &BeltwayHeap<VM>,
    requested_free_space: usize,
) -> Result<bool, AllocationError> {
    heap.collect_garbage(requested_free_space)
}

/// Store `target` into the reference slot `slot` of `src`, with the write barrier.
pub fn object_reference_write<VM: VMBinding>(
    heap: &BeltwayHeap<VM>,
    src: ObjectReference,
    slot: Address,
    target: ObjectReference,
) {
    unsafe { slot.store(target) };
    heap.write_barrier(src, slot, target);
}

/// The write barrier alone, for a binding that performs the store itself.
pub fn write_barrier<VM: VMBinding>(
    heap: &BeltwayHeap<VM>,
    src: ObjectReference,
    slot: Address,
    target: ObjectReference,
) {
    heap.write_barrier(src, slot, target);
}

/// Is the address inside the heap?
pub fn is_in_heap<VM: VMBinding>(heap: &BeltwayHeap<VM>, addr: Address) -> bool {
    heap.contains(addr)
}

/// The address of the block an inspector reads the heap state from.
pub fn inspectable_heap_info<VM: VMBinding>(heap: &BeltwayHeap<VM>) -> Address {
    heap.inspectable().address()
}
