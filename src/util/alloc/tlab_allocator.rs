use super::allocator::allocation_size;
use super::BumpPointer;
use crate::plan::beltway::BeltwayHeap;
use crate::util::Address;
use crate::vm::ObjectModel;
use crate::vm::VMBinding;

/// A thread-local allocation buffer allocator. Each mutator owns one.
///
/// The fast path bumps inside the current TLAB. The slow path refills a TLAB from the
/// youngest belt, then falls back to a direct bump in the youngest belt, and finally
/// returns `Address::ZERO`, which tells the caller a collection is needed. The
/// allocator never blocks and never triggers a collection.
pub struct TlabAllocator<'a, VM: VMBinding> {
    heap: &'a BeltwayHeap<VM>,
    /// The usable part of the TLAB. The limit stays `MIN_OBJECT_SIZE` below the end
    /// of the TLAB so the tail can always be formatted as a filler object.
    tlab: BumpPointer,
    tlab_end: Address,
    /// The heap's TLAB epoch when the TLAB was refilled. A different epoch means
    /// the youngest belt was reset underneath the TLAB.
    epoch: u64,
}

impl<'a, VM: VMBinding> TlabAllocator<'a, VM> {
    pub fn new(heap: &'a BeltwayHeap<VM>) -> Self {
        TlabAllocator {
            heap,
            tlab: BumpPointer::empty(),
            tlab_end: Address::ZERO,
            epoch: heap.tlab_epoch(),
        }
    }

    pub fn heap(&self) -> &'a BeltwayHeap<VM> {
        self.heap
    }

    /// Allocate `size` bytes of zeroed memory. Returns `Address::ZERO` if the
    /// youngest belt is exhausted.
    pub fn alloc(&mut self, size: usize) -> Address {
        let size = allocation_size::<VM>(size);
        self.check_epoch();
        if let Some(result) = self.tlab.alloc(size) {
            return result;
        }
        self.alloc_slow(size)
    }

    fn alloc_slow(&mut self, size: usize) -> Address {
        let eden = self.heap.belts().youngest();
        if self.heap.options().use_tlabs {
            self.retire_tlab();
            let tlab_size = self
                .heap
                .options()
                .tlab_size
                .max(size + VM::VMObjectModel::MIN_OBJECT_SIZE);
            if let Some(start) = eden.bump_allocate(tlab_size) {
                trace!("Refilled TLAB [{}, {})", start, start + tlab_size);
                self.tlab_end = start + tlab_size;
                self.tlab
                    .reset(start, self.tlab_end - VM::VMObjectModel::MIN_OBJECT_SIZE);
                self.epoch = self.heap.tlab_epoch();
                if let Some(result) = self.tlab.alloc(size) {
                    return result;
                }
            }
        }
        match eden.bump_allocate(size) {
            Some(result) => {
                trace!("Allocated {} bytes directly in {}", size, eden.name());
                result
            }
            None => {
                debug!("{} is exhausted, a {} byte allocation must collect", eden.name(), size);
                Address::ZERO
            }
        }
    }

    /// Drop the TLAB if the youngest belt was reset since the refill. The memory it
    /// covered no longer belongs to us.
    fn check_epoch(&mut self) {
        let epoch = self.heap.tlab_epoch();
        if self.epoch != epoch {
            self.tlab = BumpPointer::empty();
            self.tlab_end = Address::ZERO;
            self.epoch = epoch;
        }
    }

    /// Format the unused tail of the TLAB as a filler object and drop the TLAB.
    pub fn retire_tlab(&mut self) {
        self.check_epoch();
        if !self.tlab.is_empty() {
            let cursor = self.tlab.cursor;
            VM::VMObjectModel::fill_gap(cursor, self.tlab_end - cursor);
            self.tlab = BumpPointer::empty();
            self.tlab_end = Address::ZERO;
        }
    }
}
