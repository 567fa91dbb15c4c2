use crate::util::Address;
use crate::util::ObjectReference;
use crate::vm::ObjectModel;
use crate::vm::VMBinding;
use std::marker::PhantomData;

/// Iterate over an address range of contiguously allocated objects, stepping by each
/// object's size. Belts are always linearly parseable from their start to their
/// allocation mark: TLAB tails are formatted by [`ObjectModel::fill_gap`], and the
/// collector copies and slides objects without leaving holes.
pub struct ObjectIterator<VM: VMBinding> {
    end: Address,
    cursor: Address,
    _p: PhantomData<VM>,
}

impl<VM: VMBinding> ObjectIterator<VM> {
    /// Create an iterator for the address range. The caller must ensure the range
    /// starts at an object and ends at an object boundary.
    pub fn new(start: Address, end: Address) -> Self {
        debug_assert!(start <= end);
        ObjectIterator {
            end,
            cursor: start,
            _p: PhantomData,
        }
    }
}

impl<VM: VMBinding> std::iter::Iterator for ObjectIterator<VM> {
    type Item = ObjectReference;

    fn next(&mut self) -> Option<<Self as Iterator>::Item> {
        if self.cursor >= self.end {
            return None;
        }
        let object = VM::VMObjectModel::address_to_ref(self.cursor);
        let size = VM::VMObjectModel::get_current_size(object);
        debug_assert!(
            size >= VM::VMObjectModel::MIN_OBJECT_SIZE,
            "Object {} has size {}, the heap is not parseable",
            object,
            size
        );
        self.cursor += size;
        debug_assert!(self.cursor <= self.end);
        Some(object)
    }
}
