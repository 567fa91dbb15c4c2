use crate::util::{Address, ObjectReference};
use crate::vm::VMBinding;

/// How objects are laid out in memory.
///
/// The belt collector needs very little from an object: its size, one word it can
/// own during a collection (the forwarding word), and a way to format the unused
/// tail of a TLAB so belts stay linearly parseable.
pub trait ObjectModel<VM: VMBinding> {
    /// The offset of the forwarding word from the object's origin. Outside a
    /// collection the collector keeps this word zero.
    const FORWARDING_POINTER_OFFSET: isize;

    /// The smallest object. Every object and every gap filler is at least this big.
    const MIN_OBJECT_SIZE: usize;

    /// The current size of the object in bytes, a multiple of `VM::MIN_ALIGNMENT`.
    fn get_current_size(object: ObjectReference) -> usize;

    /// The object whose allocation starts at `start`.
    fn address_to_ref(start: Address) -> ObjectReference;

    /// The start of the allocation of an object.
    fn ref_to_object_start(object: ObjectReference) -> Address;

    /// Format `[start, start + size)` as a dead object with no references.
    /// `size` is at least `MIN_OBJECT_SIZE`.
    fn fill_gap(start: Address, size: usize);

    /// Copy an object to `to`, which has room for `get_current_size(from)` bytes.
    /// Returns the new object. The default is a plain memory copy.
    fn copy_to(from: ObjectReference, to: Address) -> ObjectReference {
        let size = Self::get_current_size(from);
        let src = Self::ref_to_object_start(from);
        unsafe {
            std::ptr::copy(src.to_ptr::<u8>(), to.to_mut_ptr::<u8>(), size);
        }
        Self::address_to_ref(to)
    }
}
