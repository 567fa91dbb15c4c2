use crate::util::{Address, ObjectReference};
use crate::vm::VMBinding;

/// Where references live.
///
/// Visitors receive slot addresses: each slot holds an [`ObjectReference`] (or null),
/// and the collector may overwrite the slot with the new location of the object.
pub trait Scanning<VM: VMBinding> {
    /// Visit every root slot: thread stacks, registers, globals. Called while the
    /// mutators are stopped.
    fn scan_roots(visitor: &mut dyn FnMut(Address));

    /// Visit every reference slot of an object.
    fn scan_object(object: ObjectReference, visitor: &mut dyn FnMut(Address));
}
