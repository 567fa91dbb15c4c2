use crate::util::alloc::AllocationError;
use crate::util::ObjectReference;
use crate::vm::VMBinding;

/// How the collector interacts with the runtime around a collection.
pub trait Collection<VM: VMBinding> {
    /// Stop all mutator threads at a safepoint. Returns when they are stopped.
    fn stop_all_mutators();

    /// Resume the mutators stopped by `stop_all_mutators`.
    fn resume_mutators();

    /// Called right after the forwarding pointer of `from` was installed. `to` is
    /// where the object lives once the collection completes. A debugger watching the
    /// forwarding word of `from` observes the move at this point.
    fn post_forwarding(_from: ObjectReference, _to: ObjectReference) {}

    /// The heap is exhausted. The error is also returned to the caller that
    /// requested the collection; the default only logs it.
    fn out_of_memory(err: &AllocationError) {
        error!("Out of memory: {}", err);
    }
}
