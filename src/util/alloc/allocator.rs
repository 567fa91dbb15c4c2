use crate::util::conversions::raw_align_up;
use crate::util::conversions::bytes_to_formatted_string;
use crate::vm::ObjectModel;
use crate::vm::VMBinding;
use std::fmt;

/// Errors returned by allocation and collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationError {
    /// The collector could not free enough memory. Once this is returned, the heap
    /// stays out of memory and later collection requests fail immediately.
    OutOfMemory {
        /// The allocation (or requested free space) that could not be satisfied.
        requested: usize,
    },
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AllocationError::OutOfMemory { requested } => write!(
                f,
                "heap exhausted, could not provide {}",
                bytes_to_formatted_string(*requested)
            ),
        }
    }
}

impl std::error::Error for AllocationError {}

/// The number of bytes actually allocated for a request of `size` bytes.
pub fn allocation_size<VM: VMBinding>(size: usize) -> usize {
    raw_align_up(size, VM::MIN_ALIGNMENT).max(VM::VMObjectModel::MIN_OBJECT_SIZE)
}
