// All the tests with prefix 'mock_test_' run a real BeltwayHeap over MockVM.
// MockVM keeps its roots in a global, so every such test runs under
// `with_mock_heap`, which serializes the tests and clears the mock afterwards.

// Common includes for mock tests.
pub(crate) mod mock_test_prelude {
    pub use super::fixtures::*;
    pub use crate::memory_manager;
    pub use crate::plan::beltway::{BeltwayHeap, CollectorPhase};
    pub use crate::util::alloc::AllocationError;
    pub use crate::util::options::{BeltPercentages, Options};
    pub use crate::util::test_util::mock_vm::{self, MockVM};
    pub use crate::util::{Address, ObjectReference};
}

pub(crate) mod fixtures {
    use crate::plan::beltway::{BeltwayHeap, Mutator};
    use crate::util::heap::Belt;
    use crate::util::options::{BeltPercentages, Options};
    use crate::util::test_util::mock_vm::{self, MockVM};
    use crate::util::test_util::{serial_test, with_cleanup};
    use crate::util::ObjectReference;
    use std::panic::UnwindSafe;

    pub const MB: usize = 1 << 20;
    pub const TLAB_SIZE: usize = 4096;

    pub fn heap_options(heap_size: usize, percentages: &[usize]) -> Options {
        let mut options = Options::defaults();
        options.heap_size = heap_size;
        options.tlab_size = TLAB_SIZE;
        options.belt_percentages = BeltPercentages::new(percentages.to_vec());
        options
    }

    /// Run `test` against a fresh heap. Tests using the mock roots run one at a time,
    /// and the mock is reset even if the test panics.
    pub fn with_mock_heap<T>(options: Options, test: T)
    where
        T: FnOnce(&BeltwayHeap<MockVM>) + UnwindSafe,
    {
        serial_test(|| {
            with_cleanup(
                || {
                    let heap = BeltwayHeap::<MockVM>::new(options).unwrap();
                    test(&heap);
                },
                mock_vm::reset,
            )
        })
    }

    /// Allocate one unreachable object of `size` bytes directly in `belt`.
    pub fn fill_with_garbage(belt: &Belt, size: usize) {
        let start = belt.bump_allocate(size).unwrap();
        mock_vm::format_object(start, size, 0);
    }

    /// Allocate `size`-byte objects in `belt` until it is full, calling `each` with
    /// every object.
    pub fn fill_belt(belt: &Belt, size: usize, mut each: impl FnMut(ObjectReference)) {
        while let Some(start) = belt.bump_allocate(size) {
            mock_vm::format_object(start, size, 0);
            each(ObjectReference::from_raw_address(start));
        }
    }

    /// Allocate unreachable objects until eden needs a collection. Returns the number
    /// of objects allocated.
    pub fn fill_eden_with_garbage(mutator: &mut Mutator<MockVM>, size: usize) -> usize {
        let mut count = 0;
        loop {
            let start = mutator.alloc(size);
            if start.is_zero() {
                return count;
            }
            mock_vm::format_object(start, size, 0);
            count += 1;
        }
    }
}

mod mock_test_allocate_or_collect;
mod mock_test_belt_partition;
mod mock_test_collect_full_heap;
mod mock_test_collect_major;
mod mock_test_collect_minor;
mod mock_test_collect_out_of_memory;
mod mock_test_collect_promotion_cascade;
mod mock_test_inspector_follows_object;
mod mock_test_inspector_roots;
