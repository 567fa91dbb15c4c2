use super::mock_test_prelude::*;

/// A mutator that only makes garbage can allocate forever: every time eden is
/// exhausted, one collection makes room again.
#[test]
pub fn allocate_or_collect_garbage_forever() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let mut mutator = memory_manager::bind_mutator(heap);
        let eden_size = heap.eden().size();
        let mut allocated = 0;
        while allocated < 5 * eden_size {
            let object = memory_manager::alloc_or_collect(&mut mutator, 512).unwrap();
            assert!(heap.eden().contains(object));
            mock_vm::format_object(object, 512, 0);
            allocated += 512;
        }
        assert!(heap.stats().collections.get() >= 4);
        assert_eq!(heap.stats().major_collections.get(), 0);
        // Nothing survived, so nothing was promoted.
        assert_eq!(heap.to_space().used(), 0);
        assert_eq!(heap.mature().used(), 0);
        assert!(!heap.is_out_of_memory());
        assert_eq!(mock_vm::read_mock(|m| (m.stop_count, m.resume_count)), {
            let n = heap.stats().collections.get() as usize;
            (n, n)
        });
        memory_manager::destroy_mutator(&mut mutator);
    })
}

/// Allocation alone never collects: it hands out the sentinel once eden is full.
#[test]
pub fn alloc_returns_zero_without_collecting() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let mut mutator = memory_manager::bind_mutator(heap);
        let count = fill_eden_with_garbage(&mut mutator, 1000);
        assert!(count > 0);
        assert!(memory_manager::alloc(&mut mutator, 1000).is_zero());
        assert!(memory_manager::alloc(&mut mutator, 1000).is_zero());
        assert_eq!(heap.stats().collections.get(), 0);
        assert_eq!(heap.inspectable().gc_started_counter(), 0);
    })
}

/// A request larger than eden can never be satisfied, but it is not the collector
/// that ran out of memory.
#[test]
pub fn alloc_or_collect_larger_than_eden() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let mut mutator = memory_manager::bind_mutator(heap);
        let size = heap.eden().size() + TLAB_SIZE;
        assert_eq!(
            memory_manager::alloc_or_collect(&mut mutator, size),
            Err(AllocationError::OutOfMemory { requested: size })
        );
        assert_eq!(heap.stats().collections.get(), 1);
        assert!(!heap.is_out_of_memory());
    })
}
