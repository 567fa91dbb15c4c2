use super::mock_test_prelude::*;

const OBJECT_SIZE: usize = 4096;

fn root_objects_in(belt: &crate::util::heap::Belt, count: usize) {
    for _ in 0..count {
        let start = belt.bump_allocate(OBJECT_SIZE).unwrap();
        mock_vm::format_object(start, OBJECT_SIZE, 0);
        mock_vm::add_root(ObjectReference::from_raw_address(start));
    }
}

fn assert_stays_out_of_memory(heap: &BeltwayHeap<MockVM>) {
    assert!(heap.is_out_of_memory());
    assert_eq!(heap.phase(), CollectorPhase::Idle);
    assert!(!heap.inspectable().is_in_gc());
    let collections = heap.stats().collections.get();
    // Later requests fail fast, without stopping the world.
    assert_eq!(heap.collect_garbage(0), Ok(false));
    assert_eq!(heap.stats().collections.get(), collections);
    let mut mutator = memory_manager::bind_mutator(heap);
    // Eden was reset by the failed cycle, so plain allocation still works for now.
    assert!(!memory_manager::alloc(&mut mutator, 64).is_zero());
}

/// Mature is full of live objects: compaction cannot make room for to-space.
#[test]
pub fn mature_full_of_live_objects() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let (eden, to_space, mature) = (heap.eden(), heap.to_space(), heap.mature());
        fill_belt(mature, OBJECT_SIZE, |object| {
            mock_vm::add_root(object);
        });
        assert_eq!(mature.remaining(), 0);
        fill_with_garbage(to_space, to_space.size() - eden.size() / 2);
        let to_space_used = to_space.used();

        assert_eq!(
            heap.collect_garbage(0),
            Err(AllocationError::OutOfMemory {
                requested: to_space_used
            })
        );
        assert_eq!(heap.stats().major_collections.get(), 1);
        assert_eq!(heap.stats().to_space_collections.get(), 0);
        // The failed cycle did not lose any live object.
        for i in 0..mature.size() / OBJECT_SIZE {
            assert!(mature.contains_allocated(mock_vm::root(i).to_raw_address()));
        }
        assert_stays_out_of_memory(heap);
    })
}

/// To-space fits into mature, but afterwards mature stays below half of to-space
/// even when compacted.
#[test]
pub fn mature_below_watermark_after_compaction() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let (eden, to_space, mature) = (heap.eden(), heap.to_space(), heap.mature());
        let watermark = to_space.size() / 2;

        root_objects_in(mature, 50);
        root_objects_in(to_space, 30);
        fill_with_garbage(to_space, 78 * OBJECT_SIZE - to_space.used());
        assert!(to_space.remaining() < eden.size());
        assert!(mature.remaining() >= to_space.used());
        assert!(mature.remaining() - 30 * OBJECT_SIZE < watermark);

        assert_eq!(
            heap.collect_garbage(100),
            Err(AllocationError::OutOfMemory {
                requested: watermark
            })
        );
        let stats = heap.stats();
        assert_eq!(stats.minor_collections.get(), 1);
        assert_eq!(stats.to_space_collections.get(), 1);
        assert_eq!(stats.major_collections.get(), 1);
        assert_eq!(mature.used(), 80 * OBJECT_SIZE);
        assert_eq!(to_space.used(), 0);
        assert_stays_out_of_memory(heap);
    })
}

/// `alloc_or_collect` reports the failure of the collection it ran.
#[test]
pub fn alloc_or_collect_propagates_out_of_memory() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let (eden, to_space, mature) = (heap.eden(), heap.to_space(), heap.mature());
        root_objects_in(mature, mature.size() / OBJECT_SIZE);
        fill_with_garbage(to_space, to_space.size() - eden.size() / 2);
        let mut mutator = memory_manager::bind_mutator(heap);
        fill_eden_with_garbage(&mut mutator, 1024);

        assert!(memory_manager::alloc_or_collect(&mut mutator, 1024).is_err());
        assert!(heap.is_out_of_memory());
    })
}
