use super::mock_test_prelude::*;

/// When to-space is left with less room than eden after a minor collection, its
/// survivors move on to mature in the same cycle. Mature keeps plenty of room, so
/// no compaction follows.
#[test]
pub fn to_space_evacuated_into_mature() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let (eden, to_space, mature) = (heap.eden(), heap.to_space(), heap.mature());
        let mut mutator = memory_manager::bind_mutator(heap);

        // Dead objects from earlier cycles leave to-space half an eden of room.
        fill_with_garbage(to_space, to_space.size() - eden.size() / 2);

        let live = mock_vm::alloc_object(&mut mutator, 64, 1);
        let child = mock_vm::alloc_object(&mut mutator, 48, 0);
        mock_vm::set_ref(live, 0, child);
        mock_vm::set_data(child, 0, 0xcafe);
        mock_vm::add_root(live);
        fill_eden_with_garbage(&mut mutator, 256);

        assert_eq!(heap.collect_garbage(256), Ok(true));

        let stats = heap.stats();
        assert_eq!(stats.minor_collections.get(), 1);
        assert_eq!(stats.to_space_collections.get(), 1);
        assert_eq!(stats.major_collections.get(), 0);
        // Each live object moved twice: eden to to-space, then to mature.
        assert_eq!(stats.objects_moved.get(), 4);

        assert_eq!(eden.allocation_mark(), eden.start());
        assert_eq!(to_space.allocation_mark(), to_space.start());
        assert_eq!(mature.used(), 64 + 48);

        let live = mock_vm::root(0);
        assert_eq!(live.to_raw_address(), mature.start());
        let child = mock_vm::get_ref(live, 0);
        assert!(mature.contains_allocated(child.to_raw_address()));
        assert_eq!(mock_vm::get_data(child, 0), 0xcafe);
        assert!(mature.remaining() >= to_space.size() / 2);
        heap.verify_heap();

        // Mutators can allocate again right away.
        assert!(!memory_manager::alloc(&mut mutator, 256).is_zero());
    })
}

/// Survivors that do not fit in to-space overflow into mature. The whole cascade
/// still completes, and every object stays reachable.
#[test]
pub fn minor_survivors_overflow_into_mature() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let (eden, to_space, mature) = (heap.eden(), heap.to_space(), heap.mature());
        let mut mutator = memory_manager::bind_mutator(heap);

        // To-space has room for only a handful of survivors.
        fill_with_garbage(to_space, to_space.size() - 4 * 1024);

        // A rooted linked list filling most of eden.
        let mut head = ObjectReference::NULL;
        let mut count = 0;
        while eden.remaining() > 2 * TLAB_SIZE {
            let node = mock_vm::alloc_object(&mut mutator, 512, 1);
            mock_vm::set_ref(node, 0, head);
            mock_vm::set_data(node, 0, count);
            head = node;
            count += 1;
        }
        mock_vm::add_root(head);
        let survivors = count * 512;
        assert!(survivors > to_space.remaining());

        assert_eq!(heap.collect_garbage(512), Ok(true));
        assert_eq!(heap.stats().to_space_collections.get(), 1);
        assert_eq!(heap.stats().major_collections.get(), 0);
        assert_eq!(mature.used(), survivors);
        assert_eq!(to_space.used(), 0);

        let mut node = mock_vm::root(0);
        let mut expected = count;
        while !node.is_null() {
            assert!(mature.contains_allocated(node.to_raw_address()));
            expected -= 1;
            assert_eq!(mock_vm::get_data(node, 0), expected);
            node = mock_vm::get_ref(node, 0);
        }
        assert_eq!(expected, 0);
        heap.verify_heap();
    })
}
