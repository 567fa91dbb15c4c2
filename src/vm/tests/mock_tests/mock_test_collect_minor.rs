use super::mock_test_prelude::*;

/// A minor collection copies the reachable part of eden into to-space, updates
/// every reference, and empties eden.
#[test]
pub fn minor_collection_copies_reachable_objects() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let mut mutator = memory_manager::bind_mutator(heap);

        // root -> a -> b, and a cycle b -> a.
        let root = mock_vm::alloc_object(&mut mutator, 64, 2);
        let a = mock_vm::alloc_object(&mut mutator, 48, 1);
        let b = mock_vm::alloc_object(&mut mutator, 40, 1);
        mock_vm::set_ref(root, 0, a);
        mock_vm::set_ref(a, 0, b);
        mock_vm::set_ref(b, 0, a);
        mock_vm::set_data(a, 0, 0xa);
        mock_vm::set_data(b, 0, 0xb);
        mock_vm::add_root(root);
        let garbage = fill_eden_with_garbage(&mut mutator, 128);
        assert!(garbage > 0);

        assert_eq!(heap.collect_garbage(128), Ok(true));

        let stats = heap.stats();
        assert_eq!(stats.collections.get(), 1);
        assert_eq!(stats.minor_collections.get(), 1);
        assert_eq!(stats.to_space_collections.get(), 0);
        assert_eq!(stats.major_collections.get(), 0);
        assert_eq!(stats.objects_moved.get(), 3);
        assert_eq!(stats.bytes_moved.get(), 64 + 48 + 40);

        let root = mock_vm::root(0);
        assert!(heap.to_space().contains_allocated(root.to_raw_address()));
        let a = mock_vm::get_ref(root, 0);
        let b = mock_vm::get_ref(a, 0);
        assert!(mock_vm::get_ref(root, 1).is_null());
        assert_eq!(mock_vm::get_ref(b, 0), a);
        assert_eq!(mock_vm::get_data(a, 0), 0xa);
        assert_eq!(mock_vm::get_data(b, 0), 0xb);
        assert_eq!(heap.to_space().used(), 64 + 48 + 40);

        assert_eq!(heap.eden().allocation_mark(), heap.eden().start());
        assert_eq!(heap.phase(), CollectorPhase::Idle);
        heap.verify_heap();

        // The old TLAB is void; the mutator refills from the empty eden.
        let next = memory_manager::alloc(&mut mutator, 64);
        assert_eq!(next, heap.eden().start());
    })
}

/// Objects in older belts that point into eden keep their targets alive, and
/// are updated to the copies.
#[test]
pub fn minor_collection_follows_old_to_young_references() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let mut mutator = memory_manager::bind_mutator(heap);
        let young = mock_vm::alloc_object(&mut mutator, 32, 0);
        mock_vm::set_data(young, 0, 42);

        let old_start = heap.mature().bump_allocate(32).unwrap();
        mock_vm::format_object(old_start, 32, 1);
        let old = ObjectReference::from_raw_address(old_start);
        memory_manager::object_reference_write(heap, old, mock_vm::ref_slot(old, 0), young);

        assert_eq!(heap.collect_garbage(0), Ok(true));

        let young = mock_vm::get_ref(old, 0);
        assert!(heap.to_space().contains_allocated(young.to_raw_address()));
        assert_eq!(mock_vm::get_data(young, 0), 42);
        // Unchanged: the mature object was not collected.
        assert_eq!(heap.mature().used(), 32);
    })
}

/// The collector stops the mutators once per cycle and resumes them afterwards.
#[test]
pub fn collection_stops_and_resumes_mutators() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        assert_eq!(heap.collect_garbage(0), Ok(true));
        assert_eq!(heap.collect_garbage(0), Ok(true));
        assert_eq!(mock_vm::read_mock(|m| (m.stop_count, m.resume_count)), (2, 2));
        assert_eq!(heap.stats().minor_collections.get(), 2);
    })
}
