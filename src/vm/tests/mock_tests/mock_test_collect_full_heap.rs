use super::mock_test_prelude::*;

const OBJECT_SIZE: usize = 4096;

/// Every belt is full, and nothing is reachable: the cascade empties the heap.
#[test]
pub fn all_belts_full_of_garbage() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let (eden, to_space, mature) = (heap.eden(), heap.to_space(), heap.mature());
        for belt in [eden, to_space, mature] {
            fill_belt(belt, OBJECT_SIZE, |_| {});
        }
        assert!(to_space.remaining() + mature.remaining() < OBJECT_SIZE * 2);

        assert_eq!(heap.collect_garbage(0), Ok(true));
        assert!(!heap.is_out_of_memory());
        let stats = heap.stats();
        assert_eq!(stats.minor_collections.get(), 1);
        assert_eq!(stats.to_space_collections.get(), 1);
        assert_eq!(stats.major_collections.get(), 1);
        assert_eq!(stats.objects_moved.get(), 0);
        for belt in [eden, to_space, mature] {
            assert_eq!(belt.used(), 0, "{}", belt.name());
        }
        heap.verify_heap();

        // The next cycle only needs a minor stage.
        assert_eq!(heap.collect_garbage(0), Ok(true));
        assert_eq!(stats.minor_collections.get(), 2);
        assert_eq!(stats.to_space_collections.get(), 1);
    })
}

/// Eden survivors do not fit in the room left in to-space and mature, but the older
/// belts only hold garbage. They are collected first, with the survivors as roots.
#[test]
pub fn older_belts_make_room_for_eden_survivors() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let (eden, to_space, mature) = (heap.eden(), heap.to_space(), heap.mature());
        fill_belt(to_space, OBJECT_SIZE, |_| {});
        fill_belt(mature, OBJECT_SIZE, |_| {});

        const LIVE: usize = 10;
        let mut head = ObjectReference::NULL;
        for i in 0..LIVE {
            let start = eden.bump_allocate(OBJECT_SIZE).unwrap();
            mock_vm::format_object(start, OBJECT_SIZE, 1);
            let object = ObjectReference::from_raw_address(start);
            mock_vm::set_ref(object, 0, head);
            mock_vm::set_data(object, 0, i);
            head = object;
        }
        let root = mock_vm::add_root(head);

        assert_eq!(heap.collect_garbage(0), Ok(true));
        let stats = heap.stats();
        assert_eq!(stats.minor_collections.get(), 1);
        assert_eq!(stats.to_space_collections.get(), 1);
        assert_eq!(stats.major_collections.get(), 1);
        assert_eq!(stats.objects_moved.get(), LIVE as u64);
        assert_eq!(eden.used(), 0);
        assert_eq!(mature.used(), 0);
        assert_eq!(to_space.used(), LIVE * OBJECT_SIZE);

        // The list survived intact, in to-space.
        let mut object = mock_vm::root(root);
        for i in (0..LIVE).rev() {
            assert!(to_space.contains_allocated(object.to_raw_address()));
            assert_eq!(mock_vm::get_data(object, 0), i);
            object = mock_vm::get_ref(object, 0);
        }
        assert!(object.is_null());
        heap.verify_heap();
    })
}

/// Eden survivors, to-space and mature are all live: nothing can make room.
#[test]
pub fn every_belt_full_of_live_objects() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let (eden, to_space, mature) = (heap.eden(), heap.to_space(), heap.mature());
        for belt in [eden, to_space, mature] {
            fill_belt(belt, OBJECT_SIZE, |object| {
                mock_vm::add_root(object);
            });
        }
        let eden_used = eden.used();
        let to_space_used = to_space.used();

        assert_eq!(
            heap.collect_garbage(0),
            Err(AllocationError::OutOfMemory {
                requested: to_space_used
            })
        );
        assert!(heap.is_out_of_memory());
        assert_eq!(heap.stats().minor_collections.get(), 0);
        assert_eq!(heap.stats().major_collections.get(), 1);
        assert_eq!(heap.stats().to_space_collections.get(), 0);
        // Nothing moved, and eden was left alone.
        assert_eq!(heap.stats().objects_moved.get(), 0);
        assert_eq!(eden.used(), eden_used);
    })
}
