use super::mock_test_prelude::*;

const LIVE_SIZE: usize = 64;
const GARBAGE_SIZE: usize = 4096;

/// Fill mature with live objects separated by garbage. Live object `i` is root `i`
/// and points to live object `i - 1`.
fn fill_mature_with_fragments(heap: &BeltwayHeap<MockVM>) -> usize {
    let mature = heap.mature();
    let mut previous = ObjectReference::NULL;
    let mut count = 0;
    while mature.remaining() >= LIVE_SIZE + GARBAGE_SIZE {
        let start = mature.bump_allocate(LIVE_SIZE).unwrap();
        mock_vm::format_object(start, LIVE_SIZE, 1);
        let object = ObjectReference::from_raw_address(start);
        mock_vm::set_ref(object, 0, previous);
        mock_vm::set_data(object, 0, count);
        assert_eq!(mock_vm::add_root(object), count);
        previous = object;
        count += 1;
        fill_with_garbage(mature, GARBAGE_SIZE);
    }
    count
}

/// Mature has too little room to take to-space, so it is compacted first. The live
/// objects slide down in address order and every reference follows them.
#[test]
pub fn mature_compacted_before_to_space_evacuation() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let (eden, to_space, mature) = (heap.eden(), heap.to_space(), heap.mature());
        // Eden stays empty: mature could not absorb its survivors otherwise.

        let count = fill_mature_with_fragments(heap);
        assert!(count > 1);
        fill_with_garbage(to_space, to_space.size() - eden.size() / 2);
        assert!(mature.remaining() < to_space.used());

        assert_eq!(heap.collect_garbage(256), Ok(true));

        let stats = heap.stats();
        assert_eq!(stats.minor_collections.get(), 1);
        assert_eq!(stats.to_space_collections.get(), 1);
        assert_eq!(stats.major_collections.get(), 1);
        assert!(!heap.is_out_of_memory());

        assert_eq!(mature.used(), count * LIVE_SIZE);
        for i in 0..count {
            let object = mock_vm::root(i);
            assert_eq!(object.to_raw_address(), mature.start() + i * LIVE_SIZE);
            assert_eq!(mock_vm::get_data(object, 0), i);
            let expected = if i == 0 { ObjectReference::NULL } else { mock_vm::root(i - 1) };
            assert_eq!(mock_vm::get_ref(object, 0), expected);
        }
        // The freed space reads as zeroes.
        let mark = mature.allocation_mark();
        assert_eq!(unsafe { mark.load::<usize>() }, 0);
        heap.verify_heap();
    })
}

/// Objects that are already in place do not move, and are not reported as moved.
#[test]
pub fn compaction_leaves_dense_prefix_in_place() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let (eden, to_space, mature) = (heap.eden(), heap.to_space(), heap.mature());

        // Two live objects at the start of mature, then garbage filling the rest.
        let first = mature.bump_allocate(LIVE_SIZE).unwrap();
        let second = mature.bump_allocate(LIVE_SIZE).unwrap();
        for start in [first, second] {
            mock_vm::format_object(start, LIVE_SIZE, 0);
            mock_vm::add_root(ObjectReference::from_raw_address(start));
        }
        fill_with_garbage(mature, mature.remaining());
        fill_with_garbage(to_space, to_space.size() - eden.size() / 2);

        let moved_before = heap.stats().objects_moved.get();
        assert_eq!(heap.collect_garbage(256), Ok(true));
        assert_eq!(heap.stats().major_collections.get(), 1);
        // Nothing survived eden or to-space, and the mature objects stayed put.
        assert_eq!(heap.stats().objects_moved.get(), moved_before);
        assert_eq!(mock_vm::root(0).to_raw_address(), first);
        assert_eq!(mock_vm::root(1).to_raw_address(), second);
        assert_eq!(mature.used(), 2 * LIVE_SIZE);
        heap.verify_heap();
    })
}
