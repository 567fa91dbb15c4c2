use super::mock_test_prelude::*;
use crate::tele::data_access::LocalDataAccess;
use crate::tele::object::ObjectMemoryState;
use crate::tele::vm::TeleVM;
use std::sync::Arc;

fn attach(heap: &BeltwayHeap<MockVM>) -> Arc<TeleVM> {
    TeleVM::new(
        Arc::new(unsafe { LocalDataAccess::new() }),
        memory_manager::inspectable_heap_info(heap),
        mock_vm::tele_layout(),
    )
    .unwrap()
}

/// The inspector root table does not keep objects alive. Entries for survivors
/// follow them, entries for the dead are cleared, and the inspector's objects
/// catch up once it sees the collection complete.
#[test]
pub fn root_table_entries_are_weak() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let vm = attach(heap);
        let mut mutator = memory_manager::bind_mutator(heap);
        let survivor = mock_vm::alloc_object(&mut mutator, 48, 0);
        let doomed = mock_vm::alloc_object(&mut mutator, 48, 0);
        mock_vm::add_root(survivor);

        let tele_survivor = vm.objects().find_object(survivor.to_raw_address()).unwrap();
        let tele_doomed = vm.objects().find_object(doomed.to_raw_address()).unwrap();
        assert_eq!(tele_survivor.size(), 48);
        let (table, _) = heap.root_table();
        let slot = |object: &crate::tele::object::TeleObject| {
            table + object.root_slot().unwrap() * std::mem::size_of::<usize>()
        };
        let survivor_slot = slot(&tele_survivor);
        let doomed_slot = slot(&tele_doomed);
        assert_eq!(unsafe { survivor_slot.load::<ObjectReference>() }, survivor);

        assert_eq!(heap.collect_garbage(0), Ok(true));
        let moved = mock_vm::root(0);
        assert_ne!(moved, survivor);
        assert_eq!(unsafe { survivor_slot.load::<ObjectReference>() }, moved);
        assert!(unsafe { doomed_slot.load::<ObjectReference>() }.is_null());
        // Only the mutator roots kept anything alive.
        assert_eq!(heap.to_space().used(), 48);

        // Nothing changes for the inspector until it refreshes.
        assert_eq!(tele_survivor.origin(), survivor.to_raw_address());
        let epoch = vm.refresh().unwrap();
        assert_eq!(epoch.gc_completed, 1);
        assert_eq!(tele_survivor.origin(), moved.to_raw_address());
        assert_eq!(tele_survivor.memory_state(), ObjectMemoryState::Live);
        assert_eq!(tele_doomed.memory_state(), ObjectMemoryState::Dead);
        assert_eq!(tele_doomed.root_slot(), None);

        let tracked = vm.objects().objects();
        assert_eq!(tracked.len(), 1);
        assert!(Arc::ptr_eq(&tracked[0], &tele_survivor));
        // The registry finds the survivor at its new address.
        let found = vm.objects().find_object(moved.to_raw_address()).unwrap();
        assert!(Arc::ptr_eq(&found, &tele_survivor));
    })
}

/// Compaction updates the root table entries of the objects it slides.
#[test]
pub fn root_table_follows_compaction() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let vm = attach(heap);
        let (eden, to_space, mature) = (heap.eden(), heap.to_space(), heap.mature());
        fill_with_garbage(mature, 4096);
        let start = mature.bump_allocate(64).unwrap();
        mock_vm::format_object(start, 64, 0);
        let object = ObjectReference::from_raw_address(start);
        mock_vm::add_root(object);
        fill_with_garbage(mature, mature.remaining());
        fill_with_garbage(to_space, to_space.size() - eden.size() / 2);

        let tele_object = vm.objects().find_object(start).unwrap();
        assert_eq!(heap.collect_garbage(0), Ok(true));
        assert_eq!(heap.stats().major_collections.get(), 1);
        assert_eq!(mock_vm::root(0).to_raw_address(), mature.start());

        vm.refresh().unwrap();
        assert_eq!(tele_object.origin(), mature.start());
        assert!(tele_object.is_live());
    })
}
