use super::mock_test_prelude::*;
use crate::tele::data_access::LocalDataAccess;
use crate::tele::memory_region::MemoryRegion;
use crate::tele::object::ObjectMemoryState;
use crate::tele::process::TeleProcess;
use crate::tele::thread::{TeleNativeThread, ThreadState};
use crate::tele::vm::TeleVM;
use crate::tele::watchpoint::{WatchpointFactory, WatchpointKind, WatchpointSettings};
use std::sync::{Arc, Mutex};

const WRITE: WatchpointSettings = WatchpointSettings::new(false, true, false, false);

/// Plants traps by recording them. The collector stands in for the hardware: every
/// forwarding word it writes under a write trap is reported to the factory.
#[derive(Default)]
struct RecordingProcess {
    traps: Mutex<Vec<(MemoryRegion, WatchpointSettings)>>,
}

impl RecordingProcess {
    fn traps(&self) -> Vec<MemoryRegion> {
        self.traps.lock().unwrap().iter().map(|(r, _)| *r).collect()
    }

    fn traps_write(&self, address: Address) -> bool {
        self.traps
            .lock()
            .unwrap()
            .iter()
            .any(|(r, s)| s.trap_on_write && r.contains(address))
    }
}

impl TeleProcess for RecordingProcess {
    fn activate_watchpoint(&self, region: MemoryRegion, settings: &WatchpointSettings) -> bool {
        self.traps.lock().unwrap().push((region, *settings));
        true
    }

    fn deactivate_watchpoint(&self, region: MemoryRegion) -> bool {
        let mut traps = self.traps.lock().unwrap();
        let before = traps.len();
        traps.retain(|(r, _)| *r != region);
        traps.len() < before
    }

    fn maximum_watchpoint_count(&self) -> usize {
        16
    }
}

struct Inspector {
    vm: Arc<TeleVM>,
    factory: Arc<WatchpointFactory>,
    process: Arc<RecordingProcess>,
    /// Whether each reported trap asked to stop the process.
    stops: Arc<Mutex<Vec<bool>>>,
}

fn attach(heap: &BeltwayHeap<MockVM>) -> Inspector {
    let vm = TeleVM::new(
        Arc::new(unsafe { LocalDataAccess::new() }),
        memory_manager::inspectable_heap_info(heap),
        mock_vm::tele_layout(),
    )
    .unwrap();
    let process = Arc::new(RecordingProcess::default());
    let factory = WatchpointFactory::new(vm.clone(), process.clone());
    let stops: Arc<Mutex<Vec<bool>>> = Arc::default();
    {
        let (factory, process, stops) = (factory.clone(), process.clone(), stops.clone());
        let thread = TeleNativeThread::new(1, None);
        mock_vm::set_forwarding_hook(move |from, _| {
            let address = from.to_raw_address() + mock_vm::MISC_OFFSET;
            if process.traps_write(address) {
                thread.set_state(ThreadState::Watchpoint);
                let stop = factory.handle_watchpoint_trigger(address, &thread);
                thread.set_state(ThreadState::Running);
                stops.lock().unwrap().push(stop);
            }
        });
    }
    Inspector {
        vm,
        factory,
        process,
        stops,
    }
}

/// An object watchpoint follows its object from eden through to-space into mature
/// within one collection, and is planted again once the collection is over.
#[test]
pub fn object_watchpoint_follows_promotion() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let inspector = attach(heap);
        let (eden, to_space, mature) = (heap.eden(), heap.to_space(), heap.mature());
        let mut mutator = memory_manager::bind_mutator(heap);
        fill_with_garbage(to_space, to_space.size() - eden.size() / 2);

        let object = mock_vm::alloc_object(&mut mutator, 64, 0);
        mock_vm::set_data(object, 0, 7);
        mock_vm::add_root(object);
        let origin = object.to_raw_address();
        let tele_object = inspector.vm.objects().find_object(origin).unwrap();
        let watchpoint = inspector
            .factory
            .create_object_watchpoint("object", &tele_object, WRITE)
            .unwrap()
            .unwrap();
        assert_eq!(inspector.process.traps().len(), 2);

        assert_eq!(heap.collect_garbage(0), Ok(true));
        assert_eq!(heap.stats().to_space_collections.get(), 1);
        let final_origin = mock_vm::root(0).to_raw_address();
        assert_eq!(final_origin, mature.start());

        // Two moves, each reported once, none stopping the process.
        assert_eq!(*inspector.stops.lock().unwrap(), vec![false, false]);
        assert_eq!(watchpoint.start(), final_origin);
        assert_eq!(watchpoint.memory_region().size(), 64);
        // Not enabled during GC: only the relocation watchpoint is planted until the
        // inspector sees the collection end.
        assert!(!watchpoint.is_active());
        let relocation = watchpoint.relocation_watchpoint().unwrap();
        assert_eq!(relocation.start(), final_origin + mock_vm::MISC_OFFSET);
        assert_eq!(inspector.process.traps(), vec![relocation.memory_region()]);
        assert_eq!(tele_object.memory_state(), ObjectMemoryState::Obsolete);

        inspector.vm.refresh().unwrap();
        assert!(watchpoint.is_active());
        let followed = watchpoint.object().unwrap();
        assert_eq!(followed.origin(), final_origin);
        assert_eq!(followed.memory_state(), ObjectMemoryState::Live);
        assert_eq!(mock_vm::get_data(mock_vm::root(0), 0), 7);
        let mut traps = inspector.process.traps();
        traps.sort_by_key(|r| (r.start(), r.size()));
        assert_eq!(
            traps,
            vec![relocation.memory_region(), MemoryRegion::new(final_origin, 64)]
        );
        assert!(Arc::ptr_eq(
            &inspector.factory.find_client_watchpoint(final_origin).unwrap(),
            &watchpoint
        ));
        assert!(inspector.factory.find_client_watchpoint(origin).is_none());
    })
}

/// A watchpoint enabled during GC keeps trapping at each new location, and the
/// moves themselves are not reported as hits.
#[test]
pub fn gc_enabled_watchpoint_stays_planted() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let inspector = attach(heap);
        let mut mutator = memory_manager::bind_mutator(heap);
        let object = mock_vm::alloc_object(&mut mutator, 40, 0);
        mock_vm::add_root(object);
        let tele_object = inspector
            .vm
            .objects()
            .find_object(object.to_raw_address())
            .unwrap();
        let settings = WatchpointSettings::new(false, true, false, true);
        let watchpoint = inspector
            .factory
            .create_object_watchpoint("object", &tele_object, settings)
            .unwrap()
            .unwrap();

        assert_eq!(heap.collect_garbage(0), Ok(true));
        assert_eq!(*inspector.stops.lock().unwrap(), vec![false]);
        let new_origin = mock_vm::root(0).to_raw_address();
        assert_eq!(watchpoint.start(), new_origin);
        assert!(watchpoint.is_active());
        assert!(inspector
            .process
            .traps()
            .contains(&MemoryRegion::new(new_origin, 40)));
    })
}

/// When the watched object dies, the watchpoint keeps watching the memory it
/// occupied, as a plain region watchpoint.
#[test]
pub fn watchpoint_on_collected_object_is_replaced() {
    with_mock_heap(heap_options(MB, &[10, 40, 50]), |heap| {
        let inspector = attach(heap);
        let mut mutator = memory_manager::bind_mutator(heap);
        let object = mock_vm::alloc_object(&mut mutator, 48, 0);
        let region = MemoryRegion::new(object.to_raw_address(), 48);
        let tele_object = inspector
            .vm
            .objects()
            .find_object(object.to_raw_address())
            .unwrap();
        let watchpoint = inspector
            .factory
            .create_object_watchpoint("doomed", &tele_object, WRITE)
            .unwrap()
            .unwrap();

        assert_eq!(heap.collect_garbage(0), Ok(true));
        assert!(inspector.stops.lock().unwrap().is_empty());
        inspector.vm.refresh().unwrap();

        assert_eq!(tele_object.memory_state(), ObjectMemoryState::Dead);
        assert!(!watchpoint.is_alive());
        assert!(inspector.factory.system_watchpoints().is_empty());
        let client = inspector.factory.client_watchpoints();
        assert_eq!(client.len(), 1);
        let replacement = &client[0];
        assert_eq!(replacement.description(), "Replacement for watchpoint on GC'd object");
        assert_eq!(replacement.kind(), WatchpointKind::Client);
        assert_eq!(replacement.memory_region(), region);
        assert_eq!(replacement.settings(), WRITE);
        assert!(!replacement.is_relocatable());
        assert!(replacement.is_active());
        assert_eq!(inspector.process.traps(), vec![region]);
    })
}
