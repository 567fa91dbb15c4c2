use super::collector::{BeltCollector, CollectorPhase};
use super::daemon::StopTheWorldDaemon;
use crate::util::alloc::allocator::allocation_size;
use crate::util::alloc::AllocationError;
use crate::util::constants::{BYTES_IN_PAGE, BYTES_IN_WORD, MAX_MEMORY_REGIONS};
use crate::util::conversions::{bytes_to_formatted_string, raw_align_up};
use crate::util::heap::{Belt, BeltManager, CardTable, ConfigurationError};
use crate::util::inspectable::InspectableHeapInfo;
use crate::util::memory::Mapping;
use crate::util::options::Options;
use crate::util::statistics::HeapStatistics;
use crate::util::{Address, ObjectReference};
use crate::vm::{Collection, VMBinding};
use atomic::Atomic;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// The belt new objects are allocated in.
pub const EDEN: usize = 0;
/// The belt eden survivors are copied to.
pub const TO_SPACE: usize = 1;
/// The oldest belt, compacted in place.
pub const MATURE: usize = 2;
const NUM_BELTS: usize = 3;

const_assert!(NUM_BELTS <= MAX_MEMORY_REGIONS);

/// The generational Beltway heap.
///
/// One contiguous reservation is split into eden, to-space and mature belts.
/// Mutators allocate in eden through TLABs. When eden is exhausted, the runtime calls
/// [`BeltwayHeap::collect_garbage`], which runs this cascade:
///
/// 1. Minor: evacuate eden into to-space. Survivors that do not fit overflow into
///    mature. If even the two together cannot take the survivors, steps 2 and 3
///    run first to make room.
/// 2. If to-space has less room than the size of eden, evacuate to-space into mature.
///    Mature is compacted first if it cannot take all of to-space.
/// 3. If mature then has less room than half of to-space, compact mature. If it
///    still has less room than half of to-space, the heap is out of memory.
///
/// Each stage runs on a dedicated stop-the-world daemon thread.
pub struct BeltwayHeap<VM: VMBinding> {
    daemon: StopTheWorldDaemon,
    options: Options,
    heap: Mapping,
    belts: BeltManager,
    card_table: CardTable,
    /// Boxed so an inspector can keep reading it at the same address.
    inspectable: Box<InspectableHeapInfo>,
    root_table: Mapping,
    out_of_memory: AtomicBool,
    phase: Atomic<CollectorPhase>,
    /// Bumped every time eden is reset. TLABs refilled in an older epoch are void.
    tlab_epoch: AtomicU64,
    gc_lock: Mutex<()>,
    stats: HeapStatistics,
    _p: PhantomData<VM>,
}

impl<VM: VMBinding> BeltwayHeap<VM> {
    /// Reserve the heap and the inspector root table, and split the heap into belts.
    pub fn new(options: Options) -> Result<Self, ConfigurationError> {
        let percentages = options.belt_percentages.as_slice();
        if percentages.len() != NUM_BELTS {
            return Err(ConfigurationError::WrongBeltCount {
                expected: NUM_BELTS,
                found: percentages.len(),
            });
        }
        let granularity = options.tlab_size;
        if options.heap_size % granularity != 0 {
            return Err(ConfigurationError::HeapSizeNotAligned {
                heap_size: options.heap_size,
                granularity,
            });
        }
        let heap = Mapping::new(options.heap_size, granularity.max(BYTES_IN_PAGE))
            .map_err(ConfigurationError::ReservationFailed)?;
        let belts =
            BeltManager::initialize(heap.start(), options.heap_size, percentages, granularity)?;
        let (to_space_size, mature_size) = (belts.belt(TO_SPACE).size(), belts.belt(MATURE).size());
        if mature_size < to_space_size / 2 {
            return Err(ConfigurationError::OldestBeltTooSmall {
                size: mature_size,
                previous_size: to_space_size,
            });
        }

        let root_table_bytes = raw_align_up(options.max_inspector_roots * BYTES_IN_WORD, BYTES_IN_PAGE);
        let root_table = Mapping::new(root_table_bytes, BYTES_IN_PAGE)
            .map_err(ConfigurationError::ReservationFailed)?;
        let inspectable = Box::new(InspectableHeapInfo::new());
        inspectable.set_root_table(root_table.start(), options.max_inspector_roots);
        inspectable.set_memory_regions(&belts.memory_regions());

        if options.verbose {
            info!("{}", *crate::build_info::BELTWAY_FULL_BUILD_INFO);
        }
        info!(
            "Initialized a {} Beltway heap at {}, belts {}",
            bytes_to_formatted_string(options.heap_size),
            heap.start(),
            options.belt_percentages
        );

        Ok(BeltwayHeap {
            daemon: StopTheWorldDaemon::new("beltway-collector"),
            card_table: CardTable::new(heap.start(), options.heap_size),
            options,
            heap,
            belts,
            inspectable,
            root_table,
            out_of_memory: AtomicBool::new(false),
            phase: Atomic::new(CollectorPhase::Idle),
            tlab_epoch: AtomicU64::new(0),
            gc_lock: Mutex::new(()),
            stats: HeapStatistics::new(),
            _p: PhantomData,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn belts(&self) -> &BeltManager {
        &self.belts
    }

    pub fn eden(&self) -> &Belt {
        self.belts.belt(EDEN)
    }

    pub fn to_space(&self) -> &Belt {
        self.belts.belt(TO_SPACE)
    }

    pub fn mature(&self) -> &Belt {
        self.belts.belt(MATURE)
    }

    pub fn card_table(&self) -> &CardTable {
        &self.card_table
    }

    pub fn inspectable(&self) -> &InspectableHeapInfo {
        &self.inspectable
    }

    pub fn stats(&self) -> &HeapStatistics {
        &self.stats
    }

    pub fn phase(&self) -> CollectorPhase {
        self.phase.load(Ordering::Acquire)
    }

    pub fn tlab_epoch(&self) -> u64 {
        self.tlab_epoch.load(Ordering::Acquire)
    }

    pub fn is_out_of_memory(&self) -> bool {
        self.out_of_memory.load(Ordering::Acquire)
    }

    /// Is the address inside the heap reservation?
    pub fn contains(&self, addr: Address) -> bool {
        self.heap.start() <= addr && addr < self.heap.end()
    }

    /// The inspector root table: first slot and number of slots.
    pub fn root_table(&self) -> (Address, usize) {
        debug_assert!(self.root_table.size() >= self.options.max_inspector_roots * BYTES_IN_WORD);
        self.inspectable.root_table()
    }

    /// Allocate directly in eden, bypassing TLABs. Returns `Address::ZERO` if eden is
    /// exhausted. Never collects.
    pub fn allocate(&self, size: usize) -> Address {
        self.eden()
            .bump_allocate(allocation_size::<VM>(size))
            .unwrap_or(Address::ZERO)
    }

    /// The write barrier. It does nothing unless card marking is enabled: the collector
    /// scans whole belts for roots and does not need a remembered set.
    pub fn write_barrier(&self, src: ObjectReference, _slot: Address, _target: ObjectReference) {
        if self.options.card_marking_barrier && self.contains(src.to_raw_address()) {
            self.card_table.mark(src.to_raw_address());
        }
    }

    /// Run a collection cycle.
    ///
    /// Returns `Ok(false)` without collecting if the heap already ran out of memory,
    /// `Ok(true)` after a successful cycle, and `Err` if this cycle found the heap
    /// exhausted. After an `Err` the heap stays out of memory.
    /// `requested_free_space` is only used for reporting.
    pub fn collect_garbage(&self, requested_free_space: usize) -> Result<bool, AllocationError> {
        let _guard = self.gc_lock.lock().unwrap_or_else(|p| p.into_inner());
        if self.is_out_of_memory() {
            debug!("Heap is out of memory, not collecting");
            return Ok(false);
        }

        VM::VMCollection::stop_all_mutators();
        let epoch = self.inspectable.notify_gc_started();
        self.stats.collections.inc();
        debug!(
            "GC {} started, {} bytes requested",
            epoch, requested_free_space
        );

        let result = self.collection_cycle(requested_free_space);

        self.phase.store(CollectorPhase::Idle, Ordering::Release);
        self.card_table.clear_all_cards();
        self.inspectable.set_memory_regions(&self.belts.memory_regions());
        if let Err(e) = &result {
            self.out_of_memory.store(true, Ordering::Release);
            warn!("GC {} ran out of memory: {}", epoch, e);
        }
        if self.options.verbose {
            info!("After GC {}:\n{}\n{}", epoch, self.belts.describe(), self.stats);
        }
        self.inspectable.notify_gc_completed();
        VM::VMCollection::resume_mutators();
        debug!("GC {} completed", epoch);

        match result {
            Ok(()) => Ok(true),
            Err(e) => {
                VM::VMCollection::out_of_memory(&e);
                Err(e)
            }
        }
    }

    fn collection_cycle(&self, requested_free_space: usize) -> Result<(), AllocationError> {
        let (eden, to_space, mature) = (self.eden(), self.to_space(), self.mature());

        let survivors = self.run_on_daemon(CollectorPhase::Minor, &[], |c| {
            c.find_young_survivors(eden)
        });
        if to_space.remaining() + mature.remaining() < survivors.bytes {
            // Collect the older belts first, treating the eden survivors as roots.
            debug!(
                "{} bytes survive in {}, making room before evacuating",
                survivors.bytes,
                eden.name()
            );
            self.collect_old_belts(requested_free_space, &survivors.objects)?;
            if to_space.remaining() + mature.remaining() < survivors.bytes {
                return Err(AllocationError::OutOfMemory {
                    requested: survivors.bytes,
                });
            }
        }
        // Survivors that do not fit in to-space overflow into mature.
        self.run_stage(CollectorPhase::Minor, &[], |c| {
            c.evacuate(eden, to_space, Some(mature))
        })?;
        self.tlab_epoch.fetch_add(1, Ordering::AcqRel);

        if to_space.remaining() < eden.size() {
            self.collect_old_belts(requested_free_space, &[])?;
        }
        Ok(())
    }

    /// Evacuate to-space into mature, compacting mature before if it cannot take
    /// to-space, and after if it is left with less room than half of to-space.
    fn collect_old_belts(
        &self,
        requested_free_space: usize,
        young_survivors: &[ObjectReference],
    ) -> Result<(), AllocationError> {
        let (to_space, mature) = (self.to_space(), self.mature());
        if mature.remaining() < to_space.used() {
            self.run_stage(CollectorPhase::Major, young_survivors, |c| c.compact(mature));
            if mature.remaining() < to_space.used() {
                return Err(AllocationError::OutOfMemory {
                    requested: to_space.used(),
                });
            }
        }
        self.run_stage(CollectorPhase::ToSpace, young_survivors, |c| {
            c.evacuate(to_space, mature, None)
        })?;

        let watermark = to_space.size() / 2;
        if mature.remaining() < watermark {
            self.run_stage(CollectorPhase::Major, young_survivors, |c| c.compact(mature));
            if mature.remaining() < watermark {
                return Err(AllocationError::OutOfMemory {
                    requested: requested_free_space.max(watermark),
                });
            }
        }
        Ok(())
    }

    /// Run a counted collection stage on the daemon.
    fn run_stage<R: Send>(
        &self,
        phase: CollectorPhase,
        young_survivors: &[ObjectReference],
        stage: impl FnOnce(&BeltCollector<VM>) -> R + Send,
    ) -> R {
        match phase {
            CollectorPhase::Minor => self.stats.minor_collections.inc(),
            CollectorPhase::ToSpace => self.stats.to_space_collections.inc(),
            CollectorPhase::Major => self.stats.major_collections.inc(),
            CollectorPhase::Idle => unreachable!(),
        }
        let result = self.run_on_daemon(phase, young_survivors, |c| {
            let result = stage(c);
            #[cfg(feature = "extreme_assertions")]
            self.verify_heap();
            result
        });
        trace!("{} stage done:\n{}", phase, self.belts.describe());
        result
    }

    fn run_on_daemon<R: Send>(
        &self,
        phase: CollectorPhase,
        young_survivors: &[ObjectReference],
        job: impl FnOnce(&BeltCollector<VM>) -> R + Send,
    ) -> R {
        self.phase.store(phase, Ordering::Release);
        self.daemon
            .execute(|| job(&BeltCollector::new(self, young_survivors)))
    }

    /// Check that the belts tile the heap and every belt parses as a sequence of
    /// objects with clear forwarding words.
    #[cfg(any(test, feature = "extreme_assertions"))]
    pub(crate) fn verify_heap(&self) {
        use crate::util::linear_scan::ObjectIterator;
        use crate::util::object_forwarding;
        assert!(self.belts.verify_partition(), "{}", self.belts.describe());
        // Eden may hold unformatted TLAB tails between collections.
        for belt in &self.belts.belts()[TO_SPACE..] {
            for object in ObjectIterator::<VM>::new(belt.start(), belt.allocation_mark()) {
                assert_eq!(
                    object_forwarding::read_forwarding_word::<VM>(object),
                    0,
                    "{} has GC bits set in {}",
                    object,
                    belt.name()
                );
            }
        }
    }
}
