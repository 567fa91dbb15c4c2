//! State the heap publishes for an inspector.
//!
//! [`InspectableHeapInfo`] is a `#[repr(C)]` block of words at a fixed address. A
//! remote inspector locates it once and then parses it with plain memory reads, using
//! the offsets from [`InspectableHeapInfo::layout`]. It never runs code in the
//! observed process.
//!
//! The two epoch counters gate every cached view the inspector keeps. The collector
//! bumps `gc_started_counter` before touching the heap and `gc_completed_counter`
//! after it is done, so `started == completed` means the heap is quiescent and
//! `started > completed` means a collection is in progress. A reader that sees the
//! counters change across a read must treat what it read as possibly inconsistent.
//!
//! The root table is a block of words the inspector writes object origins into. The
//! collector treats it as a weak root set: entries are updated when their object
//! moves, and zeroed when their object dies.

use crate::util::constants::*;
use crate::util::Address;
use memoffset::offset_of;
use probe::probe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// The bounds of one heap region, as published to an inspector.
#[repr(C)]
#[derive(Default)]
pub struct MemoryRegionDescriptor {
    start: AtomicUsize,
    size: AtomicUsize,
}

/// See the module documentation.
#[repr(C)]
pub struct InspectableHeapInfo {
    gc_started_counter: AtomicU64,
    gc_completed_counter: AtomicU64,
    recent_relocation_old_cell: AtomicUsize,
    recent_relocation_new_cell: AtomicUsize,
    roots_pointer: AtomicUsize,
    root_table_capacity: AtomicUsize,
    region_count: AtomicUsize,
    regions: [MemoryRegionDescriptor; MAX_MEMORY_REGIONS],
}

/// Byte offsets of the fields of [`InspectableHeapInfo`], for remote readers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InspectableHeapInfoLayout {
    pub gc_started_counter: usize,
    pub gc_completed_counter: usize,
    pub recent_relocation_old_cell: usize,
    pub recent_relocation_new_cell: usize,
    pub roots_pointer: usize,
    pub root_table_capacity: usize,
    pub region_count: usize,
    pub regions: usize,
    pub region_descriptor_size: usize,
    pub region_start: usize,
    pub region_size: usize,
    pub max_regions: usize,
}

impl InspectableHeapInfoLayout {
    /// The offset of the i-th region descriptor.
    pub fn region(&self, index: usize) -> usize {
        debug_assert!(index < self.max_regions);
        self.regions + index * self.region_descriptor_size
    }
}

impl Default for InspectableHeapInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl InspectableHeapInfo {
    pub fn new() -> Self {
        InspectableHeapInfo {
            gc_started_counter: AtomicU64::new(0),
            gc_completed_counter: AtomicU64::new(0),
            recent_relocation_old_cell: AtomicUsize::new(0),
            recent_relocation_new_cell: AtomicUsize::new(0),
            roots_pointer: AtomicUsize::new(0),
            root_table_capacity: AtomicUsize::new(0),
            region_count: AtomicUsize::new(0),
            regions: Default::default(),
        }
    }

    pub fn layout() -> InspectableHeapInfoLayout {
        InspectableHeapInfoLayout {
            gc_started_counter: offset_of!(InspectableHeapInfo, gc_started_counter),
            gc_completed_counter: offset_of!(InspectableHeapInfo, gc_completed_counter),
            recent_relocation_old_cell: offset_of!(InspectableHeapInfo, recent_relocation_old_cell),
            recent_relocation_new_cell: offset_of!(InspectableHeapInfo, recent_relocation_new_cell),
            roots_pointer: offset_of!(InspectableHeapInfo, roots_pointer),
            root_table_capacity: offset_of!(InspectableHeapInfo, root_table_capacity),
            region_count: offset_of!(InspectableHeapInfo, region_count),
            regions: offset_of!(InspectableHeapInfo, regions),
            region_descriptor_size: std::mem::size_of::<MemoryRegionDescriptor>(),
            region_start: offset_of!(MemoryRegionDescriptor, start),
            region_size: offset_of!(MemoryRegionDescriptor, size),
            max_regions: MAX_MEMORY_REGIONS,
        }
    }

    /// The address an inspector reads this block from.
    pub fn address(&self) -> Address {
        Address::from_ref(self)
    }

    /// Publish the heap regions. Called at startup and after every collection, when
    /// belt bounds may have changed.
    pub fn set_memory_regions(&self, regions: &[(Address, usize)]) {
        assert!(
            regions.len() <= MAX_MEMORY_REGIONS,
            "At most {} regions can be published",
            MAX_MEMORY_REGIONS
        );
        for (descriptor, (start, size)) in self.regions.iter().zip(regions.iter()) {
            descriptor.start.store(start.as_usize(), Ordering::Relaxed);
            descriptor.size.store(*size, Ordering::Relaxed);
        }
        self.region_count.store(regions.len(), Ordering::Release);
    }

    pub fn memory_regions(&self) -> Vec<(Address, usize)> {
        let count = self.region_count.load(Ordering::Acquire);
        self.regions[..count]
            .iter()
            .map(|d| unsafe {
                (
                    Address::from_usize(d.start.load(Ordering::Relaxed)),
                    d.size.load(Ordering::Relaxed),
                )
            })
            .collect()
    }

    pub fn set_root_table(&self, start: Address, capacity: usize) {
        self.root_table_capacity.store(capacity, Ordering::Relaxed);
        self.roots_pointer.store(start.as_usize(), Ordering::Release);
    }

    /// The root table: its first slot and the number of slots.
    pub fn root_table(&self) -> (Address, usize) {
        let start = unsafe { Address::from_usize(self.roots_pointer.load(Ordering::Acquire)) };
        (start, self.root_table_capacity.load(Ordering::Relaxed))
    }

    /// The address of every root slot, occupied or not.
    pub fn root_slots(&self) -> impl Iterator<Item = Address> {
        let (start, capacity) = self.root_table();
        (0..capacity).map(move |i| start + i * BYTES_IN_WORD)
    }

    pub fn gc_started_counter(&self) -> u64 {
        self.gc_started_counter.load(Ordering::Acquire)
    }

    pub fn gc_completed_counter(&self) -> u64 {
        self.gc_completed_counter.load(Ordering::Acquire)
    }

    pub fn is_in_gc(&self) -> bool {
        self.gc_started_counter() != self.gc_completed_counter()
    }

    /// Called by the collector before it touches the heap. Returns the epoch of the
    /// collection that starts.
    pub fn notify_gc_started(&self) -> u64 {
        debug_assert!(!self.is_in_gc(), "A collection is already in progress");
        let epoch = self.gc_started_counter.fetch_add(1, Ordering::AcqRel) + 1;
        probe!(beltway, gc_started, epoch);
        beltway_inspectable_gc_started(epoch);
        epoch
    }

    /// Called by the collector when the heap is consistent again.
    pub fn notify_gc_completed(&self) {
        let epoch = self.gc_started_counter();
        debug_assert_eq!(self.gc_completed_counter() + 1, epoch);
        self.gc_completed_counter.store(epoch, Ordering::Release);
        probe!(beltway, gc_completed, epoch);
        beltway_inspectable_gc_completed(epoch);
    }

    /// Record the most recent move of an object.
    pub fn notify_object_relocated(&self, old_cell: Address, new_cell: Address) {
        self.recent_relocation_old_cell
            .store(old_cell.as_usize(), Ordering::Relaxed);
        self.recent_relocation_new_cell
            .store(new_cell.as_usize(), Ordering::Release);
    }

    /// The most recent move recorded by [`InspectableHeapInfo::notify_object_relocated`].
    pub fn recent_relocation(&self) -> (Address, Address) {
        unsafe {
            (
                Address::from_usize(self.recent_relocation_old_cell.load(Ordering::Relaxed)),
                Address::from_usize(self.recent_relocation_new_cell.load(Ordering::Acquire)),
            )
        }
    }
}

/// An empty function a debugger can break on to observe the start of a collection.
#[inline(never)]
#[no_mangle]
pub extern "C" fn beltway_inspectable_gc_started(epoch: u64) {
    std::hint::black_box(epoch);
}

/// An empty function a debugger can break on to observe the end of a collection.
#[inline(never)]
#[no_mangle]
pub extern "C" fn beltway_inspectable_gc_completed(epoch: u64) {
    std::hint::black_box(epoch);
}
