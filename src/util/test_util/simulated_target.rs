//! A simulated observed process for inspector tests.
//!
//! Memory is a sparse set of words inside explicitly mapped regions. The target
//! publishes a fake `InspectableHeapInfo`, and plays the collector's part by hand:
//! tests start and complete collections, move objects and kill them. Watchpoint
//! traps fire on writes made with [`SimulatedTarget::write_word_and_trap`].

use super::mock_vm;
use crate::tele::data_access::{DataAccess, DataIoError};
use crate::tele::memory_region::MemoryRegion;
use crate::tele::process::TeleProcess;
use crate::tele::thread::{TeleNativeThread, ThreadState};
use crate::tele::vm::TeleVM;
use crate::tele::watchpoint::{WatchpointFactory, WatchpointSettings};
use crate::util::constants::{BYTES_IN_PAGE, BYTES_IN_WORD};
use crate::util::inspectable::InspectableHeapInfo;
use crate::util::object_forwarding::FORWARDED_BIT;
use crate::util::Address;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

pub const HEAP_INFO: Address = unsafe { Address::from_usize(0x1000_0000) };
pub const ROOT_TABLE: Address = unsafe { Address::from_usize(0x2000_0000) };
pub const ROOT_TABLE_CAPACITY: usize = 64;
pub const HEAP_START: Address = unsafe { Address::from_usize(0x4000_0000) };
pub const HEAP_SIZE: usize = 1 << 20;
pub const THREAD_LOCALS: Address = unsafe { Address::from_usize(0x3000_0000) };

pub struct SimulatedTarget {
    words: Mutex<HashMap<Address, [u8; BYTES_IN_WORD]>>,
    mapped: Vec<MemoryRegion>,
    traps: Mutex<Vec<(MemoryRegion, WatchpointSettings)>>,
    maximum_watchpoints: usize,
    refuse_activation: AtomicBool,
    activations: AtomicUsize,
    factory: Mutex<Weak<WatchpointFactory>>,
    thread: TeleNativeThread,
}

impl SimulatedTarget {
    pub fn new(maximum_watchpoints: usize) -> Arc<Self> {
        let target = Arc::new(SimulatedTarget {
            words: Mutex::new(HashMap::new()),
            mapped: vec![
                MemoryRegion::new(HEAP_INFO, BYTES_IN_PAGE),
                MemoryRegion::new(ROOT_TABLE, ROOT_TABLE_CAPACITY * BYTES_IN_WORD),
                MemoryRegion::new(THREAD_LOCALS, BYTES_IN_PAGE),
                MemoryRegion::new(HEAP_START, HEAP_SIZE),
            ],
            traps: Mutex::new(vec![]),
            maximum_watchpoints,
            refuse_activation: AtomicBool::new(false),
            activations: AtomicUsize::new(0),
            factory: Mutex::new(Weak::new()),
            thread: TeleNativeThread::new(1, None),
        });
        let layout = InspectableHeapInfo::layout();
        target.poke(HEAP_INFO + layout.roots_pointer, ROOT_TABLE.as_usize());
        target.poke(HEAP_INFO + layout.root_table_capacity, ROOT_TABLE_CAPACITY);
        target.poke(HEAP_INFO + layout.region_count, 1);
        target.poke(HEAP_INFO + layout.region(0) + layout.region_start, HEAP_START.as_usize());
        target.poke(HEAP_INFO + layout.region(0) + layout.region_size, HEAP_SIZE);
        target
    }

    pub fn tele_vm(self: &Arc<Self>) -> Arc<TeleVM> {
        TeleVM::new(self.clone(), HEAP_INFO, mock_vm::tele_layout()).unwrap()
    }

    /// A VM and a watchpoint factory over this target, with traps delivered to the factory.
    pub fn attach(self: &Arc<Self>) -> (Arc<TeleVM>, Arc<WatchpointFactory>) {
        let vm = self.tele_vm();
        let factory = WatchpointFactory::new(vm.clone(), self.clone());
        *self.factory.lock().unwrap() = Arc::downgrade(&factory);
        (vm, factory)
    }

    fn words(&self) -> MutexGuard<'_, HashMap<Address, [u8; BYTES_IN_WORD]>> {
        self.words.lock().unwrap()
    }

    fn is_mapped(&self, address: Address, size: usize) -> bool {
        self.mapped
            .iter()
            .any(|r| r.contains(address) && (size == 0 || r.contains(address + (size - 1))))
    }

    /// Read a word without any side effect.
    pub fn peek(&self, address: Address) -> usize {
        self.read_word(address).unwrap()
    }

    /// Write a word without triggering traps.
    pub fn poke(&self, address: Address, value: usize) {
        self.write_word(address, value).unwrap()
    }

    /// Write a word as the process would: a watchpoint trapping on writes to the
    /// address stops the thread and hands the trap to the factory. Returns true if
    /// the inspector wants the process to stay stopped.
    pub fn write_word_and_trap(&self, address: Address, value: usize) -> bool {
        self.poke(address, value);
        let trapped = self
            .traps
            .lock()
            .unwrap()
            .iter()
            .any(|(region, settings)| settings.trap_on_write && region.contains(address));
        if !trapped {
            return false;
        }
        let Some(factory) = self.factory.lock().unwrap().upgrade() else {
            return false;
        };
        self.thread.set_state(ThreadState::Watchpoint);
        let stop = factory.handle_watchpoint_trigger(address, &self.thread);
        self.thread.set_state(ThreadState::Running);
        stop
    }

    pub fn thread(&self) -> &TeleNativeThread {
        &self.thread
    }

    pub fn traps(&self) -> Vec<MemoryRegion> {
        self.traps.lock().unwrap().iter().map(|(r, _)| *r).collect()
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    pub fn set_refuse_activation(&self, refuse: bool) {
        self.refuse_activation.store(refuse, Ordering::SeqCst);
    }

    /// Lay out a mock object with no references.
    pub fn format_object(&self, origin: Address, size: usize) {
        assert!(size >= mock_vm::HEADER_SIZE && size % BYTES_IN_WORD == 0);
        for offset in (0..size).step_by(BYTES_IN_WORD) {
            self.poke(origin + offset, 0);
        }
        self.poke(origin + mock_vm::LENGTH_OFFSET, size);
    }

    fn write_counter(&self, offset: usize, value: u64) {
        self.write_bytes(HEAP_INFO + offset, &value.to_ne_bytes())
            .unwrap();
    }

    pub fn gc_started(&self) -> u64 {
        self.read_u64(HEAP_INFO + InspectableHeapInfo::layout().gc_started_counter)
            .unwrap()
    }

    pub fn begin_gc(&self) {
        let epoch = self.gc_started() + 1;
        self.write_counter(InspectableHeapInfo::layout().gc_started_counter, epoch);
    }

    pub fn end_gc(&self) {
        let epoch = self.gc_started();
        self.write_counter(InspectableHeapInfo::layout().gc_completed_counter, epoch);
    }

    /// Copy the object at `old` to `new`, install the forwarding pointer (which
    /// trips any watchpoint over the forwarding word), then update the root table.
    pub fn move_object(&self, old: Address, new: Address) {
        let size = self.peek(old + mock_vm::LENGTH_OFFSET);
        for offset in (0..size).step_by(BYTES_IN_WORD) {
            self.poke(new + offset, self.peek(old + offset));
        }
        self.write_word_and_trap(
            old + mock_vm::MISC_OFFSET,
            new.as_usize() | FORWARDED_BIT,
        );
        self.update_roots(old, new);
    }

    /// Replace root table entries equal to `old` with `new`.
    pub fn update_roots(&self, old: Address, new: Address) {
        for slot in 0..ROOT_TABLE_CAPACITY {
            let address = ROOT_TABLE + slot * BYTES_IN_WORD;
            if self.peek(address) == old.as_usize() {
                self.poke(address, new.as_usize());
            }
        }
    }

    /// The collector found the object unreachable.
    pub fn kill_object(&self, origin: Address) {
        self.update_roots(origin, Address::ZERO);
    }

    pub fn root_entries(&self) -> Vec<Address> {
        (0..ROOT_TABLE_CAPACITY)
            .map(|slot| unsafe { Address::from_usize(self.peek(ROOT_TABLE + slot * BYTES_IN_WORD)) })
            .filter(|a| !a.is_zero())
            .collect()
    }
}

impl DataAccess for SimulatedTarget {
    fn read_bytes(&self, address: Address, buffer: &mut [u8]) -> Result<(), DataIoError> {
        if !self.is_mapped(address, buffer.len()) {
            return Err(DataIoError {
                address,
                size: buffer.len(),
            });
        }
        let words = self.words();
        for (i, byte) in buffer.iter_mut().enumerate() {
            let a = address + i;
            let word = a.align_down(BYTES_IN_WORD);
            *byte = words.get(&word).map_or(0, |w| w[a - word]);
        }
        Ok(())
    }

    fn write_bytes(&self, address: Address, bytes: &[u8]) -> Result<(), DataIoError> {
        if !self.is_mapped(address, bytes.len()) {
            return Err(DataIoError {
                address,
                size: bytes.len(),
            });
        }
        let mut words = self.words();
        for (i, byte) in bytes.iter().enumerate() {
            let a = address + i;
            let word = a.align_down(BYTES_IN_WORD);
            words.entry(word).or_insert([0; BYTES_IN_WORD])[a - word] = *byte;
        }
        Ok(())
    }
}

impl TeleProcess for SimulatedTarget {
    fn activate_watchpoint(&self, region: MemoryRegion, settings: &WatchpointSettings) -> bool {
        if self.refuse_activation.load(Ordering::SeqCst) {
            return false;
        }
        self.activations.fetch_add(1, Ordering::SeqCst);
        self.traps.lock().unwrap().push((region, *settings));
        true
    }

    fn deactivate_watchpoint(&self, region: MemoryRegion) -> bool {
        let mut traps = self.traps.lock().unwrap();
        match traps.iter().position(|(r, _)| *r == region) {
            Some(index) => {
                traps.remove(index);
                true
            }
            None => false,
        }
    }

    fn maximum_watchpoint_count(&self) -> usize {
        self.maximum_watchpoints
    }
}
