//! A mock VM binding with a minimal object layout, for tests and benchmarks.
//!
//! An object is a header of three words followed by its reference slots and then raw
//! data words:
//!
//! | offset | field                                          |
//! |--------|------------------------------------------------|
//! | 0      | misc: the forwarding word, zero outside GC      |
//! | 8      | hub: the number of reference slots              |
//! | 16     | length: the object size in bytes                |
//! | 24     | reference slots, then data                      |
//!
//! Roots live in a global list. Tests that collect must run under
//! [`crate::util::test_util::serial_test`] and call [`reset`] when done.

use crate::plan::beltway::Mutator;
use crate::tele::layout::ObjectLayout;
use crate::util::constants::BYTES_IN_WORD;
use crate::util::{Address, ObjectReference};
use crate::vm::{Collection, ObjectModel, Scanning, VMBinding};
use std::sync::{Arc, Mutex};

pub const MISC_OFFSET: usize = 0;
pub const HUB_OFFSET: usize = BYTES_IN_WORD;
pub const LENGTH_OFFSET: usize = 2 * BYTES_IN_WORD;
pub const HEADER_SIZE: usize = 3 * BYTES_IN_WORD;

type ForwardingHook = Arc<dyn Fn(ObjectReference, ObjectReference) + Send + Sync>;

#[derive(Default)]
pub struct MockState {
    pub roots: Vec<ObjectReference>,
    pub forwarding_hook: Option<ForwardingHook>,
    pub stop_count: usize,
    pub resume_count: usize,
}

lazy_static! {
    // The mutex may get poisoned any time. Use read_mock/write_mock to access it.
    static ref MOCK_STATE: Mutex<MockState> = Mutex::new(MockState::default());
}

pub fn read_mock<F, R>(func: F) -> R
where
    F: FnOnce(&MockState) -> R,
{
    let lock = MOCK_STATE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    func(&lock)
}

pub fn write_mock<F, R>(func: F) -> R
where
    F: FnOnce(&mut MockState) -> R,
{
    let mut lock = MOCK_STATE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    func(&mut lock)
}

/// Forget all roots and hooks.
pub fn reset() {
    write_mock(|mock| *mock = MockState::default());
}

/// Add a root and return its index.
pub fn add_root(object: ObjectReference) -> usize {
    write_mock(|mock| {
        mock.roots.push(object);
        mock.roots.len() - 1
    })
}

pub fn root(index: usize) -> ObjectReference {
    read_mock(|mock| mock.roots[index])
}

pub fn set_root(index: usize, object: ObjectReference) {
    write_mock(|mock| mock.roots[index] = object);
}

pub fn set_forwarding_hook(hook: impl Fn(ObjectReference, ObjectReference) + Send + Sync + 'static) {
    write_mock(|mock| mock.forwarding_hook = Some(Arc::new(hook)));
}

/// Write an object header at `start`.
pub fn format_object(start: Address, size: usize, num_refs: usize) {
    assert!(size >= HEADER_SIZE + num_refs * BYTES_IN_WORD);
    assert!(size % BYTES_IN_WORD == 0);
    unsafe {
        (start + MISC_OFFSET).store::<usize>(0);
        (start + HUB_OFFSET).store::<usize>(num_refs);
        (start + LENGTH_OFFSET).store::<usize>(size);
    }
}

/// Allocate and format an object. Panics if the heap needs a collection.
pub fn alloc_object(mutator: &mut Mutator<MockVM>, size: usize, num_refs: usize) -> ObjectReference {
    let start = mutator.alloc(size);
    assert!(!start.is_zero(), "heap exhausted");
    format_object(start, size, num_refs);
    ObjectReference::from_raw_address(start)
}

pub fn object_size(object: ObjectReference) -> usize {
    unsafe { (object.to_raw_address() + LENGTH_OFFSET).load::<usize>() }
}

pub fn num_refs(object: ObjectReference) -> usize {
    unsafe { (object.to_raw_address() + HUB_OFFSET).load::<usize>() }
}

pub fn ref_slot(object: ObjectReference, index: usize) -> Address {
    debug_assert!(index < num_refs(object));
    object.to_raw_address() + HEADER_SIZE + index * BYTES_IN_WORD
}

pub fn get_ref(object: ObjectReference, index: usize) -> ObjectReference {
    unsafe { ref_slot(object, index).load::<ObjectReference>() }
}

pub fn set_ref(object: ObjectReference, index: usize, target: ObjectReference) {
    unsafe { ref_slot(object, index).store(target) }
}

fn data_slot(object: ObjectReference, index: usize) -> Address {
    let slot = object.to_raw_address() + HEADER_SIZE + (num_refs(object) + index) * BYTES_IN_WORD;
    debug_assert!(slot + BYTES_IN_WORD <= object.to_raw_address() + object_size(object));
    slot
}

pub fn get_data(object: ObjectReference, index: usize) -> usize {
    unsafe { data_slot(object, index).load::<usize>() }
}

pub fn set_data(object: ObjectReference, index: usize, value: usize) {
    unsafe { data_slot(object, index).store(value) }
}

/// The layout of mock objects, as the inspector sees it.
pub fn tele_layout() -> ObjectLayout {
    ObjectLayout {
        word_size: BYTES_IN_WORD,
        forwarding_offset: MISC_OFFSET,
        misc_offset: MISC_OFFSET,
        hub_offset: HUB_OFFSET,
        length_offset: LENGTH_OFFSET,
        size_offset: LENGTH_OFFSET,
        elements_offset: HEADER_SIZE,
    }
}

#[derive(Default)]
pub struct MockVM;

impl VMBinding for MockVM {
    type VMObjectModel = MockObjectModel;
    type VMScanning = MockScanning;
    type VMCollection = MockCollection;
}

pub struct MockObjectModel;

impl ObjectModel<MockVM> for MockObjectModel {
    const FORWARDING_POINTER_OFFSET: isize = MISC_OFFSET as isize;
    const MIN_OBJECT_SIZE: usize = HEADER_SIZE;

    fn get_current_size(object: ObjectReference) -> usize {
        object_size(object)
    }

    fn address_to_ref(start: Address) -> ObjectReference {
        ObjectReference::from_raw_address(start)
    }

    fn ref_to_object_start(object: ObjectReference) -> Address {
        object.to_raw_address()
    }

    fn fill_gap(start: Address, size: usize) {
        format_object(start, size, 0);
    }
}

pub struct MockScanning;

impl Scanning<MockVM> for MockScanning {
    fn scan_roots(visitor: &mut dyn FnMut(Address)) {
        // Visit without holding the lock: the visitor may call back into the mock.
        let mut roots = write_mock(|mock| std::mem::take(&mut mock.roots));
        for root in roots.iter_mut() {
            visitor(Address::from_mut_ptr(root as *mut ObjectReference));
        }
        write_mock(|mock| {
            debug_assert!(mock.roots.is_empty());
            mock.roots = roots;
        });
    }

    fn scan_object(object: ObjectReference, visitor: &mut dyn FnMut(Address)) {
        for i in 0..num_refs(object) {
            visitor(ref_slot(object, i));
        }
    }
}

pub struct MockCollection;

impl Collection<MockVM> for MockCollection {
    fn stop_all_mutators() {
        write_mock(|mock| mock.stop_count += 1);
    }

    fn resume_mutators() {
        write_mock(|mock| mock.resume_count += 1);
    }

    fn post_forwarding(from: ObjectReference, to: ObjectReference) {
        let hook = read_mock(|mock| mock.forwarding_hook.clone());
        if let Some(hook) = hook {
            hook(from, to);
        }
    }
}
