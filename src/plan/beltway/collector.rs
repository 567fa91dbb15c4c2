use super::global::BeltwayHeap;
use crate::util::alloc::AllocationError;
use crate::util::heap::Belt;
use crate::util::linear_scan::ObjectIterator;
use crate::util::object_forwarding;
use crate::util::{Address, ObjectReference};
use crate::vm::{Collection, ObjectModel, Scanning, VMBinding};
use bytemuck::NoUninit;

/// What the collector is doing. Stages always run in this order within a cycle,
/// although any of them after `Minor` may be skipped.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, NoUninit, strum_macros::Display)]
pub enum CollectorPhase {
    Idle,
    /// Evacuating eden into to-space.
    Minor,
    /// Evacuating to-space into the mature belt.
    ToSpace,
    /// Compacting the mature belt in place.
    Major,
}

/// The objects of the youngest belt reachable at the start of a cycle.
#[derive(Debug, Default)]
pub(crate) struct YoungSurvivors {
    pub objects: Vec<ObjectReference>,
    pub bytes: usize,
}

/// Moves live objects between belts. One collector exists per stage and runs on
/// the stop-the-world daemon while mutators are stopped.
///
/// There is no remembered set: the write barrier is a no-op, so every stage treats
/// all objects outside the belts being collected as roots. The youngest belt is the
/// exception. Mutators leave unformatted TLAB tails in it, so it cannot be walked.
/// A stage that runs while it still holds objects is given its survivors instead.
pub(crate) struct BeltCollector<'a, VM: VMBinding> {
    heap: &'a BeltwayHeap<VM>,
    young_survivors: &'a [ObjectReference],
}

impl<'a, VM: VMBinding> BeltCollector<'a, VM> {
    pub fn new(heap: &'a BeltwayHeap<VM>, young_survivors: &'a [ObjectReference]) -> Self {
        BeltCollector {
            heap,
            young_survivors,
        }
    }

    fn load_slot(slot: Address) -> ObjectReference {
        unsafe { slot.load::<ObjectReference>() }
    }

    fn store_slot(slot: Address, object: ObjectReference) {
        unsafe { slot.store::<ObjectReference>(object) }
    }

    /// Visit the reference slots of every object in every belt not in `exclude`.
    /// The youngest belt contributes only its known survivors.
    fn scan_other_belts(&self, exclude: &[&Belt], visitor: &mut dyn FnMut(Address)) {
        for belt in self.heap.belts().belts() {
            if exclude.iter().any(|b| b.index() == belt.index()) {
                continue;
            }
            if belt.index() == 0 {
                for object in self.young_survivors {
                    VM::VMScanning::scan_object(*object, visitor);
                }
                continue;
            }
            for object in ObjectIterator::<VM>::new(belt.start(), belt.allocation_mark()) {
                VM::VMScanning::scan_object(object, visitor);
            }
        }
    }

    /// Find the reachable objects of the youngest belt without moving anything. The
    /// mark bits are cleared again before returning.
    pub fn find_young_survivors(&self, eden: &Belt) -> YoungSurvivors {
        debug_assert_eq!(eden.index(), 0);
        let objects = self.mark(eden);
        let mut bytes = 0;
        for object in &objects {
            bytes += VM::VMObjectModel::get_current_size(*object);
            object_forwarding::clear_forwarding_bits::<VM>(*object);
        }
        debug!("{} has {} survivors, {} bytes", eden.name(), objects.len(), bytes);
        YoungSurvivors { objects, bytes }
    }

    /// Rewrite the inspector root table. `resolve` returns the new value for an
    /// entry that points into the collected belt: the object's new location, or
    /// None if it died. Entries outside the collected belt are left alone.
    fn process_inspector_roots(
        &self,
        collected: &Belt,
        resolve: impl Fn(ObjectReference) -> Option<ObjectReference>,
    ) {
        for slot in self.heap.inspectable().root_slots() {
            let object = Self::load_slot(slot);
            if object.is_null() || !collected.contains_allocated(object.to_raw_address()) {
                continue;
            }
            match resolve(object) {
                Some(new_object) => {
                    if new_object != object {
                        trace!("Inspector root {} moved to {}", object, new_object);
                        Self::store_slot(slot, new_object);
                    }
                }
                None => {
                    trace!("Inspector root {} died", object);
                    Self::store_slot(slot, ObjectReference::NULL);
                }
            }
        }
    }

    fn record_move(&self, from: ObjectReference, to: ObjectReference, size: usize) {
        self.heap.inspectable().notify_object_relocated(
            VM::VMObjectModel::ref_to_object_start(from),
            VM::VMObjectModel::ref_to_object_start(to),
        );
        VM::VMCollection::post_forwarding(from, to);
        self.heap.stats().objects_moved.inc();
        self.heap.stats().bytes_moved.inc_by(size as u64);
    }

    /// Copy every object in `from` reachable from the roots into `to`, then reset
    /// `from`. Objects that do not fit in `to` go to `overflow`.
    ///
    /// The caller checks that the survivors fit. If they do not, copying stops at
    /// the first object without room and the heap is out of memory: `from` is not
    /// reset and references already updated keep pointing at the copies.
    pub fn evacuate(&self, from: &Belt, to: &Belt, overflow: Option<&Belt>) -> Result<(), AllocationError> {
        debug!("Evacuating {} into {}", from.name(), to.name());

        // Copies into the overflow belt start at its current mark.
        let mut overflow_scan = overflow.map(|b| (b, b.allocation_mark()));
        let mut exhausted = false;
        let mut process_slot = |slot: Address| {
            let object = Self::load_slot(slot);
            if !exhausted && !object.is_null() && from.contains_allocated(object.to_raw_address()) {
                match self.forward(object, to, overflow) {
                    Some(new_object) => Self::store_slot(slot, new_object),
                    None => exhausted = true,
                }
            }
        };
        VM::VMScanning::scan_roots(&mut process_slot);
        self.scan_other_belts(&[from, to], &mut process_slot);

        // Cheney scan: objects already in `to` and every copy we make are scanned in
        // allocation order. The marks grow while we scan.
        let mut cursor = to.start();
        loop {
            let mut scanned = false;
            while cursor < to.allocation_mark() {
                cursor += Self::scan_object_at(cursor, &mut process_slot);
                scanned = true;
            }
            if let Some((belt, overflow_cursor)) = overflow_scan.as_mut() {
                while *overflow_cursor < belt.allocation_mark() {
                    *overflow_cursor += Self::scan_object_at(*overflow_cursor, &mut process_slot);
                    scanned = true;
                }
            }
            if !scanned {
                break;
            }
        }
        if exhausted {
            return Err(AllocationError::OutOfMemory {
                requested: from.used(),
            });
        }

        self.process_inspector_roots(from, |object| {
            if object_forwarding::is_forwarded::<VM>(object) {
                Some(object_forwarding::read_forwarding_pointer::<VM>(object))
            } else {
                None
            }
        });
        from.reset();
        Ok(())
    }

    /// Scan the object at `cursor` and return its size.
    fn scan_object_at(cursor: Address, visitor: &mut dyn FnMut(Address)) -> usize {
        let object = VM::VMObjectModel::address_to_ref(cursor);
        VM::VMScanning::scan_object(object, visitor);
        VM::VMObjectModel::get_current_size(object)
    }

    /// Copy an object into `to` (or `overflow`) unless it already was, and return
    /// the copy. Returns None if neither belt has room for it.
    fn forward(
        &self,
        object: ObjectReference,
        to: &Belt,
        overflow: Option<&Belt>,
    ) -> Option<ObjectReference> {
        if object_forwarding::is_forwarded::<VM>(object) {
            return Some(object_forwarding::read_forwarding_pointer::<VM>(object));
        }
        let size = VM::VMObjectModel::get_current_size(object);
        let Some(dest) = to
            .bump_allocate(size)
            .or_else(|| overflow.and_then(|b| b.bump_allocate(size)))
        else {
            warn!("No room for {} ({} bytes) while evacuating into {}", object, size, to.name());
            return None;
        };
        // Copy first so that anyone following the forwarding pointer finds a complete object.
        let new_object = VM::VMObjectModel::copy_to(object, dest);
        object_forwarding::write_forwarding_pointer::<VM>(object, new_object);
        self.record_move(object, new_object, size);
        Some(new_object)
    }

    /// Slide the live objects of `belt` down to its start, in four passes over the
    /// belt: mark, compute forwarding pointers, update references, move.
    pub fn compact(&self, belt: &Belt) {
        debug!("Compacting {}", belt.name());
        let start = belt.start();
        let old_mark = belt.allocation_mark();

        self.mark(belt);
        let new_mark = self.calculate_forwarding_pointers(belt, start, old_mark);
        self.update_references(belt, start, old_mark);
        self.slide(start, old_mark);

        belt.set_allocation_mark(new_mark);
        belt.zero_above_mark(old_mark);
        debug!(
            "Compacted {}: {} bytes live, {} bytes freed",
            belt.name(),
            new_mark - start,
            old_mark - new_mark
        );
    }

    fn try_mark(belt: &Belt, slot: Address) -> Option<ObjectReference> {
        let object = Self::load_slot(slot);
        if !object.is_null()
            && belt.contains_allocated(object.to_raw_address())
            && object_forwarding::test_and_mark::<VM>(object)
        {
            Some(object)
        } else {
            None
        }
    }

    /// Mark every object of `belt` reachable from outside it, and return them.
    fn mark(&self, belt: &Belt) -> Vec<ObjectReference> {
        let mut worklist = vec![];
        let mut visit = |slot: Address| {
            if let Some(object) = Self::try_mark(belt, slot) {
                worklist.push(object);
            }
        };
        VM::VMScanning::scan_roots(&mut visit);
        self.scan_other_belts(&[belt], &mut visit);

        let mut marked = vec![];
        while let Some(object) = worklist.pop() {
            VM::VMScanning::scan_object(object, &mut |slot| {
                if let Some(child) = Self::try_mark(belt, slot) {
                    worklist.push(child);
                }
            });
            marked.push(object);
        }
        marked
    }

    /// Assign each marked object its address after sliding. Objects that move get a
    /// forwarding pointer. Returns the new allocation mark.
    fn calculate_forwarding_pointers(&self, belt: &Belt, start: Address, old_mark: Address) -> Address {
        let mut to = start;
        for object in ObjectIterator::<VM>::new(start, old_mark) {
            if !object_forwarding::is_marked::<VM>(object) {
                continue;
            }
            let size = VM::VMObjectModel::get_current_size(object);
            let new_object = VM::VMObjectModel::address_to_ref(to);
            if new_object != object {
                object_forwarding::write_forwarding_pointer::<VM>(object, new_object);
                self.record_move(object, new_object, size);
            }
            to += size;
        }
        debug_assert!(to <= belt.allocation_mark());
        to
    }

    fn update_references(&self, belt: &Belt, start: Address, old_mark: Address) {
        let mut update = |slot: Address| {
            let object = Self::load_slot(slot);
            if !object.is_null()
                && belt.contains_allocated(object.to_raw_address())
                && object_forwarding::is_forwarded::<VM>(object)
            {
                Self::store_slot(slot, object_forwarding::read_forwarding_pointer::<VM>(object));
            }
        };
        VM::VMScanning::scan_roots(&mut update);
        self.scan_other_belts(&[belt], &mut update);
        for object in ObjectIterator::<VM>::new(start, old_mark) {
            if object_forwarding::is_marked::<VM>(object) {
                VM::VMScanning::scan_object(object, &mut update);
            }
        }
        self.process_inspector_roots(belt, |object| {
            if object_forwarding::is_marked::<VM>(object) {
                Some(object_forwarding::get_forwarded_object::<VM>(object))
            } else {
                None
            }
        });
    }

    /// Move every marked object to its forwarding address and clear its GC bits.
    fn slide(&self, start: Address, old_mark: Address) {
        let mut cursor = start;
        while cursor < old_mark {
            let object = VM::VMObjectModel::address_to_ref(cursor);
            // Read the size before moving: an earlier copy never reaches this object,
            // but this object's own copy may overwrite its header.
            let size = VM::VMObjectModel::get_current_size(object);
            if object_forwarding::is_marked::<VM>(object) {
                let new_object = object_forwarding::get_forwarded_object::<VM>(object);
                if new_object != object {
                    VM::VMObjectModel::copy_to(object, VM::VMObjectModel::ref_to_object_start(new_object));
                }
                object_forwarding::clear_forwarding_bits::<VM>(new_object);
            }
            cursor += size;
        }
    }
}
