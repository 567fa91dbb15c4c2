//! Remote objects, tracked across collections.
//!
//! The inspector cannot pin objects, so it registers each object it tracks in the
//! heap's root table. The collector treats that table as weak roots: after a
//! collection a slot holds the object's new origin, or zero if the object died.
//! [`TeleObjectRegistry::update_after_gc`] reads the table back.

use super::data_access::{DataAccess, DataIoError};
use super::layout::ObjectLayout;
use super::memory_region::MemoryRegion;
use crate::util::object_forwarding;
use crate::util::Address;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ObjectMemoryState {
    /// The object is at its recorded origin.
    Live,
    /// The object was copied elsewhere. Another `TeleObject` describes the copy.
    Obsolete,
    /// The collector found the object unreachable.
    Dead,
}

struct ObjectState {
    origin: Address,
    memory_state: ObjectMemoryState,
    root_slot: Option<usize>,
}

/// The inspector's handle on one object in the observed heap.
pub struct TeleObject {
    size: usize,
    state: Mutex<ObjectState>,
}

impl TeleObject {
    fn new(origin: Address, size: usize, root_slot: Option<usize>) -> Self {
        TeleObject {
            size,
            state: Mutex::new(ObjectState {
                origin,
                memory_state: ObjectMemoryState::Live,
                root_slot,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ObjectState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn origin(&self) -> Address {
        self.state().origin
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn memory_state(&self) -> ObjectMemoryState {
        self.state().memory_state
    }

    pub fn is_live(&self) -> bool {
        self.memory_state() == ObjectMemoryState::Live
    }

    /// The root-table slot keeping track of this object, while it is live.
    pub fn root_slot(&self) -> Option<usize> {
        self.state().root_slot
    }

    pub fn memory_region(&self) -> MemoryRegion {
        MemoryRegion::new(self.origin(), self.size)
    }
}

impl fmt::Display for TeleObject {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.state();
        write!(f, "object@{} ({} bytes, {})", state.origin, self.size, state.memory_state)
    }
}

/// Tracking an object failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    Io(DataIoError),
    /// Every slot of the root table is in use.
    RootTableFull { capacity: usize },
}

impl From<DataIoError> for RegistryError {
    fn from(e: DataIoError) -> Self {
        RegistryError::Io(e)
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RegistryError::Io(e) => write!(f, "{}", e),
            RegistryError::RootTableFull { capacity } => {
                write!(f, "all {} inspector root slots are in use", capacity)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

#[derive(Default)]
struct RegistryInner {
    /// Live objects by origin.
    by_origin: HashMap<Address, Arc<TeleObject>>,
    /// Occupied root slots.
    by_slot: HashMap<usize, Arc<TeleObject>>,
    free_slots: Vec<usize>,
    /// Slots at or above this index were never used.
    high_water: usize,
    /// Objects followed during the current collection, by their old origin.
    forwarded: HashMap<Address, Arc<TeleObject>>,
}

/// All objects the inspector tracks, keyed by origin.
pub struct TeleObjectRegistry {
    access: Arc<dyn DataAccess>,
    layout: ObjectLayout,
    root_table: Address,
    capacity: usize,
    inner: Mutex<RegistryInner>,
}

impl TeleObjectRegistry {
    pub fn new(
        access: Arc<dyn DataAccess>,
        layout: ObjectLayout,
        root_table: Address,
        capacity: usize,
    ) -> Self {
        TeleObjectRegistry {
            access,
            layout,
            root_table,
            capacity,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn slot_address(&self, slot: usize) -> Address {
        self.root_table + slot * self.layout.word_size
    }

    fn allocate_slot(&self, inner: &mut RegistryInner) -> Result<usize, RegistryError> {
        if let Some(slot) = inner.free_slots.pop() {
            return Ok(slot);
        }
        if inner.high_water == self.capacity {
            return Err(RegistryError::RootTableFull {
                capacity: self.capacity,
            });
        }
        inner.high_water += 1;
        Ok(inner.high_water - 1)
    }

    /// The tracked object at `origin`, registering it if needed. Registering writes
    /// `origin` into a free root slot.
    pub fn find_object(&self, origin: Address) -> Result<Arc<TeleObject>, RegistryError> {
        let mut inner = self.inner();
        if let Some(object) = inner.by_origin.get(&origin) {
            return Ok(object.clone());
        }
        let size = self.access.read_word(origin + self.layout.size_offset)?;
        let slot = self.allocate_slot(&mut inner)?;
        if let Err(e) = self.access.write_word(self.slot_address(slot), origin.as_usize()) {
            inner.free_slots.push(slot);
            return Err(e.into());
        }
        let object = Arc::new(TeleObject::new(origin, size, Some(slot)));
        trace!("Registered {} in root slot {}", object, slot);
        inner.by_origin.insert(origin, object.clone());
        inner.by_slot.insert(slot, object.clone());
        Ok(object)
    }

    /// The object `origin` was forwarded to, or the object at `origin` if it was not
    /// forwarded. Following a forwarding pointer makes the old object obsolete and
    /// hands its root slot to the new one.
    ///
    /// Only the old origin is ever written to the root table here: while the
    /// collection runs, the new origin may not hold the object yet, and the
    /// collector updates the slot itself.
    pub fn get_forwarded_object(&self, origin: Address) -> Result<Arc<TeleObject>, RegistryError> {
        if let Some(new_object) = self.inner().forwarded.get(&origin) {
            // Several watchpoints on one object all see the same move.
            return Ok(new_object.clone());
        }
        let old = self.find_object(origin)?;
        let word = self
            .access
            .read_word(self.layout.forwarding_word_address(origin))?;
        if !object_forwarding::is_forwarded_word(word) {
            return Ok(old);
        }
        let new_origin = object_forwarding::forwarding_pointer_of_word(word);
        if new_origin == origin {
            return Ok(old);
        }

        let mut inner = self.inner();
        if let Some(existing) = inner.by_origin.get(&new_origin).cloned() {
            inner.forwarded.insert(origin, existing.clone());
            return Ok(existing);
        }
        let slot = {
            let mut state = old.state();
            state.memory_state = ObjectMemoryState::Obsolete;
            state.root_slot.take()
        };
        inner.by_origin.remove(&origin);
        let new_object = Arc::new(TeleObject::new(new_origin, old.size, slot));
        if let Some(slot) = slot {
            inner.by_slot.insert(slot, new_object.clone());
        }
        inner.by_origin.insert(new_origin, new_object.clone());
        inner.forwarded.insert(origin, new_object.clone());
        trace!("{} forwarded to {}", origin, new_origin);
        Ok(new_object)
    }

    /// Bring every tracked object up to date with the root table, after a collection
    /// completed.
    pub fn update_after_gc(&self) -> Result<(), DataIoError> {
        let mut inner = self.inner();
        inner.forwarded.clear();
        let slots: Vec<(usize, Arc<TeleObject>)> = inner
            .by_slot
            .iter()
            .map(|(slot, object)| (*slot, object.clone()))
            .collect();
        for (slot, object) in slots {
            let entry = self.access.read_address(self.slot_address(slot))?;
            let old_origin = object.origin();
            if entry.is_zero() {
                {
                    let mut state = object.state();
                    state.memory_state = ObjectMemoryState::Dead;
                    state.root_slot = None;
                }
                inner.by_slot.remove(&slot);
                inner.free_slots.push(slot);
                if inner
                    .by_origin
                    .get(&old_origin)
                    .is_some_and(|o| Arc::ptr_eq(o, &object))
                {
                    inner.by_origin.remove(&old_origin);
                }
                debug!("{} died", object);
            } else if entry != old_origin {
                object.state().origin = entry;
                if inner
                    .by_origin
                    .get(&old_origin)
                    .is_some_and(|o| Arc::ptr_eq(o, &object))
                {
                    inner.by_origin.remove(&old_origin);
                }
                inner.by_origin.insert(entry, object.clone());
                trace!("{} moved from {}", object, old_origin);
            }
        }
        Ok(())
    }

    /// Every live tracked object.
    pub fn objects(&self) -> Vec<Arc<TeleObject>> {
        self.inner().by_origin.values().cloned().collect()
    }

    pub fn layout(&self) -> &ObjectLayout {
        &self.layout
    }
}
