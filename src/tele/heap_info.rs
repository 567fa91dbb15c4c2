//! The inspector's reader of [`InspectableHeapInfo`].
//!
//! Every read is a plain memory read through [`DataAccess`]. A reader cannot lock the
//! heap, so it brackets each read with the two epoch counters: if a collection was in
//! progress, or one started while reading, the result is flagged as possibly
//! inconsistent.

use super::data_access::{DataAccess, DataIoError};
use super::memory_region::MemoryRegion;
use crate::util::inspectable::{InspectableHeapInfo, InspectableHeapInfoLayout};
use crate::util::Address;
use std::sync::Arc;

/// The epoch counters around a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EpochSnapshot {
    pub gc_started: u64,
    pub gc_completed: u64,
    /// False if a collection was running, or started, while the data was read.
    pub consistent: bool,
}

impl EpochSnapshot {
    pub fn is_in_gc(&self) -> bool {
        self.gc_started != self.gc_completed
    }
}

pub struct TeleHeapInfo {
    access: Arc<dyn DataAccess>,
    base: Address,
    layout: InspectableHeapInfoLayout,
}

impl TeleHeapInfo {
    /// `base` is the address of the heap's `InspectableHeapInfo`.
    pub fn new(access: Arc<dyn DataAccess>, base: Address) -> Self {
        TeleHeapInfo {
            access,
            base,
            layout: InspectableHeapInfo::layout(),
        }
    }

    pub fn base(&self) -> Address {
        self.base
    }

    fn read_counters(&self) -> Result<(u64, u64), DataIoError> {
        // Completed first: a reader must never see completed > started.
        let completed = self.access.read_u64(self.base + self.layout.gc_completed_counter)?;
        let started = self.access.read_u64(self.base + self.layout.gc_started_counter)?;
        Ok((started, completed))
    }

    /// The current epoch counters.
    pub fn epoch(&self) -> Result<EpochSnapshot, DataIoError> {
        let (gc_started, gc_completed) = self.read_counters()?;
        Ok(EpochSnapshot {
            gc_started,
            gc_completed,
            consistent: gc_started == gc_completed,
        })
    }

    /// Run `read` between two reads of the counters.
    fn read_consistent<T>(
        &self,
        read: impl FnOnce(&Self) -> Result<T, DataIoError>,
    ) -> Result<(T, EpochSnapshot), DataIoError> {
        let before = self.read_counters()?;
        let value = read(self)?;
        let after = self.read_counters()?;
        let snapshot = EpochSnapshot {
            gc_started: after.0,
            gc_completed: after.1,
            consistent: before == after && after.0 == after.1,
        };
        if !snapshot.consistent {
            debug!(
                "Heap info read across a collection: epochs {:?} then {:?}",
                before, after
            );
        }
        Ok((value, snapshot))
    }

    /// The published heap regions, one per belt.
    pub fn memory_regions(&self) -> Result<(Vec<MemoryRegion>, EpochSnapshot), DataIoError> {
        self.read_consistent(|this| {
            let layout = &this.layout;
            let count = this.access.read_word(this.base + layout.region_count)?;
            if count > layout.max_regions {
                return Err(DataIoError {
                    address: this.base + layout.region_count,
                    size: count,
                });
            }
            (0..count)
                .map(|i| {
                    let descriptor = this.base + layout.region(i);
                    let start = this.access.read_address(descriptor + layout.region_start)?;
                    let size = this.access.read_word(descriptor + layout.region_size)?;
                    Ok(MemoryRegion::new(start, size))
                })
                .collect()
        })
    }

    /// The inspector root table: its first slot and the number of slots.
    pub fn root_table(&self) -> Result<(Address, usize), DataIoError> {
        let start = self.access.read_address(self.base + self.layout.roots_pointer)?;
        let capacity = self.access.read_word(self.base + self.layout.root_table_capacity)?;
        Ok((start, capacity))
    }

    /// The old and new cell of the most recent object move.
    pub fn recent_relocation(&self) -> Result<((Address, Address), EpochSnapshot), DataIoError> {
        self.read_consistent(|this| {
            let old = this
                .access
                .read_address(this.base + this.layout.recent_relocation_old_cell)?;
            let new = this
                .access
                .read_address(this.base + this.layout.recent_relocation_new_cell)?;
            Ok((old, new))
        })
    }
}
