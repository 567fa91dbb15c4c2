//! The inspector's model of the observed VM.

use super::data_access::{DataAccess, DataIoError};
use super::heap_info::{EpochSnapshot, TeleHeapInfo};
use super::layout::ObjectLayout;
use super::object::TeleObjectRegistry;
use crate::util::Address;
use std::sync::{Arc, Mutex};

/// Notified after the inspector observed the end of a collection, once every tracked
/// object has been brought up to date.
pub trait GCCompletedListener: Send + Sync {
    fn gc_completed(&self);
}

pub struct TeleVM {
    access: Arc<dyn DataAccess>,
    heap_info: TeleHeapInfo,
    objects: TeleObjectRegistry,
    /// The counters as of the last `refresh`.
    epoch: Mutex<EpochSnapshot>,
    gc_completed_listeners: Mutex<Vec<Arc<dyn GCCompletedListener>>>,
}

impl TeleVM {
    /// Attach to a heap whose `InspectableHeapInfo` is at `heap_info`.
    pub fn new(
        access: Arc<dyn DataAccess>,
        heap_info: Address,
        layout: ObjectLayout,
    ) -> Result<Arc<Self>, DataIoError> {
        let heap_info = TeleHeapInfo::new(access.clone(), heap_info);
        let (root_table, capacity) = heap_info.root_table()?;
        let epoch = heap_info.epoch()?;
        info!(
            "Attached to heap info at {}: {} inspector roots at {}, GC epoch {}",
            heap_info.base(),
            capacity,
            root_table,
            epoch.gc_completed
        );
        Ok(Arc::new(TeleVM {
            objects: TeleObjectRegistry::new(access.clone(), layout, root_table, capacity),
            access,
            heap_info,
            epoch: Mutex::new(epoch),
            gc_completed_listeners: Mutex::new(vec![]),
        }))
    }

    pub fn access(&self) -> &dyn DataAccess {
        self.access.as_ref()
    }

    pub fn heap_info(&self) -> &TeleHeapInfo {
        &self.heap_info
    }

    pub fn layout(&self) -> &ObjectLayout {
        self.objects.layout()
    }

    pub fn objects(&self) -> &TeleObjectRegistry {
        &self.objects
    }

    /// The counters as of the last [`TeleVM::refresh`].
    pub fn epoch(&self) -> EpochSnapshot {
        *self.epoch.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn is_in_gc(&self) -> bool {
        self.epoch().is_in_gc()
    }

    /// Read the epoch counters. If a collection completed since the last refresh,
    /// update every tracked object and notify the GC-completed listeners.
    pub fn refresh(&self) -> Result<EpochSnapshot, DataIoError> {
        let current = self.heap_info.epoch()?;
        let previous = {
            let mut epoch = self.epoch.lock().unwrap_or_else(|p| p.into_inner());
            std::mem::replace(&mut *epoch, current)
        };
        debug_assert!(current.gc_started >= previous.gc_started);
        if current.gc_completed > previous.gc_completed {
            debug!(
                "Observed GC completion: epoch {} -> {}",
                previous.gc_completed, current.gc_completed
            );
            self.objects.update_after_gc()?;
            let listeners = self
                .gc_completed_listeners
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .clone();
            for listener in listeners {
                listener.gc_completed();
            }
        }
        Ok(current)
    }

    pub fn add_gc_completed_listener(&self, listener: Arc<dyn GCCompletedListener>) {
        self.gc_completed_listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(listener);
    }

    pub fn remove_gc_completed_listener(&self, listener: &Arc<dyn GCCompletedListener>) {
        self.gc_completed_listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .retain(|l| Arc::as_ptr(l) as *const () != Arc::as_ptr(listener) as *const ());
    }

    pub fn gc_completed_listener_count(&self) -> usize {
        self.gc_completed_listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }
}
