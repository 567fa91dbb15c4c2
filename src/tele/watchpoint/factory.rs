use super::{
    ObjectAnchor, TriggerHandler, Watchpoint, WatchpointError, WatchpointKind,
    WatchpointSettings, RELOCATION_WATCHPOINT_SETTINGS,
};
use crate::tele::layout::{FieldDescriptor, HeaderField};
use crate::tele::memory_region::MemoryRegion;
use crate::tele::object::TeleObject;
use crate::tele::process::TeleProcess;
use crate::tele::thread::{TeleNativeThread, TeleThreadLocalValues};
use crate::tele::vm::{GCCompletedListener, TeleVM};
use crate::util::Address;
use arc_swap::ArcSwap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Notified whenever the set of watchpoints, or the state of one, changes.
pub trait WatchpointListener: Send + Sync {
    fn watchpoints_changed(&self);
}

struct FactoryGCListener(Weak<WatchpointFactory>);

impl GCCompletedListener for FactoryGCListener {
    fn gc_completed(&self) {
        if let Some(factory) = self.0.upgrade() {
            factory.update_after_gc();
        }
    }
}

#[derive(Default)]
struct WatchpointSets {
    /// Sorted by start. Client watchpoints never overlap.
    client: Vec<Arc<Watchpoint>>,
    system: Vec<Arc<Watchpoint>>,
    /// Registered with the VM while any watchpoint exists.
    gc_listener: Option<Arc<dyn GCCompletedListener>>,
}

type Snapshot = Arc<Vec<Arc<Watchpoint>>>;

/// Creates and tracks every watchpoint of one observed process.
///
/// Mutations take one coarse lock. Queries read a snapshot that is rebuilt after
/// every mutation, and never block. No lock is held while calling the process, the
/// VM, a listener or a watchpoint.
pub struct WatchpointFactory {
    vm: Arc<TeleVM>,
    process: Arc<dyn TeleProcess>,
    this: Weak<WatchpointFactory>,
    sets: Mutex<WatchpointSets>,
    client_snapshot: ArcSwap<Vec<Arc<Watchpoint>>>,
    system_snapshot: ArcSwap<Vec<Arc<Watchpoint>>>,
    listeners: Mutex<Vec<Arc<dyn WatchpointListener>>>,
}

impl WatchpointFactory {
    pub fn new(vm: Arc<TeleVM>, process: Arc<dyn TeleProcess>) -> Arc<Self> {
        Arc::new_cyclic(|this| WatchpointFactory {
            vm,
            process,
            this: this.clone(),
            sets: Mutex::new(WatchpointSets::default()),
            client_snapshot: ArcSwap::from_pointee(vec![]),
            system_snapshot: ArcSwap::from_pointee(vec![]),
            listeners: Mutex::new(vec![]),
        })
    }

    pub fn vm(&self) -> &Arc<TeleVM> {
        &self.vm
    }

    pub fn process(&self) -> &dyn TeleProcess {
        self.process.as_ref()
    }

    fn sets(&self) -> MutexGuard<'_, WatchpointSets> {
        self.sets.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn add_watchpoint_listener(&self, listener: Arc<dyn WatchpointListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(listener);
    }

    pub fn remove_watchpoint_listener(&self, listener: &Arc<dyn WatchpointListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .retain(|l| Arc::as_ptr(l) as *const () != Arc::as_ptr(listener) as *const ());
    }

    /// Watch a fixed region of memory.
    ///
    /// Returns `Ok(None)` if the process refused to plant the watchpoint.
    pub fn create_region_watchpoint(
        &self,
        description: &str,
        region: MemoryRegion,
        settings: WatchpointSettings,
    ) -> Result<Option<Arc<Watchpoint>>, WatchpointError> {
        let watchpoint = Watchpoint::new(
            WatchpointKind::Client,
            self.this.clone(),
            description,
            region,
            settings,
            TriggerHandler::AlwaysStop,
            None,
        );
        self.add_client_watchpoint(Arc::new(watchpoint), 1)
    }

    /// Watch a whole object, following it when it moves.
    pub fn create_object_watchpoint(
        &self,
        description: &str,
        object: &Arc<TeleObject>,
        settings: WatchpointSettings,
    ) -> Result<Option<Arc<Watchpoint>>, WatchpointError> {
        self.create_object_based_watchpoint(description, object, 0, object.size(), settings)
    }

    /// Watch one field of an object, following the object when it moves.
    pub fn create_field_watchpoint(
        &self,
        description: &str,
        object: &Arc<TeleObject>,
        field: &FieldDescriptor,
        settings: WatchpointSettings,
    ) -> Result<Option<Arc<Watchpoint>>, WatchpointError> {
        self.create_object_based_watchpoint(description, object, field.offset, field.size, settings)
    }

    /// Watch one element of an array, following the array when it moves.
    pub fn create_array_element_watchpoint(
        &self,
        description: &str,
        object: &Arc<TeleObject>,
        element_size: usize,
        index: usize,
        settings: WatchpointSettings,
    ) -> Result<Option<Arc<Watchpoint>>, WatchpointError> {
        let offset = self.vm.layout().array_element_offset(element_size, index);
        self.create_object_based_watchpoint(description, object, offset, element_size, settings)
    }

    /// Watch one word of an object header, following the object when it moves.
    pub fn create_header_watchpoint(
        &self,
        description: &str,
        object: &Arc<TeleObject>,
        field: HeaderField,
        settings: WatchpointSettings,
    ) -> Result<Option<Arc<Watchpoint>>, WatchpointError> {
        let layout = self.vm.layout();
        let (offset, size) = (layout.header_offset(field), layout.word_size);
        self.create_object_based_watchpoint(description, object, offset, size, settings)
    }

    /// Watch one VM thread-local variable of a thread.
    pub fn create_vm_thread_local_watchpoint(
        &self,
        description: &str,
        thread_locals: &TeleThreadLocalValues,
        index: usize,
        settings: WatchpointSettings,
    ) -> Result<Option<Arc<Watchpoint>>, WatchpointError> {
        self.create_region_watchpoint(description, thread_locals.memory_region(index), settings)
    }

    fn create_object_based_watchpoint(
        &self,
        description: &str,
        object: &Arc<TeleObject>,
        offset: usize,
        size: usize,
        settings: WatchpointSettings,
    ) -> Result<Option<Arc<Watchpoint>>, WatchpointError> {
        assert!(
            object.is_live(),
            "Attempt to set an object-based watchpoint on an object that is not live: {}",
            object
        );
        let origin = object.origin();
        let watchpoint = Watchpoint::new(
            WatchpointKind::Client,
            self.this.clone(),
            description,
            MemoryRegion::new(origin + offset, size),
            settings,
            TriggerHandler::AlwaysStop,
            Some(ObjectAnchor {
                object: object.clone(),
                offset,
                relocation_watchpoint: None,
            }),
        );
        // One slot for the watchpoint, one for its relocation watchpoint.
        let Some(watchpoint) = self.add_client_watchpoint(Arc::new(watchpoint), 2)? else {
            return Ok(None);
        };
        match self.create_relocation_watchpoint(&watchpoint, origin) {
            Ok(Some(relocation_watchpoint)) => {
                watchpoint.set_relocation_watchpoint(Some(relocation_watchpoint))
            }
            Ok(None) => warn!("{} will not follow its object when it moves", watchpoint),
            Err(e) => warn!(
                "{} will not follow its object when it moves: {}",
                watchpoint, e
            ),
        }
        Ok(Some(watchpoint))
    }

    /// Plant a hidden watchpoint over the forwarding word of the object at `origin`,
    /// which relocates `owner` when the collector moves the object.
    pub(super) fn create_relocation_watchpoint(
        &self,
        owner: &Arc<Watchpoint>,
        origin: Address,
    ) -> Result<Option<Arc<Watchpoint>>, WatchpointError> {
        let layout = self.vm.layout();
        let region = MemoryRegion::new(layout.forwarding_word_address(origin), layout.word_size);
        let watchpoint = Watchpoint::new(
            WatchpointKind::System,
            self.this.clone(),
            "Object relocation watchpoint",
            region,
            RELOCATION_WATCHPOINT_SETTINGS,
            TriggerHandler::Relocation {
                owner: Arc::downgrade(owner),
                origin,
            },
            None,
        );
        self.add_system_watchpoint(Arc::new(watchpoint))
    }

    fn check_capacity(&self, sets: &WatchpointSets, needed: usize) -> Result<(), WatchpointError> {
        let maximum = self.process.maximum_watchpoint_count();
        if sets.client.len() + sets.system.len() + needed > maximum {
            Err(WatchpointError::TooManyWatchpoints { maximum })
        } else {
            Ok(())
        }
    }

    fn add_client_watchpoint(
        &self,
        watchpoint: Arc<Watchpoint>,
        needed: usize,
    ) -> Result<Option<Arc<Watchpoint>>, WatchpointError> {
        let region = watchpoint.memory_region();
        assert!(!region.is_empty(), "Attempt to watch an empty region: {}", watchpoint);
        {
            let mut sets = self.sets();
            self.check_capacity(&sets, needed)?;
            if let Some(existing) = sets
                .client
                .iter()
                .map(|w| w.memory_region())
                .find(|r| r.overlaps(&region))
            {
                return Err(WatchpointError::DuplicateWatchpoint {
                    requested: region,
                    existing,
                });
            }
            let index = sets.client.partition_point(|w| w.start() < region.start());
            sets.client.insert(index, watchpoint.clone());
        }
        if (!self.vm.is_in_gc() || watchpoint.settings().enabled_during_gc) && !watchpoint.activate()
        {
            watchpoint.terminate();
            self.sets().client.retain(|w| !Arc::ptr_eq(w, &watchpoint));
            return Ok(None);
        }
        trace!("Added watchpoint: {}", watchpoint);
        self.update_after_watchpoint_changes();
        Ok(Some(watchpoint))
    }

    fn add_system_watchpoint(
        &self,
        watchpoint: Arc<Watchpoint>,
    ) -> Result<Option<Arc<Watchpoint>>, WatchpointError> {
        {
            let mut sets = self.sets();
            self.check_capacity(&sets, 1)?;
            sets.system.push(watchpoint.clone());
        }
        if !watchpoint.activate() {
            watchpoint.terminate();
            self.sets().system.retain(|w| !Arc::ptr_eq(w, &watchpoint));
            return Ok(None);
        }
        trace!("Added watchpoint: {}", watchpoint);
        self.update_after_watchpoint_changes();
        Ok(Some(watchpoint))
    }

    pub(super) fn remove_watchpoint(&self, watchpoint: &Watchpoint) {
        let removed = {
            let mut sets = self.sets();
            let set = match watchpoint.kind() {
                WatchpointKind::Client => &mut sets.client,
                WatchpointKind::System => &mut sets.system,
            };
            let before = set.len();
            set.retain(|w| !std::ptr::eq(Arc::as_ptr(w), watchpoint));
            set.len() < before
        };
        assert!(removed, "Failed to remove watchpoint: {}", watchpoint);
        trace!("Removed watchpoint: {}", watchpoint);
        self.update_after_watchpoint_changes();
    }

    /// A client watchpoint changed its start. Keep the client set sorted.
    pub(super) fn watchpoint_moved(&self) {
        self.sets().client.sort_by_key(|w| w.start());
        self.update_after_watchpoint_changes();
    }

    /// Republish the snapshots, make sure the factory hears about completed
    /// collections exactly while watchpoints exist, and tell the listeners.
    pub(super) fn update_after_watchpoint_changes(&self) {
        let (register, unregister) = {
            let mut sets = self.sets();
            self.client_snapshot.store(Arc::new(sets.client.clone()));
            self.system_snapshot.store(Arc::new(sets.system.clone()));
            if sets.client.len() + sets.system.len() > 0 {
                if sets.gc_listener.is_none() {
                    let listener: Arc<dyn GCCompletedListener> =
                        Arc::new(FactoryGCListener(self.this.clone()));
                    sets.gc_listener = Some(listener.clone());
                    (Some(listener), None)
                } else {
                    (None, None)
                }
            } else {
                (None, sets.gc_listener.take())
            }
        };
        if let Some(listener) = register {
            self.vm.add_gc_completed_listener(listener);
        }
        if let Some(listener) = unregister {
            self.vm.remove_gc_completed_listener(&listener);
        }
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        for listener in listeners {
            listener.watchpoints_changed();
        }
    }

    /// Every client watchpoint, sorted by start. Never blocks.
    pub fn client_watchpoints(&self) -> Snapshot {
        self.client_snapshot.load_full()
    }

    pub fn system_watchpoints(&self) -> Snapshot {
        self.system_snapshot.load_full()
    }

    pub fn watchpoint_count(&self) -> usize {
        self.client_snapshot.load().len() + self.system_snapshot.load().len()
    }

    /// The client watchpoint covering `address`.
    pub fn find_client_watchpoint(&self, address: Address) -> Option<Arc<Watchpoint>> {
        let client = self.client_snapshot.load();
        let index = client.partition_point(|w| w.start() <= address);
        if index == 0 {
            return None;
        }
        let candidate = &client[index - 1];
        if candidate.memory_region().contains(address) {
            Some(candidate.clone())
        } else {
            None
        }
    }

    /// Every client watchpoint overlapping `region`.
    pub fn find_client_watchpoints(&self, region: MemoryRegion) -> Vec<Arc<Watchpoint>> {
        self.client_snapshot
            .load()
            .iter()
            .filter(|w| w.memory_region().overlaps(&region))
            .cloned()
            .collect()
    }

    /// A system watchpoint covering `address`.
    pub fn find_system_watchpoint(&self, address: Address) -> Option<Arc<Watchpoint>> {
        self.system_snapshot
            .load()
            .iter()
            .find(|w| w.memory_region().contains(address))
            .cloned()
    }

    /// A thread stopped on a trap at `address`. Returns true if the process should
    /// stay stopped.
    ///
    /// A trap covered by an active system watchpoint is the collector moving an
    /// object: only the system watchpoints see it. Otherwise every active client
    /// watchpoint covering the address handles it.
    pub fn handle_watchpoint_trigger(&self, address: Address, thread: &TeleNativeThread) -> bool {
        if let Err(e) = self.vm.refresh() {
            warn!("Cannot read the GC state of the process: {}", e);
        }
        let covering = |set: &[Arc<Watchpoint>]| -> Vec<Arc<Watchpoint>> {
            set.iter()
                .filter(|w| w.is_active() && w.memory_region().contains(address))
                .cloned()
                .collect()
        };
        let system = covering(self.system_snapshot.load_full().as_slice());
        let triggered = if system.is_empty() {
            covering(self.client_snapshot.load_full().as_slice())
        } else {
            system
        };
        if triggered.is_empty() {
            debug!("No active watchpoint covers the trapped address {}", address);
            return false;
        }
        let mut stop = false;
        for watchpoint in triggered {
            // An earlier handler may have disposed or moved it.
            if watchpoint.is_alive()
                && watchpoint.is_active()
                && watchpoint.memory_region().contains(address)
            {
                stop |= watchpoint.handle_trigger_event(thread);
            }
        }
        stop
    }

    fn update_after_gc(&self) {
        for watchpoint in self.client_watchpoints().iter() {
            trace!("Updating after GC: {}", watchpoint);
            watchpoint.update_after_gc(self);
        }
    }

    /// Read the current contents of every client watchpoint's memory.
    pub fn update_watchpoint_memory_caches(&self) {
        for watchpoint in self.client_watchpoints().iter() {
            watchpoint.update_memory_cache(self.vm.access());
        }
    }

    pub fn write_summary(&self, writer: &mut dyn io::Write) -> io::Result<()> {
        writeln!(writer, "Watchpoints :")?;
        for watchpoint in self
            .client_watchpoints()
            .iter()
            .chain(self.system_watchpoints().iter())
        {
            writeln!(writer, "  {}", watchpoint)?;
        }
        Ok(())
    }

    /// The process exited: its traps are gone. Forget every watchpoint.
    pub fn process_terminated(&self) {
        let (client, system) = {
            let mut sets = self.sets();
            (
                std::mem::take(&mut sets.client),
                std::mem::take(&mut sets.system),
            )
        };
        debug!(
            "Process terminated, dropping {} watchpoints",
            client.len() + system.len()
        );
        for watchpoint in client.iter().chain(system.iter()) {
            watchpoint.terminate();
        }
        self.update_after_watchpoint_changes();
    }
}
