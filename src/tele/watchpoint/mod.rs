//! Memory watchpoints in the observed process.
//!
//! A watchpoint traps reads, writes or executions of a region of memory. Its life is
//! `created (inactive) -> active <-> inactive -> disposed`: a watchpoint is active
//! while a trap is planted in the process, and is deactivated when its settings
//! change, when it moves, and while a collection runs unless it is enabled during GC.
//! A disposed watchpoint is dead for good, and any further use of it panics.
//!
//! Client watchpoints are created by the user through [`WatchpointFactory`] and never
//! overlap. System watchpoints are hidden and serve the inspector itself. A
//! watchpoint on an object is relocatable: it owns a system watchpoint over the
//! object's forwarding word, and when the collector writes a forwarding pointer there
//! it follows the object to its new location.

mod error;
mod factory;

pub use self::error::WatchpointError;
pub use self::factory::{WatchpointFactory, WatchpointListener};

use super::data_access::DataAccess;
use super::memory_region::MemoryRegion;
use super::object::{ObjectMemoryState, TeleObject};
use super::thread::{TeleNativeThread, ThreadState};
use crate::util::object_forwarding;
use crate::util::Address;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// What a watchpoint traps on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchpointSettings {
    pub trap_on_read: bool,
    pub trap_on_write: bool,
    pub trap_on_exec: bool,
    /// Keep trapping while a collection runs.
    pub enabled_during_gc: bool,
}

impl WatchpointSettings {
    pub const fn new(
        trap_on_read: bool,
        trap_on_write: bool,
        trap_on_exec: bool,
        enabled_during_gc: bool,
    ) -> Self {
        WatchpointSettings {
            trap_on_read,
            trap_on_write,
            trap_on_exec,
            enabled_during_gc,
        }
    }

    /// Does the watchpoint trap on anything?
    pub fn is_enabled(&self) -> bool {
        self.trap_on_read || self.trap_on_write || self.trap_on_exec
    }
}

impl fmt::Display for WatchpointSettings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let flag = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}{}",
            flag(self.trap_on_read, 'r'),
            flag(self.trap_on_write, 'w'),
            flag(self.trap_on_exec, 'x'),
            if self.enabled_during_gc { " gc" } else { "" }
        )
    }
}

/// The settings of the hidden watchpoint over a forwarding word.
pub(crate) const RELOCATION_WATCHPOINT_SETTINGS: WatchpointSettings =
    WatchpointSettings::new(false, true, false, true);

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum WatchpointKind {
    /// Created by the user, and visible.
    Client,
    /// Created by the inspector for its own use.
    System,
}

/// What happens when a watchpoint traps, outside of a collection.
enum TriggerHandler {
    /// Stop the process.
    AlwaysStop,
    /// Follow the object at `origin` if the collector forwarded it. Never stops.
    Relocation {
        owner: Weak<Watchpoint>,
        origin: Address,
    },
}

/// Where an object watchpoint is, relative to its object.
struct ObjectAnchor {
    object: Arc<TeleObject>,
    offset: usize,
    relocation_watchpoint: Option<Arc<Watchpoint>>,
}

struct WatchpointState {
    alive: bool,
    active: bool,
    settings: WatchpointSettings,
    region: MemoryRegion,
    anchor: Option<ObjectAnchor>,
    memory_cache: Option<Vec<u8>>,
}

/// A watchpoint. See the module documentation.
pub struct Watchpoint {
    kind: WatchpointKind,
    description: String,
    factory: Weak<WatchpointFactory>,
    handler: TriggerHandler,
    state: Mutex<WatchpointState>,
}

impl Watchpoint {
    fn new(
        kind: WatchpointKind,
        factory: Weak<WatchpointFactory>,
        description: &str,
        region: MemoryRegion,
        settings: WatchpointSettings,
        handler: TriggerHandler,
        anchor: Option<ObjectAnchor>,
    ) -> Self {
        Watchpoint {
            kind,
            description: description.to_string(),
            factory,
            handler,
            state: Mutex::new(WatchpointState {
                alive: true,
                active: false,
                settings,
                region,
                anchor,
                memory_cache: None,
            }),
        }
    }

    // Never call the process, the factory or `Display` while holding this.
    fn state(&self) -> MutexGuard<'_, WatchpointState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn factory(&self) -> Arc<WatchpointFactory> {
        match self.factory.upgrade() {
            Some(factory) => factory,
            None => panic!(
                "Watchpoint \"{}\" used after its factory was dropped",
                self.description
            ),
        }
    }

    fn check_alive(&self) {
        assert!(
            self.state().alive,
            "Watchpoint \"{}\" has been disposed",
            self.description
        );
    }

    pub fn kind(&self) -> WatchpointKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Does the watchpoint follow an object when the collector moves it?
    pub fn is_relocatable(&self) -> bool {
        self.state().anchor.is_some()
    }

    pub fn is_alive(&self) -> bool {
        self.state().alive
    }

    pub fn is_active(&self) -> bool {
        self.state().active
    }

    pub fn settings(&self) -> WatchpointSettings {
        self.state().settings
    }

    pub fn is_enabled(&self) -> bool {
        let state = self.state();
        state.alive && state.settings.is_enabled()
    }

    pub fn memory_region(&self) -> MemoryRegion {
        self.state().region
    }

    pub fn start(&self) -> Address {
        self.state().region.start()
    }

    /// The object a relocatable watchpoint is set on.
    pub fn object(&self) -> Option<Arc<TeleObject>> {
        self.state().anchor.as_ref().map(|a| a.object.clone())
    }

    /// The hidden watchpoint that catches the next move of the object.
    pub fn relocation_watchpoint(&self) -> Option<Arc<Watchpoint>> {
        self.state()
            .anchor
            .as_ref()
            .and_then(|a| a.relocation_watchpoint.clone())
    }

    /// The contents of the watched memory at the last cache update, if it was readable.
    pub fn memory_cache(&self) -> Option<Vec<u8>> {
        self.state().memory_cache.clone()
    }

    pub fn set_trap_on_read(&self, trap_on_read: bool) -> bool {
        self.update_settings(|s| s.trap_on_read = trap_on_read)
    }

    pub fn set_trap_on_write(&self, trap_on_write: bool) -> bool {
        self.update_settings(|s| s.trap_on_write = trap_on_write)
    }

    pub fn set_trap_on_exec(&self, trap_on_exec: bool) -> bool {
        self.update_settings(|s| s.trap_on_exec = trap_on_exec)
    }

    pub fn set_enabled_during_gc(&self, enabled_during_gc: bool) -> bool {
        self.update_settings(|s| s.enabled_during_gc = enabled_during_gc)
    }

    /// Disabling clears every trap flag. Enabling a watchpoint that traps on nothing
    /// makes it trap on writes.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.update_settings(|s| {
            if !enabled {
                s.trap_on_read = false;
                s.trap_on_write = false;
                s.trap_on_exec = false;
            } else if !s.is_enabled() {
                s.trap_on_write = true;
            }
        })
    }

    fn update_settings(&self, update: impl FnOnce(&mut WatchpointSettings)) -> bool {
        self.check_alive();
        update(&mut self.state().settings);
        let reset = self.reset();
        self.factory().update_after_watchpoint_changes();
        reset
    }

    /// Should the watchpoint be planted now?
    fn should_activate(&self) -> bool {
        let settings = {
            let state = self.state();
            if !state.alive || state.active {
                return false;
            }
            state.settings
        };
        settings.is_enabled() && (settings.enabled_during_gc || !self.factory().vm().is_in_gc())
    }

    /// Deactivate, then plant again with the current settings if they call for it.
    fn reset(&self) -> bool {
        if self.is_active() && !self.deactivate() {
            warn!("Failed to reset watchpoint: {}", self);
            return false;
        }
        if self.should_activate() && !self.activate() {
            warn!("Failed to reset and install watchpoint: {}", self);
            return false;
        }
        trace!("Watchpoint reset: {}", self);
        true
    }

    pub(crate) fn activate(&self) -> bool {
        let (region, settings) = {
            let state = self.state();
            assert!(state.alive, "Watchpoint \"{}\" has been disposed", self.description);
            assert!(
                !state.active,
                "Attempt to activate an active watchpoint: \"{}\"",
                self.description
            );
            (state.region, state.settings)
        };
        if self.factory().process().activate_watchpoint(region, &settings) {
            self.state().active = true;
            trace!("Watchpoint activated: {}", self);
            true
        } else {
            warn!("Failed to activate watchpoint: {}", self);
            false
        }
    }

    pub(crate) fn deactivate(&self) -> bool {
        let region = {
            let state = self.state();
            assert!(
                state.active,
                "Attempt to deactivate an inactive watchpoint: \"{}\"",
                self.description
            );
            state.region
        };
        if self.factory().process().deactivate_watchpoint(region) {
            self.state().active = false;
            trace!("Watchpoint deactivated: {}", self);
            true
        } else {
            warn!("Failed to deactivate watchpoint: {}", self);
            false
        }
    }

    /// Move the watchpoint to `new_start`, keeping its size. Only relocatable
    /// watchpoints move.
    pub fn relocate(&self, new_start: Address) -> bool {
        self.check_alive();
        assert!(
            self.is_relocatable(),
            "Attempt to relocate a fixed watchpoint: {}",
            self
        );
        if self.is_active() && !self.deactivate() {
            warn!("Failed to relocate watchpoint: {}", self);
            return false;
        }
        let old_start = {
            let mut state = self.state();
            let old_start = state.region.start();
            state.region = state.region.moved_to(new_start);
            old_start
        };
        self.factory().watchpoint_moved();
        debug!("Watchpoint relocated from {}: {}", old_start, self);
        if self.should_activate() && !self.activate() {
            warn!("Failed to install relocated watchpoint: {}", self);
            return false;
        }
        true
    }

    /// Deactivate the watchpoint and forget it. A relocatable watchpoint takes its
    /// hidden relocation watchpoint with it.
    pub fn dispose(&self) {
        let relocation_watchpoint = {
            let mut state = self.state();
            assert!(
                state.alive,
                "Attempt to dispose a disposed watchpoint: \"{}\"",
                self.description
            );
            state
                .anchor
                .as_mut()
                .and_then(|a| a.relocation_watchpoint.take())
        };
        if let Some(relocation_watchpoint) = relocation_watchpoint {
            relocation_watchpoint.dispose();
        }
        if self.is_active() {
            self.deactivate();
        }
        {
            let mut state = self.state();
            state.alive = false;
            state.active = false;
        }
        self.factory().remove_watchpoint(self);
    }

    /// The process is gone, and so are its traps.
    pub(crate) fn terminate(&self) {
        let mut state = self.state();
        state.alive = false;
        state.active = false;
        if let Some(anchor) = state.anchor.as_mut() {
            anchor.relocation_watchpoint = None;
        }
    }

    /// Handle a trap. Returns true if the process should stay stopped.
    ///
    /// While a collection runs, a watchpoint that is not enabled during GC ignores the
    /// trap and deactivates itself until the collection is over.
    pub fn handle_trigger_event(&self, thread: &TeleNativeThread) -> bool {
        self.check_alive();
        assert_eq!(
            thread.state(),
            ThreadState::Watchpoint,
            "Thread {} was not stopped by a watchpoint",
            thread.id()
        );
        let factory = self.factory();
        if factory.vm().is_in_gc() && !self.settings().enabled_during_gc {
            trace!("Ignoring trigger during GC: {}", self);
            if self.is_active() {
                self.deactivate();
            }
            return false;
        }
        match &self.handler {
            TriggerHandler::AlwaysStop => true,
            TriggerHandler::Relocation { owner, origin } => {
                if let Some(owner) = owner.upgrade() {
                    owner.follow_relocation(&factory, *origin);
                }
                false
            }
        }
    }

    /// The collector wrote the forwarding word of the object at `origin`. If it now
    /// points elsewhere, move this watchpoint along, and plant a new relocation
    /// watchpoint at the new origin.
    fn follow_relocation(self: &Arc<Self>, factory: &WatchpointFactory, origin: Address) {
        if !self.is_alive() {
            return;
        }
        let vm = factory.vm();
        let word = match vm
            .access()
            .read_word(vm.layout().forwarding_word_address(origin))
        {
            Ok(word) => word,
            Err(e) => {
                warn!("Cannot read the forwarding word of {}: {}", origin, e);
                return;
            }
        };
        if !object_forwarding::is_forwarded_word(word)
            || object_forwarding::forwarding_pointer_of_word(word) == origin
        {
            trace!("Ignoring spurious relocation trigger at {}: {}", origin, self);
            return;
        }
        let new_object = match vm.objects().get_forwarded_object(origin) {
            Ok(object) => object,
            Err(e) => {
                warn!("Unable to find the relocated object at {}: {}", origin, e);
                return;
            }
        };
        let offset = {
            let mut state = self.state();
            let Some(anchor) = state.anchor.as_mut() else {
                return;
            };
            anchor.object = new_object.clone();
            anchor.offset
        };
        self.relocate(new_object.origin() + offset);

        // Replace the relocation watchpoint for the next time the object moves.
        let old = self
            .state()
            .anchor
            .as_mut()
            .and_then(|a| a.relocation_watchpoint.take());
        if let Some(old) = old {
            old.dispose();
        }
        match factory.create_relocation_watchpoint(self, new_object.origin()) {
            Ok(replacement) => {
                if replacement.is_none() {
                    warn!("{} will not follow its object any further", self);
                }
                if let Some(anchor) = self.state().anchor.as_mut() {
                    anchor.relocation_watchpoint = replacement;
                }
            }
            Err(e) => warn!("Failed to replant the relocation watchpoint of {}: {}", self, e),
        }
    }

    fn set_relocation_watchpoint(&self, relocation_watchpoint: Option<Arc<Watchpoint>>) {
        if let Some(anchor) = self.state().anchor.as_mut() {
            anchor.relocation_watchpoint = relocation_watchpoint;
        }
    }

    /// Called for every client watchpoint once the inspector observed the end of a
    /// collection, after the tracked objects were updated.
    fn update_after_gc(&self, factory: &WatchpointFactory) {
        if !self.is_alive() {
            return;
        }
        let anchor = {
            let state = self.state();
            state.anchor.as_ref().map(|a| (a.object.clone(), a.offset))
        };
        if let Some((object, offset)) = anchor {
            match object.memory_state() {
                ObjectMemoryState::Live => {
                    if object.origin() + offset != self.start() {
                        warn!(
                            "Watchpoint relocation failure - watchpoint on live object at wrong location: {}",
                            self
                        );
                    }
                }
                ObjectMemoryState::Obsolete => {
                    warn!(
                        "Watchpoint relocation failure - watchpoint on obsolete object: {}",
                        self
                    );
                }
                ObjectMemoryState::Dead => {
                    // Keep watching the memory the object occupied.
                    let (region, settings) = (self.memory_region(), self.settings());
                    self.dispose();
                    match factory.create_region_watchpoint(
                        "Replacement for watchpoint on GC'd object",
                        region,
                        settings,
                    ) {
                        Ok(Some(replacement)) => {
                            debug!("Watchpoint on collected object replaced: {}", replacement)
                        }
                        Ok(None) => warn!("Failed to activate the replacement watchpoint at {}", region),
                        Err(e) => warn!(
                            "Failed to replace object watchpoint with region watchpoint: {}",
                            e
                        ),
                    }
                    return;
                }
            }
        }
        // It may have been deactivated during the collection.
        if self.should_activate() {
            self.activate();
        }
    }

    pub(crate) fn update_memory_cache(&self, access: &dyn DataAccess) {
        let region = self.memory_region();
        let mut buffer = vec![0u8; region.size()];
        let cache = match access.read_bytes(region.start(), &mut buffer) {
            Ok(()) => Some(buffer),
            // The region may not exist in the process (yet).
            Err(_) => None,
        };
        self.state().memory_cache = cache;
    }
}

impl fmt::Display for Watchpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (alive, active, settings, region) = {
            let state = self.state();
            (state.alive, state.active, state.settings, state.region)
        };
        write!(f, "Watchpoint{{{}", self.kind)?;
        if !alive {
            write!(f, "(DELETED)")?;
        }
        write!(
            f,
            ", {}, {}, {}, {}, \"{}\"}}",
            if alive && settings.is_enabled() {
                "enabled"
            } else {
                "disabled"
            },
            if active { "active" } else { "inactive" },
            settings,
            region,
            self.description
        )
    }
}

impl fmt::Debug for Watchpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
