use super::memory_region::MemoryRegion;
use super::watchpoint::WatchpointSettings;

/// The debugger's control over the observed process.
///
/// Implementations plant traps on memory. When a trap fires, the implementation
/// stops the thread, sets its state to `ThreadState::Watchpoint` and calls
/// `WatchpointFactory::handle_watchpoint_trigger` with the trapped address.
pub trait TeleProcess: Send + Sync {
    /// Plant a trap over `region`. Returns false if the platform refused.
    fn activate_watchpoint(&self, region: MemoryRegion, settings: &WatchpointSettings) -> bool;

    /// Remove the trap over `region`. Returns false if there was none or the platform
    /// refused.
    fn deactivate_watchpoint(&self, region: MemoryRegion) -> bool;

    /// How many traps the platform supports at once.
    fn maximum_watchpoint_count(&self) -> usize;
}
