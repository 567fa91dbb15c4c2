use crate::tele::memory_region::MemoryRegion;
use std::fmt;

/// Why a watchpoint could not be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchpointError {
    /// The platform supports no more watchpoints.
    TooManyWatchpoints { maximum: usize },
    /// The requested region overlaps an existing client watchpoint.
    DuplicateWatchpoint {
        requested: MemoryRegion,
        existing: MemoryRegion,
    },
}

impl fmt::Display for WatchpointError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WatchpointError::TooManyWatchpoints { maximum } => write!(
                f,
                "Number of watchpoints supported by platform ({}) exceeded",
                maximum
            ),
            WatchpointError::DuplicateWatchpoint {
                requested,
                existing,
            } => write!(
                f,
                "Watchpoint at {} overlaps the existing watchpoint at {}",
                requested, existing
            ),
        }
    }
}

impl std::error::Error for WatchpointError {}
