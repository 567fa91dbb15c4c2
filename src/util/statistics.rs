use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A named counter of events or bytes. Counters are updated by the collector
/// thread and may be read from any thread.
pub struct EventCounter {
    name: &'static str,
    count: AtomicU64,
}

impl EventCounter {
    pub const fn new(name: &'static str) -> Self {
        EventCounter {
            name,
            count: AtomicU64::new(0),
        }
    }

    /// Increment the event counter
    pub fn inc(&self) {
        self.inc_by(1);
    }

    /// Increment the event counter by provided value
    pub fn inc_by(&self, value: u64) {
        self.count.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for EventCounter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.get())
    }
}

/// Counters kept by the belt collector.
pub struct HeapStatistics {
    /// Collection cycles, one per call into the collector that did not fail fast.
    pub collections: EventCounter,
    /// Evacuations of eden into to-space.
    pub minor_collections: EventCounter,
    /// Evacuations of to-space into the mature belt.
    pub to_space_collections: EventCounter,
    /// Compactions of the mature belt.
    pub major_collections: EventCounter,
    /// Objects copied or slid to a new address.
    pub objects_moved: EventCounter,
    /// Bytes copied or slid to a new address.
    pub bytes_moved: EventCounter,
}

impl HeapStatistics {
    pub const fn new() -> Self {
        HeapStatistics {
            collections: EventCounter::new("collections"),
            minor_collections: EventCounter::new("minor"),
            to_space_collections: EventCounter::new("to_space"),
            major_collections: EventCounter::new("major"),
            objects_moved: EventCounter::new("objects_moved"),
            bytes_moved: EventCounter::new("bytes_moved"),
        }
    }

    fn counters(&self) -> [&EventCounter; 6] {
        [
            &self.collections,
            &self.minor_collections,
            &self.to_space_collections,
            &self.major_collections,
            &self.objects_moved,
            &self.bytes_moved,
        ]
    }
}

impl Default for HeapStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HeapStatistics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self.counters().iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(", "))
    }
}
