use super::memory_region::MemoryRegion;
use crate::util::constants::BYTES_IN_WORD;
use crate::util::Address;
use std::sync::Mutex;

/// What a thread of the observed process is doing, as seen by the inspector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ThreadState {
    Running,
    Suspended,
    /// Stopped at a breakpoint.
    Breakpoint,
    /// Stopped by a watchpoint trap.
    Watchpoint,
    Terminated,
}

/// The word-sized VM thread-local variables of one thread, stored contiguously.
#[derive(Debug, Clone)]
pub struct TeleThreadLocalValues {
    start: Address,
    names: Vec<String>,
}

impl TeleThreadLocalValues {
    pub fn new(start: Address, names: Vec<String>) -> Self {
        TeleThreadLocalValues { start, names }
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// The memory holding the variable at `index`.
    pub fn memory_region(&self, index: usize) -> MemoryRegion {
        assert!(
            index < self.names.len(),
            "Thread local {} out of {}",
            index,
            self.names.len()
        );
        MemoryRegion::new(self.start + index * BYTES_IN_WORD, BYTES_IN_WORD)
    }
}

/// A native thread of the observed process.
pub struct TeleNativeThread {
    id: u64,
    state: Mutex<ThreadState>,
    thread_locals: Option<TeleThreadLocalValues>,
}

impl TeleNativeThread {
    pub fn new(id: u64, thread_locals: Option<TeleThreadLocalValues>) -> Self {
        TeleNativeThread {
            id,
            state: Mutex::new(ThreadState::Suspended),
            thread_locals,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ThreadState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_state(&self, state: ThreadState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    pub fn thread_locals(&self) -> Option<&TeleThreadLocalValues> {
        self.thread_locals.as_ref()
    }
}
