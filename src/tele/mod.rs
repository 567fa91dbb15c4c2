//! The inspector side: observing a process that runs the Beltway heap.
//!
//! Everything here works on the observed process through two seams: a
//! [`data_access::DataAccess`] to read and write its memory, and a
//! [`process::TeleProcess`] to plant watchpoint traps. Neither needs the process
//! to run any code on the inspector's behalf. The process may be the current one
//! (see [`data_access::LocalDataAccess`]) or a remote one behind a debugger.
//!
//! [`vm::TeleVM`] follows the heap's collection epochs and keeps the inspector's
//! [`object::TeleObject`]s up to date. [`watchpoint::WatchpointFactory`] manages
//! watchpoints, including watchpoints that follow objects as the collector moves
//! them.

pub mod data_access;
pub mod heap_info;
pub mod layout;
pub mod memory_region;
pub mod object;
pub mod process;
pub mod thread;
pub mod vm;
pub mod watchpoint;
