// Allow this for now. Clippy suggests we should use Sft, Tlab, rather than SFT and TLAB.
#![allow(clippy::upper_case_acronyms)]

//! Beltway is a belt-based generational copying collector, together with the
//! inspector-side machinery a debugger needs to observe a process that uses it.
//!
//! The crate has two halves:
//! * The VM side. [`plan::beltway::BeltwayHeap`] carves one contiguous heap into
//!   belts (eden, to-space and mature), allocates through thread-local allocation
//!   buffers, and collects by moving survivors forward from belt to belt. The heap
//!   publishes its state through [`util::inspectable::InspectableHeapInfo`] so that
//!   a remote reader can follow it without running code in the process.
//! * The inspector side ([`tele`]). [`tele::vm::TeleVM`] reads the published state
//!   through a [`tele::data_access::DataAccess`], tracks remote objects across
//!   collections, and [`tele::watchpoint::WatchpointFactory`] manages memory
//!   watchpoints, including watchpoints that follow objects moved by the collector.
//!
//! A language runtime binds to the VM side by implementing [`vm::VMBinding`] and
//! calling into [`memory_manager`]. A debugger builds a [`tele::vm::TeleVM`] over
//! its own [`tele::process::TeleProcess`] and [`tele::data_access::DataAccess`].

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate static_assertions;

pub mod build_info;
pub mod memory_manager;
pub mod plan;
pub mod tele;
pub mod util;
pub mod vm;

pub use crate::plan::beltway::BeltwayHeap;
pub use crate::plan::beltway::Mutator;
