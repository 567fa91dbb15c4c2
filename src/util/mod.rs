//! Utilities shared by the collector and the inspector.

/// Address and object reference types.
pub mod address;
/// Allocators.
pub mod alloc;
/// Constants about memory and heap layout.
pub mod constants;
/// Conversions between addresses, sizes and their human readable forms.
pub mod conversions;
/// Belts, the belt manager and the card table.
pub mod heap;
/// The state the collector publishes for an inspector.
pub mod inspectable;
/// Linear scan through a range of contiguously allocated objects.
pub mod linear_scan;
/// Logger initialization.
pub mod logger;
/// Wrappers for OS memory calls.
pub mod memory;
/// The forwarding word: forwarding pointers and mark bits.
pub mod object_forwarding;
/// Beltway options.
pub mod options;
/// Statistics counters for the collector.
pub mod statistics;
/// Test utilities. Only available in tests, or with the `test_private` feature.
#[cfg(any(test, feature = "test_private"))]
pub mod test_util;

pub use self::address::Address;
pub use self::address::ObjectReference;
