//! Heap schemes.
//!
//! [`beltway::BeltwayHeap`] is the generational belt scheme: three belts (eden,
//! to-space, mature), TLAB allocation from eden, and a collector that evacuates
//! eden into to-space, to-space into mature, and compacts mature in place.

pub mod beltway;
