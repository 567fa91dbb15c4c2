//! The generational Beltway heap scheme.

mod collector;
mod daemon;
pub(crate) mod global;
mod mutator;

pub use self::collector::CollectorPhase;
pub use self::daemon::StopTheWorldDaemon;
pub use self::global::{BeltwayHeap, EDEN, MATURE, TO_SPACE};
pub use self::mutator::Mutator;
