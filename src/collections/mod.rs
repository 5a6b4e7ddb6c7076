// ============================================================================
// spark-sorted-map - Reactive Collections
// The reactive facade over SortedMap, its change records and listeners
// ============================================================================
//
// Two ways to watch a map:
//
// 1. Dependency tracking: effects and deriveds that read the map re-run after
//    any change, coalesced per transaction
// 2. Change listeners: callbacks that get one record per affected entry
// ============================================================================

mod change;
mod iter;
mod listeners;
mod sorted_map;

pub use change::{ChangeKind, ChangeRecord};
pub use iter::TrackedIter;
pub use listeners::{Listener, ObserveOptions, Subscription};
pub use sorted_map::ReactiveSortedMap;
