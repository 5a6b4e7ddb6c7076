// ============================================================================
// spark-sorted-map - Reactivity Module
// Tracked cells, dependency tracking, batching and effect scheduling
// ============================================================================

pub mod batching;
pub mod cell;
pub mod scheduling;
pub mod tracking;

pub use batching::{batch, untrack};
pub use cell::TrackedCell;
pub use scheduling::{flush_pending_reactions, flush_sync};
pub use tracking::{is_dirty, mark_reactions, notify_write, remove_reactions, track_read};
