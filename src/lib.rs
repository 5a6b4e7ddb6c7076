// ============================================================================
// spark-sorted-map - A Reactive Sorted Map for Rust
// ============================================================================
//
// A comparator-ordered map that plugs into a small signals runtime: reading
// it inside an effect or derived registers a dependency, writing it
// invalidates those dependents once per transaction, and change listeners
// receive one record per affected entry.
// ============================================================================

pub mod collections;
pub mod core;
pub mod primitives;
pub mod reactivity;
pub mod sorted;

// Re-export core items at crate root for ergonomic access
pub use crate::core::constants;
pub use crate::core::config::{configure, current_config, with_config, ReactiveConfig, ReadPolicy};
pub use crate::core::context::{
    is_batching, is_tracking, is_untracking, with_context, write_version, ReactiveContext,
};
pub use crate::core::error::ReactiveError;
pub use crate::core::types::{AnyReaction, AnySource};

// Re-export primitives
pub use primitives::derived::{derived, Derived};
pub use primitives::effect::{effect, effect_tracking};

// Re-export reactivity functions
pub use reactivity::batching::{batch, untrack};
pub use reactivity::cell::TrackedCell;
pub use reactivity::scheduling::flush_sync;

// Re-export the map and its comparators
pub use collections::{
    ChangeKind, ChangeRecord, Listener, ObserveOptions, ReactiveSortedMap, Subscription,
    TrackedIter,
};
pub use sorted::{by_field, by_key, by_key_desc, by_value, comparator, Comparator, SortedMap};

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn context_starts_clean() {
        with_context(|ctx| {
            assert!(!ctx.has_active_reaction());
            assert!(!ctx.is_batching());
        });
        assert!(write_version() >= 1);
        assert!(!is_tracking());
        assert!(!is_untracking());
        assert_eq!(current_config(), ReactiveConfig::default());
    }

    #[test]
    fn map_drives_effect_and_listener_together() {
        let board: ReactiveSortedMap<&str, u32> =
            ReactiveSortedMap::named("board", by_field(|score: &u32| std::cmp::Reverse(*score)));
        let leader = Rc::new(RefCell::new(None));
        let changes = Rc::new(Cell::new(0));

        let _dispose = effect({
            let board = board.clone();
            let leader = leader.clone();
            move || *leader.borrow_mut() = board.first_key()
        });
        let sub = board.observe({
            let changes = changes.clone();
            move |_| changes.set(changes.get() + 1)
        });

        board.add("ann", 3);
        board.add("bob", 5);
        assert_eq!(*leader.borrow(), Some("bob"));

        board.update(&"ann", |s| s + 10).unwrap();
        assert_eq!(*leader.borrow(), Some("ann"));
        assert_eq!(changes.get(), 3);

        sub.dispose();
        board.clear();
        assert_eq!(*leader.borrow(), None);
        assert_eq!(changes.get(), 3);
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        let map: ReactiveSortedMap<u8, u8> = ReactiveSortedMap::new();
        let runs = Rc::new(Cell::new(0));
        let _dispose = effect({
            let map = map.clone();
            let runs = runs.clone();
            move || {
                untrack(|| map.len());
                runs.set(runs.get() + 1);
            }
        });

        map.add(1, 1);
        assert_eq!(runs.get(), 1);
        assert_eq!(map.observer_count(), 0);
    }
}
