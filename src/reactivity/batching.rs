// ============================================================================
// spark-sorted-map - Batching
// Transactions: coalesce invalidations into one reaction pass
// ============================================================================

use crate::core::context::with_context;
use crate::reactivity::scheduling::flush_sync;

// =============================================================================
// BATCH
// =============================================================================

/// Run `f` as one transaction.
///
/// Effects dirtied inside `f` run once, after the outermost batch returns,
/// however many writes happened. Every map mutation runs inside its own
/// batch, so a single bulk call is already one transaction.
///
/// # Example
///
/// ```
/// use spark_sorted_map::{batch, effect, ReactiveSortedMap};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let scores: ReactiveSortedMap<u32, u32> = ReactiveSortedMap::new();
/// let runs = Rc::new(Cell::new(0));
///
/// let _dispose = effect({
///     let scores = scores.clone();
///     let runs = runs.clone();
///     move || {
///         let _ = scores.len();
///         runs.set(runs.get() + 1);
///     }
/// });
/// assert_eq!(runs.get(), 1);
///
/// batch(|| {
///     scores.add(1, 10);
///     scores.add(2, 20);
///     scores.remove_key(&1);
/// });
///
/// assert_eq!(runs.get(), 2);
/// ```
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    with_context(|ctx| ctx.enter_batch());

    // Exit the batch even when `f` panics
    struct BatchGuard;

    impl Drop for BatchGuard {
        fn drop(&mut self) {
            let depth = with_context(|ctx| ctx.exit_batch());
            if depth == 0 && !std::thread::panicking() {
                flush_sync();
            }
        }
    }

    let _guard = BatchGuard;
    f()
}

// =============================================================================
// UNTRACK
// =============================================================================

/// Read observables without creating dependencies.
///
/// # Example
///
/// ```
/// use spark_sorted_map::{effect, untrack, ReactiveSortedMap};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let map: ReactiveSortedMap<u32, &str> = ReactiveSortedMap::new();
/// let runs = Rc::new(Cell::new(0));
///
/// let _dispose = effect({
///     let map = map.clone();
///     let runs = runs.clone();
///     move || {
///         let _ = untrack(|| map.len());
///         runs.set(runs.get() + 1);
///     }
/// });
///
/// map.add(1, "one");
/// assert_eq!(runs.get(), 1);
/// ```
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let prev = with_context(|ctx| ctx.set_untracking(true));

    struct UntrackGuard {
        prev: bool,
    }

    impl Drop for UntrackGuard {
        fn drop(&mut self) {
            with_context(|ctx| ctx.set_untracking(self.prev));
        }
    }

    let _guard = UntrackGuard { prev };
    f()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::{is_batching, is_untracking};
    use crate::effect;
    use crate::reactivity::cell::TrackedCell;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn batch_defers_effects_until_outermost_exit() {
        let cell = TrackedCell::new("batched");
        let runs = Rc::new(Cell::new(0));

        let _dispose = effect({
            let cell = cell.clone();
            let runs = runs.clone();
            move || {
                cell.report_observed();
                runs.set(runs.get() + 1);
            }
        });
        assert_eq!(runs.get(), 1);

        batch(|| {
            cell.report_changed();
            assert_eq!(runs.get(), 1);

            batch(|| {
                cell.report_changed();
            });
            // Inner exit does not flush
            assert_eq!(runs.get(), 1);

            cell.report_changed();
        });

        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn batch_returns_value() {
        assert_eq!(batch(|| 42), 42);
    }

    #[test]
    fn batch_depth_unwinds_on_panic() {
        let result = std::panic::catch_unwind(|| batch(|| panic!("inside batch")));
        assert!(result.is_err());
        assert!(!is_batching());
    }

    #[test]
    fn untrack_restores_flag() {
        assert!(!is_untracking());
        untrack(|| {
            assert!(is_untracking());
            untrack(|| assert!(is_untracking()));
            assert!(is_untracking());
        });
        assert!(!is_untracking());
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        let cell = TrackedCell::new("quiet");
        let runs = Rc::new(Cell::new(0));

        let _dispose = effect({
            let cell = cell.clone();
            let runs = runs.clone();
            move || {
                untrack(|| cell.report_observed());
                runs.set(runs.get() + 1);
            }
        });

        cell.report_changed();
        assert_eq!(runs.get(), 1);
        assert_eq!(cell.observer_count(), 0);
    }
}
