// ============================================================================
// spark-sorted-map - Effect Scheduling
// ============================================================================
//
// There are no microtasks in Rust, so dirty effects run synchronously: right
// after the write that dirtied them, or when the outermost batch exits.
// ============================================================================

use tracing::error;

use crate::core::config::current_config;
use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::error::ReactiveError;
use crate::reactivity::tracking::is_dirty;

/// Run every pending effect, repeating while effects dirty other effects.
///
/// # Panics
/// When the queue is still non-empty after `max_flush_iterations` rounds.
pub fn flush_pending_reactions() {
    let was_flushing = with_context(|ctx| ctx.set_flushing(true));

    struct FlushGuard {
        was_flushing: bool,
    }

    impl Drop for FlushGuard {
        fn drop(&mut self) {
            with_context(|ctx| ctx.set_flushing(self.was_flushing));
        }
    }

    let _guard = FlushGuard { was_flushing };
    let max_iterations = current_config().max_flush_iterations;
    let mut iterations = 0u32;

    loop {
        let pending = with_context(|ctx| ctx.take_pending_reactions());
        if pending.is_empty() {
            break;
        }

        iterations += 1;
        if iterations > max_iterations {
            let err = ReactiveError::FlushLoop {
                iterations: max_iterations,
            };
            error!(%err, "aborting effect flush");
            panic!("{err}");
        }

        for reaction in pending.iter().filter_map(|weak| weak.upgrade()) {
            let flags = reaction.flags();
            if (flags & DESTROYED) != 0 || (flags & EFFECT) == 0 {
                continue;
            }
            // The same effect can be queued twice; only the first run sees it dirty
            if is_dirty(&*reaction) {
                reaction.update();
            }
        }
    }
}

/// Flush whatever is pending right now, unless a batch is still open.
pub fn flush_sync() {
    if with_context(|ctx| ctx.is_batching() || ctx.is_flushing()) {
        return;
    }
    flush_pending_reactions();
}
