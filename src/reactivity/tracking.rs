// ============================================================================
// spark-sorted-map - Dependency Tracking
// Registering reads and propagating writes through the reactive graph
// ============================================================================
//
// RefCell borrows must be released before mutating neighbours in the graph,
// so every walk here collects first and mutates second.
// ============================================================================

use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::types::{AnyReaction, AnySource, same_node};
use crate::reactivity::scheduling::flush_pending_reactions;

// =============================================================================
// TRACK READ
// =============================================================================

/// Register `source` as a dependency of the active reaction, if any.
///
/// Returns true when a dependency was recorded. Reading the same source
/// several times during one reaction run records it once.
pub fn track_read(source: Rc<dyn AnySource>) -> bool {
    with_context(|ctx| {
        if !ctx.has_active_reaction() || ctx.is_untracking() {
            return false;
        }

        let Some(reaction) = ctx.get_active_reaction().and_then(|weak| weak.upgrade()) else {
            return false;
        };

        if (reaction.flags() & REACTION_IS_UPDATING) != 0 {
            if ctx.new_deps.borrow().iter().any(|dep| same_node(dep, &source)) {
                return false;
            }
            ctx.add_new_dep(source);
            true
        } else {
            if reaction.has_dep(&source) {
                return false;
            }
            reaction.add_dep(source.clone());
            source.add_reaction(Rc::downgrade(&reaction));
            true
        }
    })
}

// =============================================================================
// NOTIFY WRITE
// =============================================================================

/// Tell the graph that `source` changed.
///
/// # Panics
/// When called while a derived is computing; deriveds must stay pure.
pub fn notify_write(source: Rc<dyn AnySource>) {
    let inside_derived = with_context(|ctx| {
        ctx.get_active_reaction()
            .and_then(|weak| weak.upgrade())
            .is_some_and(|reaction| reaction.is_derived())
    });
    if inside_derived {
        panic!(
            "Cannot change observables inside a derived. \
             Deriveds should be pure computations with no side effects."
        );
    }

    let version = with_context(|ctx| ctx.increment_write_version());
    source.set_write_version(version);

    mark_reactions(source, DIRTY);
}

// =============================================================================
// MARK REACTIONS
// =============================================================================

/// Mark every dependent of `source` with `status`.
///
/// Direct dependents get `status`; dependents reached through a derived get
/// MAYBE_DIRTY. Effects that turn dirty are queued and flushed unless a batch
/// or flush is already running.
pub fn mark_reactions(source: Rc<dyn AnySource>, status: u32) {
    let mut effects: Vec<Rc<dyn AnyReaction>> = Vec::new();
    let mut stack: Vec<(Rc<dyn AnySource>, u32)> = vec![(source, status)];

    while let Some((current, current_status)) = stack.pop() {
        current.cleanup_dead_reactions();

        let reactions: Vec<Rc<dyn AnyReaction>> = {
            let mut collected = Vec::new();
            current.for_each_reaction(&mut |reaction| {
                collected.push(reaction);
                true
            });
            collected
        };

        for reaction in reactions {
            let flags = reaction.flags();
            if (flags & DESTROYED) != 0 {
                continue;
            }

            let not_dirty = (flags & DIRTY) == 0;
            if not_dirty {
                set_signal_status(&*reaction, current_status);
            }

            if (flags & DERIVED) != 0 {
                if let Some(derived) = reaction.as_derived_source() {
                    stack.push((derived, MAYBE_DIRTY));
                }
            } else if not_dirty && (flags & EFFECT) != 0 {
                effects.push(reaction);
            }
        }
    }

    if effects.is_empty() {
        return;
    }

    with_context(|ctx| {
        for effect in &effects {
            ctx.add_pending_reaction(Rc::downgrade(effect));
        }
    });

    let should_flush = with_context(|ctx| !ctx.is_batching() && !ctx.is_flushing());
    if should_flush {
        flush_pending_reactions();
    }
}

// =============================================================================
// STATUS HELPERS
// =============================================================================

/// Replace the status bits (CLEAN / DIRTY / MAYBE_DIRTY) of a reaction.
pub fn set_signal_status(target: &dyn AnyReaction, status: u32) {
    target.set_flags((target.flags() & STATUS_MASK) | status);
}

/// Replace the status bits of a source.
pub fn set_source_status(target: &dyn AnySource, status: u32) {
    target.set_flags((target.flags() & STATUS_MASK) | status);
}

/// DIRTY and MAYBE_DIRTY both count; a MAYBE_DIRTY reaction re-runs
/// conservatively rather than walking its dependencies.
pub fn is_dirty(reaction: &dyn AnyReaction) -> bool {
    (reaction.flags() & (DIRTY | MAYBE_DIRTY)) != 0
}

// =============================================================================
// DEPENDENCY WIRING
// =============================================================================

/// Detach `reaction` from its dependencies starting at index `start`.
pub fn remove_reactions(reaction: Rc<dyn AnyReaction>, start: usize) {
    let stale: Vec<Rc<dyn AnySource>> = {
        let mut collected = Vec::new();
        let mut idx = 0;
        reaction.for_each_dep(&mut |dep| {
            if idx >= start {
                collected.push(dep.clone());
            }
            idx += 1;
            true
        });
        collected
    };

    for dep in stale {
        dep.remove_reaction(&reaction);
    }

    reaction.remove_deps_from(start);
}

/// Replace a reaction's dependencies with the ones collected during its run.
pub fn install_dependencies(reaction: Rc<dyn AnyReaction>, new_deps: Vec<Rc<dyn AnySource>>) {
    remove_reactions(reaction.clone(), 0);

    for dep in new_deps {
        if reaction.has_dep(&dep) {
            continue;
        }
        reaction.add_dep(dep.clone());
        dep.add_reaction(Rc::downgrade(&reaction));
    }
}

// =============================================================================
// RUN TRACKED
// =============================================================================

/// Run `f` as the active reaction and return what it produced together with
/// the sources it read.
///
/// The previous reaction, collected deps and untracking flag are restored on
/// the way out, also when `f` panics.
pub(crate) fn run_tracked<R>(
    reaction: &Rc<dyn AnyReaction>,
    f: impl FnOnce() -> R,
) -> (R, Vec<Rc<dyn AnySource>>) {
    struct TrackingGuard {
        reaction: Rc<dyn AnyReaction>,
        prev_reaction: Option<Weak<dyn AnyReaction>>,
        prev_deps: Vec<Rc<dyn AnySource>>,
        prev_untracking: bool,
    }

    impl Drop for TrackingGuard {
        fn drop(&mut self) {
            let prev_reaction = self.prev_reaction.take();
            let prev_deps = std::mem::take(&mut self.prev_deps);
            with_context(|ctx| {
                ctx.set_active_reaction(prev_reaction);
                ctx.swap_new_deps(prev_deps);
                ctx.set_untracking(self.prev_untracking);
            });
            self.reaction
                .set_flags(self.reaction.flags() & !REACTION_IS_UPDATING);
        }
    }

    let guard = with_context(|ctx| {
        let prev_reaction = ctx.set_active_reaction(Some(Rc::downgrade(reaction)));
        let prev_deps = ctx.swap_new_deps(Vec::new());
        let prev_untracking = ctx.set_untracking(false);
        TrackingGuard {
            reaction: reaction.clone(),
            prev_reaction,
            prev_deps,
            prev_untracking,
        }
    });
    reaction.set_flags(reaction.flags() | REACTION_IS_UPDATING);

    let result = f();
    let deps = with_context(|ctx| ctx.swap_new_deps(Vec::new()));
    drop(guard);

    (result, deps)
}

// =============================================================================
// TESTS
// =============================================================================
