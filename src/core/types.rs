// ============================================================================
// spark-sorted-map - Type Definitions
// Type-erased traits for the reactive graph
// ============================================================================
//
// Graph operations (mark dirty, compare versions, wire dependencies) never
// need the value type, so sources and reactions are stored as trait objects:
// - Vec<Rc<dyn AnySource>> for a reaction's dependencies
// - Vec<Weak<dyn AnyReaction>> for a source's dependents
// ============================================================================

use std::any::Any;
use std::rc::{Rc, Weak};

use super::constants::*;

/// Type-erased source: something a reaction can depend on.
///
/// Implemented by the tracked cell and by deriveds.
pub trait AnySource: Any {
    fn flags(&self) -> u32;

    fn set_flags(&self, flags: u32);

    /// Version of the last change
    fn write_version(&self) -> u32;

    fn set_write_version(&self, version: u32);

    fn reaction_count(&self) -> usize;

    fn add_reaction(&self, reaction: Weak<dyn AnyReaction>);

    /// Drop weak references whose reaction is gone
    fn cleanup_dead_reactions(&self);

    /// Visit live reactions; return false from `f` to stop.
    fn for_each_reaction(&self, f: &mut dyn FnMut(Rc<dyn AnyReaction>) -> bool);

    fn remove_reaction(&self, reaction: &Rc<dyn AnyReaction>);

    fn is_derived(&self) -> bool {
        self.flags() & DERIVED != 0
    }

    fn is_dirty(&self) -> bool {
        self.flags() & DIRTY != 0
    }

    fn is_clean(&self) -> bool {
        self.flags() & CLEAN != 0
    }

    fn as_any(&self) -> &dyn Any;
}

/// Type-erased reaction: something that re-runs when its sources change.
///
/// Implemented by effects and deriveds.
pub trait AnyReaction: Any {
    fn flags(&self) -> u32;

    fn set_flags(&self, flags: u32);

    fn dep_count(&self) -> usize;

    fn add_dep(&self, source: Rc<dyn AnySource>);

    /// Returns true if `source` is already one of this reaction's dependencies.
    fn has_dep(&self, source: &Rc<dyn AnySource>) -> bool;

    fn clear_deps(&self);

    /// Truncate dependencies to the first `start`
    fn remove_deps_from(&self, start: usize);

    fn for_each_dep(&self, f: &mut dyn FnMut(&Rc<dyn AnySource>) -> bool);

    /// Run the reaction. Returns true if a derived's value changed.
    fn update(&self) -> bool;

    fn is_derived(&self) -> bool {
        self.flags() & DERIVED != 0
    }

    fn is_effect(&self) -> bool {
        self.flags() & EFFECT != 0
    }

    fn is_dirty(&self) -> bool {
        self.flags() & DIRTY != 0
    }

    fn is_maybe_dirty(&self) -> bool {
        self.flags() & MAYBE_DIRTY != 0
    }

    fn is_clean(&self) -> bool {
        self.flags() & CLEAN != 0
    }

    fn is_destroyed(&self) -> bool {
        self.flags() & DESTROYED != 0
    }

    fn mark_dirty(&self) {
        self.set_flags((self.flags() & STATUS_MASK) | DIRTY);
    }

    fn mark_clean(&self) {
        self.set_flags((self.flags() & STATUS_MASK) | CLEAN);
    }

    fn as_any(&self) -> &dyn Any;

    /// Deriveds are also sources; everything else returns None.
    fn as_derived_source(&self) -> Option<Rc<dyn AnySource>>;
}

/// Pointer identity for trait objects, ignoring vtables.
pub(crate) fn same_node<T: ?Sized, U: ?Sized>(a: &Rc<T>, b: &Rc<U>) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}
