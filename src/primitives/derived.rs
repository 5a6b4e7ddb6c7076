// ============================================================================
// spark-sorted-map - Derived Values
// Lazy computed values that cache and update when dependencies change
// ============================================================================
//
// A derived is both a source (effects depend on it) and a reaction (it
// depends on tracked cells). Invalidation only marks it; the computation
// runs on the next read.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::types::{AnyReaction, AnySource, same_node};
use crate::reactivity::tracking::{install_dependencies, run_tracked, set_source_status, track_read};

// =============================================================================
// DERIVED INNER
// =============================================================================

pub struct DerivedInner<T> {
    flags: Cell<u32>,
    func: Box<dyn Fn() -> T>,
    value: RefCell<Option<T>>,
    write_version: Cell<u32>,
    reactions: RefCell<Vec<Weak<dyn AnyReaction>>>,
    deps: RefCell<Vec<Rc<dyn AnySource>>>,
    self_weak: RefCell<Weak<DerivedInner<T>>>,
}

impl<T: Clone + PartialEq + 'static> DerivedInner<T> {
    fn new(func: Box<dyn Fn() -> T>) -> Rc<Self> {
        let inner = Rc::new(Self {
            flags: Cell::new(DERIVED | SOURCE | DIRTY),
            func,
            value: RefCell::new(None),
            write_version: Cell::new(0),
            reactions: RefCell::new(Vec::new()),
            deps: RefCell::new(Vec::new()),
            self_weak: RefCell::new(Weak::new()),
        });
        *inner.self_weak.borrow_mut() = Rc::downgrade(&inner);
        inner
    }

    /// Recompute if marked, tracking what the computation reads.
    fn refresh(self: &Rc<Self>) {
        if (self.flags.get() & (DIRTY | MAYBE_DIRTY)) == 0 {
            return;
        }

        let reaction = self.clone() as Rc<dyn AnyReaction>;
        let (next, deps) = run_tracked(&reaction, || (self.func)());
        install_dependencies(reaction, deps);

        let changed = self.value.borrow().as_ref() != Some(&next);
        if changed {
            *self.value.borrow_mut() = Some(next);
            let version = with_context(|ctx| ctx.increment_write_version());
            self.write_version.set(version);
        }
        set_source_status(&**self, CLEAN);
    }
}

impl<T: Clone + PartialEq + 'static> AnySource for DerivedInner<T> {
    fn flags(&self) -> u32 {
        self.flags.get()
    }

    fn set_flags(&self, flags: u32) {
        self.flags.set(flags);
    }

    fn write_version(&self) -> u32 {
        self.write_version.get()
    }

    fn set_write_version(&self, version: u32) {
        self.write_version.set(version);
    }

    fn reaction_count(&self) -> usize {
        self.reactions.borrow().len()
    }

    fn add_reaction(&self, reaction: Weak<dyn AnyReaction>) {
        self.reactions.borrow_mut().push(reaction);
    }

    fn cleanup_dead_reactions(&self) {
        self.reactions.borrow_mut().retain(|w| w.strong_count() > 0);
    }

    fn for_each_reaction(&self, f: &mut dyn FnMut(Rc<dyn AnyReaction>) -> bool) {
        let reactions = self.reactions.borrow();
        for reaction in reactions.iter().filter_map(Weak::upgrade) {
            if !f(reaction) {
                break;
            }
        }
    }

    fn remove_reaction(&self, reaction: &Rc<dyn AnyReaction>) {
        self.reactions.borrow_mut().retain(|weak| {
            weak.upgrade()
                .is_some_and(|rc| !same_node(&rc, reaction))
        });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T: Clone + PartialEq + 'static> AnyReaction for DerivedInner<T> {
    fn flags(&self) -> u32 {
        self.flags.get()
    }

    fn set_flags(&self, flags: u32) {
        self.flags.set(flags);
    }

    fn dep_count(&self) -> usize {
        self.deps.borrow().len()
    }

    fn add_dep(&self, source: Rc<dyn AnySource>) {
        self.deps.borrow_mut().push(source);
    }

    fn has_dep(&self, source: &Rc<dyn AnySource>) -> bool {
        self.deps.borrow().iter().any(|dep| same_node(dep, source))
    }

    fn clear_deps(&self) {
        self.deps.borrow_mut().clear();
    }

    fn remove_deps_from(&self, start: usize) {
        self.deps.borrow_mut().truncate(start);
    }

    fn for_each_dep(&self, f: &mut dyn FnMut(&Rc<dyn AnySource>) -> bool) {
        for dep in self.deps.borrow().iter() {
            if !f(dep) {
                break;
            }
        }
    }

    fn update(&self) -> bool {
        let Some(inner) = self.self_weak.borrow().upgrade() else {
            return false;
        };
        let before = inner.write_version.get();
        inner.refresh();
        inner.write_version.get() != before
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_derived_source(&self) -> Option<Rc<dyn AnySource>> {
        self.self_weak
            .borrow()
            .upgrade()
            .map(|rc| rc as Rc<dyn AnySource>)
    }
}

// =============================================================================
// DERIVED<T>
// =============================================================================

/// A lazily computed, cached value.
///
/// Recomputes on read after one of the observables it read last time
/// changed. Reading it inside an effect makes the effect depend on it.
///
/// # Example
///
/// ```
/// use spark_sorted_map::{derived, ReactiveSortedMap};
///
/// let prices: ReactiveSortedMap<&str, u32> = ReactiveSortedMap::new();
/// let total = derived({
///     let prices = prices.clone();
///     move || prices.values().sum::<u32>()
/// });
///
/// prices.add("tea", 3);
/// prices.add("cake", 5);
/// assert_eq!(total.get(), 8);
/// ```
pub struct Derived<T> {
    inner: Rc<DerivedInner<T>>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Derived<T> {
    /// Current value, recomputing first if a dependency changed.
    pub fn get(&self) -> T {
        self.inner.refresh();
        track_read(self.inner.clone() as Rc<dyn AnySource>);
        match self.inner.value.borrow().as_ref() {
            Some(value) => value.clone(),
            None => unreachable!("refresh always stores a value"),
        }
    }

    /// Number of sources read by the last computation
    pub fn dep_count(&self) -> usize {
        AnyReaction::dep_count(&*self.inner)
    }
}

/// Create a derived value.
pub fn derived<T, F>(f: F) -> Derived<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    Derived {
        inner: DerivedInner::new(Box::new(f)),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect;
    use crate::reactivity::cell::TrackedCell;

    #[test]
    fn computes_lazily_and_caches() {
        let cell = TrackedCell::new("input");
        let computes = Rc::new(Cell::new(0));

        let d = derived({
            let cell = cell.clone();
            let computes = computes.clone();
            move || {
                cell.report_observed();
                computes.set(computes.get() + 1);
                computes.get()
            }
        });
        assert_eq!(computes.get(), 0);

        assert_eq!(d.get(), 1);
        assert_eq!(d.get(), 1);
        assert_eq!(computes.get(), 1);

        cell.report_changed();
        assert_eq!(computes.get(), 1);
        assert_eq!(d.get(), 2);
    }

    #[test]
    fn tracks_its_dependencies() {
        let a = TrackedCell::new("a");
        let b = TrackedCell::new("b");
        let d = derived({
            let a = a.clone();
            let b = b.clone();
            move || {
                a.report_observed();
                b.report_observed();
                a.report_observed();
                0
            }
        });
        d.get();
        assert_eq!(d.dep_count(), 2);
        assert_eq!(a.observer_count(), 1);
    }

    #[test]
    fn derived_chain_propagates_to_effect() {
        let cell = TrackedCell::new("root");
        let n = Rc::new(Cell::new(1));

        let base = derived({
            let cell = cell.clone();
            let n = n.clone();
            move || {
                cell.report_observed();
                n.get()
            }
        });
        let doubled = derived({
            let base = base.clone();
            move || base.get() * 2
        });

        let seen = Rc::new(Cell::new(0));
        let _dispose = effect({
            let doubled = doubled.clone();
            let seen = seen.clone();
            move || seen.set(doubled.get())
        });
        assert_eq!(seen.get(), 2);

        n.set(5);
        cell.report_changed();
        assert_eq!(seen.get(), 10);
    }
}
