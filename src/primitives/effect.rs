// ============================================================================
// spark-sorted-map - Effects
// Side effects that re-run when the observables they read change
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::types::{AnyReaction, AnySource, same_node};
use crate::reactivity::tracking::{install_dependencies, remove_reactions, run_tracked, set_signal_status};

/// Effect body
pub type EffectFn = Box<dyn FnMut()>;

// =============================================================================
// EFFECT INNER
// =============================================================================

/// Reaction side of an effect. Not a source: nothing depends on an effect.
pub struct EffectInner {
    flags: Cell<u32>,
    func: RefCell<Option<EffectFn>>,
    deps: RefCell<Vec<Rc<dyn AnySource>>>,
    self_weak: RefCell<Weak<EffectInner>>,
}

impl EffectInner {
    fn new(func: EffectFn) -> Rc<Self> {
        let effect = Rc::new(Self {
            flags: Cell::new(EFFECT | DIRTY),
            func: RefCell::new(Some(func)),
            deps: RefCell::new(Vec::new()),
            self_weak: RefCell::new(Weak::new()),
        });
        *effect.self_weak.borrow_mut() = Rc::downgrade(&effect);
        effect
    }
}

impl AnyReaction for EffectInner {
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
        if let Some(effect) = self.self_weak.borrow().upgrade() {
            update_effect(&effect);
        }
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_derived_source(&self) -> Option<Rc<dyn AnySource>> {
        None
    }
}

// =============================================================================
// RUN / DESTROY
// =============================================================================

/// Run an effect and rewire its dependencies to what it read this time.
pub fn update_effect(effect: &Rc<EffectInner>) {
    if (effect.flags.get() & DESTROYED) != 0 {
        return;
    }

    // Clean before running so a write inside the body can dirty it again
    set_signal_status(&**effect, CLEAN);

    // Take the body out so a re-entrant flush cannot run it twice at once
    let Some(mut func) = effect.func.borrow_mut().take() else {
        return;
    };

    let reaction = effect.clone() as Rc<dyn AnyReaction>;
    let ((), deps) = run_tracked(&reaction, || func());

    if (effect.flags.get() & DESTROYED) != 0 {
        // Disposed from inside its own body
        return;
    }
    *effect.func.borrow_mut() = Some(func);
    install_dependencies(reaction, deps);
}

/// Stop an effect for good and detach it from everything it read.
pub fn destroy_effect(effect: &Rc<EffectInner>) {
    remove_reactions(effect.clone() as Rc<dyn AnyReaction>, 0);
    effect.set_flags(effect.flags() | DESTROYED);
    effect.func.borrow_mut().take();
}

// =============================================================================
// PUBLIC API
// =============================================================================

/// Create an effect that runs now and again whenever an observable it read
/// changes.
///
/// Returns a dispose function; the effect stays alive for as long as the
/// returned closure does.
///
/// # Example
///
/// ```
/// use spark_sorted_map::{effect, ReactiveSortedMap};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let map: ReactiveSortedMap<u32, &str> = ReactiveSortedMap::new();
/// let firsts = Rc::new(RefCell::new(Vec::new()));
///
/// let dispose = effect({
///     let map = map.clone();
///     let firsts = firsts.clone();
///     move || firsts.borrow_mut().push(map.first_key())
/// });
///
/// map.add(2, "two");
/// map.add(1, "one");
/// dispose();
/// map.add(0, "zero");
///
/// assert_eq!(*firsts.borrow(), vec![None, Some(2), Some(1)]);
/// ```
pub fn effect<F>(f: F) -> impl FnOnce()
where
    F: FnMut() + 'static,
{
    let effect = EffectInner::new(Box::new(f));
    update_effect(&effect);
    move || destroy_effect(&effect)
}

/// True while running inside an effect or derived.
pub fn effect_tracking() -> bool {
    with_context(|ctx| ctx.has_active_reaction())
}

// =============================================================================
// TESTS
// =============================================================================
