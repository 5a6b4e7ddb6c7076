// ============================================================================
// spark-sorted-map - Tracked Cell
// A value-less source: "this observable was read" / "this observable changed"
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::core::config::{current_config, ReadPolicy};
use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::error::ReactiveError;
use crate::core::types::{AnyReaction, AnySource, same_node};
use crate::reactivity::batching::batch;
use crate::reactivity::tracking::{notify_write, track_read};

// =============================================================================
// CELL INNER
// =============================================================================

struct CellInner {
    name: String,
    flags: Cell<u32>,
    write_version: Cell<u32>,
    reactions: RefCell<Vec<Weak<dyn AnyReaction>>>,
}

impl AnySource for CellInner {
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

// =============================================================================
// TRACKED CELL
// =============================================================================

/// One observable "piece of state" for dependency registration and
/// invalidation. Holds no value; the owner keeps the data and reports reads
/// and changes through the cell.
///
/// Cloning shares the same cell.
///
/// # Example
///
/// ```
/// use spark_sorted_map::{effect, TrackedCell};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let cell = TrackedCell::new("todos");
/// let runs = Rc::new(Cell::new(0));
///
/// let _dispose = effect({
///     let cell = cell.clone();
///     let runs = runs.clone();
///     move || {
///         cell.report_observed();
///         runs.set(runs.get() + 1);
///     }
/// });
///
/// cell.report_changed();
/// assert_eq!(runs.get(), 2);
/// ```
#[derive(Clone)]
pub struct TrackedCell {
    inner: Rc<CellInner>,
}

impl TrackedCell {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(CellInner {
                name: name.into(),
                flags: Cell::new(SOURCE | CLEAN),
                write_version: Cell::new(0),
                reactions: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Fail when the read policy forbids reading here.
    ///
    /// Under [`ReadPolicy::Always`] a read is allowed inside an effect, a
    /// derived or a `batch`; everything else is a violation.
    pub fn enforce_read_policy(&self) -> Result<(), ReactiveError> {
        if current_config().read_policy == ReadPolicy::Never {
            return Ok(());
        }

        let allowed = with_context(|ctx| ctx.has_active_reaction() || ctx.is_batching());
        if allowed {
            return Ok(());
        }

        warn!(observable = %self.inner.name, "read outside a reaction or batch");
        Err(ReactiveError::ReadOutsideReaction {
            name: self.inner.name.clone(),
        })
    }

    /// Register the current read as a dependency of the running reaction.
    ///
    /// Returns true when a new dependency was recorded; repeated reads in the
    /// same run return false.
    pub fn report_observed(&self) -> bool {
        track_read(self.inner.clone() as Rc<dyn AnySource>)
    }

    /// Invalidate every dependent.
    ///
    /// Runs inside a batch, so dependents re-run at the end of the outermost
    /// transaction rather than immediately when one is already open.
    pub fn report_changed(&self) {
        batch(|| notify_write(self.inner.clone() as Rc<dyn AnySource>));
    }

    /// Number of live reactions depending on this cell
    pub fn observer_count(&self) -> usize {
        self.inner.cleanup_dead_reactions();
        self.inner.reaction_count()
    }

    /// Version of the last change, from the context-wide write counter
    pub fn write_version(&self) -> u32 {
        self.inner.write_version()
    }
}

impl std::fmt::Debug for TrackedCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedCell")
            .field("name", &self.inner.name)
            .field("observers", &self.inner.reaction_count())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{with_config, ReactiveConfig};
    use crate::{derived, effect};

    fn strict() -> ReactiveConfig {
        ReactiveConfig::default().with_read_policy(ReadPolicy::Always)
    }

    #[test]
    fn new_cell_is_clean_and_unobserved() {
        let cell = TrackedCell::new("fresh");
        assert_eq!(cell.name(), "fresh");
        assert_eq!(cell.observer_count(), 0);
        assert_eq!(cell.write_version(), 0);
    }

    #[test]
    fn report_changed_bumps_write_version() {
        let cell = TrackedCell::new("bump");
        cell.report_changed();
        let first = cell.write_version();
        cell.report_changed();
        assert!(cell.write_version() > first);
    }

    #[test]
    fn default_policy_allows_reads_anywhere() {
        let cell = TrackedCell::new("open");
        assert_eq!(cell.enforce_read_policy(), Ok(()));
    }

    #[test]
    fn strict_policy_rejects_untracked_reads() {
        let cell = TrackedCell::new("guarded");
        with_config(strict(), || {
            assert_eq!(
                cell.enforce_read_policy(),
                Err(ReactiveError::ReadOutsideReaction {
                    name: "guarded".to_string()
                })
            );
        });
    }

    #[test]
    fn strict_policy_allows_batches_and_reactions() {
        let cell = TrackedCell::new("guarded");
        with_config(strict(), || {
            assert!(batch(|| cell.enforce_read_policy()).is_ok());

            let d = derived({
                let cell = cell.clone();
                move || cell.enforce_read_policy().is_ok()
            });
            assert!(d.get());

            let seen = Rc::new(Cell::new(false));
            let _dispose = effect({
                let cell = cell.clone();
                let seen = seen.clone();
                move || seen.set(cell.enforce_read_policy().is_ok())
            });
            assert!(seen.get());
        });
    }

    #[test]
    fn dropped_reactions_are_not_counted() {
        let cell = TrackedCell::new("gc");
        {
            let dispose = effect({
                let cell = cell.clone();
                move || {
                    cell.report_observed();
                }
            });
            assert_eq!(cell.observer_count(), 1);
            dispose();
        }
        assert_eq!(cell.observer_count(), 0);
    }

    #[test]
    fn debug_shows_name() {
        let cell = TrackedCell::new("debuggable");
        assert!(format!("{cell:?}").contains("debuggable"));
    }
}
