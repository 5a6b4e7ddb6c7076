// ============================================================================
// spark-sorted-map - Tracked Iterator
// ============================================================================

use std::iter::Peekable;
use std::vec;

use crate::core::error::ReactiveError;
use crate::reactivity::cell::TrackedCell;

/// Iterator over a snapshot of a reactive map that reports a read on every
/// step.
///
/// The snapshot is taken when the iterator is created; writes made while
/// iterating are not reflected, but each `next` and `peek` inside an effect
/// still registers the dependency and checks the read policy.
pub struct TrackedIter<T> {
    items: Peekable<vec::IntoIter<T>>,
    cell: TrackedCell,
}

impl<T> TrackedIter<T> {
    pub(crate) fn new(items: Vec<T>, cell: TrackedCell) -> Self {
        Self {
            items: items.into_iter().peekable(),
            cell,
        }
    }

    fn observe(&self) -> Result<(), ReactiveError> {
        self.cell.enforce_read_policy()?;
        self.cell.report_observed();
        Ok(())
    }

    /// Look at the next item without consuming it.
    ///
    /// # Panics
    ///
    /// When the read policy forbids reading here.
    pub fn peek(&mut self) -> Option<&T> {
        if let Err(err) = self.observe() {
            panic!("{err}");
        }
        self.items.peek()
    }

    /// [`next`](Iterator::next) that reports a policy violation instead of
    /// panicking.
    pub fn try_next(&mut self) -> Result<Option<T>, ReactiveError> {
        self.observe()?;
        Ok(self.items.next())
    }
}

impl<T> Iterator for TrackedIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if let Err(err) = self.observe() {
            panic!("{err}");
        }
        self.items.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl<T> ExactSizeIterator for TrackedIter<T> {}

impl<T> std::fmt::Debug for TrackedIter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedIter")
            .field("observable", &self.cell.name())
            .field("remaining", &self.items.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{with_config, ReactiveConfig, ReadPolicy};
    use crate::{batch, effect};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn yields_snapshot_in_order() {
        let cell = TrackedCell::new("it");
        let mut iter = TrackedIter::new(vec![1, 2, 3], cell);
        assert_eq!(iter.len(), 3);
        assert_eq!(iter.peek(), Some(&1));
        assert_eq!(iter.collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn steps_register_the_dependency() {
        let cell = TrackedCell::new("it");
        let runs = Rc::new(Cell::new(0));

        let _dispose = effect({
            let cell = cell.clone();
            let runs = runs.clone();
            move || {
                runs.set(runs.get() + 1);
                // Empty iterators still depend on the collection
                let mut iter = TrackedIter::new(Vec::<u8>::new(), cell.clone());
                assert_eq!(iter.next(), None);
            }
        });
        assert_eq!(cell.observer_count(), 1);

        cell.report_changed();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn try_next_reports_policy_violation() {
        let strict = ReactiveConfig::default().with_read_policy(ReadPolicy::Always);
        with_config(strict, || {
            let mut iter = TrackedIter::new(vec!['a'], TrackedCell::new("letters"));
            assert_eq!(
                iter.try_next(),
                Err(ReactiveError::ReadOutsideReaction {
                    name: "letters".into()
                })
            );
            assert_eq!(batch(|| iter.try_next()), Ok(Some('a')));
        });
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn next_panics_on_policy_violation() {
        let strict = ReactiveConfig::default().with_read_policy(ReadPolicy::Always);
        with_config(strict, || {
            let mut iter = TrackedIter::new(vec![1], TrackedCell::new("n"));
            iter.next();
        });
    }
}
