// ============================================================================
// spark-sorted-map - ReactiveSortedMap
// A comparator-ordered map whose reads are tracked and whose writes notify
// ============================================================================
//
// Every query goes through `read`: check the read policy, report the read on
// the map's tracked cell, then ask the core. Every mutation goes through
// `write`: open a batch, mutate the core while filling a per-call change log,
// invalidate the cell once if anything changed, then hand the records to the
// listeners after the core is released.
//
// One tracked cell covers the whole map. Any change re-runs every reaction
// that read anything from it.
// ============================================================================

use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::change::{ChangeLog, ChangeRecord};
use super::iter::TrackedIter;
use super::listeners::{Detach, ListenerRegistry, ObserveOptions, Subscription};
use crate::core::context::with_context;
use crate::core::error::ReactiveError;
use crate::reactivity::batching::{batch, untrack};
use crate::reactivity::cell::TrackedCell;
use crate::sorted::comparator::{by_key, Comparator};
use crate::sorted::map::SortedMap;

struct MapInner<K, V> {
    core: RefCell<SortedMap<K, V>>,
    cell: TrackedCell,
    listeners: RefCell<Option<Rc<ListenerRegistry<K, V>>>>,
}

/// A sorted map that takes part in dependency tracking and reports
/// entry-level changes to listeners.
///
/// Cloning yields another handle to the same map.
///
/// Closures passed to mutations (`update`, `update_all`, `remove_where`,
/// `rebalance_where`) and to `for_each_entry` run while the map is borrowed
/// and must not call back into it. Listeners and effects run after the borrow
/// is released and may read or write the map freely.
///
/// # Example
///
/// ```
/// use spark_sorted_map::{ChangeKind, ReactiveSortedMap};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let fruit: ReactiveSortedMap<u32, String> = ReactiveSortedMap::new();
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let sub = fruit.observe({
///     let log = log.clone();
///     move |change| log.borrow_mut().push((change.kind(), *change.key()))
/// });
///
/// fruit.add(2, "banana".to_string());
/// fruit.add(1, "apple".to_string());
/// fruit.add(2, "blueberry".to_string());
/// sub.dispose();
/// fruit.remove_key(&1);
///
/// assert_eq!(
///     *log.borrow(),
///     vec![(ChangeKind::Add, 2), (ChangeKind::Add, 1), (ChangeKind::Update, 2)]
/// );
/// assert_eq!(fruit.keys().collect::<Vec<_>>(), vec![2]);
/// ```
pub struct ReactiveSortedMap<K, V> {
    inner: Rc<MapInner<K, V>>,
}

impl<K, V> Clone for ReactiveSortedMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> ReactiveSortedMap<K, V> {
    /// Name used in logs and error messages.
    pub fn name(&self) -> &str {
        self.inner.cell.name()
    }

    /// True when both handles point at the same map.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of reactions currently depending on this map
    pub fn observer_count(&self) -> usize {
        self.inner.cell.observer_count()
    }

    /// Number of subscribed change listeners
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .borrow()
            .as_ref()
            .map_or(0, |registry| registry.len())
    }

    fn is_listened(&self) -> bool {
        self.inner
            .listeners
            .borrow()
            .as_ref()
            .is_some_and(|registry| !registry.is_empty())
    }
}

impl<K, V> ReactiveSortedMap<K, V>
where
    K: Ord + Hash + Clone + 'static,
    V: Clone + 'static,
{
    /// Empty map ordered by key.
    pub fn new() -> Self {
        Self::with_comparator(by_key())
    }
}

impl<K, V> Default for ReactiveSortedMap<K, V>
where
    K: Ord + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ReactiveSortedMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    // =========================================================================
    // CONSTRUCTION
    // =========================================================================

    /// Empty map ordered by `comparator`, named `ReactiveSortedMap@<id>`.
    pub fn with_comparator(comparator: Comparator<K, V>) -> Self {
        let id = with_context(|ctx| ctx.next_id());
        Self::named(format!("ReactiveSortedMap@{id}"), comparator)
    }

    /// Empty map ordered by `comparator`, named `name` in logs and errors.
    pub fn named(name: impl Into<String>, comparator: Comparator<K, V>) -> Self {
        Self {
            inner: Rc::new(MapInner {
                core: RefCell::new(SortedMap::new(comparator)),
                cell: TrackedCell::new(name),
                listeners: RefCell::new(None),
            }),
        }
    }

    /// Map seeded with `entries`. Seeding notifies nobody.
    pub fn from_entries<I>(comparator: Comparator<K, V>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let map = Self::with_comparator(comparator);
        map.inner.core.borrow_mut().add_all(entries);
        map
    }

    // =========================================================================
    // GUARDS
    // =========================================================================

    /// Run a query against the core, reporting the read.
    ///
    /// Fails with [`ReactiveError::ReadOutsideReaction`] when the read
    /// policy forbids reading here. The plain query methods panic instead.
    pub fn try_read<R>(&self, f: impl FnOnce(&SortedMap<K, V>) -> R) -> Result<R, ReactiveError> {
        self.inner.cell.enforce_read_policy()?;
        self.inner.cell.report_observed();
        Ok(f(&*self.inner.core.borrow()))
    }

    fn read<R>(&self, f: impl FnOnce(&SortedMap<K, V>) -> R) -> R {
        match self.try_read(f) {
            Ok(result) => result,
            Err(err) => panic!("{err}"),
        }
    }

    fn write<R>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut SortedMap<K, V>, &mut ChangeLog<K, V>) -> R,
    ) -> R {
        batch(|| {
            let mut log = ChangeLog::new(self.is_listened().then(|| self.clone()));
            let result = f(&mut *self.inner.core.borrow_mut(), &mut log);

            if log.has_changes() {
                trace!(map = %self.name(), op, records = log.len(), "write committed");
                self.inner.cell.report_changed();
            }

            let records = log.into_records();
            let registry = self.inner.listeners.borrow().clone();
            if let Some(registry) = registry {
                registry.dispatch(&records);
            }
            result
        })
    }

    fn put(core: &mut SortedMap<K, V>, log: &mut ChangeLog<K, V>, key: K, value: V) -> Option<V> {
        let previous = core.add(key.clone(), value);
        if let Some(current) = core.get(&key) {
            match &previous {
                Some(old) => log.updated(&key, current, old),
                None => log.added(&key, current),
            }
        }
        previous
    }

    fn apply_update<F>(core: &mut SortedMap<K, V>, log: &mut ChangeLog<K, V>, key: &K, f: F) -> Option<V>
    where
        F: FnOnce(&V) -> V,
    {
        let old = log.capture(|| core.get(key).cloned()).flatten();
        let next = core.update(key, f)?.clone();
        match &old {
            Some(old) => log.updated(key, &next, old),
            None => log.touch(),
        }
        Some(next)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn len(&self) -> usize {
        self.read(|core| core.len())
    }

    pub fn is_empty(&self) -> bool {
        self.read(|core| core.is_empty())
    }

    pub fn is_not_empty(&self) -> bool {
        !self.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.read(|core| core.get(key).cloned())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.read(|core| core.contains_key(key))
    }

    pub fn first_key(&self) -> Option<K> {
        self.read(|core| core.first_key().cloned())
    }

    pub fn last_key(&self) -> Option<K> {
        self.read(|core| core.last_key().cloned())
    }

    pub fn first_key_after(&self, key: &K) -> Option<K> {
        self.read(|core| core.first_key_after(key).cloned())
    }

    pub fn last_key_before(&self, key: &K) -> Option<K> {
        self.read(|core| core.last_key_before(key).cloned())
    }

    pub fn first_value_after(&self, key: &K) -> Option<V> {
        self.read(|core| core.first_value_after(key).cloned())
    }

    pub fn last_value_before(&self, key: &K) -> Option<V> {
        self.read(|core| core.last_value_before(key).cloned())
    }

    /// Entries in order, copied out.
    pub fn to_list(&self) -> Vec<(K, V)> {
        self.read(|core| core.to_list())
    }

    /// Visit every entry in order without copying the map.
    pub fn for_each_entry<F>(&self, f: F)
    where
        F: FnMut(&K, &V),
    {
        self.read(|core| core.for_each_entry(f));
    }

    pub fn comparator(&self) -> Comparator<K, V> {
        self.read(|core| core.comparator().clone())
    }

    pub fn iter(&self) -> TrackedIter<(K, V)> {
        let items = self.read(|core| core.to_list());
        TrackedIter::new(items, self.inner.cell.clone())
    }

    pub fn keys(&self) -> TrackedIter<K> {
        let items = self.read(|core| core.keys().cloned().collect());
        TrackedIter::new(items, self.inner.cell.clone())
    }

    pub fn values(&self) -> TrackedIter<V> {
        let items = self.read(|core| core.values().cloned().collect());
        TrackedIter::new(items, self.inner.cell.clone())
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Insert or replace. Emits `Update` for an existing key, `Add`
    /// otherwise, and returns the previous value.
    pub fn add(&self, key: K, value: V) -> Option<V> {
        self.write("add", |core, log| Self::put(core, log, key, value))
    }

    /// `add` for each entry, as one write.
    pub fn add_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.write("add_all", |core, log| {
            for (key, value) in entries {
                Self::put(core, log, key, value);
            }
        });
    }

    /// Replace the value at `key` with `f(current)` and return it.
    ///
    /// An absent key is a usage error: nothing changes and nobody is
    /// notified.
    pub fn update<F>(&self, key: &K, f: F) -> Result<V, ReactiveError>
    where
        F: FnOnce(&V) -> V,
    {
        self.write("update", |core, log| {
            Self::apply_update(core, log, key, f).ok_or_else(|| ReactiveError::KeyNotFound {
                map: self.name().to_string(),
            })
        })
    }

    /// Like [`update`](Self::update), inserting `if_absent()` when the key is
    /// missing.
    pub fn update_or_insert_with<F, D>(&self, key: K, f: F, if_absent: D) -> V
    where
        F: FnOnce(&V) -> V,
        D: FnOnce() -> V,
    {
        self.write("update", |core, log| {
            if let Some(next) = Self::apply_update(core, log, &key, f) {
                return next;
            }
            let value = if_absent();
            core.add(key.clone(), value.clone());
            log.added(&key, &value);
            value
        })
    }

    /// Replace every value with `f(key, value)`, then re-sort.
    ///
    /// Emits one `Update` per entry in the order entries were visited, each
    /// carrying the value from before the call.
    pub fn update_all<F>(&self, f: F)
    where
        F: FnMut(&K, &V) -> V,
    {
        self.write("update_all", |core, log| {
            if core.is_empty() {
                return;
            }
            let before = log.capture(|| core.to_list());
            core.update_all(f);
            log.touch();

            for (key, old) in before.into_iter().flatten() {
                if let Some(new) = core.get(&key) {
                    log.updated(&key, new, &old);
                }
            }
        });
    }

    pub fn remove_key(&self, key: &K) -> Option<V> {
        self.write("remove_key", |core, log| {
            let removed = core.remove_key(key)?;
            log.removed(key, &removed);
            Some(removed)
        })
    }

    /// Remove every entry matching `pred`, returning them in order.
    pub fn remove_where<F>(&self, pred: F) -> Vec<(K, V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.write("remove_where", |core, log| {
            let removed = core.remove_where(pred);
            for (key, value) in &removed {
                log.removed(key, value);
            }
            removed
        })
    }

    /// Remove everything, emitting one `Remove` per entry in order.
    pub fn clear(&self) {
        self.write("clear", |core, log| {
            if core.is_empty() {
                return;
            }
            if log.is_observed() {
                for (key, value) in core.remove_where(|_, _| true) {
                    log.removed(&key, &value);
                }
            } else {
                core.clear();
                log.touch();
            }
        });
    }

    // =========================================================================
    // REBALANCING
    // =========================================================================

    /// Re-sort after values changed through interior mutability. Emits no
    /// records.
    pub fn rebalance_all(&self) {
        self.write("rebalance_all", |core, log| {
            if !core.is_empty() {
                core.rebalance_all();
                log.touch();
            }
        });
    }

    /// Re-place the entries matching `pred`; returns how many. Emits no
    /// records.
    pub fn rebalance_where<F>(&self, pred: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.write("rebalance_where", |core, log| {
            let moved = core.rebalance_where(pred);
            if moved > 0 {
                log.touch();
            }
            moved
        })
    }

    /// Swap the ordering and re-sort. Emits no records.
    pub fn set_comparator(&self, comparator: Comparator<K, V>) {
        self.write("set_comparator", |core, log| {
            core.set_comparator(comparator);
            log.touch();
            debug!(map = %self.name(), entries = core.len(), "comparator swapped");
        });
    }

    // =========================================================================
    // LISTENERS
    // =========================================================================

    /// Subscribe to change records.
    pub fn observe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChangeRecord<K, V>) + 'static,
    {
        self.observe_with(listener, ObserveOptions::default())
    }

    /// Subscribe to change records, optionally replaying the current entries
    /// as `Add`s first.
    pub fn observe_with<F>(&self, listener: F, options: ObserveOptions) -> Subscription
    where
        F: Fn(&ChangeRecord<K, V>) + 'static,
    {
        if options.fire_immediately {
            let entries = self.inner.core.borrow().to_list();
            untrack(|| {
                for (key, value) in entries {
                    listener(&ChangeRecord::added(self.clone(), key, value));
                }
            });
        }

        let registry = self
            .inner
            .listeners
            .borrow_mut()
            .get_or_insert_with(|| Rc::new(ListenerRegistry::new(self.name())))
            .clone();
        let id = registry.subscribe(Rc::new(listener));
        let detach: Weak<dyn Detach> = Rc::downgrade(&registry) as Weak<dyn Detach>;
        Subscription::new(detach, id)
    }
}

impl<K, V> ReactiveSortedMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + PartialEq + 'static,
{
    pub fn contains_value(&self, value: &V) -> bool {
        self.read(|core| core.contains_value(value))
    }

    /// Key of the first entry, in order, holding `value`.
    pub fn key_of(&self, value: &V) -> Option<K> {
        self.read(|core| core.key_of(value).cloned())
    }

    /// Remove the first entry, in order, holding `value`.
    pub fn remove_value(&self, value: &V) -> Option<(K, V)> {
        self.write("remove_value", |core, log| {
            let (key, removed) = core.remove_value(value)?;
            log.removed(&key, &removed);
            Some((key, removed))
        })
    }

    /// Remove one entry per value, emitting `Remove`s in input order.
    /// Values that are not present are skipped.
    pub fn remove_all<I>(&self, values: I) -> Vec<(K, V)>
    where
        I: IntoIterator,
        I::Item: std::borrow::Borrow<V>,
    {
        self.write("remove_all", |core, log| {
            let removed = core.remove_all(values);
            for (key, value) in &removed {
                log.removed(key, value);
            }
            removed
        })
    }
}

impl<K, V> fmt::Debug for ReactiveSortedMap<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("ReactiveSortedMap");
        out.field("name", &self.name());
        match self.inner.core.try_borrow() {
            Ok(core) => out.field("entries", &*core),
            Err(_) => out.field("entries", &"<borrowed>"),
        };
        out.finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::ChangeKind;
    use crate::sorted::{by_key_desc, by_value};
    use crate::{derived, effect};
    use std::cell::Cell;
    use tracing_test::traced_test;

    fn fruit() -> ReactiveSortedMap<u32, &'static str> {
        ReactiveSortedMap::from_entries(by_key(), [(2, "banana"), (1, "apple")])
    }

    fn counting_effect(map: &ReactiveSortedMap<u32, &'static str>) -> (Rc<Cell<u32>>, impl FnOnce()) {
        let runs = Rc::new(Cell::new(0));
        let dispose = effect({
            let map = map.clone();
            let runs = runs.clone();
            move || {
                map.len();
                runs.set(runs.get() + 1);
            }
        });
        (runs, dispose)
    }

    #[test]
    fn queries_delegate_to_core() {
        let map = fruit();
        assert_eq!(map.len(), 2);
        assert!(map.is_not_empty());
        assert_eq!(map.get(&1), Some("apple"));
        assert_eq!(map.first_key(), Some(1));
        assert_eq!(map.last_value_before(&2), Some("apple"));
        assert_eq!(map.key_of(&"banana"), Some(2));
        assert!(map.contains_value(&"apple"));
        assert_eq!(map.to_list(), vec![(1, "apple"), (2, "banana")]);
    }

    #[test]
    fn unnamed_maps_get_distinct_names() {
        let a: ReactiveSortedMap<u8, u8> = ReactiveSortedMap::new();
        let b: ReactiveSortedMap<u8, u8> = ReactiveSortedMap::new();
        assert!(a.name().starts_with("ReactiveSortedMap@"));
        assert_ne!(a.name(), b.name());
        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn repeated_reads_register_one_dependency() {
        let map = fruit();
        let _dispose = effect({
            let map = map.clone();
            move || {
                map.len();
                map.get(&1);
                map.keys().count();
            }
        });
        assert_eq!(map.observer_count(), 1);
    }

    #[test]
    fn each_changing_write_invalidates_once() {
        let map = fruit();
        let (runs, _dispose) = counting_effect(&map);

        map.add(3, "cherry");
        map.update(&3, |_| "cranberry").unwrap();
        map.remove_key(&3);
        assert_eq!(runs.get(), 4);
    }

    #[test]
    fn no_op_writes_do_not_invalidate() {
        let map = fruit();
        let (runs, _dispose) = counting_effect(&map);

        assert_eq!(map.remove_key(&9), None);
        assert_eq!(map.remove_value(&"kiwi"), None);
        assert!(map.remove_all(["kiwi"]).is_empty());
        assert!(map.remove_where(|_, _| false).is_empty());
        assert_eq!(map.rebalance_where(|_, _| false), 0);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn update_on_missing_key_is_an_error() {
        let map = ReactiveSortedMap::named("stock", by_key::<u32, &str>());
        let (runs, _dispose) = counting_effect(&map);
        let records = Rc::new(Cell::new(0));
        let _sub = map.observe({
            let records = records.clone();
            move |_| records.set(records.get() + 1)
        });

        assert_eq!(
            map.update(&1, |v| *v),
            Err(ReactiveError::KeyNotFound {
                map: "stock".to_string()
            })
        );
        assert_eq!(runs.get(), 1);
        assert_eq!(records.get(), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn update_or_insert_with_covers_both_paths() {
        let map: ReactiveSortedMap<&str, u32> = ReactiveSortedMap::new();
        let kinds = Rc::new(RefCell::new(Vec::new()));
        let _sub = map.observe({
            let kinds = kinds.clone();
            move |c| kinds.borrow_mut().push(c.kind())
        });

        assert_eq!(map.update_or_insert_with("hits", |n| n + 1, || 1), 1);
        assert_eq!(map.update_or_insert_with("hits", |n| n + 1, || 1), 2);
        assert_eq!(*kinds.borrow(), vec![ChangeKind::Add, ChangeKind::Update]);
    }

    #[test]
    fn comparator_swap_reorders_and_is_tracked() {
        let map = fruit();
        let firsts = Rc::new(RefCell::new(Vec::new()));
        let _dispose = effect({
            let map = map.clone();
            let firsts = firsts.clone();
            move || firsts.borrow_mut().push(map.first_key())
        });

        map.set_comparator(by_key_desc());
        assert_eq!(*firsts.borrow(), vec![Some(1), Some(2)]);
        map.set_comparator(by_value());
        assert_eq!(map.keys().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn derived_follows_the_map() {
        let map = fruit();
        let joined = derived({
            let map = map.clone();
            move || map.values().collect::<Vec<_>>().join(",")
        });
        assert_eq!(joined.get(), "apple,banana");

        map.add(0, "date");
        assert_eq!(joined.get(), "date,apple,banana");
    }

    #[test]
    fn listener_dispatch_happens_after_core_is_released() {
        let map = fruit();
        let seen_len = Rc::new(Cell::new(0));
        let _sub = map.observe({
            let seen_len = seen_len.clone();
            move |change| seen_len.set(change.source().len())
        });

        map.add(3, "cherry");
        assert_eq!(seen_len.get(), 3);
    }

    #[test]
    fn debug_shows_name_and_entries() {
        let map = ReactiveSortedMap::named("fruit", by_key());
        map.add(1, "apple");
        let text = format!("{map:?}");
        assert!(text.contains("\"fruit\""));
        assert!(text.contains("apple"));
    }

    #[traced_test]
    #[test]
    fn writes_and_subscriptions_are_logged() {
        let map = ReactiveSortedMap::named("logged", by_key::<u8, u8>());
        let sub = map.observe(|_| {});
        map.add(1, 1);
        map.set_comparator(by_key_desc());
        sub.dispose();

        assert!(logs_contain("listener subscribed"));
        assert!(logs_contain("write committed"));
        assert!(logs_contain("comparator swapped"));
        assert!(logs_contain("listener disposed"));
        assert!(logs_contain("logged"));
    }
}
