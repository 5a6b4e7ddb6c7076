// ============================================================================
// spark-sorted-map - SortedMap
// Hash-indexed entries kept in comparator order
// ============================================================================
//
// Two indexes over the same keys:
// - `entries`: key -> value, for O(1) lookup
// - `order`: keys sorted by the comparator over (key, value) pairs
//
// The comparator sees values, so an entry whose value changes through
// interior mutability can drift out of place until it is rebalanced.
// Lookups by key never depend on the order index being accurate.
// ============================================================================

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use super::comparator::{by_key, Comparator};

/// A key→value map iterated in the order of a swappable comparator.
///
/// # Example
///
/// ```
/// use spark_sorted_map::sorted::{by_value, SortedMap};
///
/// let mut fruit = SortedMap::new(by_value());
/// fruit.add(1, "cherry");
/// fruit.add(2, "apple");
/// fruit.add(3, "banana");
///
/// let keys: Vec<_> = fruit.keys().copied().collect();
/// assert_eq!(keys, vec![2, 3, 1]);
/// assert_eq!(fruit.get(&1), Some(&"cherry"));
/// ```
pub struct SortedMap<K, V> {
    entries: HashMap<K, V>,
    order: Vec<K>,
    comparator: Comparator<K, V>,
}

impl<K, V> SortedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(comparator: Comparator<K, V>) -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            comparator,
        }
    }

    pub fn from_entries<I>(comparator: Comparator<K, V>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut map = Self::new(comparator);
        map.add_all(entries);
        map
    }

    pub fn comparator(&self) -> &Comparator<K, V> {
        &self.comparator
    }

    // =========================================================================
    // PLACEMENT
    // =========================================================================

    fn compare(&self, a: (&K, &V), b: (&K, &V)) -> Ordering {
        (self.comparator)(a, b)
    }

    /// Index after every entry that sorts before or equal to `(key, value)`.
    fn insertion_point(&self, key: &K, value: &V) -> usize {
        self.order.partition_point(|candidate| {
            self.compare((candidate, &self.entries[candidate]), (key, value)) != Ordering::Greater
        })
    }

    /// Where `key` sits in the order index.
    fn position_of(&self, key: &K) -> Option<usize> {
        let value = self.entries.get(key)?;
        let start = self.order.partition_point(|candidate| {
            self.compare((candidate, &self.entries[candidate]), (key, value)) == Ordering::Less
        });
        self.order[start..]
            .iter()
            .take_while(|candidate| {
                self.compare((*candidate, &self.entries[*candidate]), (key, value)) == Ordering::Equal
            })
            .position(|candidate| candidate == key)
            .map(|offset| start + offset)
            // Value drifted since it was placed; binary search can't see it
            .or_else(|| self.order.iter().position(|candidate| candidate == key))
    }

    fn place(&mut self, key: K, value: V) {
        let at = self.insertion_point(&key, &value);
        self.order.insert(at, key.clone());
        self.entries.insert(key, value);
    }

    fn detach(&mut self, key: &K) -> Option<V> {
        let at = self.position_of(key)?;
        self.order.remove(at);
        self.entries.remove(key)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn first_key(&self) -> Option<&K> {
        self.order.first()
    }

    pub fn last_key(&self) -> Option<&K> {
        self.order.last()
    }

    /// Key of the entry right after `key`; `None` for the last key or a
    /// key that is not in the map.
    pub fn first_key_after(&self, key: &K) -> Option<&K> {
        let at = self.position_of(key)?;
        self.order.get(at + 1)
    }

    /// Key of the entry right before `key`; `None` for the first key or a
    /// key that is not in the map.
    pub fn last_key_before(&self, key: &K) -> Option<&K> {
        let at = self.position_of(key)?;
        at.checked_sub(1).and_then(|prev| self.order.get(prev))
    }

    pub fn first_value_after(&self, key: &K) -> Option<&V> {
        self.first_key_after(key).map(|next| &self.entries[next])
    }

    pub fn last_value_before(&self, key: &K) -> Option<&V> {
        self.last_key_before(key).map(|prev| &self.entries[prev])
    }

    /// Entries in comparator order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            keys: self.order.iter(),
            entries: &self.entries,
        }
    }

    pub fn keys(&self) -> std::slice::Iter<'_, K> {
        self.order.iter()
    }

    pub fn values(&self) -> impl DoubleEndedIterator<Item = &V> + '_ {
        self.iter().map(|(_, value)| value)
    }

    pub fn for_each_entry<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        for (key, value) in self.iter() {
            f(key, value);
        }
    }

    pub fn to_list(&self) -> Vec<(K, V)>
    where
        V: Clone,
    {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    // =========================================================================
    // MUTATION
    // =========================================================================

    /// Insert or replace, returning the previous value.
    ///
    /// A replaced entry is re-placed according to its new value.
    pub fn add(&mut self, key: K, value: V) -> Option<V> {
        let previous = self.detach(&key);
        self.place(key, value);
        previous
    }

    pub fn add_all<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.add(key, value);
        }
    }

    /// Replace the value at `key` with `f(current)`.
    ///
    /// Returns `None`, leaving the map untouched, when `key` is absent.
    pub fn update<F>(&mut self, key: &K, f: F) -> Option<&V>
    where
        F: FnOnce(&V) -> V,
    {
        let next = f(self.entries.get(key)?);
        self.detach(key);
        self.place(key.clone(), next);
        self.entries.get(key)
    }

    /// Replace every value with `f(key, value)`, visiting entries in order,
    /// then re-sort.
    pub fn update_all<F>(&mut self, mut f: F)
    where
        F: FnMut(&K, &V) -> V,
    {
        let next: Vec<V> = self
            .order
            .iter()
            .map(|key| f(key, &self.entries[key]))
            .collect();

        for (key, value) in self.order.iter().zip(next) {
            if let Some(slot) = self.entries.get_mut(key) {
                *slot = value;
            }
        }
        self.rebalance_all();
    }

    pub fn remove_key(&mut self, key: &K) -> Option<V> {
        self.detach(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Remove every entry matching `pred`, returning them in order.
    ///
    /// The predicate sees the map as it was before anything was removed.
    pub fn remove_where<F>(&mut self, mut pred: F) -> Vec<(K, V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        let doomed: Vec<bool> = self
            .order
            .iter()
            .map(|key| pred(key, &self.entries[key]))
            .collect();
        if !doomed.contains(&true) {
            return Vec::new();
        }

        let order = std::mem::take(&mut self.order);
        let mut removed = Vec::new();
        for (key, doomed) in order.into_iter().zip(doomed) {
            if !doomed {
                self.order.push(key);
            } else if let Some(value) = self.entries.remove(&key) {
                removed.push((key, value));
            }
        }
        removed
    }

    // =========================================================================
    // REBALANCING
    // =========================================================================

    /// Re-sort every entry under the active comparator.
    pub fn rebalance_all(&mut self) {
        let entries = &self.entries;
        let comparator = &self.comparator;
        self.order
            .sort_by(|a, b| comparator((a, &entries[a]), (b, &entries[b])));
    }

    /// Re-place only the entries matching `pred`. Returns how many moved
    /// through placement.
    ///
    /// The remaining entries must still be in order.
    pub fn rebalance_where<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        let entries = &self.entries;
        let mut lifted = Vec::new();
        self.order.retain(|key| {
            if pred(key, &entries[key]) {
                lifted.push(key.clone());
                false
            } else {
                true
            }
        });

        let count = lifted.len();
        for key in lifted {
            let at = self.insertion_point(&key, &self.entries[&key]);
            self.order.insert(at, key);
        }
        count
    }

    /// Swap the comparator and re-sort everything under it.
    pub fn set_comparator(&mut self, comparator: Comparator<K, V>) {
        self.comparator = comparator;
        self.rebalance_all();
    }
}

impl<K, V> SortedMap<K, V>
where
    K: Eq + Hash + Clone,
    V: PartialEq,
{
    /// Key of the first entry (in order) holding `value`.
    pub fn key_of(&self, value: &V) -> Option<&K> {
        self.order.iter().find(|key| &self.entries[*key] == value)
    }

    pub fn contains_value(&self, value: &V) -> bool {
        self.key_of(value).is_some()
    }

    /// Remove the first entry (in order) holding `value`.
    pub fn remove_value(&mut self, value: &V) -> Option<(K, V)> {
        let key = self.key_of(value)?.clone();
        let removed = self.detach(&key)?;
        Some((key, removed))
    }

    /// Remove one entry per value, in input order. Values not present are
    /// skipped.
    pub fn remove_all<I>(&mut self, values: I) -> Vec<(K, V)>
    where
        I: IntoIterator,
        I::Item: Borrow<V>,
    {
        values
            .into_iter()
            .filter_map(|value| self.remove_value(value.borrow()))
            .collect()
    }
}

impl<K, V> Default for SortedMap<K, V>
where
    K: Ord + Hash + Clone + 'static,
    V: 'static,
{
    fn default() -> Self {
        Self::new(by_key())
    }
}

impl<K, V> Extend<(K, V)> for SortedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.add_all(iter);
    }
}

impl<K, V> fmt::Debug for SortedMap<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

// =============================================================================
// ITER
// =============================================================================

/// Borrowing iterator over a [`SortedMap`] in comparator order.
pub struct Iter<'a, K, V> {
    keys: std::slice::Iter<'a, K>,
    entries: &'a HashMap<K, V>,
}

impl<'a, K: Eq + Hash, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.keys.next()?;
        Some((key, &self.entries[key]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

impl<K: Eq + Hash, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let key = self.keys.next_back()?;
        Some((key, &self.entries[key]))
    }
}

impl<K: Eq + Hash, V> ExactSizeIterator for Iter<'_, K, V> {}

// =============================================================================
// TESTS
// =============================================================================
