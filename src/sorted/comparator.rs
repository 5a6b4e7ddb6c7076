// ============================================================================
// spark-sorted-map - Comparators
// Total orderings over (key, value) pairs
// ============================================================================

use std::cmp::Ordering;
use std::rc::Rc;

/// A swappable ordering over entries.
///
/// Receives two `(key, value)` pairs, so entries can be sorted by something
/// their values hold while lookups stay keyed.
pub type Comparator<K, V> = Rc<dyn Fn((&K, &V), (&K, &V)) -> Ordering>;

/// Wrap a closure as a [`Comparator`].
pub fn comparator<K, V, F>(f: F) -> Comparator<K, V>
where
    F: Fn((&K, &V), (&K, &V)) -> Ordering + 'static,
{
    Rc::new(f)
}

/// Ascending by key.
pub fn by_key<K: Ord + 'static, V: 'static>() -> Comparator<K, V> {
    comparator(|(a, _): (&K, &V), (b, _): (&K, &V)| a.cmp(b))
}

/// Descending by key.
pub fn by_key_desc<K: Ord + 'static, V: 'static>() -> Comparator<K, V> {
    comparator(|(a, _): (&K, &V), (b, _): (&K, &V)| b.cmp(a))
}

/// Ascending by value; equal values fall back to the key.
pub fn by_value<K: Ord + 'static, V: Ord + 'static>() -> Comparator<K, V> {
    comparator(|(ka, va): (&K, &V), (kb, vb): (&K, &V)| {
        va.cmp(vb).then_with(|| ka.cmp(kb))
    })
}

/// Ascending by a field extracted from the value; ties fall back to the key.
///
/// ```
/// use spark_sorted_map::sorted::{by_field, SortedMap};
///
/// struct Player { score: u32 }
///
/// let mut board = SortedMap::new(by_field(|p: &Player| std::cmp::Reverse(p.score)));
/// board.add("ann", Player { score: 7 });
/// board.add("bob", Player { score: 9 });
///
/// assert_eq!(board.first_key(), Some(&"bob"));
/// ```
pub fn by_field<K, V, F, R>(field: F) -> Comparator<K, V>
where
    K: Ord + 'static,
    V: 'static,
    F: Fn(&V) -> R + 'static,
    R: Ord + 'static,
{
    comparator(move |(ka, va): (&K, &V), (kb, vb): (&K, &V)| {
        field(va).cmp(&field(vb)).then_with(|| ka.cmp(kb))
    })
}
