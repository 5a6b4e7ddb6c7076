// ============================================================================
// spark-sorted-map - Sorted Module
// The plain ordered map and the comparators that drive it
// ============================================================================

pub mod comparator;
pub mod map;

pub use comparator::{by_field, by_key, by_key_desc, by_value, comparator, Comparator};
pub use map::{Iter, SortedMap};
