// ============================================================================
// spark-sorted-map - Change Records
// What a single write did to a single entry
// ============================================================================

use std::fmt;

use super::sorted_map::ReactiveSortedMap;

/// Kind of change a [`ChangeRecord`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A key that was not in the map now is. Carries only a new value.
    Add,
    /// An existing key got a new value. Carries both values.
    Update,
    /// A key left the map. Carries only the old value.
    Remove,
}

/// One entry-level change delivered to listeners.
///
/// Which values are present follows from the kind, so an `Add` never has an
/// old value and a `Remove` never has a new one.
pub struct ChangeRecord<K, V> {
    source: ReactiveSortedMap<K, V>,
    kind: ChangeKind,
    key: K,
    new_value: Option<V>,
    old_value: Option<V>,
}

impl<K, V> ChangeRecord<K, V> {
    pub(crate) fn added(source: ReactiveSortedMap<K, V>, key: K, new_value: V) -> Self {
        Self {
            source,
            kind: ChangeKind::Add,
            key,
            new_value: Some(new_value),
            old_value: None,
        }
    }

    pub(crate) fn updated(
        source: ReactiveSortedMap<K, V>,
        key: K,
        new_value: V,
        old_value: V,
    ) -> Self {
        Self {
            source,
            kind: ChangeKind::Update,
            key,
            new_value: Some(new_value),
            old_value: Some(old_value),
        }
    }

    pub(crate) fn removed(source: ReactiveSortedMap<K, V>, key: K, old_value: V) -> Self {
        Self {
            source,
            kind: ChangeKind::Remove,
            key,
            new_value: None,
            old_value: Some(old_value),
        }
    }

    /// The map that changed.
    pub fn source(&self) -> &ReactiveSortedMap<K, V> {
        &self.source
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Value after the change; `None` for `Remove`.
    pub fn new_value(&self) -> Option<&V> {
        self.new_value.as_ref()
    }

    /// Value before the change; `None` for `Add`.
    pub fn old_value(&self) -> Option<&V> {
        self.old_value.as_ref()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for ChangeRecord<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeRecord")
            .field("source", &self.source.name())
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("new_value", &self.new_value)
            .field("old_value", &self.old_value)
            .finish()
    }
}

// =============================================================================
// CHANGE LOG
// =============================================================================

/// Per-call record buffer for one write.
///
/// Built with a source only when someone is listening; without one it just
/// remembers whether anything changed, and the recording methods clone
/// nothing.
pub(crate) struct ChangeLog<K, V> {
    source: Option<ReactiveSortedMap<K, V>>,
    changed: bool,
    records: Vec<ChangeRecord<K, V>>,
}

impl<K: Clone, V: Clone> ChangeLog<K, V> {
    pub(crate) fn new(source: Option<ReactiveSortedMap<K, V>>) -> Self {
        Self {
            source,
            changed: false,
            records: Vec::new(),
        }
    }

    pub(crate) fn is_observed(&self) -> bool {
        self.source.is_some()
    }

    /// Run `f` only when the result will end up in a record.
    pub(crate) fn capture<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        self.source.as_ref().map(|_| f())
    }

    /// Mark the call as changing the map without producing a record.
    pub(crate) fn touch(&mut self) {
        self.changed = true;
    }

    pub(crate) fn added(&mut self, key: &K, new_value: &V) {
        self.changed = true;
        if let Some(source) = &self.source {
            self.records.push(ChangeRecord::added(
                source.clone(),
                key.clone(),
                new_value.clone(),
            ));
        }
    }

    pub(crate) fn updated(&mut self, key: &K, new_value: &V, old_value: &V) {
        self.changed = true;
        if let Some(source) = &self.source {
            self.records.push(ChangeRecord::updated(
                source.clone(),
                key.clone(),
                new_value.clone(),
                old_value.clone(),
            ));
        }
    }

    pub(crate) fn removed(&mut self, key: &K, old_value: &V) {
        self.changed = true;
        if let Some(source) = &self.source {
            self.records.push(ChangeRecord::removed(
                source.clone(),
                key.clone(),
                old_value.clone(),
            ));
        }
    }

    pub(crate) fn has_changes(&self) -> bool {
        self.changed
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn into_records(self) -> Vec<ChangeRecord<K, V>> {
        self.records
    }
}

// =============================================================================
// TESTS
// =============================================================================
