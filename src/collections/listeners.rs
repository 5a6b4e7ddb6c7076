// ============================================================================
// spark-sorted-map - Change Listeners
// Per-map callback registry and the handles that detach from it
// ============================================================================
//
// Independent of the tracked cell: listeners get entry-level records, while
// effects and deriveds only learn that "something changed".
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::debug;

use super::change::ChangeRecord;
use crate::reactivity::batching::untrack;

/// A change listener. Shared so dispatch can run without holding the list.
pub type Listener<K, V> = Rc<dyn Fn(&ChangeRecord<K, V>)>;

/// Options for [`observe_with`](super::ReactiveSortedMap::observe_with).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserveOptions {
    /// Deliver one `Add` per current entry, in order, before subscribing.
    pub fire_immediately: bool,
}

impl ObserveOptions {
    pub fn fire_immediately() -> Self {
        Self {
            fire_immediately: true,
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

pub(crate) struct ListenerRegistry<K, V> {
    map_name: String,
    next_id: Cell<u64>,
    listeners: RefCell<Vec<(u64, Listener<K, V>)>>,
}

impl<K, V> ListenerRegistry<K, V> {
    pub(crate) fn new(map_name: impl Into<String>) -> Self {
        Self {
            map_name: map_name.into(),
            next_id: Cell::new(0),
            listeners: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self, listener: Listener<K, V>) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners.borrow_mut().push((id, listener));
        debug!(map = %self.map_name, id, listeners = self.len(), "listener subscribed");
        id
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    fn contains(&self, id: u64) -> bool {
        self.listeners.borrow().iter().any(|(live, _)| *live == id)
    }

    /// Deliver every record to every listener, record by record, listeners in
    /// subscription order.
    ///
    /// Works from a copy of the list: listeners may subscribe, dispose or
    /// write to the map while being called. A listener disposed mid-dispatch
    /// gets nothing further; one subscribed mid-dispatch waits for the next
    /// write. Listeners run untracked, so what they read never becomes a
    /// dependency of the reaction that made the write.
    pub(crate) fn dispatch(&self, records: &[ChangeRecord<K, V>]) {
        if records.is_empty() {
            return;
        }
        let listeners: Vec<(u64, Listener<K, V>)> = self.listeners.borrow().clone();

        for record in records {
            for (id, listener) in &listeners {
                if self.contains(*id) {
                    untrack(|| listener(record));
                }
            }
        }
    }
}

/// Detach side of a registry, erased over the map's types.
pub(crate) trait Detach {
    /// Returns false when `id` was not subscribed.
    fn detach(&self, id: u64) -> bool;
}

impl<K, V> Detach for ListenerRegistry<K, V> {
    fn detach(&self, id: u64) -> bool {
        let removed = {
            let mut listeners = self.listeners.borrow_mut();
            let before = listeners.len();
            listeners.retain(|(live, _)| *live != id);
            listeners.len() != before
        };
        if removed {
            debug!(map = %self.map_name, id, listeners = self.len(), "listener disposed");
        }
        removed
    }
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Handle for one listener.
///
/// Dropping the handle does not unsubscribe; call [`dispose`](Self::dispose).
///
/// The registry holds its listeners strongly, and every record holds its map.
/// A listener that captures the map, or keeps records around, keeps the map
/// alive until it is disposed.
#[must_use = "a listener stays subscribed until its subscription is disposed"]
pub struct Subscription {
    registry: Weak<dyn Detach>,
    id: u64,
    disposed: Cell<bool>,
}

impl Subscription {
    pub(crate) fn new(registry: Weak<dyn Detach>, id: u64) -> Self {
        Self {
            registry,
            id,
            disposed: Cell::new(false),
        }
    }

    /// Stop delivering records to this listener. Safe to call more than once.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self.id);
        }
    }

    /// True after `dispose`, or once the map itself is gone.
    pub fn is_disposed(&self) -> bool {
        self.disposed.get() || self.registry.strong_count() == 0
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
