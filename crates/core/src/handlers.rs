//! Callback storage shared by all controllers.
//!
//! Dispatch takes a reference-counted snapshot of the registered handlers,
//! so adding or removing handlers from user threads while a dispatch is in
//! flight is safe. Each slot carries an `active` flag that removal clears;
//! a handler whose removal has returned is never invoked again, even if a
//! snapshot taken earlier still holds it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque id of a registered callback, monotonically assigned per
/// controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerId(pub u64);

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared id counter: all registries of one controller draw from the same
/// source so ids are unique across its handler kinds.
#[derive(Debug, Default)]
pub struct HandlerIdSource(AtomicU64);

impl HandlerIdSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(0)))
    }

    fn next(&self) -> HandlerId {
        HandlerId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

struct Slot<E: ?Sized> {
    id: HandlerId,
    active: AtomicBool,
    callback: Box<dyn Fn(&E) + Send + Sync>,
}

/// Snapshot-under-lock callback registry for events of type `E`.
pub struct HandlerRegistry<E: ?Sized> {
    ids: Arc<HandlerIdSource>,
    slots: Mutex<Arc<Vec<Arc<Slot<E>>>>>,
}

impl<E> HandlerRegistry<E> {
    pub fn new(ids: Arc<HandlerIdSource>) -> Self {
        Self { ids, slots: Mutex::new(Arc::new(Vec::new())) }
    }

    /// Register a callback; returns its removable id.
    pub fn add(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> HandlerId {
        let id = self.ids.next();
        let slot =
            Arc::new(Slot { id, active: AtomicBool::new(true), callback: Box::new(callback) });
        let mut slots = self.slots.lock();
        let mut next: Vec<_> = slots.iter().cloned().collect();
        next.push(slot);
        *slots = Arc::new(next);
        id
    }

    /// Remove a callback. Returns false for an unknown id so the caller can
    /// log a warning; removal of an unknown id is otherwise harmless.
    pub fn remove(&self, id: HandlerId) -> bool {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.iter().find(|s| s.id == id) else {
            return false;
        };
        slot.active.store(false, Ordering::Release);
        let next: Vec<_> = slots.iter().filter(|s| s.id != id).cloned().collect();
        *slots = Arc::new(next);
        true
    }

    /// Invoke every registered callback with `event`.
    ///
    /// The slot list is snapshotted before the first invocation; handlers
    /// registered mid-dispatch see the next event, handlers removed
    /// mid-dispatch are skipped.
    pub fn dispatch(&self, event: &E) {
        let snapshot = Arc::clone(&self.slots.lock());
        for slot in snapshot.iter() {
            if slot.active.load(Ordering::Acquire) {
                (slot.callback)(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
