//! Per-worker event slab (§4.4). Grounded on `openssl_evt_alloc`/
//! `openssl_evt_free`'s `pool_get`/`pool_put_index` reuse pattern: freed
//! slots are recycled before growing the slab.

use crate::crypto_engine::event::Event;

/// A worker-local slab of reusable [`Event`] records.
///
/// Only the owning worker allocates from its own pool; `free` may be
/// called by any worker acting on another worker's context (§4.4: "the
/// worker that allocated an event is the only one permitted to free it" —
/// in this single-process model every pool is directly addressable, but a
/// real multi-threaded deployment routes a foreign-worker free through
/// [`crate::worker::WorkerHandle::send_rpc`] to the owning worker first).
#[derive(Debug, Default)]
pub struct EventPool {
    slots: Vec<Option<Event>>,
    free: Vec<usize>,
}

impl EventPool {
    /// An empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a slot for `event`, reusing a freed slot if one is
    /// available, and return its index.
    pub fn alloc(&mut self, event: Event) -> usize {
        if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(event);
            slot
        } else {
            self.slots.push(Some(event));
            self.slots.len() - 1
        }
    }

    /// Return `slot` to the freelist. The slot's content is cleared;
    /// further access by an old index is a logic error the caller must
    /// not make (mirrors the C pool's "no stale access" discipline).
    pub fn free(&mut self, slot: usize) {
        self.slots[slot] = None;
        self.free.push(slot);
    }

    /// Borrow the event at `slot`.
    #[must_use]
    pub fn get(&self, slot: usize) -> &Event {
        self.slots[slot].as_ref().expect("access to freed event slot")
    }

    /// Mutably borrow the event at `slot`.
    pub fn get_mut(&mut self, slot: usize) -> &mut Event {
        self.slots[slot].as_mut().expect("access to freed event slot")
    }

    /// Number of live (allocated, not-yet-freed) events in this pool.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto_engine::contracts::{ContextId, SessionId};
    use crate::crypto_engine::event::EventKind;
    use crate::worker::WorkerId;

    fn sample() -> Event {
        Event::new(ContextId(0), SessionId(0), WorkerId(0), EventKind::Init)
    }

    #[test]
    fn freed_slots_are_reused_before_growing() {
        let mut pool = EventPool::new();
        let a = pool.alloc(sample());
        let b = pool.alloc(sample());
        assert_ne!(a, b);
        pool.free(a);
        let c = pool.alloc(sample());
        assert_eq!(c, a, "freed slot should be recycled");
        assert_eq!(pool.live_count(), 2);
    }

    #[test]
    #[should_panic(expected = "freed event slot")]
    fn accessing_a_freed_slot_panics() {
        let mut pool = EventPool::new();
        let a = pool.alloc(sample());
        pool.free(a);
        pool.get(a);
    }
}
