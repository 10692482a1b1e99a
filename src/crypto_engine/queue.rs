//! Intrusive singly-linked run queue (§3.2, §4.4). Grounded on
//! `openssl_async_queue_t` (`evt_run_head`, `evt_run_tail`, `depth`) plus
//! the `next` field on `openssl_evt_t`: the queue itself holds no
//! allocation, only head/tail slot indices into the owning [`super::pool::EventPool`].

use crate::crypto_engine::event::{Event, EventStatus};
use crate::crypto_engine::pool::EventPool;

/// A per-worker run queue: `init_queue` or `data_queue` (§3.2). Holds only
/// head/tail/depth; link nodes live inside each [`Event`]'s `next_slot`
/// field in the pool, avoiding a separate allocation per queued event.
#[derive(Debug, Default)]
pub struct RunQueue {
    head: Option<usize>,
    tail: Option<usize>,
    depth: usize,
}

/// Default budget for one [`RunQueue::drain`] call (§4.4).
pub const DEFAULT_DRAIN_BUDGET: usize = 256;

impl RunQueue {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events currently queued.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// `true` if the queue has no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Enqueue `slot`'s event (§4.4's `enqueue`):
    /// - if its status is already `Ready`, set `Reenter` and return without
    ///   re-linking (idempotent: the callback fired again before the
    ///   previous run was dequeued);
    /// - otherwise set `Ready`, clear `next_slot`, and append to the tail.
    pub fn enqueue(&mut self, pool: &mut EventPool, slot: usize) {
        if pool.get(slot).status == EventStatus::Ready {
            pool.get_mut(slot).status = EventStatus::Reenter;
            return;
        }

        {
            let event = pool.get_mut(slot);
            event.status = EventStatus::Ready;
            event.next_slot = None;
        }

        match self.tail {
            Some(tail) => pool.get_mut(tail).next_slot = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.depth += 1;
    }

    /// Drain up to `budget` events from the head (§4.4's `drain`).
    ///
    /// For each popped slot: if its status was `Reenter`, the handler is
    /// *not* re-dispatched (the pop itself counts as processing the
    /// reentrant completion) — `on_ready` is only called for events that
    /// were genuinely `Ready`. Every popped event's status becomes
    /// `DeqDone` either way; callers that dispatch to a handler are
    /// responsible for transitioning it to `CbExecuted` once the handler
    /// returns.
    pub fn drain(&mut self, pool: &mut EventPool, budget: usize, mut on_ready: impl FnMut(usize)) -> usize {
        let mut drained = 0;
        while drained < budget {
            let Some(slot) = self.head else { break };
            let event = pool.get_mut(slot);
            let was_reenter = event.status == EventStatus::Reenter;
            self.head = event.next_slot;
            event.status = EventStatus::DeqDone;
            self.depth -= 1;
            if self.head.is_none() {
                self.tail = None;
            }

            if !was_reenter {
                on_ready(slot);
            }
            drained += 1;
        }
        drained
    }
}
