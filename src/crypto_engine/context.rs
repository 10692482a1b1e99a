//! Per-context event bookkeeping and the `init_event`/`is_inflight`
//! contract from §4.7. Grounded on `openssl_ctx_t`'s `evt_index`/
//! `evt_alloc_flag` arrays and `vpp_tls_async_init_event`/
//! `vpp_openssl_is_inflight`.

use crate::crypto_engine::contracts::SendParams;
use crate::crypto_engine::event::{EventKind, EventStatus, EVENT_KIND_COUNT};

/// Per-(context, kind) event bookkeeping enforcing "at most one
/// outstanding event per (context, kind)" (§3.2). Embedded in whatever
/// struct represents a TLS context alongside the fields
/// [`crate::crypto_engine::contracts::TlsContext`] already exposes.
#[derive(Debug, Clone, Default)]
pub struct ContextExt {
    evt_index: [Option<usize>; EVENT_KIND_COUNT],
    evt_alloc_flag: [bool; EVENT_KIND_COUNT],
}

impl ContextExt {
    /// No events allocated yet for any kind.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot index currently bound to `kind`, if any.
    #[must_use]
    pub fn slot_for(&self, kind: EventKind) -> Option<usize> {
        self.evt_index[kind.index()]
    }

    fn is_allocated(&self, kind: EventKind) -> bool {
        self.evt_alloc_flag[kind.index()]
    }

    fn bind(&mut self, kind: EventKind, slot: usize) {
        self.evt_index[kind.index()] = Some(slot);
        self.evt_alloc_flag[kind.index()] = true;
    }

    /// Slots for every kind that has ever been allocated on this context,
    /// used by [`super::dispatcher::is_inflight`].
    pub(crate) fn allocated_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.evt_index.iter().filter_map(|s| *s)
    }
}

/// Outcome of [`init_event`], telling the caller whether a fresh slot was
/// allocated or an existing one was reused/updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitEventOutcome {
    /// A new event slot was allocated.
    Allocated(usize),
    /// `kind == Write` and an event already existed; its `send_params`/
    /// `total_async_write` were updated in place.
    Rearmed(usize),
    /// `kind` is `Init` or `Read` and an event already existed; no change
    /// made (at-most-one rule).
    AlreadyPending(usize),
}

impl InitEventOutcome {
    /// The event slot in every case.
    #[must_use]
    pub fn slot(self) -> usize {
        match self {
            InitEventOutcome::Allocated(s) | InitEventOutcome::Rearmed(s) | InitEventOutcome::AlreadyPending(s) => s,
        }
    }
}

/// `init_event(ctx, handler, session, kind, send_params, wr_size)` (§4.7).
///
/// `alloc_new` is called only when a fresh slot is required; it should
/// allocate from the owning worker's [`super::pool::EventPool`] and return
/// the new slot index with the event populated (`ctx_id`, `session_id`,
/// `worker_id`, `kind`, `status = Invalid`).
///
/// For write events: the transport connection is descheded and
/// `send_params.desched` is set, whether this is a fresh allocation or a
/// rearm, mirroring the original's `update_wr_evnt` fallthrough.
pub fn init_event(
    ctx: &mut ContextExt,
    kind: EventKind,
    mut send_params: Option<SendParams>,
    wr_size: usize,
    mut set_send_params: impl FnMut(usize, Option<SendParams>),
    mut set_total_async_write: impl FnMut(usize, usize),
    alloc_new: impl FnOnce() -> usize,
) -> InitEventOutcome {
    let outcome = if ctx.is_allocated(kind) {
        let slot = ctx.slot_for(kind).expect("alloc flag implies a bound slot");
        if kind == EventKind::Write {
            set_total_async_write(slot, wr_size);
            InitEventOutcome::Rearmed(slot)
        } else {
            return InitEventOutcome::AlreadyPending(slot);
        }
    } else {
        let slot = alloc_new();
        ctx.bind(kind, slot);
        InitEventOutcome::Allocated(slot)
    };

    if kind == EventKind::Write {
        if let Some(sp) = &mut send_params {
            sp.desched = true;
        }
    }
    set_send_params(outcome.slot(), send_params);
    outcome
}

/// `is_inflight(ctx)`: `true` if any event allocated for `ctx` currently
/// has status [`EventStatus::Inflight`] (§4.7, §8).
pub fn is_inflight(ctx: &ContextExt, status_of: impl Fn(usize) -> EventStatus) -> bool {
    ctx.allocated_slots().any(|slot| status_of(slot) == EventStatus::Inflight)
}
