//! The per-(context, kind) event record (§3.2) and its status lifecycle.
//!
//! Grounded directly on `openssl_evt_t` in
//! `examples/original_source/src/plugins/tlsopenssl/tls_async.c`: the same
//! fields re-expressed with enums instead of `#define`d constants and
//! `Option<usize>` instead of a sentinel `-1` for "no next".

use crate::crypto_engine::contracts::{ContextId, SendParams, SessionId};
use crate::worker::WorkerId;

/// Which TLS operation an event tracks. Mirrors `ssl_async_evt_type_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Handshake step (`SSL_ASYNC_EVT_INIT`).
    Init,
    /// Read step.
    Read,
    /// Write step.
    Write,
}

/// Number of [`EventKind`] variants, for fixed-size per-context tables.
pub const EVENT_KIND_COUNT: usize = 3;

impl EventKind {
    /// Index into a fixed-size `[T; EVENT_KIND_COUNT]` table.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            EventKind::Init => 0,
            EventKind::Read => 1,
            EventKind::Write => 2,
        }
    }
}

/// Status lifecycle from §3.2/§8: `invalid -> inflight -> ready ->
/// (reenter)? -> deq_done -> cb_executed -> invalid`. Mirrors
/// `ssl_evt_status_type_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// Freshly allocated or recycled; not yet queued.
    Invalid,
    /// The underlying crypto operation has been submitted and has not yet
    /// completed.
    Inflight,
    /// Queued on a run queue, awaiting dispatch.
    Ready,
    /// The completion callback fired again while the previous `Ready`
    /// entry was still queued; the next drain pops without re-dispatching.
    Reenter,
    /// Popped off its run queue; dispatch has been handed to the handler.
    DeqDone,
    /// The handler returned.
    CbExecuted,
}

/// One outstanding asynchronous TLS operation (§3.2).
#[derive(Debug, Clone)]
pub struct Event {
    /// The context this event belongs to.
    pub ctx_id: ContextId,
    /// The session this event's context is attached to.
    pub session_id: SessionId,
    /// The worker that allocated this event and owns its handler
    /// dispatch.
    pub worker_id: WorkerId,
    /// Which operation this event tracks.
    pub kind: EventKind,
    /// Current lifecycle status.
    pub status: EventStatus,
    /// Next event's slot index on the same run queue, or `None` at the
    /// tail. Mirrors the intrusive `int next` field.
    pub next_slot: Option<usize>,
    /// Transport send parameters, present only for write events.
    pub send_params: Option<SendParams>,
}

impl Event {
    /// Construct a freshly-allocated event in `Invalid` status with no
    /// queue membership.
    #[must_use]
    pub fn new(ctx_id: ContextId, session_id: SessionId, worker_id: WorkerId, kind: EventKind) -> Self {
        Self {
            ctx_id,
            session_id,
            worker_id,
            kind,
            status: EventStatus::Invalid,
            next_slot: None,
            send_params: None,
        }
    }
}
