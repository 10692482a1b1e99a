//! The four external contracts §1 says the async engine consumes:
//! `resume_handler(ctx, session)`, `ctx_by_index(id)`, `session_by_handle(h)`,
//! and `send_rpc_to_thread(tid, fn, arg)`.
//!
//! The TLS record/session machinery and transport stack are out of scope
//! (§1's deliberately-out-of-scope list), so they are modeled here as
//! traits rather than concrete types. `send_rpc_to_thread` is not
//! re-modeled — it is [`crate::worker::WorkerHandle::send_rpc`], the one
//! shared primitive §2 says both cores rely on.

use crate::worker::WorkerId;

/// Outcome of driving one step of the TLS handshake, mirroring
/// `SSL_do_handshake`'s `SSL_get_error` classification in §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Handshake finished this step; the caller should check
    /// [`TlsContext::is_server`] to decide accept-notification behavior.
    Success,
    /// Benign: more reads are needed before progress.
    WantRead,
    /// Benign: more writes are needed before progress.
    WantWrite,
    /// The underlying crypto operation is still pending off-thread; the
    /// event must remain armed for a later callback.
    WantAsync,
    /// Fatal TLS protocol error; the session must be torn down.
    ProtocolError,
}

/// Outcome of driving one step of a TLS read (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStep {
    /// `n` bytes of plaintext were enqueued into the application rx
    /// buffer (`n` may be zero for a read that produced nothing new).
    Progress(usize),
    /// Still pending off-thread.
    WantAsync,
    /// Unrecoverable error.
    Fatal,
}

/// Outcome of driving one step of a TLS write (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    /// `n` bytes were consumed from the application tx buffer and written.
    Wrote(usize),
    /// Still pending off-thread.
    WantAsync,
    /// Unrecoverable error.
    Fatal,
}

/// A numeric identity for a TLS context, stable for its lifetime. Mirrors
/// `ctx_by_index`'s key (`u32 ctx_index` in the original).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u32);

/// A numeric identity for a session, resolved via `session_by_handle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

/// Transport send parameters an in-flight write event carries (§3.2).
/// `DESCHED` must be set before the event is queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendParams {
    /// Mirrors `TRANSPORT_SND_F_DESCHED`: the transport connection has
    /// been descheduled pending this write's completion.
    pub desched: bool,
    /// Mirrors `SESSION_F_CUSTOM_TX`: the application session wants a
    /// custom-tx callback instead of the default scheduler path.
    pub custom_tx: bool,
}

/// The TLS context / record-layer contract the handlers drive. One
/// implementor per real connection; `ctx_by_index` resolves a
/// [`ContextId`] to `&mut dyn TlsContext` via [`ContextDirectory`].
pub trait TlsContext: std::fmt::Debug {
    /// `true` once `SSL_in_init` would return false — no further handshake
    /// steps are needed.
    fn handshake_complete(&self) -> bool;

    /// `true` if this context was marked explicitly resuming (the
    /// `TLS_CONN_F_RESUME` flag), consuming the flag as it reads it.
    fn take_resume_flag(&mut self) -> bool;

    /// `true` if the transport rx queue has nothing pending (nothing to
    /// feed the handshake with).
    fn transport_rx_empty(&self) -> bool;

    /// Drive one step of the handshake state machine.
    fn do_handshake_step(&mut self) -> HandshakeStep;

    /// `true` for a server-side context (client-side handshake completion
    /// is unsupported by this core, per §4.6).
    fn is_server(&self) -> bool;

    /// `true` if the context is in passive-close (`TLS_CONN_F_PASSIVE_CLOSE`).
    fn is_passive_close(&self) -> bool;

    /// Mark the context's handshake as complete (`TLS_CONN_F_HS_DONE`).
    fn mark_handshake_done(&mut self);

    /// Drive one step of decrypting available ciphertext into the
    /// application rx buffer.
    fn do_read_step(&mut self) -> ReadStep;

    /// `true` if ciphertext remains pending in the TLS object's internal
    /// buffer (`SSL_pending`) or the transport rx buffer.
    fn ciphertext_pending(&self) -> bool;

    /// Set/clear the context's `TLS_CONN_F_ASYNC_RD` flag.
    fn set_async_rd(&mut self, value: bool);

    /// Bytes still to be written for the current async write
    /// (`oc->total_async_write`).
    fn total_async_write(&self) -> usize;

    /// Set `total_async_write`, e.g. when (re-)arming a write event.
    fn set_total_async_write(&mut self, n: usize);

    /// Drive one step of encrypting/writing from the application tx
    /// buffer.
    fn do_write_step(&mut self) -> WriteStep;

    /// `true` if the application has closed its side (`TLS_CONN_F_APP_CLOSED`).
    fn app_closed(&self) -> bool;

    /// Total size of the transport tx fifo, for the write handler's
    /// reserve-space computation.
    fn transport_tx_fifo_size(&self) -> usize;

    /// Bytes currently free in the transport tx fifo.
    fn transport_tx_remaining(&self) -> usize;
}

/// The session/application notification contract (§1's `session_by_handle`
/// plus the notification calls the handlers make on it).
pub trait SessionLayer: std::fmt::Debug {
    /// Handshake failed; tear the session down. No retry (§7).
    fn notify_handshake_failure(&mut self, ctx: ContextId);
    /// Server-side handshake completed; notify the application of an
    /// accepted connection. Returns `false` if notification failed, in
    /// which case the caller marks the context for transport disconnect.
    fn notify_app_accept(&mut self, ctx: ContextId) -> bool;
    /// Disconnect the transport for `ctx` (used when accept notification
    /// fails).
    fn disconnect_transport(&mut self, ctx: ContextId);
    /// Surface an IO error to the application (unrecoverable read/write).
    fn notify_app_io_error(&mut self, ctx: ContextId);
    /// New application-visible bytes are available.
    fn notify_app_enqueue(&mut self, ctx: ContextId, session: SessionId);
    /// Re-arm a builtin rx event on the transport session (more ciphertext
    /// pending after a read).
    fn add_builtin_rx_event(&mut self, session: SessionId);
    /// The application has fully closed with no ciphertext pending;
    /// confirm the close.
    fn confirm_app_close(&mut self, ctx: ContextId);
    /// Deschedule the transport connection (write path, fifo nearly full).
    fn deschedule(&mut self, ctx: ContextId);
    /// Reschedule the transport connection and request a custom-tx pass.
    fn reschedule_for_custom_tx(&mut self, ctx: ContextId);
    /// Request a dequeue notification on the transport tx fifo.
    fn request_dequeue_notify(&mut self, ctx: ContextId);
    /// App tx fifo had a dequeue-notify request pending; deliver it.
    fn notify_app_dequeued(&mut self, ctx: ContextId);
}

/// Resolves [`ContextId`]/[`SessionId`] to the live trait objects the
/// handlers need, mirroring `ctx_by_index`/`session_by_handle`. One
/// instance is shared by every worker's dispatcher.
pub trait ContextDirectory {
    /// Look up a context by id, or `None` if it has since been torn down
    /// (a stale event referencing a freed context is dropped silently).
    fn ctx_mut(&mut self, id: ContextId) -> Option<&mut dyn TlsContext>;
}

/// Re-exported for callers that need to name a worker when constructing
/// an [`super::event::Event`].
pub type Worker = WorkerId;
