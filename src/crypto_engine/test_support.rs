//! In-memory test doubles for [`super::contracts::TlsContext`] and
//! [`super::contracts::SessionLayer`], used to exercise the dispatcher and
//! handlers end-to-end without a real TLS stack or transport (§1).

use crate::crypto_engine::contracts::{ContextId, HandshakeStep, ReadStep, SessionId, SessionLayer, TlsContext, WriteStep};

/// A scriptable [`TlsContext`] double: each method returns whatever the
/// test configured, and records how many times the driving methods were
/// called.
#[derive(Debug)]
pub struct FakeTlsContext {
    pub handshake_done: bool,
    pub resume_flag: bool,
    pub rx_empty: bool,
    pub is_server: bool,
    pub passive_close: bool,
    pub next_step: HandshakeStep,
    pub handshake_steps_driven: usize,

    pub next_read: ReadStep,
    pub async_rd: bool,
    pub ciphertext_pending: bool,

    pub total_async_write: usize,
    pub next_write: WriteStep,
    pub write_steps_driven: usize,
    pub app_closed: bool,
    pub tx_fifo_size: usize,
    pub tx_remaining: usize,
}

impl FakeTlsContext {
    /// A server-side context with defaults chosen so the handshake
    /// handler does not short-circuit (`rx_empty = false`).
    #[must_use]
    pub fn new_server() -> Self {
        Self {
            handshake_done: false,
            resume_flag: false,
            rx_empty: false,
            is_server: true,
            passive_close: false,
            next_step: HandshakeStep::WantRead,
            handshake_steps_driven: 0,
            next_read: ReadStep::Progress(0),
            async_rd: false,
            ciphertext_pending: false,
            total_async_write: 0,
            next_write: WriteStep::Wrote(0),
            write_steps_driven: 0,
            app_closed: false,
            tx_fifo_size: 4096,
            tx_remaining: 4096,
        }
    }
}

impl TlsContext for FakeTlsContext {
    fn handshake_complete(&self) -> bool {
        self.handshake_done
    }

    fn take_resume_flag(&mut self) -> bool {
        std::mem::take(&mut self.resume_flag)
    }

    fn transport_rx_empty(&self) -> bool {
        self.rx_empty
    }

    fn do_handshake_step(&mut self) -> HandshakeStep {
        self.handshake_steps_driven += 1;
        self.next_step
    }

    fn is_server(&self) -> bool {
        self.is_server
    }

    fn is_passive_close(&self) -> bool {
        self.passive_close
    }

    fn mark_handshake_done(&mut self) {
        self.handshake_done = true;
    }

    fn do_read_step(&mut self) -> ReadStep {
        self.next_read
    }

    fn ciphertext_pending(&self) -> bool {
        self.ciphertext_pending
    }

    fn set_async_rd(&mut self, value: bool) {
        self.async_rd = value;
    }

    fn total_async_write(&self) -> usize {
        self.total_async_write
    }

    fn set_total_async_write(&mut self, n: usize) {
        self.total_async_write = n;
    }

    fn do_write_step(&mut self) -> WriteStep {
        self.write_steps_driven += 1;
        self.next_write
    }

    fn app_closed(&self) -> bool {
        self.app_closed
    }

    fn transport_tx_fifo_size(&self) -> usize {
        self.tx_fifo_size
    }

    fn transport_tx_remaining(&self) -> usize {
        self.tx_remaining
    }
}

/// A recording [`SessionLayer`] double: every notification is appended to
/// a `Vec` the test can assert against.
#[derive(Debug)]
pub struct FakeSession {
    pub handshake_failures: Vec<ContextId>,
    pub app_accepts: Vec<ContextId>,
    pub transport_disconnects: Vec<ContextId>,
    pub io_errors: Vec<ContextId>,
    pub app_enqueues: Vec<(ContextId, SessionId)>,
    pub builtin_rx_rearms: Vec<SessionId>,
    pub app_closes_confirmed: Vec<ContextId>,
    pub deschedules: Vec<ContextId>,
    pub reschedules: Vec<ContextId>,
    pub dequeue_notify_requests: Vec<ContextId>,
    pub app_dequeue_notifies: Vec<ContextId>,
    /// If `false`, [`SessionLayer::notify_app_accept`] reports failure.
    pub accept_succeeds: bool,
}

impl FakeSession {
    /// Configure `notify_app_accept` to report failure for the next call.
    pub fn fail_next_accept(&mut self) {
        self.accept_succeeds = false;
    }
}

impl Default for FakeTlsContext {
    fn default() -> Self {
        Self::new_server()
    }
}

impl Default for FakeSession {
    fn default() -> Self {
        Self {
            handshake_failures: Vec::new(),
            app_accepts: Vec::new(),
            transport_disconnects: Vec::new(),
            io_errors: Vec::new(),
            app_enqueues: Vec::new(),
            builtin_rx_rearms: Vec::new(),
            app_closes_confirmed: Vec::new(),
            deschedules: Vec::new(),
            reschedules: Vec::new(),
            dequeue_notify_requests: Vec::new(),
            app_dequeue_notifies: Vec::new(),
            accept_succeeds: true,
        }
    }
}

impl SessionLayer for FakeSession {
    fn notify_handshake_failure(&mut self, ctx: ContextId) {
        self.handshake_failures.push(ctx);
    }

    fn notify_app_accept(&mut self, ctx: ContextId) -> bool {
        self.app_accepts.push(ctx);
        self.accept_succeeds
    }

    fn disconnect_transport(&mut self, ctx: ContextId) {
        self.transport_disconnects.push(ctx);
    }

    fn notify_app_io_error(&mut self, ctx: ContextId) {
        self.io_errors.push(ctx);
    }

    fn notify_app_enqueue(&mut self, ctx: ContextId, session: SessionId) {
        self.app_enqueues.push((ctx, session));
    }

    fn add_builtin_rx_event(&mut self, session: SessionId) {
        self.builtin_rx_rearms.push(session);
    }

    fn confirm_app_close(&mut self, ctx: ContextId) {
        self.app_closes_confirmed.push(ctx);
    }

    fn deschedule(&mut self, ctx: ContextId) {
        self.deschedules.push(ctx);
    }

    fn reschedule_for_custom_tx(&mut self, ctx: ContextId) {
        self.reschedules.push(ctx);
    }

    fn request_dequeue_notify(&mut self, ctx: ContextId) {
        self.dequeue_notify_requests.push(ctx);
    }

    fn notify_app_dequeued(&mut self, ctx: ContextId) {
        self.app_dequeue_notifies.push(ctx);
    }
}

impl FakeSession {
    /// A double that reports success for every `notify_app_accept` call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
