//! The resumption dispatcher (§4.5) and the top-level [`CryptoEngine`]
//! that owns every per-worker pool/queue pair plus the engine registry.
//! Grounded on `tls_async_process`/`tls_resume_from_crypto`: poll, then
//! drain `data_queue` before `init_queue` ("data before init preserves
//! user-data flow when both are ready; both are drained every tick").

use crate::crypto_engine::context::{init_event, is_inflight, ContextExt, InitEventOutcome};
use crate::crypto_engine::contracts::{ContextDirectory, ContextId, SendParams, SessionId, SessionLayer};
use crate::crypto_engine::engine::EngineRegistry;
use crate::crypto_engine::event::{Event, EventKind, EventStatus};
use crate::crypto_engine::handlers::{handshake_handler, read_handler, write_handler};
use crate::crypto_engine::pool::EventPool;
use crate::crypto_engine::queue::{RunQueue, DEFAULT_DRAIN_BUDGET};
use crate::error::EngineError;
use crate::worker::WorkerId;

/// Per-worker state the dispatcher owns: its event pool and its two run
/// queues (§3.2, §4.4).
#[derive(Debug, Default)]
struct WorkerState {
    pool: EventPool,
    data_queue: RunQueue,
    init_queue: RunQueue,
}

/// The process-wide async crypto engine: one [`WorkerState`] per worker
/// plus the registered [`EngineRegistry`] (§9: realized as an explicit
/// singleton rather than ambient global state, constructed once at
/// subsystem startup).
#[derive(Debug)]
pub struct CryptoEngine {
    workers: Vec<WorkerState>,
    registry: EngineRegistry,
}

impl CryptoEngine {
    /// Construct an engine with `num_workers` independent worker states
    /// and no engine registered yet.
    #[must_use]
    pub fn new(num_workers: usize) -> Self {
        Self { workers: (0..num_workers).map(|_| WorkerState::default()).collect(), registry: EngineRegistry::new() }
    }

    /// `openssl_engine_register` (§6.2): register `name`, run its
    /// `pre_init`, then `init_worker` once per worker.
    ///
    /// # Errors
    ///
    /// See [`EngineRegistry::register`].
    pub fn register_engine(&mut self, name: &str) -> Result<(), EngineError> {
        self.registry.register(name)?;
        for i in 0..self.workers.len() {
            self.registry.init_worker(WorkerId(i));
        }
        Ok(())
    }

    /// The currently registered engine's name, if any.
    #[must_use]
    pub fn registered_engine(&self) -> Option<&str> {
        self.registry.registered_name()
    }

    fn worker_mut(&mut self, worker: WorkerId) -> &mut WorkerState {
        &mut self.workers[worker.0]
    }

    /// `init_event(ctx, handler, session, kind, send_params, wr_size)`
    /// (§4.7). `handler` is not stored explicitly — the dispatcher always
    /// calls the matching one of [`handshake_handler`]/[`read_handler`]/
    /// [`write_handler`] for an event's `kind`; `handler` is accepted here
    /// only to mirror the contract's signature documented in spec.md.
    pub fn init_event(
        &mut self,
        ctx_ext: &mut ContextExt,
        ctx_id: ContextId,
        session_id: SessionId,
        worker: WorkerId,
        kind: EventKind,
        send_params: Option<SendParams>,
        wr_size: usize,
    ) -> InitEventOutcome {
        let state = self.worker_mut(worker);
        init_event(
            ctx_ext,
            kind,
            send_params,
            wr_size,
            |slot, sp| state.pool.get_mut(slot).send_params = sp,
            |slot, n| {
                // total_async_write lives on the caller's TlsContext, not
                // the event; the dispatcher only tracks the slot here.
                let _ = (slot, n);
            },
            || state.pool.alloc(Event::new(ctx_id, session_id, worker, kind)),
        )
    }

    /// `is_inflight(ctx)` (§4.7, §8): true if any event allocated for
    /// `ctx_ext` currently has status `Inflight`. `worker` identifies
    /// which worker's pool owns those slots.
    #[must_use]
    pub fn is_inflight(&self, ctx_ext: &ContextExt, worker: WorkerId) -> bool {
        let pool = &self.workers[worker.0].pool;
        is_inflight(ctx_ext, |slot| pool.get(slot).status)
    }

    /// Mark an event `Inflight`, once the caller has submitted its
    /// underlying crypto operation to the engine.
    pub fn mark_inflight(&mut self, worker: WorkerId, slot: usize) {
        self.worker_mut(worker).pool.get_mut(slot).status = EventStatus::Inflight;
    }

    /// The engine completion callback hand-off (§4.4's `enqueue`):
    /// arrives on an arbitrary thread in a real deployment and must reach
    /// `worker` before the handler runs. A true multi-threaded deployment
    /// routes this through `worker::WorkerHandle::send_rpc(move || ...)`;
    /// here `worker` directly addresses this engine's own per-worker
    /// state, since `CryptoEngine` is not itself thread-split.
    pub fn raise_completion(&mut self, worker: WorkerId, slot: usize) {
        let kind = self.worker_mut(worker).pool.get(slot).kind;
        let state = self.worker_mut(worker);
        match kind {
            EventKind::Init => state.init_queue.enqueue(&mut state.pool, slot),
            EventKind::Read | EventKind::Write => state.data_queue.enqueue(&mut state.pool, slot),
        }
    }

    /// One worker's periodic tick (§4.5): poll the engine, then drain
    /// `data_queue` before `init_queue`. Returns the number of events
    /// dispatched to a handler (excludes reentrant pops, which are
    /// unlinked but not re-dispatched).
    pub fn tick(
        &mut self,
        worker: WorkerId,
        contexts: &mut dyn ContextDirectory,
        session: &mut dyn SessionLayer,
    ) -> usize {
        if self.worker_mut(worker).pool.live_count() == 0 {
            return 0;
        }

        self.registry.poll(worker);

        let mut dispatched = 0;
        dispatched += self.drain_queue(worker, Queue::Data, contexts, session);
        dispatched += self.drain_queue(worker, Queue::Init, contexts, session);
        dispatched
    }

    fn drain_queue(
        &mut self,
        worker: WorkerId,
        which: Queue,
        contexts: &mut dyn ContextDirectory,
        session: &mut dyn SessionLayer,
    ) -> usize {
        let mut ready = Vec::new();
        {
            let state = self.worker_mut(worker);
            let queue = match which {
                Queue::Data => &mut state.data_queue,
                Queue::Init => &mut state.init_queue,
            };
            queue.drain(&mut state.pool, DEFAULT_DRAIN_BUDGET, |slot| ready.push(slot));
        }

        for slot in &ready {
            self.dispatch(worker, *slot, contexts, session);
        }
        ready.len()
    }

    fn dispatch(&mut self, worker: WorkerId, slot: usize, contexts: &mut dyn ContextDirectory, session: &mut dyn SessionLayer) {
        let (ctx_id, session_id, kind) = {
            let event = self.worker_mut(worker).pool.get(slot);
            (event.ctx_id, event.session_id, event.kind)
        };

        if let Some(ctx) = contexts.ctx_mut(ctx_id) {
            match kind {
                EventKind::Init => handshake_handler(ctx, ctx_id, session),
                EventKind::Read => read_handler(ctx, ctx_id, session_id, session),
                EventKind::Write => write_handler(ctx, ctx_id, session),
            }
        }

        self.worker_mut(worker).pool.get_mut(slot).status = EventStatus::CbExecuted;
    }

    /// Free an event slot. May target a worker other than the one running
    /// this call (§4.4: "the worker that allocated an event is the only
    /// one permitted to free it" — a real deployment routes a
    /// foreign-worker free through `send_rpc_to_thread` to the owning
    /// worker before calling this).
    pub fn free_event(&mut self, worker: WorkerId, slot: usize) {
        self.worker_mut(worker).pool.free(slot);
    }
}

#[derive(Clone, Copy)]
enum Queue {
    Data,
    Init,
}
