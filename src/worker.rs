//! Pinned per-worker execution model shared by the bridge and the crypto
//! engine.
//!
//! Each worker is one OS thread that owns a disjoint slice of state: its
//! ring-pair endpoints, its event pool, its run queues. Workers never block
//! and never share mutable state directly — the only cross-worker
//! mechanism is [`WorkerHandle::send_rpc`], which enqueues a task on the
//! target worker's input queue for execution on that worker's own tick.
//!
//! Grounded on the handle/channel pattern used for cross-task communication
//! elsewhere in this codebase (an `UnboundedSender` paired with a cloneable
//! handle struct, rather than sharing a mutex).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Identifies one pinned worker thread. Workers are numbered `0..num_workers`
/// and the numbering is stable for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker#{}", self.0)
    }
}

/// A task handed to a worker via [`WorkerHandle::send_rpc`]. Boxed so the
/// RPC channel can carry closures from either core without a trait object
/// per call site.
type Rpc = Box<dyn FnOnce() + Send + 'static>;

/// A handle used by any thread (including engine callback threads that are
/// not themselves workers) to enqueue work onto a specific worker.
///
/// This is the only permitted cross-worker communication mechanism per the
/// concurrency model: engine callbacks arrive on arbitrary threads and must
/// hand the event to its owning worker through `send_rpc` before any
/// handler runs.
#[derive(Clone)]
pub struct WorkerHandle {
    id: WorkerId,
    tx: Sender<Rpc>,
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle").field("id", &self.id).finish()
    }
}

impl WorkerHandle {
    /// The worker this handle targets.
    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Enqueue `task` to run on the target worker's own thread, the next
    /// time that worker drains its RPC queue. Never blocks the caller.
    ///
    /// Returns `false` if the target worker has already shut down (the
    /// receiving end was dropped); callers on hot paths should treat this
    /// the same as a dropped event rather than propagating an error.
    pub fn send_rpc<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(Box::new(task)).is_ok()
    }
}

/// One pinned worker's side of the RPC channel: drained once per tick.
pub struct WorkerInbox {
    rx: Receiver<Rpc>,
}

impl WorkerInbox {
    /// Run every RPC queued since the last drain, in FIFO order. Never
    /// blocks; returns immediately once the queue is empty.
    pub fn drain(&self) {
        while let Ok(task) = self.rx.try_recv() {
            task();
        }
    }
}

/// Constructs a worker's RPC endpoint pair: a cloneable [`WorkerHandle`]
/// other threads use to reach this worker, and the [`WorkerInbox`] the
/// worker itself drains on every tick.
#[must_use]
pub fn worker_channel(id: WorkerId) -> (WorkerHandle, WorkerInbox) {
    let (tx, rx) = mpsc::channel();
    (WorkerHandle { id, tx }, WorkerInbox { rx })
}

/// A pool of pinned worker threads, each ticking a caller-supplied closure
/// until told to stop.
///
/// `WorkerPool` itself does not know about rings or crypto events; it only
/// owns thread lifecycle and the shutdown flag, the way the teacher's
/// top-level run loop owns a `SHUTDOWN_FLAG` checked once per tick rather
/// than relying on blocking I/O to unwind the loop.
pub struct WorkerPool {
    shutdown: Arc<AtomicBool>,
    threads: Vec<std::thread::JoinHandle<()>>,
    handles: Vec<WorkerHandle>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("num_workers", &self.handles.len())
            .finish()
    }
}

impl WorkerPool {
    /// Spawn `num_workers` pinned threads. `make_tick(id, inbox)` is called
    /// once per worker (on the main thread, before spawning) to build the
    /// per-tick closure that thread will run in a loop until shutdown.
    pub fn spawn<F, T>(num_workers: usize, mut make_tick: F) -> Self
    where
        F: FnMut(WorkerId, WorkerInbox) -> T,
        T: FnMut() + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut threads = Vec::with_capacity(num_workers);
        let mut handles = Vec::with_capacity(num_workers);

        for i in 0..num_workers {
            let id = WorkerId(i);
            let (handle, inbox) = worker_channel(id);
            let mut tick = make_tick(id, inbox);
            let shutdown = Arc::clone(&shutdown);

            let join = std::thread::Builder::new()
                .name(format!("snort-bridge-{i}"))
                .spawn(move || {
                    while !shutdown.load(Ordering::Relaxed) {
                        tick();
                    }
                })
                .expect("failed to spawn worker thread");

            threads.push(join);
            handles.push(handle);
        }

        Self { shutdown, threads, handles }
    }

    /// Handles to every worker, indexed by [`WorkerId`].
    #[must_use]
    pub fn handles(&self) -> &[WorkerHandle] {
        &self.handles
    }

    /// Signal every worker to stop after its current tick and join all
    /// threads. Blocks until every worker thread has exited.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for t in self.threads {
            let _ = t.join();
        }
    }
}
