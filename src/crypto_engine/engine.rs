//! Engine adapter and registry (§6.2). Grounded on `engine_list` /
//! `openssl_engine_register` in the original: each named engine pairs a
//! `pre_init` hook (registration-time, e.g. QAT's
//! `ENABLE_EXTERNAL_POLLING`), a `thread_init` hook (once per worker, via
//! `send_rpc_to_thread`, e.g. QAT's `SET_INSTANCE_FOR_THREAD`), and a
//! `poll` hook. `dasync` deliberately has none of the three — it is a
//! software engine that fires its callback inline — so this crate keeps
//! the three-hook shape rather than collapsing it into one `poll` call.

use crate::error::EngineError;
use crate::worker::WorkerId;

/// The vendor-specific polling driver for one registered crypto engine.
pub trait EngineAdapter: std::fmt::Debug {
    /// Called once at registration time, before any worker init or poll.
    /// No-op for engines that need no pre-init (e.g. `dasync`).
    fn pre_init(&mut self) {}

    /// Called once per worker at registration time (mirrors
    /// `session_send_rpc_evt_to_thread(i + 1, thread_init, ...)`).
    /// No-op for engines with nothing to bind per worker.
    fn init_worker(&mut self, _worker: WorkerId) {}

    /// Called on every dispatcher tick for a worker with live events.
    /// No-op for software engines that raise their callback inline
    /// instead of being polled.
    fn poll(&mut self, _worker: WorkerId) {}
}

/// `qat`: issues `ENABLE_EXTERNAL_POLLING` at registration, binds each
/// worker to a QAT instance index equal to its worker id, and issues a
/// `POLL` command on every tick.
#[derive(Debug, Default)]
pub struct QatEngine {
    external_polling_enabled: bool,
    bound_workers: Vec<WorkerId>,
    poll_count: u64,
}

impl QatEngine {
    /// `true` once [`EngineAdapter::pre_init`] has run.
    #[must_use]
    pub fn external_polling_enabled(&self) -> bool {
        self.external_polling_enabled
    }

    /// Workers that have had `SET_INSTANCE_FOR_THREAD` applied, in call
    /// order.
    #[must_use]
    pub fn bound_workers(&self) -> &[WorkerId] {
        &self.bound_workers
    }

    /// Number of `POLL` commands issued so far.
    #[must_use]
    pub fn poll_count(&self) -> u64 {
        self.poll_count
    }
}

impl EngineAdapter for QatEngine {
    fn pre_init(&mut self) {
        self.external_polling_enabled = true;
    }

    fn init_worker(&mut self, worker: WorkerId) {
        self.bound_workers.push(worker);
    }

    fn poll(&mut self, _worker: WorkerId) {
        self.poll_count += 1;
    }
}

/// `dasync`: a software engine that raises its completion callback inline
/// from within the crypto operation itself, so polling it is a no-op
/// (§6.2).
#[derive(Debug, Default)]
pub struct DasyncEngine;

impl EngineAdapter for DasyncEngine {}

/// Registers and owns the process-wide crypto engine (§6.2, §9's
/// "realized as an explicit singleton" note — held by
/// [`super::CryptoEngine`] rather than as ambient global state).
#[derive(Debug, Default)]
pub struct EngineRegistry {
    registered: Option<(String, Box<dyn EngineAdapter + Send>)>,
}

impl EngineRegistry {
    /// No engine registered yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` (`"qat"` or `"dasync"`), running `pre_init` once.
    /// Registration is idempotent for the same name; registering a
    /// *different* name after one is already registered is rejected
    /// (§6.2: "changing engine after registration is rejected").
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownEngine`] for any other name, and
    /// [`EngineError::AlreadyRegistered`] if a different engine is already
    /// registered.
    pub fn register(&mut self, name: &str) -> Result<(), EngineError> {
        if let Some((existing, _)) = &self.registered {
            if existing == name {
                return Ok(());
            }
            return Err(EngineError::AlreadyRegistered(existing.clone()));
        }

        let mut adapter: Box<dyn EngineAdapter + Send> = match name {
            "qat" => Box::new(QatEngine::default()),
            "dasync" => Box::new(DasyncEngine),
            other => return Err(EngineError::UnknownEngine(other.to_string())),
        };
        adapter.pre_init();
        self.registered = Some((name.to_string(), adapter));
        Ok(())
    }

    /// Run `init_worker` for `worker` on the registered engine, if any.
    pub fn init_worker(&mut self, worker: WorkerId) {
        if let Some((_, adapter)) = &mut self.registered {
            adapter.init_worker(worker);
        }
    }

    /// Poll the registered engine for `worker`, if any is registered.
    pub fn poll(&mut self, worker: WorkerId) {
        if let Some((_, adapter)) = &mut self.registered {
            adapter.poll(worker);
        }
    }

    /// The currently registered engine's name, if any.
    #[must_use]
    pub fn registered_name(&self) -> Option<&str> {
        self.registered.as_ref().map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_engine_is_rejected() {
        let mut registry = EngineRegistry::new();
        assert_eq!(registry.register("bogus"), Err(EngineError::UnknownEngine("bogus".to_string())));
    }

    #[test]
    fn registering_same_engine_twice_is_idempotent() {
        let mut registry = EngineRegistry::new();
        registry.register("dasync").unwrap();
        assert!(registry.register("dasync").is_ok());
    }

    #[test]
    fn registering_a_different_engine_after_one_is_set_is_rejected() {
        let mut registry = EngineRegistry::new();
        registry.register("qat").unwrap();
        assert_eq!(registry.register("dasync"), Err(EngineError::AlreadyRegistered("qat".to_string())));
    }

    #[test]
    fn qat_pre_init_enables_external_polling_before_worker_init() {
        let mut registry = EngineRegistry::new();
        registry.register("qat").unwrap();
        registry.init_worker(WorkerId(0));
        registry.init_worker(WorkerId(1));
        registry.poll(WorkerId(0));
        // Indirectly verified via registered_name(); direct adapter state
        // is exercised through QatEngine's own unit tests below.
        assert_eq!(registry.registered_name(), Some("qat"));
    }

    #[test]
    fn qat_engine_tracks_pre_init_worker_binding_and_poll_count() {
        let mut qat = QatEngine::default();
        assert!(!qat.external_polling_enabled());
        qat.pre_init();
        assert!(qat.external_polling_enabled());
        qat.init_worker(WorkerId(2));
        assert_eq!(qat.bound_workers(), &[WorkerId(2)]);
        qat.poll(WorkerId(2));
        qat.poll(WorkerId(2));
        assert_eq!(qat.poll_count(), 2);
    }
}
