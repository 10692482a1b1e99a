//! Asynchronous crypto/TLS offload dispatcher (§3-§7 of the async core).
//!
//! Ties together a per-worker [`pool::EventPool`] and pair of
//! [`queue::RunQueue`]s, the [`engine::EngineRegistry`], and the three
//! [`handlers`] into [`dispatcher::CryptoEngine`], the type the rest of
//! the crate and its tests drive.

pub mod contracts;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod event;
pub mod handlers;
pub mod pool;
pub mod queue;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::{init_event, is_inflight, ContextExt, InitEventOutcome};
pub use contracts::{ContextDirectory, ContextId, HandshakeStep, ReadStep, SendParams, SessionId, SessionLayer, TlsContext, WriteStep};
pub use dispatcher::CryptoEngine;
pub use event::{Event, EventKind, EventStatus};
