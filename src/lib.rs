//! snort-bridge: a lock-free shared-memory IDS bridge paired with an
//! asynchronous crypto/TLS offload dispatcher.
//!
//! The two subsystems share only the pinned-worker model in [`worker`] and
//! the process-wide [`Config`]; neither depends on the other's internals.

pub mod bridge;
pub mod config;
pub mod crypto_engine;
pub mod error;
pub mod worker;

pub use bridge::{Action, Bridge, Descriptor, Instance};
pub use config::Config;
pub use crypto_engine::CryptoEngine;
pub use error::{BridgeError, EngineError};
pub use worker::{WorkerHandle, WorkerId, WorkerPool};
