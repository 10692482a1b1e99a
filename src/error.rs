//! Public error types for the bridge's configuration surface and the
//! crypto engine's registration surface.
//!
//! Hot-path failures (ring-full, verdict decode) are deliberately *not*
//! represented here — per the error handling design, those are counted as
//! statistics rather than raised (see [`crate::bridge::stats`]).

use thiserror::Error;

/// Errors returned by the bridge's control surface
/// (`instance_create`, `interface_attach`, ...).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BridgeError {
    /// `interface_attach` or `instance_disconnect` referenced an instance
    /// name/id that does not exist.
    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    /// `instance_create` was called with a name already in use.
    #[error("duplicate instance name: {0}")]
    DuplicateInstance(String),

    /// A client tried to `HELLO` an instance that already has a connected
    /// client.
    #[error("instance {0} already has a connected client")]
    DuplicateClient(String),

    /// `interface_attach` received a direction that doesn't decode to one
    /// of `input`/`output`/`inout`.
    #[error("invalid attach direction: {0}")]
    BadDirection(u8),

    /// `instance_delete` was called on an instance still referenced by an
    /// interface binding.
    #[error("instance {0} still has interface attachments")]
    InstanceInUse(String),

    /// A descriptor's action byte, decoded off a ring pair's shared memory,
    /// did not match any recognized [`crate::bridge::Action`] value.
    #[error("invalid descriptor action: {0}")]
    InvalidAction(u8),

    /// A verdict decoded with `action == replace`. The wire format does not
    /// yet define a payload convention for replacement bytes, so replace
    /// verdicts are rejected rather than guessed at.
    #[error("replace verdicts are not supported (no payload convention defined)")]
    ReplaceNotSupported,
}

/// Errors returned by the crypto engine's registration surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineError {
    /// `register(name)` was called with a name not in the engine table.
    #[error("unknown engine: {0}")]
    UnknownEngine(String),

    /// `register` was called a second time with a different engine name.
    #[error("engine already registered as {0}")]
    AlreadyRegistered(String),
}
