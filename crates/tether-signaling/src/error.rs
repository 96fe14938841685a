//! Signaling error types

use thiserror::Error;

use tether_core::{OperationCode, SessionId};
use tether_transport::{EngineError, TransportError};

pub type Result<T> = std::result::Result<T, SignalingError>;

#[derive(Error, Debug)]
pub enum SignalingError {
    /// A session with this identifier is already registered; the existing
    /// session is never replaced.
    #[error("session already registered: {0}")]
    AlreadyExists(SessionId),

    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// The session is already paired with an engine session.
    #[error("session already paired: {0}")]
    AlreadyPaired(SessionId),

    /// A second handler was registered for the same operation code.
    #[error("callback already registered for operation {0}")]
    HandlerExists(OperationCode),

    /// The session's bounded outbound queue is full; fatal to the
    /// connection, never silently dropped.
    #[error("outbound queue full for session {0}")]
    BackpressureExceeded(SessionId),

    /// The session's connection has already torn down its write path.
    #[error("session closed: {0}")]
    SessionClosed(SessionId),

    #[error(transparent)]
    Core(#[from] tether_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}
