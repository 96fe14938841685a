//! Error types for the tether protocol core

use thiserror::Error;

use crate::message::OperationCode;
use crate::negotiation::{NegotiationEvent, NegotiationState};

/// Result type alias for core protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol-level error taxonomy.
///
/// Only [`Error::Protocol`] is fatal to a connection; every other variant
/// describes a single rejected message and leaves the session untouched.
#[derive(Error, Debug)]
pub enum Error {
    /// Identifier seed was empty or exceeded the fixed maximum length
    #[error("invalid identifier: {0} bytes (expected 1..=64)")]
    InvalidIdentifier(usize),

    /// The `type` field named no registered operation
    #[error("unknown operation: {0:?}")]
    UnknownOperation(String),

    /// Payload was missing a field the operation requires
    #[error("malformed {op} payload: {detail}")]
    MalformedPayload { op: OperationCode, detail: String },

    /// The operation is not permitted in the session's current state
    #[error("{event:?} not permitted in state {state:?}")]
    InvalidTransition {
        event: NegotiationEvent,
        state: NegotiationState,
    },

    /// Frame could not be serialized
    #[error("encode error: {0}")]
    Encode(String),

    /// Frame was not a JSON object with a `type` field; fatal to the connection
    #[error("protocol error: {0}")]
    Protocol(String),
}
