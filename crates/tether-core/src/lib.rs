//! Tether Core
//!
//! Core types and protocol primitives for the tether signaling layer.
//!
//! This crate provides:
//! - Session identifiers ([`SessionId`])
//! - Wire message types and JSON codec ([`SignalMessage`], [`codec`])
//! - The negotiation state machine ([`NegotiationState`], [`transition`])
//! - The core error taxonomy ([`Error`])
//!
//! Everything here is I/O-free; transports and the session engine live in
//! the sibling crates.

pub mod codec;
pub mod error;
pub mod ident;
pub mod message;
pub mod negotiation;

pub use codec::{decode, encode};
pub use error::{Error, Result};
pub use ident::SessionId;
pub use message::{IceCandidate, OperationCode, SignalMessage};
pub use negotiation::{transition, NegotiationEvent, NegotiationState};

/// Default port for the WebSocket signaling listener.
pub const DEFAULT_SIGNALING_PORT: u16 = 7440;

/// Maximum size of one signaling frame on the wire.
pub const MAX_FRAME_BYTES: usize = 16 * 1024;

/// Maximum length of a session identifier, in bytes.
pub const MAX_IDENT_BYTES: usize = 64;
