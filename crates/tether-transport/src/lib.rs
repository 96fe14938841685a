//! Tether Transport Layer
//!
//! This crate provides the two seams the signaling core talks through:
//! - The message-oriented link carrying signaling frames
//!   ([`MessageSink`] / [`MessageSource`] / [`MessageListener`]), with a
//!   WebSocket implementation
//! - The peer-transport engine that performs the actual negotiation once
//!   signaling completes ([`PeerEngine`])
//!
//! The core never assumes anything about either collaborator's internals.

pub mod engine;
pub mod error;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use engine::{EngineEvent, EngineSession, PeerEngine};
pub use error::{EngineError, Result, TransportError};
pub use traits::{LinkEvent, MessageListener, MessageSink, MessageSource};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketLink, WebSocketListener};
