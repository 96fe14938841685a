//! Tether Signaling
//!
//! The session lifecycle and signaling-message routing engine:
//! - A concurrency-safe [`SessionRegistry`] mapping identifiers to live
//!   sessions
//! - A bounded per-session [`DispatchQueue`] that serializes all mutation
//!   of one session and makes backpressure explicit
//! - A per-connection [`ConnectionActor`] driving the read loop, the write
//!   queue, and the keepalive timer
//! - The [`SignalingCoordinator`], the protocol state machine that routes
//!   each inbound message through the callback table, the negotiation
//!   states, and the peer-transport engine
//!
//! The server and client roles share this one implementation; they differ
//! only in which side initiates the offer.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether_signaling::{SignalingConfig, SignalingServer};
//! use tether_transport::PeerEngine;
//!
//! async fn run(engine: Arc<dyn PeerEngine>) -> Result<(), Box<dyn std::error::Error>> {
//!     let server = SignalingServer::new(SignalingConfig::default(), engine)?;
//!     server.serve_websocket("0.0.0.0:7440").await?;
//!     Ok(())
//! }
//! ```

pub mod actor;
pub mod callbacks;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;

pub use actor::{CloseReason, ConnState, ConnectionActor};
pub use callbacks::{CallbackTable, SignalHandler};
pub use config::SignalingConfig;
pub use coordinator::SignalingCoordinator;
pub use dispatch::{DispatchQueue, QueuedTask};
pub use error::{Result, SignalingError};
pub use registry::SessionRegistry;
pub use server::SignalingServer;
pub use session::{Session, SessionRole};
