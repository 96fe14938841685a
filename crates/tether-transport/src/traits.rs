//! Signaling link trait definitions
//!
//! A link carries whole signaling frames, one JSON object per message, over
//! some persistent byte-stream transport. Framing, handshake, and TLS are
//! the transport's problem; the core only sees complete frames.

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;

use crate::error::Result;

/// Events surfaced by one signaling link.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Link is ready to carry frames.
    Connected,
    /// One complete inbound frame.
    Frame(Bytes),
    /// Link closed, cleanly or not.
    Closed { reason: Option<String> },
    /// Transport-level failure; the link is unusable afterwards.
    Error(String),
}

/// Write half of a signaling link.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Transmit one frame. Completion means the frame was handed to the
    /// transport, not that the peer received it.
    async fn send(&self, frame: Bytes) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Close the link. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Read half of a signaling link.
#[async_trait]
pub trait MessageSource: Send {
    /// Next link event; `None` once the link is fully torn down.
    async fn next_event(&mut self) -> Option<LinkEvent>;
}

/// Listener producing signaling links from inbound connections.
#[async_trait]
pub trait MessageListener: Send + Sync {
    type Sink: MessageSink + 'static;
    type Source: MessageSource + 'static;

    async fn accept(&mut self) -> Result<(Self::Sink, Self::Source, SocketAddr)>;

    fn local_addr(&self) -> Result<SocketAddr>;

    async fn close(&self) -> Result<()>;
}
