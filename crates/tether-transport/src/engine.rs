//! Peer-transport engine seam
//!
//! The engine performs the actual peer negotiation (ICE, encryption,
//! datagram delivery) once signaling hands it an offer. The signaling core
//! treats it as an opaque negotiator: offers go in, an answer and a stream
//! of events come out, and every result is forwarded verbatim. Engine
//! events are delivered over a channel rather than observer objects, so the
//! engine never holds an owning reference back into a session.

use async_trait::async_trait;
use tokio::sync::mpsc;

use tether_core::{IceCandidate, SessionId};

use crate::error::EngineError;

/// Events emitted by the engine for one peer session, in emission order.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The engine discovered a local ICE candidate to relay to the remote
    /// peer.
    LocalCandidate(IceCandidate),
    /// The peer transport reached the connected state.
    Opened,
    /// The peer transport closed.
    Closed { reason: Option<String> },
    /// Negotiation failed inside the engine. Treated like a close.
    Failed(String),
}

/// Handle returned by a successful [`PeerEngine::create_session`].
pub struct EngineSession {
    /// The engine's own identifier for the peer session. At most one engine
    /// session is paired with a given signaling session at a time.
    pub id: SessionId,
    /// Answer SDP generated for the remote offer.
    pub answer_sdp: String,
    /// Per-session engine events. The engine drops the sender on close,
    /// ending the stream.
    pub events: mpsc::Receiver<EngineEvent>,
}

/// The external peer-transport engine.
///
/// Implementations wrap whatever actually negotiates the peer channel
/// (a WebRTC stack, a QUIC hole-puncher, a test double). All methods are
/// asynchronous and must not assume they are called from any particular
/// task; the signaling core serializes calls per session.
#[async_trait]
pub trait PeerEngine: Send + Sync {
    /// Create a peer session for a remote offer and produce the answer SDP.
    async fn create_session(
        &self,
        signaling_id: &SessionId,
        offer_sdp: &str,
    ) -> std::result::Result<EngineSession, EngineError>;

    /// Apply the remote answer for a session this side initiated.
    async fn accept_answer(
        &self,
        engine_id: &SessionId,
        answer_sdp: &str,
    ) -> std::result::Result<(), EngineError>;

    /// Forward one remote ICE candidate to the engine.
    async fn add_remote_candidate(
        &self,
        engine_id: &SessionId,
        candidate: IceCandidate,
    ) -> std::result::Result<(), EngineError>;

    /// Tear the peer session down. Idempotent; unknown identifiers are a
    /// no-op.
    async fn close_session(&self, engine_id: &SessionId);
}
