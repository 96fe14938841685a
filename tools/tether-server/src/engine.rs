//! Loopback demo engine
//!
//! A stand-in peer engine for local testing and demos: it "negotiates" by
//! reflecting the offer SDP as the answer and reports the transport open
//! immediately. Wire a real engine in by implementing `PeerEngine` against
//! your peer-transport stack.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use tether_core::{IceCandidate, SessionId};
use tether_transport::{EngineError, EngineEvent, EngineSession, PeerEngine};

#[derive(Default)]
pub struct LoopbackEngine {
    sessions: Mutex<HashMap<SessionId, mpsc::Sender<EngineEvent>>>,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[async_trait]
impl PeerEngine for LoopbackEngine {
    async fn create_session(
        &self,
        signaling_id: &SessionId,
        offer_sdp: &str,
    ) -> Result<EngineSession, EngineError> {
        let engine_id = SessionId::generate();
        let (event_tx, event_rx) = mpsc::channel(16);

        // No negotiation to do: the transport is "up" as soon as the
        // answer is out.
        event_tx
            .try_send(EngineEvent::Opened)
            .map_err(|e| EngineError::Failure(e.to_string()))?;

        self.sessions
            .lock()
            .insert(engine_id.clone(), event_tx);

        debug!(
            "loopback session {} created for signaling session {}",
            engine_id, signaling_id
        );

        Ok(EngineSession {
            id: engine_id,
            answer_sdp: format!("{offer_sdp}\r\na=tether-loopback"),
            events: event_rx,
        })
    }

    async fn accept_answer(
        &self,
        engine_id: &SessionId,
        _answer_sdp: &str,
    ) -> Result<(), EngineError> {
        if !self.sessions.lock().contains_key(engine_id) {
            return Err(EngineError::SessionNotFound(engine_id.to_string()));
        }
        Ok(())
    }

    async fn add_remote_candidate(
        &self,
        engine_id: &SessionId,
        candidate: IceCandidate,
    ) -> Result<(), EngineError> {
        debug!(
            "loopback session {} ignoring candidate {}",
            engine_id, candidate.candidate
        );
        Ok(())
    }

    async fn close_session(&self, engine_id: &SessionId) {
        // Dropping the sender ends the event stream.
        self.sessions.lock().remove(engine_id);
    }
}
