//! Common test helpers for tether
//!
//! Provides:
//! - An in-memory signaling link so engine and coordinator behavior can be
//!   tested without sockets
//! - A scripted peer engine that records every call and lets tests emit
//!   engine events on demand
//! - Condition-based waiting (no hardcoded sleeps for assertions)

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use tether_core::{IceCandidate, SessionId};
use tether_transport::{
    EngineError, EngineEvent, EngineSession, LinkEvent, MessageSink, MessageSource, PeerEngine,
    TransportError,
};

/// Default timeout for condition waits.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Port allocation
// ============================================================================

/// Find an available TCP port for a test listener.
pub async fn find_available_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind to an ephemeral port");
    listener.local_addr().expect("listener has an address").port()
}

// ============================================================================
// Condition-based waiting
// ============================================================================

/// Poll `check` until it returns true or `max_wait` elapses.
pub async fn wait_for(mut check: impl FnMut() -> bool, max_wait: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check() {
            return true;
        }
        tokio::time::sleep(DEFAULT_CHECK_INTERVAL).await;
    }
    false
}

// ============================================================================
// In-memory signaling link
// ============================================================================

/// Build an in-memory link: the sink/source pair goes to the code under
/// test, the [`RemoteEnd`] plays the peer.
pub fn memory_link() -> (MemorySink, MemorySource, RemoteEnd) {
    let (event_tx, event_rx) = mpsc::channel(64);
    let (frame_tx, frame_rx) = mpsc::channel(64);

    // The link is up from the start.
    event_tx
        .try_send(LinkEvent::Connected)
        .expect("fresh event channel accepts the connected event");

    let sink = MemorySink {
        frames: Mutex::new(Some(frame_tx)),
        connected: Arc::new(Mutex::new(true)),
    };
    let source = MemorySource { events: event_rx };
    let remote = RemoteEnd {
        events: event_tx,
        frames: frame_rx,
    };

    (sink, source, remote)
}

pub struct MemorySink {
    frames: Mutex<Option<mpsc::Sender<Bytes>>>,
    connected: Arc<Mutex<bool>>,
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        let sender = self.frames.lock().clone();
        match sender {
            Some(sender) => sender
                .send(frame)
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string())),
            None => Err(TransportError::NotConnected),
        }
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<(), TransportError> {
        *self.connected.lock() = false;
        // Dropping the sender ends the remote's frame stream.
        self.frames.lock().take();
        Ok(())
    }
}

pub struct MemorySource {
    events: mpsc::Receiver<LinkEvent>,
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn next_event(&mut self) -> Option<LinkEvent> {
        self.events.recv().await
    }
}

/// The peer's side of an in-memory link.
pub struct RemoteEnd {
    events: mpsc::Sender<LinkEvent>,
    frames: mpsc::Receiver<Bytes>,
}

impl RemoteEnd {
    /// Deliver one frame to the code under test.
    pub async fn send_frame(&self, frame: impl Into<Bytes>) {
        self.events
            .send(LinkEvent::Frame(frame.into()))
            .await
            .expect("link still open");
    }

    /// Next frame written by the code under test, or `None` if it closed.
    pub async fn recv_frame(&mut self) -> Option<Bytes> {
        self.frames.recv().await
    }

    /// Next frame within `max_wait`; panics if nothing arrives.
    pub async fn expect_frame(&mut self, max_wait: Duration) -> Bytes {
        tokio::time::timeout(max_wait, self.frames.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("link closed while waiting for a frame")
    }

    /// Announce the remote side going away.
    pub async fn close(&self, reason: Option<String>) {
        let _ = self.events.send(LinkEvent::Closed { reason }).await;
    }
}

// ============================================================================
// Scripted peer engine
// ============================================================================

/// A peer engine double: answers every offer with a canned SDP, records
/// every call in order, and lets the test emit engine events by hand.
pub struct ScriptedEngine {
    answer_sdp: String,
    fail_next_create: AtomicBool,
    state: Mutex<ScriptedState>,
}

#[derive(Default)]
struct ScriptedState {
    created: Vec<(SessionId, SessionId)>,
    candidates: Vec<(SessionId, IceCandidate)>,
    accepted_answers: Vec<(SessionId, String)>,
    closed: Vec<SessionId>,
    event_senders: HashMap<SessionId, mpsc::Sender<EngineEvent>>,
}

impl ScriptedEngine {
    pub fn new(answer_sdp: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            answer_sdp: answer_sdp.into(),
            fail_next_create: AtomicBool::new(false),
            state: Mutex::new(ScriptedState::default()),
        })
    }

    /// Make the next `create_session` call fail.
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    pub fn created_count(&self) -> usize {
        self.state.lock().created.len()
    }

    /// `(signaling id, engine id)` pairs in creation order.
    pub fn created(&self) -> Vec<(SessionId, SessionId)> {
        self.state.lock().created.clone()
    }

    pub fn engine_id_for(&self, signaling_id: &SessionId) -> Option<SessionId> {
        self.state
            .lock()
            .created
            .iter()
            .find(|(sig, _)| sig == signaling_id)
            .map(|(_, engine)| engine.clone())
    }

    /// Every candidate the engine was handed, in arrival order.
    pub fn candidate_log(&self) -> Vec<(SessionId, IceCandidate)> {
        self.state.lock().candidates.clone()
    }

    pub fn candidates_for(&self, engine_id: &SessionId) -> Vec<IceCandidate> {
        self.state
            .lock()
            .candidates
            .iter()
            .filter(|(id, _)| id == engine_id)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn accepted_answers(&self) -> Vec<(SessionId, String)> {
        self.state.lock().accepted_answers.clone()
    }

    pub fn closed_sessions(&self) -> Vec<SessionId> {
        self.state.lock().closed.clone()
    }

    /// Emit one engine event for a session created earlier.
    pub async fn emit(&self, engine_id: &SessionId, event: EngineEvent) {
        let sender = self.state.lock().event_senders.get(engine_id).cloned();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }
}

#[async_trait]
impl PeerEngine for ScriptedEngine {
    async fn create_session(
        &self,
        signaling_id: &SessionId,
        _offer_sdp: &str,
    ) -> Result<EngineSession, EngineError> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Rejected("scripted failure".into()));
        }

        let engine_id = SessionId::generate();
        let (event_tx, event_rx) = mpsc::channel(16);

        let mut state = self.state.lock();
        state
            .created
            .push((signaling_id.clone(), engine_id.clone()));
        state.event_senders.insert(engine_id.clone(), event_tx);

        Ok(EngineSession {
            id: engine_id,
            answer_sdp: self.answer_sdp.clone(),
            events: event_rx,
        })
    }

    async fn accept_answer(
        &self,
        engine_id: &SessionId,
        answer_sdp: &str,
    ) -> Result<(), EngineError> {
        self.state
            .lock()
            .accepted_answers
            .push((engine_id.clone(), answer_sdp.to_string()));
        Ok(())
    }

    async fn add_remote_candidate(
        &self,
        engine_id: &SessionId,
        candidate: IceCandidate,
    ) -> Result<(), EngineError> {
        self.state
            .lock()
            .candidates
            .push((engine_id.clone(), candidate));
        Ok(())
    }

    async fn close_session(&self, engine_id: &SessionId) {
        let mut state = self.state.lock();
        state.closed.push(engine_id.clone());
        // Dropping the sender ends the session's event stream.
        state.event_senders.remove(engine_id);
    }
}
