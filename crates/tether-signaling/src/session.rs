//! Session state
//!
//! A `Session` is the unit of identity for one signaling negotiation. Its
//! negotiation state is mutated only by tasks drained from its dispatch
//! queue (a single consumer), so the short `parking_lot` locks here guard
//! nothing across an await point.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::futures::Notified;
use tokio::sync::{mpsc, Notify};

use tether_core::{
    negotiation, IceCandidate, NegotiationEvent, NegotiationState, SessionId, SignalMessage,
};

use crate::actor::CloseReason;
use crate::dispatch::DispatchQueue;
use crate::error::{Result, SignalingError};

/// Which side of the negotiation this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Initiates offers (the dialing side of a deployment).
    Offering,
    /// Receives offers and produces answers (the rendezvous server side).
    Answering,
}

pub struct Session {
    id: SessionId,
    role: SessionRole,
    state: Mutex<NegotiationState>,
    pending_candidates: Mutex<Vec<IceCandidate>>,
    outbound: mpsc::Sender<SignalMessage>,
    queue: DispatchQueue,
    work: Notify,
    close_reason: Mutex<Option<CloseReason>>,
    close_signal: Notify,
    last_activity: Mutex<Instant>,
    engine_session: Mutex<Option<SessionId>>,
}

impl Session {
    pub fn new(
        id: SessionId,
        role: SessionRole,
        outbound: mpsc::Sender<SignalMessage>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            id,
            role,
            state: Mutex::new(NegotiationState::Idle),
            pending_candidates: Mutex::new(Vec::new()),
            outbound,
            queue: DispatchQueue::with_capacity(queue_capacity),
            work: Notify::new(),
            close_reason: Mutex::new(None),
            close_signal: Notify::new(),
            last_activity: Mutex::new(Instant::now()),
            engine_session: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn state(&self) -> NegotiationState {
        *self.state.lock()
    }

    /// Apply one negotiation event atomically.
    ///
    /// On rejection the stored state is untouched and the error carries
    /// both the event and the state that refused it.
    pub fn advance(&self, event: NegotiationEvent) -> Result<NegotiationState> {
        let mut state = self.state.lock();
        let next = negotiation::transition(*state, event)?;
        *state = next;
        Ok(next)
    }

    /// Queue one frame for the connection actor's write path.
    ///
    /// A full queue is `BackpressureExceeded`, which the caller must treat
    /// as fatal to the connection.
    pub fn enqueue_outbound(&self, message: SignalMessage) -> Result<()> {
        self.outbound.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                SignalingError::BackpressureExceeded(self.id.clone())
            }
            mpsc::error::TrySendError::Closed(_) => SignalingError::SessionClosed(self.id.clone()),
        })
    }

    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    /// Wake the session's consumer; call after every successful enqueue.
    pub fn signal_work(&self) {
        self.work.notify_one();
    }

    pub(crate) fn work_notified(&self) -> Notified<'_> {
        self.work.notified()
    }

    /// Ask the owning connection actor to close. Idempotent; the first
    /// reason wins.
    pub fn request_close(&self, reason: CloseReason) {
        {
            let mut slot = self.close_reason.lock();
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.close_signal.notify_one();
    }

    pub fn close_requested(&self) -> Option<CloseReason> {
        *self.close_reason.lock()
    }

    pub(crate) fn close_notified(&self) -> Notified<'_> {
        self.close_signal.notified()
    }

    /// Note remote activity.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Hold back a candidate that outran its offer/answer exchange.
    pub fn buffer_candidate(&self, candidate: IceCandidate) {
        self.pending_candidates.lock().push(candidate);
    }

    /// Take every buffered candidate, in receipt order. The buffer is left
    /// empty, so each candidate is flushed at most once.
    pub fn take_pending_candidates(&self) -> Vec<IceCandidate> {
        std::mem::take(&mut *self.pending_candidates.lock())
    }

    pub fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.lock().len()
    }

    /// Associate the engine's session with this one. Returns false if a
    /// pairing already exists; at most one engine session per signaling
    /// session at any time.
    pub fn pair_engine_session(&self, engine_id: SessionId) -> bool {
        let mut slot = self.engine_session.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(engine_id);
        true
    }

    pub fn engine_session(&self) -> Option<SessionId> {
        self.engine_session.lock().clone()
    }

    /// Tear the pairing down, returning the engine side for cleanup.
    pub fn take_engine_session(&self) -> Option<SessionId> {
        self.engine_session.lock().take()
    }

    /// Teardown bookkeeping; only the owning actor calls these.
    pub(crate) fn mark_closing(&self) {
        let mut state = self.state.lock();
        if *state != NegotiationState::Closed {
            *state = NegotiationState::Closing;
        }
    }

    pub(crate) fn mark_closed(&self) {
        *self.state.lock() = NegotiationState::Closed;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("state", &self.state())
            .field("pending_candidates", &self.pending_candidate_count())
            .finish()
    }
}

/// Convenience constructor used by the server and tests: a session plus the
/// receiving end of its outbound queue.
pub fn session_with_outbound(
    id: SessionId,
    role: SessionRole,
    send_queue_capacity: usize,
    dispatch_queue_capacity: usize,
) -> (Arc<Session>, mpsc::Receiver<SignalMessage>) {
    let (tx, rx) = mpsc::channel(send_queue_capacity);
    let session = Arc::new(Session::new(id, role, tx, dispatch_queue_capacity));
    (session, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session(send_capacity: usize) -> (Arc<Session>, mpsc::Receiver<SignalMessage>) {
        session_with_outbound(
            SessionId::generate(),
            SessionRole::Answering,
            send_capacity,
            8,
        )
    }

    #[test]
    fn advance_leaves_state_untouched_on_rejection() {
        let (session, _rx) = test_session(4);
        session.advance(NegotiationEvent::OfferReceived).unwrap();
        let before = session.state();

        let err = session.advance(NegotiationEvent::OfferReceived).unwrap_err();
        assert!(matches!(
            err,
            SignalingError::Core(tether_core::Error::InvalidTransition { .. })
        ));
        assert_eq!(session.state(), before);
    }

    #[test]
    fn outbound_overflow_is_backpressure() {
        let (session, _rx) = test_session(1);
        session
            .enqueue_outbound(SignalMessage::Ping { echo: None })
            .unwrap();
        let err = session
            .enqueue_outbound(SignalMessage::Ping { echo: None })
            .unwrap_err();
        assert!(matches!(err, SignalingError::BackpressureExceeded(_)));
    }

    #[test]
    fn outbound_after_receiver_drop_is_session_closed() {
        let (session, rx) = test_session(1);
        drop(rx);
        let err = session
            .enqueue_outbound(SignalMessage::Ping { echo: None })
            .unwrap_err();
        assert!(matches!(err, SignalingError::SessionClosed(_)));
    }

    #[test]
    fn pending_candidates_flush_once_in_order() {
        let (session, _rx) = test_session(4);
        for n in 0..3 {
            session.buffer_candidate(IceCandidate {
                candidate: format!("candidate:{n}"),
                sdp_mid: "0".into(),
                sdp_mline_index: 0,
            });
        }

        let flushed = session.take_pending_candidates();
        let order: Vec<_> = flushed.iter().map(|c| c.candidate.as_str()).collect();
        assert_eq!(order, ["candidate:0", "candidate:1", "candidate:2"]);
        assert!(session.take_pending_candidates().is_empty());
    }

    #[test]
    fn engine_pairing_is_exclusive() {
        let (session, _rx) = test_session(4);
        assert!(session.pair_engine_session(SessionId::generate()));
        assert!(!session.pair_engine_session(SessionId::generate()));
        assert!(session.take_engine_session().is_some());
        assert!(session.engine_session().is_none());
    }

    #[test]
    fn first_close_reason_wins() {
        let (session, _rx) = test_session(4);
        session.request_close(CloseReason::IdleTimeout);
        session.request_close(CloseReason::Normal);
        assert_eq!(session.close_requested(), Some(CloseReason::IdleTimeout));
    }
}
