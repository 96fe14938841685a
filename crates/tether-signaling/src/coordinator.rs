//! Signaling coordinator
//!
//! Correlates each decoded inbound message with its session and drives the
//! negotiation: callback lookup, state transition, engine hand-off, and the
//! outbound replies. All of it runs inside tasks drained from the session's
//! dispatch queue, so one session never processes two messages at once and
//! a failure in one session cannot touch another's queue.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tether_core::{negotiation, NegotiationEvent, OperationCode, SessionId, SignalMessage};
use tether_transport::{EngineEvent, EngineSession, PeerEngine};

use crate::actor::CloseReason;
use crate::callbacks::{CallbackTable, SignalHandler};
use crate::dispatch::QueuedTask;
use crate::error::{Result, SignalingError};
use crate::session::Session;

pub struct SignalingCoordinator {
    engine: Arc<dyn PeerEngine>,
    callbacks: CallbackTable,
}

impl SignalingCoordinator {
    /// Build the coordinator and its callback table. The table is complete
    /// after this call and never changes again.
    pub fn new(engine: Arc<dyn PeerEngine>) -> Result<Self> {
        let mut callbacks = CallbackTable::new();
        callbacks.add_callback(OperationCode::Ping, ping_handler())?;
        callbacks.add_callback(OperationCode::Offer, offer_handler(engine.clone()))?;
        callbacks.add_callback(OperationCode::Answer, answer_handler(engine.clone()))?;
        callbacks.add_callback(OperationCode::Candidate, candidate_handler(engine.clone()))?;
        debug_assert_eq!(callbacks.len(), OperationCode::ALL.len());
        Ok(Self { engine, callbacks })
    }

    pub fn engine(&self) -> &Arc<dyn PeerEngine> {
        &self.engine
    }

    /// Queue one inbound message for the session. Never processes inline:
    /// read callbacks enqueue, the session's consumer mutates.
    pub fn dispatch(self: &Arc<Self>, session: &Arc<Session>, message: SignalMessage) {
        let op = message.op();
        let coordinator = self.clone();
        let task_session = session.clone();
        let task: QueuedTask = Box::pin(async move {
            coordinator.process(&task_session, message).await;
        });
        if !session.queue().try_enqueue(task) {
            // The enqueue failure is the backpressure signal; this message
            // is dropped and the peer sees silence, not a failure.
            warn!(
                "dispatch queue full for session {}, dropping {}",
                session.id(),
                op
            );
            return;
        }
        session.signal_work();
    }

    /// Run one message against the callback table and the state machine.
    async fn process(&self, session: &Arc<Session>, message: SignalMessage) {
        let op = message.op();
        let Some(handler) = self.callbacks.lookup(op) else {
            warn!("no callback registered for operation {}", op);
            return;
        };

        if let Err(err) = handler(session.clone(), message).await {
            match &err {
                SignalingError::BackpressureExceeded(_) => {
                    warn!("session {}: {}", session.id(), err);
                    session.request_close(CloseReason::BackpressureExceeded);
                }
                SignalingError::SessionClosed(_) => {
                    debug!("session {}: {}", session.id(), err);
                }
                // Everything else is recovered locally: the message is
                // dropped and the session state is unchanged.
                _ => warn!("session {}: dropped {}: {}", session.id(), op, err),
            }
        }
    }

    /// Offering-role entry point: hand a locally created offer to the link
    /// and pair the session with the engine side that produced it.
    pub fn start_offer(
        &self,
        session: &Arc<Session>,
        engine_id: SessionId,
        offer_sdp: String,
        events: mpsc::Receiver<EngineEvent>,
    ) -> Result<()> {
        session.advance(NegotiationEvent::OfferSent)?;
        if !session.pair_engine_session(engine_id) {
            return Err(SignalingError::AlreadyPaired(session.id().clone()));
        }
        spawn_engine_pump(session.clone(), events);
        session.enqueue_outbound(SignalMessage::Offer { sdp: offer_sdp })
    }

    /// Engine-side teardown for a closing session. Idempotent.
    pub async fn on_session_closed(&self, session: &Arc<Session>) {
        if let Some(engine_id) = session.take_engine_session() {
            debug!(
                "closing engine session {} paired with {}",
                engine_id,
                session.id()
            );
            self.engine.close_session(&engine_id).await;
        }
    }
}

// =========================================================================
// Operation handlers
// =========================================================================

fn ping_handler() -> SignalHandler {
    Arc::new(|session, message| {
        Box::pin(async move {
            session.advance(NegotiationEvent::Ping)?;
            // reply with the same frame, echo token and all
            session.enqueue_outbound(message)
        })
    })
}

fn offer_handler(engine: Arc<dyn PeerEngine>) -> SignalHandler {
    Arc::new(move |session, message| {
        let engine = engine.clone();
        Box::pin(async move {
            let SignalMessage::Offer { sdp } = message else {
                return Ok(()); // table wiring guarantees the variant
            };

            session.advance(NegotiationEvent::OfferReceived)?;

            let created = match engine.create_session(session.id(), &sdp).await {
                Ok(created) => created,
                Err(err) => {
                    warn!("engine rejected offer for session {}: {}", session.id(), err);
                    fail_session(&session);
                    return Ok(());
                }
            };
            let EngineSession {
                id: engine_id,
                answer_sdp,
                events,
            } = created;

            if !session.pair_engine_session(engine_id.clone()) {
                return Err(SignalingError::AlreadyPaired(session.id().clone()));
            }
            spawn_engine_pump(session.clone(), events);

            session.advance(NegotiationEvent::AnswerGenerated)?;
            session.enqueue_outbound(SignalMessage::Answer { sdp: answer_sdp })?;
            info!("session {} answered, negotiation underway", session.id());

            // Candidates that outran the offer go to the engine now, in
            // receipt order, exactly once.
            for candidate in session.take_pending_candidates() {
                if let Err(err) = engine.add_remote_candidate(&engine_id, candidate).await {
                    warn!(
                        "engine refused buffered candidate for session {}: {}",
                        session.id(),
                        err
                    );
                    fail_session(&session);
                    return Ok(());
                }
            }
            Ok(())
        })
    })
}

fn answer_handler(engine: Arc<dyn PeerEngine>) -> SignalHandler {
    Arc::new(move |session, message| {
        let engine = engine.clone();
        Box::pin(async move {
            let SignalMessage::Answer { sdp } = message else {
                return Ok(());
            };

            // Valid only on the offering side; an answering session was
            // never in OfferSent and rejects this by state.
            session.advance(NegotiationEvent::AnswerReceived)?;

            let Some(engine_id) = session.engine_session() else {
                warn!(
                    "session {} received an answer with no paired engine session",
                    session.id()
                );
                return Ok(());
            };

            if let Err(err) = engine.accept_answer(&engine_id, &sdp).await {
                warn!("engine refused answer for session {}: {}", session.id(), err);
                fail_session(&session);
                return Ok(());
            }

            for candidate in session.take_pending_candidates() {
                if let Err(err) = engine.add_remote_candidate(&engine_id, candidate).await {
                    warn!(
                        "engine refused buffered candidate for session {}: {}",
                        session.id(),
                        err
                    );
                    fail_session(&session);
                    return Ok(());
                }
            }
            Ok(())
        })
    })
}

fn candidate_handler(engine: Arc<dyn PeerEngine>) -> SignalHandler {
    Arc::new(move |session, message| {
        let engine = engine.clone();
        Box::pin(async move {
            let SignalMessage::Candidate(candidate) = message else {
                return Ok(());
            };

            match session.advance(NegotiationEvent::CandidateReceived) {
                Ok(_) => {
                    let Some(engine_id) = session.engine_session() else {
                        warn!(
                            "session {} accepted a candidate with no engine pairing",
                            session.id()
                        );
                        return Ok(());
                    };
                    if let Err(err) = engine.add_remote_candidate(&engine_id, candidate).await {
                        warn!(
                            "engine refused candidate for session {}: {}",
                            session.id(),
                            err
                        );
                        fail_session(&session);
                    }
                    Ok(())
                }
                // A candidate that outran its offer or answer is held, not
                // rejected; out-of-order delivery is a normal race.
                Err(SignalingError::Core(tether_core::Error::InvalidTransition {
                    state, ..
                })) if negotiation::buffers_candidates(state) => {
                    debug!(
                        "buffering early candidate for session {} in state {:?}",
                        session.id(),
                        state
                    );
                    session.buffer_candidate(candidate);
                    Ok(())
                }
                Err(err) => Err(err),
            }
        })
    })
}

// =========================================================================
// Engine event routing
// =========================================================================

/// Forward engine completions into the session's dispatch queue. They are
/// ordinary inbound work: queued, then applied by the session's single
/// consumer, never from the engine's own context.
fn spawn_engine_pump(session: Arc<Session>, mut events: mpsc::Receiver<EngineEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let task_session = session.clone();
            let task: QueuedTask = Box::pin(async move {
                apply_engine_event(&task_session, event);
            });
            if !session.queue().try_enqueue(task) {
                warn!(
                    "dispatch queue full for session {}, dropping engine event",
                    session.id()
                );
                continue;
            }
            session.signal_work();
        }
    });
}

fn apply_engine_event(session: &Arc<Session>, event: EngineEvent) {
    match event {
        EngineEvent::LocalCandidate(candidate) => {
            match session.enqueue_outbound(SignalMessage::Candidate(candidate)) {
                Ok(()) => {}
                Err(err @ SignalingError::BackpressureExceeded(_)) => {
                    warn!("session {}: {}", session.id(), err);
                    session.request_close(CloseReason::BackpressureExceeded);
                }
                Err(err) => debug!("session {}: {}", session.id(), err),
            }
        }
        EngineEvent::Opened => match session.advance(NegotiationEvent::TransportOpened) {
            Ok(_) => info!("session {} peer transport open", session.id()),
            Err(err) => warn!("session {}: {}", session.id(), err),
        },
        EngineEvent::Closed { reason } => {
            info!(
                "engine closed transport for session {}: {:?}",
                session.id(),
                reason
            );
            fail_session(session);
        }
        EngineEvent::Failed(reason) => {
            warn!("engine failure for session {}: {}", session.id(), reason);
            fail_session(session);
        }
    }
}

/// Engine failure and engine close land in the same place: negotiation is
/// over and the connection winds down.
fn fail_session(session: &Arc<Session>) {
    let _ = session.advance(NegotiationEvent::TransportClosed);
    session.request_close(CloseReason::TransportClosed);
}
