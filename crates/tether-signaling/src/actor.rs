//! Connection actor
//!
//! One actor per physical connection. The actor owns the read loop, the
//! write queue, and the keepalive timer; it is also the sole consumer of
//! its session's dispatch queue, which is what serializes all mutation of
//! that session. Raw frames become typed messages here; everything else is
//! the coordinator's job.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use tether_core::{codec, SignalMessage};
use tether_transport::{LinkEvent, MessageSink, MessageSource};

use crate::config::SignalingConfig;
use crate::coordinator::SignalingCoordinator;
use crate::registry::SessionRegistry;
use crate::session::Session;

/// Why a connection wound down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed, server stop, or local shutdown.
    Normal,
    /// Undecodable framing; nothing after the bad frame is processed.
    ProtocolError,
    /// A bounded queue overflowed.
    BackpressureExceeded,
    /// Two keepalive intervals passed with no remote activity.
    IdleTimeout,
    /// The peer-transport engine closed or failed the paired session.
    TransportClosed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::Normal => "normal",
            CloseReason::ProtocolError => "protocol error",
            CloseReason::BackpressureExceeded => "backpressure exceeded",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::TransportClosed => "transport closed",
        };
        f.write_str(text)
    }
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    Open,
    /// A keepalive ping is in flight; remote activity returns to `Open`,
    /// another silent interval closes.
    PingOutstanding,
    Closing,
    Closed,
}

/// Handle to one spawned connection actor.
pub struct ConnectionActor {
    session: Arc<Session>,
    state: Arc<Mutex<ConnState>>,
    handle: JoinHandle<()>,
}

impl ConnectionActor {
    /// Spawn the actor for one accepted link.
    pub fn spawn(
        sink: Arc<dyn MessageSink>,
        source: Box<dyn MessageSource>,
        outbound: mpsc::Receiver<SignalMessage>,
        session: Arc<Session>,
        registry: Arc<SessionRegistry>,
        coordinator: Arc<SignalingCoordinator>,
        config: SignalingConfig,
    ) -> Self {
        let state = Arc::new(Mutex::new(ConnState::Connecting));
        let runner = ActorRunner {
            sink,
            source,
            outbound,
            session: session.clone(),
            registry,
            coordinator,
            config,
            state: state.clone(),
            ping_seq: 0,
            pending_ping: None,
        };
        let handle = tokio::spawn(runner.run());

        Self {
            session,
            state,
            handle,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn state(&self) -> ConnState {
        *self.state.lock()
    }

    /// Ask the actor to close. Idempotent: closing an actor that is already
    /// closing or closed is a no-op.
    pub fn close(&self, reason: CloseReason) {
        self.session.request_close(reason);
    }

    /// Wait for the actor's teardown to complete.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

enum Tick {
    Link(Option<LinkEvent>),
    Outbound(Option<SignalMessage>),
    Work,
    CloseRequested,
    Keepalive,
}

struct ActorRunner {
    sink: Arc<dyn MessageSink>,
    source: Box<dyn MessageSource>,
    outbound: mpsc::Receiver<SignalMessage>,
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
    coordinator: Arc<SignalingCoordinator>,
    config: SignalingConfig,
    state: Arc<Mutex<ConnState>>,
    ping_seq: u64,
    pending_ping: Option<String>,
}

impl ActorRunner {
    async fn run(mut self) {
        let period = self.config.keepalive_interval;
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            let tick = tokio::select! {
                event = self.source.next_event() => Tick::Link(event),
                message = self.outbound.recv() => Tick::Outbound(message),
                _ = self.session.work_notified() => Tick::Work,
                _ = self.session.close_notified() => Tick::CloseRequested,
                _ = keepalive.tick() => Tick::Keepalive,
            };

            match tick {
                Tick::Link(Some(LinkEvent::Connected)) => {
                    self.set_state(ConnState::Open);
                    debug!("session {} link open", self.session.id());
                }
                Tick::Link(Some(LinkEvent::Frame(frame))) => {
                    if let Some(reason) = self.on_frame(frame) {
                        break reason;
                    }
                }
                Tick::Link(Some(LinkEvent::Closed { reason })) => {
                    debug!("session {} link closed: {:?}", self.session.id(), reason);
                    break CloseReason::Normal;
                }
                Tick::Link(Some(LinkEvent::Error(err))) => {
                    warn!("session {} link error: {}", self.session.id(), err);
                    break CloseReason::ProtocolError;
                }
                Tick::Link(None) => break CloseReason::Normal,

                Tick::Outbound(Some(message)) => {
                    if let Some(reason) = self.on_outbound(message).await {
                        break reason;
                    }
                }
                // The session owns the sender; this arm means it is gone.
                Tick::Outbound(None) => break CloseReason::Normal,

                Tick::Work => {
                    while self.session.queue().drain_one().await {}
                }

                Tick::CloseRequested => {
                    break self.session.close_requested().unwrap_or(CloseReason::Normal);
                }

                Tick::Keepalive => {
                    if let Some(reason) = self.on_keepalive_tick() {
                        break reason;
                    }
                }
            }
        };

        self.finish(reason).await;
    }

    /// Handle one raw inbound frame. Returns the close reason if the frame
    /// is fatal to the connection.
    fn on_frame(&mut self, frame: Bytes) -> Option<CloseReason> {
        // Remote activity: the connection is alive again regardless of what
        // the frame contains.
        self.session.touch();
        let outstanding = self.pending_ping.take();
        if self.state() == ConnState::PingOutstanding {
            self.set_state(ConnState::Open);
        }

        if frame.len() > self.config.max_frame_bytes {
            warn!(
                "session {} sent an oversized frame ({} bytes)",
                self.session.id(),
                frame.len()
            );
            return Some(CloseReason::ProtocolError);
        }

        let message = match codec::decode(&frame) {
            Ok(message) => message,
            Err(err @ tether_core::Error::Protocol(_)) => {
                warn!("session {}: {}", self.session.id(), err);
                return Some(CloseReason::ProtocolError);
            }
            Err(err) => {
                // Unknown operation or malformed payload: drop the message,
                // log it, leave the session alone.
                warn!("session {}: dropped frame: {}", self.session.id(), err);
                return None;
            }
        };

        // Replies to our own keepalive pings stop here; everything our side
        // originated carries this session's token prefix.
        if let SignalMessage::Ping { echo: Some(token) } = &message {
            if self.is_own_ping_token(token) {
                if outstanding.as_deref() != Some(token.as_str()) {
                    debug!("session {} late keepalive reply", self.session.id());
                }
                return None;
            }
        }

        self.coordinator.dispatch(&self.session, message);
        None
    }

    /// Flush one queued outbound message. Exactly one write is in flight at
    /// a time; queue order is wire order.
    async fn on_outbound(&mut self, message: SignalMessage) -> Option<CloseReason> {
        let frame = match codec::encode(&message) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(
                    "session {} failed to encode outbound {}: {}",
                    self.session.id(),
                    message.op(),
                    err
                );
                return None;
            }
        };

        if let Err(err) = self.sink.send(frame).await {
            warn!("session {} write failed: {}", self.session.id(), err);
            return Some(CloseReason::Normal);
        }
        None
    }

    /// One keepalive interval elapsed.
    fn on_keepalive_tick(&mut self) -> Option<CloseReason> {
        if self.session.idle_for() < self.config.keepalive_interval {
            // Fresh remote activity inside the window; nothing to probe.
            return None;
        }

        if self.pending_ping.is_some() {
            info!("session {} idle timeout", self.session.id());
            return Some(CloseReason::IdleTimeout);
        }

        self.ping_seq += 1;
        let token = format!("{}:{}", self.session.id(), self.ping_seq);
        self.pending_ping = Some(token.clone());
        self.set_state(ConnState::PingOutstanding);
        debug!("session {} sending keepalive ping", self.session.id());

        match self
            .session
            .enqueue_outbound(SignalMessage::Ping { echo: Some(token) })
        {
            Ok(()) => None,
            Err(crate::error::SignalingError::BackpressureExceeded(_)) => {
                Some(CloseReason::BackpressureExceeded)
            }
            Err(_) => Some(CloseReason::Normal),
        }
    }

    fn is_own_ping_token(&self, token: &str) -> bool {
        token
            .strip_prefix(self.session.id().as_str())
            .and_then(|rest| rest.strip_prefix(':'))
            .is_some_and(|seq| seq.chars().all(|c| c.is_ascii_digit()))
    }

    fn state(&self) -> ConnState {
        *self.state.lock()
    }

    fn set_state(&self, next: ConnState) {
        let mut state = self.state.lock();
        if matches!(*state, ConnState::Closing | ConnState::Closed) {
            return;
        }
        *state = next;
    }

    /// Teardown. Runs once: the run loop exits exactly one way, and a
    /// second close request finds the state already `Closing`.
    async fn finish(self, reason: CloseReason) {
        {
            let mut state = self.state.lock();
            if matches!(*state, ConnState::Closing | ConnState::Closed) {
                return;
            }
            *state = ConnState::Closing;
        }
        info!("closing session {} ({})", self.session.id(), reason);
        self.session.mark_closing();

        // Dropping the source cancels the pending read; a cancelled write
        // never reports success because the sink is closed first.
        if let Err(err) = self.sink.close().await {
            debug!("session {} sink close: {}", self.session.id(), err);
        }

        // The registry must stop serving this session the moment teardown
        // begins.
        if self.registry.unregister(self.session.id()).is_err() {
            debug!(
                "session {} was not registered at close",
                self.session.id()
            );
        }

        // Notify the paired engine session.
        self.coordinator.on_session_closed(&self.session).await;

        self.session.mark_closed();
        *self.state.lock() = ConnState::Closed;
    }
}
