//! Signaling server
//!
//! The accept loop and the administrative surface. The server is
//! transport-agnostic: anything implementing `MessageListener` can feed it
//! connections, and every accepted link gets a session, a registry entry,
//! and a connection actor of its own.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use tether_core::{SessionId, SignalMessage};
use tether_transport::{MessageListener, MessageSink, MessageSource, PeerEngine};

#[cfg(feature = "websocket")]
use tether_transport::{WebSocketConfig, WebSocketListener};

use crate::actor::ConnectionActor;
use crate::config::SignalingConfig;
use crate::coordinator::SignalingCoordinator;
use crate::error::{Result, SignalingError};
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionRole};

pub struct SignalingServer {
    config: SignalingConfig,
    registry: Arc<SessionRegistry>,
    coordinator: Arc<SignalingCoordinator>,
    running: Arc<RwLock<bool>>,
}

impl SignalingServer {
    pub fn new(config: SignalingConfig, engine: Arc<dyn PeerEngine>) -> Result<Self> {
        let coordinator = Arc::new(SignalingCoordinator::new(engine)?);
        Ok(Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            coordinator,
            running: Arc::new(RwLock::new(false)),
        })
    }

    pub fn config(&self) -> &SignalingConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn coordinator(&self) -> &Arc<SignalingCoordinator> {
        &self.coordinator
    }

    /// Accept connections until [`stop`](Self::stop) is called.
    pub async fn serve_on<L>(&self, mut listener: L) -> Result<()>
    where
        L: MessageListener,
        L::Sink: 'static,
        L::Source: 'static,
    {
        info!("{} accepting connections", self.config.name);
        *self.running.write() = true;

        while *self.running.read() {
            match listener.accept().await {
                Ok((sink, source, addr)) => {
                    info!("new connection from {}", addr);
                    let sink: Arc<dyn MessageSink> = Arc::new(sink);

                    if self.registry.count() >= self.config.max_sessions {
                        warn!(
                            "refusing connection from {}: at capacity ({} sessions)",
                            addr, self.config.max_sessions
                        );
                        tokio::spawn(async move {
                            let _ = sink.close().await;
                        });
                        continue;
                    }

                    if let Err(err) = self.on_connection_accepted(sink, Box::new(source)) {
                        error!("failed to start session for {}: {}", addr, err);
                    }
                }
                Err(err) => {
                    error!("accept error: {}", err);
                }
            }
        }

        Ok(())
    }

    /// Wire one accepted link into a registered session and its actor.
    pub fn on_connection_accepted(
        &self,
        sink: Arc<dyn MessageSink>,
        source: Box<dyn MessageSource>,
    ) -> Result<ConnectionActor> {
        let id = SessionId::generate();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.send_queue_capacity);
        let session = Arc::new(Session::new(
            id,
            SessionRole::Answering,
            outbound_tx,
            self.config.dispatch_queue_capacity,
        ));

        self.registry.register(session.clone())?;
        debug!("registered session {}", session.id());

        Ok(ConnectionActor::spawn(
            sink,
            source,
            outbound_rx,
            session,
            self.registry.clone(),
            self.coordinator.clone(),
            self.config.clone(),
        ))
    }

    /// Serve over WebSocket, the default link transport.
    #[cfg(feature = "websocket")]
    pub async fn serve_websocket(&self, addr: &str) -> Result<()> {
        let listener = WebSocketListener::bind(addr)
            .await?
            .with_config(WebSocketConfig {
                max_frame_bytes: self.config.max_frame_bytes,
            });
        self.serve_on(listener).await
    }

    /// Stop accepting new connections. Existing sessions keep running.
    pub fn stop(&self) {
        *self.running.write() = false;
    }

    pub fn session_count(&self) -> usize {
        self.registry.count()
    }

    /// Queue one message to every registered session. Sessions whose
    /// outbound queue is full are skipped with a warning; monitoring
    /// traffic never justifies closing a connection.
    pub fn broadcast(&self, message: &SignalMessage) {
        self.registry.for_each(|session| {
            if let Err(err) = session.enqueue_outbound(message.clone()) {
                warn!("broadcast skipped session {}: {}", session.id(), err);
            }
        });
    }

    /// Queue one message to one session.
    pub fn send_to(&self, id: &SessionId, message: SignalMessage) -> Result<()> {
        let session = self
            .registry
            .lookup(id)
            .ok_or_else(|| SignalingError::NotFound(id.clone()))?;
        session.enqueue_outbound(message)
    }
}
