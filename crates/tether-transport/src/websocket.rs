//! WebSocket signaling link
//!
//! Frames are WebSocket text messages carrying one JSON object each.
//! Binary messages are accepted for compatibility with clients that do not
//! distinguish; transport-level ping/pong is left to tungstenite.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig as WsProtocolConfig;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, TransportError};
use crate::traits::{LinkEvent, MessageListener, MessageSink, MessageSource};

/// WebSocket link configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Largest frame accepted or produced, in bytes.
    pub max_frame_bytes: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: tether_core::MAX_FRAME_BYTES,
        }
    }
}

impl WebSocketConfig {
    fn protocol_config(&self) -> WsProtocolConfig {
        let mut config = WsProtocolConfig::default();
        config.max_message_size = Some(self.max_frame_bytes);
        config.max_frame_size = Some(self.max_frame_bytes);
        config
    }
}

/// Write half of a WebSocket link
pub struct WsSink {
    tx: mpsc::Sender<WsMessage>,
    connected: Arc<Mutex<bool>>,
    max_frame_bytes: usize,
}

#[async_trait]
impl MessageSink for WsSink {
    async fn send(&self, frame: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if frame.len() > self.max_frame_bytes {
            return Err(TransportError::FrameTooLarge {
                limit: self.max_frame_bytes,
            });
        }

        // Signaling frames are JSON and therefore UTF-8.
        let text = String::from_utf8(frame.to_vec())
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        self.tx
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        let _ = self.tx.send(WsMessage::Close(None)).await;
        *self.connected.lock() = false;
        Ok(())
    }
}

/// Read half of a WebSocket link
pub struct WsSource {
    rx: mpsc::Receiver<LinkEvent>,
}

#[async_trait]
impl MessageSource for WsSource {
    async fn next_event(&mut self) -> Option<LinkEvent> {
        self.rx.recv().await
    }
}

/// Bridge one upgraded WebSocket stream into a sink/source pair backed by
/// a writer task and a reader task.
fn spawn_link_tasks<S>(stream: WebSocketStream<S>, max_frame_bytes: usize) -> (WsSink, WsSource)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (mut write, mut read) = stream.split();

    let (send_tx, mut send_rx) = mpsc::channel::<WsMessage>(100);
    let (event_tx, event_rx) = mpsc::channel::<LinkEvent>(100);

    let connected = Arc::new(Mutex::new(true));
    let connected_write = connected.clone();
    let connected_read = connected.clone();

    // Writer task: one message in flight at a time, submission order kept.
    tokio::spawn(async move {
        while let Some(msg) = send_rx.recv().await {
            if let Err(e) = write.send(msg).await {
                warn!("websocket write error: {}", e);
                break;
            }
        }
        *connected_write.lock() = false;
    });

    // Reader task: frames and lifecycle events flow out as LinkEvents.
    tokio::spawn(async move {
        let _ = event_tx.send(LinkEvent::Connected).await;

        while let Some(result) = read.next().await {
            match result {
                Ok(WsMessage::Text(text)) => {
                    let _ = event_tx.send(LinkEvent::Frame(Bytes::from(text))).await;
                }
                Ok(WsMessage::Binary(data)) => {
                    let _ = event_tx.send(LinkEvent::Frame(Bytes::from(data))).await;
                }
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {
                    // tungstenite answers pings on its own
                }
                Ok(WsMessage::Close(frame)) => {
                    let reason = frame.map(|f| f.reason.to_string());
                    debug!("websocket closed: {:?}", reason);
                    let _ = event_tx.send(LinkEvent::Closed { reason }).await;
                    break;
                }
                Ok(WsMessage::Frame(_)) => {}
                Err(e) => {
                    warn!("websocket read error: {}", e);
                    let _ = event_tx.send(LinkEvent::Error(e.to_string())).await;
                    let _ = event_tx
                        .send(LinkEvent::Closed {
                            reason: Some(e.to_string()),
                        })
                        .await;
                    break;
                }
            }
        }

        *connected_read.lock() = false;
    });

    let sink = WsSink {
        tx: send_tx,
        connected,
        max_frame_bytes,
    };
    let source = WsSource { rx: event_rx };

    (sink, source)
}

/// Outbound WebSocket link (the dialing side)
pub struct WebSocketLink;

impl WebSocketLink {
    /// Dial a signaling endpoint, e.g. `ws://host:7440/`.
    pub async fn dial(url: &str) -> Result<(WsSink, WsSource)> {
        Self::dial_with_config(url, WebSocketConfig::default()).await
    }

    pub async fn dial_with_config(
        url: &str,
        config: WebSocketConfig,
    ) -> Result<(WsSink, WsSource)> {
        let url = Url::parse(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

        info!("dialing signaling endpoint {}", url);
        let (stream, response) = tokio_tungstenite::connect_async_with_config(
            url.as_str(),
            Some(config.protocol_config()),
            false,
        )
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        debug!("websocket connected, response: {:?}", response.status());

        Ok(spawn_link_tasks(stream, config.max_frame_bytes))
    }
}

/// WebSocket signaling listener
pub struct WebSocketListener {
    listener: tokio::net::TcpListener,
    config: WebSocketConfig,
}

impl WebSocketListener {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        info!("signaling listener on {}", addr);

        Ok(Self {
            listener,
            config: WebSocketConfig::default(),
        })
    }

    pub fn with_config(mut self, config: WebSocketConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl MessageListener for WebSocketListener {
    type Sink = WsSink;
    type Source = WsSource;

    async fn accept(&mut self) -> Result<(Self::Sink, Self::Source, SocketAddr)> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("accepted tcp connection from {}", addr);

        let ws_stream =
            tokio_tungstenite::accept_async_with_config(stream, Some(self.config.protocol_config()))
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        info!("websocket client connected from {}", addr);

        let (sink, source) = spawn_link_tasks(ws_stream, self.config.max_frame_bytes);
        Ok((sink, source, addr))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(TransportError::Io)
    }

    async fn close(&self) -> Result<()> {
        // Dropping the TcpListener is the close.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_round_trip_between_dialer_and_listener() {
        let mut listener = WebSocketListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (sink, mut source, _) = listener.accept().await.unwrap();
            loop {
                match source.next_event().await {
                    Some(LinkEvent::Frame(frame)) => {
                        sink.send(frame).await.unwrap();
                        break;
                    }
                    Some(_) => continue,
                    None => panic!("link ended before a frame arrived"),
                }
            }
        });

        let (sink, mut source) = WebSocketLink::dial(&format!("ws://{}/", addr))
            .await
            .unwrap();
        sink.send(Bytes::from_static(b"{\"type\":\"ping\"}"))
            .await
            .unwrap();

        let echoed = loop {
            match source.next_event().await {
                Some(LinkEvent::Frame(frame)) => break frame,
                Some(_) => continue,
                None => panic!("link ended before the echo arrived"),
            }
        };
        assert_eq!(&echoed[..], b"{\"type\":\"ping\"}");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn oversized_outbound_frame_is_refused() {
        let mut listener = WebSocketListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let (sink, _source) = WebSocketLink::dial(&format!("ws://{}/", addr))
            .await
            .unwrap();
        let oversized = Bytes::from(vec![b'x'; tether_core::MAX_FRAME_BYTES + 1]);
        assert!(matches!(
            sink.send(oversized).await,
            Err(TransportError::FrameTooLarge { .. })
        ));

        accept.await.unwrap().unwrap();
    }
}
