//! Transport error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("not connected")]
    NotConnected,

    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::ConnectionFailed(e.to_string())
    }
}

/// Failure reported by the peer-transport engine collaborator.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine rejected the session: {0}")]
    Rejected(String),

    #[error("engine session not found: {0}")]
    SessionNotFound(String),

    #[error("engine failure: {0}")]
    Failure(String),
}
