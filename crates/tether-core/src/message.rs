//! Wire message types
//!
//! One signaling frame is one JSON object: `{"type": ..., "payload": {...}}`.
//! The `type` string names an [`OperationCode`]; the payload shape depends on
//! the operation. Field spellings (`sdpMid`, `sdpMLineIndex`) follow the
//! standard RTC signaling convention and must not change.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operations recognized on the signaling wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationCode {
    Ping,
    Offer,
    Answer,
    Candidate,
}

impl OperationCode {
    /// Every operation, in wire-name order. Useful for building the full
    /// callback table.
    pub const ALL: [OperationCode; 4] = [
        OperationCode::Ping,
        OperationCode::Offer,
        OperationCode::Answer,
        OperationCode::Candidate,
    ];

    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "ping" => Some(OperationCode::Ping),
            "offer" => Some(OperationCode::Offer),
            "answer" => Some(OperationCode::Answer),
            "candidate" => Some(OperationCode::Candidate),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            OperationCode::Ping => "ping",
            OperationCode::Offer => "offer",
            OperationCode::Answer => "answer",
            OperationCode::Candidate => "candidate",
        }
    }
}

impl fmt::Display for OperationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// One ICE candidate, exactly as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: String,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: u32,
}

/// A decoded signaling frame.
///
/// Serializes to the adjacently tagged `{"type", "payload"}` wire shape;
/// decoding goes through [`crate::codec::decode`] so that unknown operations
/// and malformed payloads surface as distinct errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum SignalMessage {
    /// Keepalive probe; the receiver echoes the frame back verbatim.
    Ping {
        #[serde(skip_serializing_if = "Option::is_none")]
        echo: Option<String>,
    },
    /// Session description offered by the initiating peer.
    Offer { sdp: String },
    /// Session description generated in response to an offer.
    Answer { sdp: String },
    /// One ICE candidate discovered by either side.
    Candidate(IceCandidate),
}

impl SignalMessage {
    pub fn op(&self) -> OperationCode {
        match self {
            SignalMessage::Ping { .. } => OperationCode::Ping,
            SignalMessage::Offer { .. } => OperationCode::Offer,
            SignalMessage::Answer { .. } => OperationCode::Answer,
            SignalMessage::Candidate(_) => OperationCode::Candidate,
        }
    }
}
