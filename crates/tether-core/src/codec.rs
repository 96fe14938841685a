//! JSON frame codec
//!
//! Decoding is two-stage so failures carry the right severity: a frame that
//! is not a JSON object with a `type` field is a protocol error (fatal to
//! the connection), while an unrecognized operation or a payload missing a
//! required field only rejects that one message.

use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::message::{IceCandidate, OperationCode, SignalMessage};

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct SdpPayload {
    sdp: String,
}

#[derive(Deserialize)]
struct PingPayload {
    #[serde(default)]
    echo: Option<String>,
}

fn malformed(op: OperationCode, err: serde_json::Error) -> Error {
    Error::MalformedPayload {
        op,
        detail: err.to_string(),
    }
}

/// Decode one wire frame into a typed message.
pub fn decode(frame: &[u8]) -> Result<SignalMessage> {
    let envelope: Envelope =
        serde_json::from_slice(frame).map_err(|e| Error::Protocol(e.to_string()))?;

    let op = OperationCode::from_wire(&envelope.kind)
        .ok_or(Error::UnknownOperation(envelope.kind.clone()))?;

    let message = match op {
        OperationCode::Ping => {
            // The ping payload is optional altogether.
            if envelope.payload.is_null() {
                SignalMessage::Ping { echo: None }
            } else {
                let payload: PingPayload =
                    serde_json::from_value(envelope.payload).map_err(|e| malformed(op, e))?;
                SignalMessage::Ping { echo: payload.echo }
            }
        }
        OperationCode::Offer => {
            let payload: SdpPayload =
                serde_json::from_value(envelope.payload).map_err(|e| malformed(op, e))?;
            SignalMessage::Offer { sdp: payload.sdp }
        }
        OperationCode::Answer => {
            let payload: SdpPayload =
                serde_json::from_value(envelope.payload).map_err(|e| malformed(op, e))?;
            SignalMessage::Answer { sdp: payload.sdp }
        }
        OperationCode::Candidate => {
            let candidate: IceCandidate =
                serde_json::from_value(envelope.payload).map_err(|e| malformed(op, e))?;
            SignalMessage::Candidate(candidate)
        }
    };

    Ok(message)
}

/// Encode one message into its wire frame.
pub fn encode(message: &SignalMessage) -> Result<Bytes> {
    let frame = serde_json::to_vec(message).map_err(|e| Error::Encode(e.to_string()))?;
    Ok(Bytes::from(frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_offer() {
        let msg = decode(br#"{"type":"offer","payload":{"sdp":"v=0..."}}"#).unwrap();
        assert_eq!(
            msg,
            SignalMessage::Offer {
                sdp: "v=0...".into()
            }
        );
    }

    #[test]
    fn decodes_candidate_with_wire_field_names() {
        let frame = br#"{"type":"candidate","payload":{"candidate":"candidate:1 1 udp 2122 10.0.0.2 57339 typ host","sdpMid":"0","sdpMLineIndex":0}}"#;
        let msg = decode(frame).unwrap();
        match msg {
            SignalMessage::Candidate(c) => {
                assert_eq!(c.sdp_mid, "0");
                assert_eq!(c.sdp_mline_index, 0);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn ping_payload_is_optional() {
        assert_eq!(
            decode(br#"{"type":"ping"}"#).unwrap(),
            SignalMessage::Ping { echo: None }
        );
        assert_eq!(
            decode(br#"{"type":"ping","payload":{"echo":"tok-1"}}"#).unwrap(),
            SignalMessage::Ping {
                echo: Some("tok-1".into())
            }
        );
    }

    #[test]
    fn unknown_operation_is_not_a_protocol_error() {
        let err = decode(br#"{"type":"renegotiate","payload":{}}"#).unwrap_err();
        assert!(matches!(err, Error::UnknownOperation(_)));
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let err = decode(br#"{"type":"offer","payload":{}}"#).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedPayload {
                op: OperationCode::Offer,
                ..
            }
        ));

        let err = decode(br#"{"type":"candidate","payload":{"candidate":"c"}}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload { .. }));
    }

    #[test]
    fn non_json_frame_is_a_protocol_error() {
        assert!(matches!(decode(b"not json"), Err(Error::Protocol(_))));
        assert!(matches!(decode(br#"{"payload":{}}"#), Err(Error::Protocol(_))));
    }

    #[test]
    fn encode_matches_wire_shape() {
        let msg = SignalMessage::Answer {
            sdp: "v=0;a=answer".into(),
        };
        let frame = encode(&msg).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value["type"], "answer");
        assert_eq!(value["payload"]["sdp"], "v=0;a=answer");
    }

    #[test]
    fn encoded_frames_round_trip() {
        let msg = SignalMessage::Candidate(IceCandidate {
            candidate: "candidate:2 1 udp 1686052607 198.51.100.7 51217 typ srflx".into(),
            sdp_mid: "data".into(),
            sdp_mline_index: 1,
        });
        let frame = encode(&msg).unwrap();
        assert_eq!(decode(&frame).unwrap(), msg);
    }
}
