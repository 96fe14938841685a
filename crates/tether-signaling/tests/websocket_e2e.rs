//! End-to-end over a real WebSocket
//!
//! Boots the server on an ephemeral port, dials it with the WebSocket
//! link, and walks one full offer/answer/candidate exchange.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tether_core::{codec, SignalMessage};
use tether_signaling::{SignalingConfig, SignalingServer};
use tether_test_utils::{find_available_port, wait_for, ScriptedEngine, DEFAULT_TIMEOUT};
use tether_transport::{LinkEvent, MessageSink, MessageSource, WebSocketLink, WebSocketListener};

const ANSWER_SDP: &str = "v=0;a=answer";

async fn next_frame(source: &mut impl MessageSource) -> Option<Bytes> {
    loop {
        match tokio::time::timeout(DEFAULT_TIMEOUT, source.next_event()).await {
            Ok(Some(LinkEvent::Frame(frame))) => return Some(frame),
            Ok(Some(LinkEvent::Closed { .. })) | Ok(None) => return None,
            Ok(Some(_)) => continue,
            Err(_) => panic!("timed out waiting for a frame"),
        }
    }
}

#[tokio::test]
async fn full_exchange_over_websocket() {
    let engine = ScriptedEngine::new(ANSWER_SDP);
    let server = Arc::new(
        SignalingServer::new(SignalingConfig::default(), engine.clone())
            .expect("coordinator builds"),
    );

    let port = find_available_port().await;
    let addr = format!("127.0.0.1:{port}");
    let listener = WebSocketListener::bind(&addr)
        .await
        .expect("bind test port");

    let serving = server.clone();
    tokio::spawn(async move {
        let _ = serving.serve_on(listener).await;
    });

    let (sink, mut source) = WebSocketLink::dial(&format!("ws://{}/", addr))
        .await
        .expect("dial the server");

    sink.send(Bytes::from_static(
        br#"{"type":"offer","payload":{"sdp":"v=0..."}}"#,
    ))
    .await
    .expect("send offer");

    let frame = next_frame(&mut source).await.expect("answer frame");
    assert_eq!(
        codec::decode(&frame).expect("valid frame"),
        SignalMessage::Answer {
            sdp: ANSWER_SDP.into()
        }
    );

    sink.send(Bytes::from_static(
        br#"{"type":"candidate","payload":{"candidate":"candidate:ws1","sdpMid":"0","sdpMLineIndex":0}}"#,
    ))
    .await
    .expect("send candidate");

    assert!(wait_for(|| engine.candidate_log().len() == 1, DEFAULT_TIMEOUT).await);
    assert_eq!(server.session_count(), 1);

    // Hang up; the server forgets the session.
    sink.close().await.expect("close link");
    assert!(wait_for(|| server.session_count() == 0, DEFAULT_TIMEOUT).await);

    server.stop();
    // Give the accept loop a beat to observe the stop flag.
    tokio::time::sleep(Duration::from_millis(20)).await;
}
