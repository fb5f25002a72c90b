//! End-to-end relay tests over a real WebSocket.

use futures_util::{SinkExt, StreamExt};
use pair_core::Signer;
use pair_types::SessionId;
use pairlink_relay::clock::SystemClock;
use pairlink_relay::config::Config;
use pairlink_relay::http::build_router;
use pairlink_relay::server::PairRelay;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_relay() -> (SocketAddr, Arc<PairRelay>) {
    let relay = Arc::new(PairRelay::new(
        Config::default(),
        Signer::new(b"integration-test-secret-0000000"),
        Arc::new(SystemClock),
    ));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(relay.clone());
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    (addr, relay)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn send(ws: &mut Client, text: impl Into<String>) {
    ws.send(Message::Text(text.into())).await.unwrap();
}

async fn recv_text(ws: &mut Client) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return text;
        }
    }
}

async fn recv_json(ws: &mut Client) -> Value {
    serde_json::from_str(&recv_text(ws).await).unwrap()
}

async fn wait_for_members(relay: &PairRelay, session: &SessionId, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while relay.router().registry().participant_count(session).await != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("membership did not settle");
}

fn join(session: &SessionId, client: &str) -> String {
    json!({ "type": "join-session", "sessionId": session.as_str(), "clientId": client })
        .to_string()
}

#[tokio::test]
async fn host_and_peer_exchange_offer_and_answer() {
    let (addr, relay) = start_relay().await;
    let session = relay
        .store()
        .create(SessionId::generate(), "pubkeyA", Duration::from_secs(300))
        .unwrap();

    let mut host = connect(addr).await;
    send(&mut host, join(&session.id, "host-1")).await;
    wait_for_members(&relay, &session.id, 1).await;

    let mut peer = connect(addr).await;
    send(&mut peer, join(&session.id, "peer-1")).await;

    assert_eq!(
        recv_json(&mut host).await,
        json!({ "type": "peer-joined", "clientId": "peer-1" })
    );
    assert_eq!(
        recv_json(&mut peer).await,
        json!({ "type": "peer-joined", "clientId": "host-1" })
    );

    let offer = r#"{"type":"webrtc-offer","sdp":"X"}"#;
    send(&mut host, offer).await;
    assert_eq!(recv_text(&mut peer).await, offer);

    let answer = r#"{"type":"webrtc-answer","sdp":"Y"}"#;
    send(&mut peer, answer).await;
    assert_eq!(recv_text(&mut host).await, answer);

    peer.close(None).await.unwrap();
    assert_eq!(
        recv_json(&mut host).await,
        json!({ "type": "peer-left", "clientId": "peer-1" })
    );
    wait_for_members(&relay, &session.id, 1).await;
}

#[tokio::test]
async fn errors_are_reported_without_closing() {
    let (addr, relay) = start_relay().await;
    let mut ws = connect(addr).await;

    send(&mut ws, r#"{"type":"webrtc-offer","sdp":"X"}"#).await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["code"], "not-joined");

    send(&mut ws, join(&SessionId::generate(), "a")).await;
    assert_eq!(recv_json(&mut ws).await["code"], "session-not-found");

    // Still usable afterwards
    let session = relay
        .store()
        .create(SessionId::generate(), "k", Duration::from_secs(60))
        .unwrap();
    send(&mut ws, join(&session.id, "a")).await;
    wait_for_members(&relay, &session.id, 1).await;
}

#[tokio::test]
async fn deleting_a_session_notifies_members() {
    let (addr, relay) = start_relay().await;
    let session = relay
        .store()
        .create(SessionId::generate(), "k", Duration::from_secs(60))
        .unwrap();

    let mut ws = connect(addr).await;
    send(&mut ws, join(&session.id, "host-1")).await;
    wait_for_members(&relay, &session.id, 1).await;

    assert!(relay.end_session(&session.id).await);
    assert_eq!(
        recv_json(&mut ws).await,
        json!({ "type": "session-ended", "sessionId": session.id.as_str() })
    );

    send(&mut ws, r#"{"type":"ice-candidate","candidate":"c"}"#).await;
    assert_eq!(recv_json(&mut ws).await["code"], "not-joined");
}
