//! Slot occupancy and presence notifications over live WebSockets.

use futures_util::StreamExt;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use switchboard_server::{app, relay::Relay, AppState};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> SocketAddr {
    let state = AppState {
        relay: Relay::new(None),
        assets_dir: "does-not-exist".to_string(),
    };
    let app = app(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    addr
}

async fn connect(addr: SocketAddr, path: &str) -> Ws {
    let (ws, _) = connect_async(format!("ws://{addr}{path}"))
        .await
        .expect("failed to connect");
    ws
}

async fn recv_json(ws: &mut Ws) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("transport error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("invalid json frame");
        }
    }
}

/// Reads frames until one with the expected `type` arrives.
async fn recv_type(ws: &mut Ws, expected: &str) -> Value {
    loop {
        let msg = recv_json(ws).await;
        if msg["type"] == expected {
            return msg;
        }
    }
}

#[tokio::test]
async fn client_receives_its_identity_on_connect() {
    let addr = start_server().await;
    let mut client = connect(addr, "/client").await;

    let msg = recv_json(&mut client).await;
    assert_eq!(msg["type"], "your_id");
    assert!(msg["clientId"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn operator_connecting_first_sees_an_empty_client_list() {
    let addr = start_server().await;
    let mut operator = connect(addr, "/operator").await;

    let msg = recv_json(&mut operator).await;
    assert_eq!(msg["type"], "active_clients");
    assert_eq!(msg["clientIds"], serde_json::json!([]));
}

#[tokio::test]
async fn operator_is_told_when_a_client_connects() {
    let addr = start_server().await;
    let mut operator = connect(addr, "/operator").await;
    recv_type(&mut operator, "active_clients").await;

    let mut client = connect(addr, "/client").await;
    let your_id = recv_json(&mut client).await;
    let client_id = your_id["clientId"].as_str().unwrap().to_string();

    let connected = recv_type(&mut operator, "client_connected").await;
    assert_eq!(connected["clientId"], client_id.as_str());
    let active = recv_type(&mut operator, "active_clients").await;
    assert_eq!(active["clientIds"][0], client_id.as_str());
}

#[tokio::test]
async fn operator_connecting_second_sees_the_present_client() {
    let addr = start_server().await;
    let mut client = connect(addr, "/client").await;
    let your_id = recv_json(&mut client).await;
    let client_id = your_id["clientId"].as_str().unwrap().to_string();

    let mut operator = connect(addr, "/operator").await;
    let active = recv_type(&mut operator, "active_clients").await;
    assert_eq!(active["clientIds"][0], client_id.as_str());
    recv_type(&mut operator, "client_connected").await;
}

#[tokio::test]
async fn second_client_is_refused_and_the_first_is_unaffected() {
    let addr = start_server().await;
    let mut first = connect(addr, "/client").await;
    let first_id = recv_json(&mut first).await["clientId"]
        .as_str()
        .unwrap()
        .to_string();

    let mut second = connect(addr, "/client").await;
    let msg = tokio::time::timeout(Duration::from_secs(5), second.next())
        .await
        .expect("timed out")
        .expect("stream ended")
        .expect("transport error");
    match msg {
        Message::Close(Some(frame)) => assert_eq!(frame.reason.as_str(), "ERR_SLOT_OCCUPIED"),
        other => panic!("expected a close frame, got {other:?}"),
    }

    // The first client's slot is untouched: a joining operator still sees it.
    let mut operator = connect(addr, "/operator").await;
    let active = recv_type(&mut operator, "active_clients").await;
    assert_eq!(active["clientIds"], serde_json::json!([first_id]));
}

#[tokio::test]
async fn second_operator_is_refused() {
    let addr = start_server().await;
    let mut first = connect(addr, "/operator").await;
    recv_type(&mut first, "active_clients").await;

    let mut second = connect(addr, "/operator").await;
    let msg = tokio::time::timeout(Duration::from_secs(5), second.next())
        .await
        .expect("timed out")
        .expect("stream ended")
        .expect("transport error");
    match msg {
        Message::Close(Some(frame)) => assert_eq!(frame.reason.as_str(), "ERR_SLOT_OCCUPIED"),
        other => panic!("expected a close frame, got {other:?}"),
    }

    // The first operator still works.
    let mut client = connect(addr, "/client").await;
    recv_json(&mut client).await;
    recv_type(&mut first, "client_connected").await;
}

#[tokio::test]
async fn slot_is_reusable_after_disconnect() {
    let addr = start_server().await;
    let mut operator = connect(addr, "/operator").await;
    recv_type(&mut operator, "active_clients").await;

    let mut client = connect(addr, "/client").await;
    let first_id = recv_json(&mut client).await["clientId"]
        .as_str()
        .unwrap()
        .to_string();
    recv_type(&mut operator, "client_connected").await;

    client.close(None).await.unwrap();
    let gone = recv_type(&mut operator, "client_disconnected").await;
    assert_eq!(gone["clientId"], first_id.as_str());

    let mut replacement = connect(addr, "/client").await;
    let second_id = recv_json(&mut replacement).await["clientId"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(first_id, second_id, "identities are per connection");
    recv_type(&mut operator, "client_connected").await;
}
