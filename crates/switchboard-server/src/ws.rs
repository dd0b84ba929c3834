//! WebSocket endpoints for the two participant roles.
//!
//! Each connection gets a bounded outbound channel drained by a writer task,
//! so a slow consumer drops messages instead of growing memory, and the
//! relay never blocks on a socket write. The receive loop parses one
//! envelope per text frame and hands it to the relay; when the loop ends,
//! the relay tears down the slot and notifies the remaining party.

use crate::AppState;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket},
        ConnectInfo, Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use switchboard_types::{FromClient, FromOperator, SLOT_OCCUPIED_REASON};
use tokio::sync::mpsc;

/// Outbound buffer per connection. Beyond this the consumer is too slow and
/// messages are dropped.
const OUTBOUND_BUFFER: usize = 256;

/// `GET /client` — the visitor endpoint.
pub async fn client_ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_client_socket(socket, state, addr))
}

/// `GET /operator` — the support agent endpoint.
pub async fn operator_ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_operator_socket(socket, state, addr))
}

/// Closes a refused connection with the fixed occupancy reason.
async fn refuse_occupied(mut sender: impl SinkExt<Message> + Unpin) {
    let frame = CloseFrame {
        code: close_code::NORMAL,
        reason: Utf8Bytes::from_static(SLOT_OCCUPIED_REASON),
    };
    let _ = sender.send(Message::Close(Some(frame))).await;
}

async fn handle_client_socket(socket: WebSocket, state: Arc<AppState>, addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    let Some((client_id, session)) = state.relay.attach_client(tx).await else {
        tracing::warn!(remote_addr = %addr, "second client connection refused");
        refuse_occupied(&mut sender).await;
        return;
    };
    tracing::info!(%client_id, remote_addr = %addr, "client connected");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let mut close_reason = String::new();
    let mut transport_error: Option<String> = None;

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<FromClient>(text.as_str()) {
                Ok(envelope) => state.relay.handle_client_envelope(&client_id, envelope).await,
                Err(e) => {
                    // Client-direction malformed traffic: logged and dropped,
                    // no acknowledgment.
                    tracing::warn!(%client_id, "unparseable client envelope dropped: {e}");
                }
            },
            Ok(Message::Close(frame)) => {
                close_reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                break;
            }
            Ok(_) => {} // ping/pong/binary are transport noise here
            Err(e) => {
                transport_error = Some(e.to_string());
                break;
            }
        }
    }

    send_task.abort();
    match transport_error {
        Some(error) => state.relay.client_errored(session, error).await,
        None => state.relay.client_closed(session, close_reason).await,
    }
}

async fn handle_operator_socket(socket: WebSocket, state: Arc<AppState>, addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    let Some(session) = state.relay.attach_operator(tx).await else {
        tracing::warn!(remote_addr = %addr, "second operator connection refused");
        refuse_occupied(&mut sender).await;
        return;
    };
    tracing::info!(remote_addr = %addr, "operator connected");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let mut transport_error = false;

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<FromOperator>(text.as_str()) {
                Ok(envelope) => state.relay.handle_operator_envelope(envelope).await,
                Err(e) => {
                    // Operator-direction malformed traffic is answered in-band.
                    tracing::warn!("unparseable operator envelope: {e}");
                    state.relay.reject_operator_envelope().await;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("operator transport error: {e}");
                transport_error = true;
                break;
            }
        }
    }

    send_task.abort();
    if transport_error {
        state.relay.operator_errored(session).await;
    } else {
        state.relay.operator_closed(session).await;
    }
}
