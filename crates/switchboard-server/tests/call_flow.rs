//! End-to-end call negotiation: both state machines driven over live
//! WebSockets through the relay, with a scripted media layer.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use switchboard_call::{
    ClientAction, ClientCallState, ClientEvent, ClientMachine, LinkState, MediaEngine,
    MediaError, MediaSession, OperatorAction, OperatorCallState, OperatorEvent, OperatorMachine,
    SdpKind,
};
use switchboard_server::{app, relay::Relay, AppState};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Scripted stand-in for the audio transport.
struct ScriptedMedia {
    label: &'static str,
    local_offer: bool,
}

impl MediaSession for ScriptedMedia {
    fn attach_local_audio(&mut self) -> Result<(), MediaError> {
        Ok(())
    }

    fn create_offer(&mut self) -> Result<String, MediaError> {
        self.local_offer = true;
        Ok(format!("v=0 {} offer", self.label))
    }

    fn create_answer(&mut self) -> Result<String, MediaError> {
        Ok(format!("v=0 {} answer", self.label))
    }

    fn apply_remote_description(&mut self, kind: SdpKind, _sdp: &str) -> Result<(), MediaError> {
        if kind == SdpKind::Offer {
            self.local_offer = false;
        }
        Ok(())
    }

    fn apply_remote_candidate(&mut self, _candidate: &Value) -> Result<(), MediaError> {
        Ok(())
    }

    fn has_local_offer(&self) -> bool {
        self.local_offer
    }

    fn close(&mut self) {}
}

struct ScriptedEngine {
    label: &'static str,
}

impl MediaEngine for ScriptedEngine {
    fn create_session(&mut self) -> Result<Box<dyn MediaSession>, MediaError> {
        Ok(Box::new(ScriptedMedia {
            label: self.label,
            local_offer: false,
        }))
    }
}

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

/// Receives the next envelope and runs it through the client machine,
/// sending any resulting envelopes back out.
async fn pump_client(
    ws: &mut Ws,
    machine: &mut ClientMachine<ScriptedEngine>,
) -> Vec<ClientAction> {
    let msg = recv_json(ws).await;
    let envelope = serde_json::from_value(msg).expect("client-bound envelope");
    let actions = machine.handle(ClientEvent::Signal(envelope));
    perform_client(ws, &actions).await;
    actions
}

async fn perform_client(ws: &mut Ws, actions: &[ClientAction]) {
    for action in actions {
        if let ClientAction::Send(envelope) = action {
            let text = serde_json::to_string(envelope).unwrap();
            ws.send(Message::Text(text.into())).await.expect("send");
        }
    }
}

async fn pump_operator(
    ws: &mut Ws,
    machine: &mut OperatorMachine<ScriptedEngine>,
) -> Vec<OperatorAction> {
    let msg = recv_json(ws).await;
    let envelope = serde_json::from_value(msg).expect("operator-bound envelope");
    let actions = machine.handle(OperatorEvent::Signal(envelope));
    perform_operator(ws, &actions).await;
    actions
}

async fn perform_operator(ws: &mut Ws, actions: &[OperatorAction]) {
    for action in actions {
        if let OperatorAction::Send(envelope) = action {
            let text = serde_json::to_string(envelope).unwrap();
            ws.send(Message::Text(text.into())).await.expect("send");
        }
    }
}

/// Connects both endpoints and drives the presence preamble through the
/// machines.
async fn connect_machines(
    addr: SocketAddr,
) -> (
    Ws,
    ClientMachine<ScriptedEngine>,
    Ws,
    OperatorMachine<ScriptedEngine>,
) {
    let mut client_ws = connect(addr, "/client").await;
    let mut client = ClientMachine::new(ScriptedEngine { label: "client" });
    pump_client(&mut client_ws, &mut client).await; // your_id
    assert!(client.client_id().is_some());

    let mut operator_ws = connect(addr, "/operator").await;
    let mut operator = OperatorMachine::new(ScriptedEngine { label: "operator" });
    pump_operator(&mut operator_ws, &mut operator).await; // active_clients
    pump_operator(&mut operator_ws, &mut operator).await; // client_connected
    assert_eq!(operator.active_client(), client.client_id());

    (client_ws, client, operator_ws, operator)
}

#[tokio::test]
async fn client_requested_call_negotiates_to_connected() {
    let addr = start_server().await;
    let (mut client_ws, mut client, mut operator_ws, mut operator) =
        connect_machines(addr).await;

    // Visitor clicks call: its own offer goes into request_call.
    let actions = client.handle(ClientEvent::CallClicked);
    perform_client(&mut client_ws, &actions).await;
    assert_eq!(client.state(), ClientCallState::Requesting);

    // Operator sees the bare callback request and accepts it.
    pump_operator(&mut operator_ws, &mut operator).await;
    assert_eq!(operator.state(), OperatorCallState::PendingRequest);

    let actions = operator.handle(OperatorEvent::AcceptRequestClicked);
    perform_operator(&mut operator_ws, &actions).await;
    assert_eq!(operator.state(), OperatorCallState::Calling);

    // The operator's offer reaches the client while it is requesting: it
    // must answer on the same session and go to connecting, never incoming.
    let actions = pump_client(&mut client_ws, &mut client).await;
    assert_eq!(client.state(), ClientCallState::Connecting);
    assert!(actions
        .iter()
        .any(|a| matches!(a, ClientAction::Send(switchboard_types::FromClient::WebrtcAnswer { .. }))));

    // The answer reaches the operator.
    pump_operator(&mut operator_ws, &mut operator).await;
    assert_eq!(operator.state(), OperatorCallState::Calling);

    // Both media layers report connected.
    client.handle(ClientEvent::Link(LinkState::Connected));
    operator.handle(OperatorEvent::Link(LinkState::Connected));
    assert_eq!(client.state(), ClientCallState::Connected);
    assert_eq!(operator.state(), OperatorCallState::Connected);
}

#[tokio::test]
async fn operator_initiated_call_waits_for_user_acceptance() {
    let addr = start_server().await;
    let (mut client_ws, mut client, mut operator_ws, mut operator) =
        connect_machines(addr).await;

    // Operator calls the visitor.
    let actions = operator.handle(OperatorEvent::CallClicked);
    perform_operator(&mut operator_ws, &actions).await;
    assert_eq!(operator.state(), OperatorCallState::Calling);

    // The visitor sees an incoming call and must not auto-answer.
    let actions = pump_client(&mut client_ws, &mut client).await;
    assert_eq!(client.state(), ClientCallState::Incoming);
    assert!(!actions
        .iter()
        .any(|a| matches!(a, ClientAction::Send(_))));

    // The visitor accepts: acceptance note first, then the answer.
    let actions = client.handle(ClientEvent::AcceptClicked);
    perform_client(&mut client_ws, &actions).await;
    assert_eq!(client.state(), ClientCallState::Connecting);

    let accepted = pump_operator(&mut operator_ws, &mut operator).await;
    assert!(accepted
        .iter()
        .any(|a| matches!(a, OperatorAction::Notice(_))));
    assert_eq!(operator.state(), OperatorCallState::Calling);

    pump_operator(&mut operator_ws, &mut operator).await; // webrtc_answer
    assert_eq!(operator.state(), OperatorCallState::Calling);

    // Candidates flow while connecting.
    let candidate = json!({"candidate": "a=candidate:1 1 udp 1 192.0.2.1 54400 typ host"});
    let actions = client.handle(ClientEvent::LocalCandidate(candidate.clone()));
    perform_client(&mut client_ws, &actions).await;
    let actions = pump_operator(&mut operator_ws, &mut operator).await;
    assert!(actions.is_empty(), "candidates apply silently");

    client.handle(ClientEvent::Link(LinkState::Connected));
    operator.handle(OperatorEvent::Link(LinkState::Connected));
    assert_eq!(client.state(), ClientCallState::Connected);
    assert_eq!(operator.state(), OperatorCallState::Connected);
}

#[tokio::test]
async fn client_disconnect_mid_call_unwinds_the_operator() {
    let addr = start_server().await;
    let (mut client_ws, mut client, mut operator_ws, mut operator) =
        connect_machines(addr).await;

    // Negotiate to connected.
    let actions = operator.handle(OperatorEvent::CallClicked);
    perform_operator(&mut operator_ws, &actions).await;
    pump_client(&mut client_ws, &mut client).await;
    let actions = client.handle(ClientEvent::AcceptClicked);
    perform_client(&mut client_ws, &actions).await;
    pump_operator(&mut operator_ws, &mut operator).await; // client_accepted_call
    pump_operator(&mut operator_ws, &mut operator).await; // webrtc_answer
    operator.handle(OperatorEvent::Link(LinkState::Connected));
    assert_eq!(operator.state(), OperatorCallState::Connected);

    // The visitor's transport drops: the relay synthesizes the pair and the
    // operator machine unwinds to idle without stalling.
    drop(client_ws);

    pump_operator(&mut operator_ws, &mut operator).await; // client_disconnected
    assert_eq!(operator.state(), OperatorCallState::Idle);
    assert!(operator.active_client().is_none());
    assert!(!operator.has_session());

    let actions = pump_operator(&mut operator_ws, &mut operator).await; // client_hangup
    assert_eq!(operator.state(), OperatorCallState::Idle);
    assert!(!actions
        .iter()
        .any(|a| matches!(a, OperatorAction::Send(_))));
}

#[tokio::test]
async fn operator_decline_returns_the_client_to_idle() {
    let addr = start_server().await;
    let (mut client_ws, mut client, mut operator_ws, mut operator) =
        connect_machines(addr).await;

    let actions = client.handle(ClientEvent::CallClicked);
    perform_client(&mut client_ws, &actions).await;
    pump_operator(&mut operator_ws, &mut operator).await;
    assert_eq!(operator.state(), OperatorCallState::PendingRequest);

    let actions = operator.handle(OperatorEvent::DeclineRequestClicked);
    perform_operator(&mut operator_ws, &actions).await;
    assert_eq!(operator.state(), OperatorCallState::Idle);

    pump_client(&mut client_ws, &mut client).await; // call_declined_by_operator
    assert_eq!(client.state(), ClientCallState::Idle);
    assert!(!client.has_session());
}
