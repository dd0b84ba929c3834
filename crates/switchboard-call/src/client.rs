//! The visitor-side call state machine.
//!
//! A synchronous reducer: every user intent, inbound envelope, and
//! media-layer report enters through [`ClientMachine::handle`] and comes out
//! as a list of [`ClientAction`]s for the embedding surface to execute
//! (send an envelope, show a notice, append chat text). The machine is the
//! single source of truth for call state; any UI is a projection of it.

use crate::error::MediaError;
use crate::media::{LinkState, MediaEngine, SdpKind};
use crate::session::CallSession;
use serde_json::Value;
use switchboard_types::{FromClient, Role, ToClient};

/// Visitor-side view of the call lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCallState {
    /// No call in progress.
    Idle,
    /// Sent our own offer via `request_call`, awaiting the operator.
    Requesting,
    /// An unsolicited operator offer arrived, awaiting user accept/decline.
    Incoming,
    /// Answer sent, awaiting the media layer to report connected.
    Connecting,
    /// Voice link established.
    Connected,
    /// Teardown in flight. With the single-queue event model teardown is
    /// atomic within one event, so this state is never observed between
    /// events; it is kept so projections cover the full lifecycle.
    HangingUp,
}

/// Inputs to the visitor machine, processed one at a time in arrival order.
#[derive(Debug)]
pub enum ClientEvent {
    /// The user clicked the call button.
    CallClicked,
    /// The user accepted an incoming call.
    AcceptClicked,
    /// The user declined an incoming call.
    DeclineClicked,
    /// The user clicked hang up.
    HangupClicked,
    /// An envelope arrived from the relay.
    Signal(ToClient),
    /// The media layer gathered a local connectivity candidate.
    LocalCandidate(Value),
    /// The media layer reported a connectivity transition.
    Link(LinkState),
    /// The relay connection closed.
    ConnectionClosed,
}

/// Side effects for the embedding surface to carry out.
#[derive(Debug, PartialEq)]
pub enum ClientAction {
    /// Send an envelope to the relay.
    Send(FromClient),
    /// Show a system notice to the user.
    Notice(String),
    /// Append operator chat text.
    Chat { text: String },
}

pub struct ClientMachine<E: MediaEngine> {
    engine: E,
    state: ClientCallState,
    session: Option<CallSession>,
    client_id: Option<String>,
    relay_open: bool,
}

impl<E: MediaEngine> ClientMachine<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            state: ClientCallState::Idle,
            session: None,
            client_id: None,
            relay_open: true,
        }
    }

    pub fn state(&self) -> ClientCallState {
        self.state
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Reduces one event into the actions it implies.
    pub fn handle(&mut self, event: ClientEvent) -> Vec<ClientAction> {
        match event {
            ClientEvent::CallClicked => self.on_call_clicked(),
            ClientEvent::AcceptClicked => self.on_accept_clicked(),
            ClientEvent::DeclineClicked => self.on_decline_clicked(),
            ClientEvent::HangupClicked => self.on_hangup(true),
            ClientEvent::Signal(envelope) => self.on_signal(envelope),
            ClientEvent::LocalCandidate(candidate) => self.on_local_candidate(candidate),
            ClientEvent::Link(link) => self.on_link(link),
            ClientEvent::ConnectionClosed => {
                self.relay_open = false;
                self.on_hangup(false)
            }
        }
    }

    fn on_call_clicked(&mut self) -> Vec<ClientAction> {
        if self.state != ClientCallState::Idle {
            return vec![ClientAction::Notice(
                "A call cannot be started right now.".to_string(),
            )];
        }
        if self.client_id.is_none() || !self.relay_open {
            return vec![ClientAction::Notice(
                "Not connected yet. Try again in a moment.".to_string(),
            )];
        }

        let sdp = match self.build_outgoing_session() {
            Ok(sdp) => sdp,
            Err(e) => return self.fail_session(format!("Could not start the call: {e}")),
        };

        self.state = ClientCallState::Requesting;
        vec![
            ClientAction::Send(FromClient::RequestCall { sdp }),
            ClientAction::Notice("Calling the operator. Awaiting response.".to_string()),
        ]
    }

    /// Creates the session, acquires audio, and produces the local offer.
    /// On failure the partially built session is dropped, which closes the
    /// media handle.
    fn build_outgoing_session(&mut self) -> Result<String, MediaError> {
        let media = self.engine.create_session()?;
        let mut session = CallSession::new(Role::Client, media);
        session.media().attach_local_audio()?;
        let sdp = session.media().create_offer()?;
        self.session = Some(session);
        Ok(sdp)
    }

    fn on_accept_clicked(&mut self) -> Vec<ClientAction> {
        if self.state != ClientCallState::Incoming || self.session.is_none() {
            return vec![ClientAction::Notice(
                "There is no incoming call to accept.".to_string(),
            )];
        }

        let result = (|| -> Result<String, MediaError> {
            let session = self.session.as_mut().ok_or(MediaError::Closed)?;
            session.take_remote_offer();
            session.media().attach_local_audio()?;
            session.media().create_answer()
        })();

        match result {
            Ok(sdp) => {
                self.state = ClientCallState::Connecting;
                vec![
                    ClientAction::Send(FromClient::ClientAcceptedCall),
                    ClientAction::Send(FromClient::WebrtcAnswer { sdp }),
                ]
            }
            Err(e) => self.fail_session(format!("Could not answer the call: {e}")),
        }
    }

    fn on_decline_clicked(&mut self) -> Vec<ClientAction> {
        if self.state != ClientCallState::Incoming {
            tracing::debug!(state = ?self.state, "decline ignored outside incoming");
            return Vec::new();
        }
        self.release_session();
        vec![
            ClientAction::Send(FromClient::ClientDeclinedCall),
            ClientAction::Notice("Incoming call declined.".to_string()),
        ]
    }

    fn on_signal(&mut self, envelope: ToClient) -> Vec<ClientAction> {
        match envelope {
            ToClient::YourId { client_id } => {
                self.client_id = Some(client_id);
                Vec::new()
            }
            ToClient::OperatorMessage { text } => vec![ClientAction::Chat { text }],
            ToClient::SystemError { text } => {
                vec![ClientAction::Notice(format!("Server error: {text}"))]
            }
            ToClient::WebrtcOffer { sdp } => self.on_offer(sdp),
            ToClient::WebrtcCandidate { candidate } => self.on_remote_candidate(candidate),
            ToClient::OperatorHangup => self.on_remote_teardown("The operator ended the call."),
            ToClient::OperatorDisconnected => {
                self.on_remote_teardown("The operator disconnected.")
            }
            ToClient::OperatorError => {
                self.on_remote_teardown("The operator connection failed.")
            }
            ToClient::WebrtcBusy => {
                self.on_remote_teardown("The operator is busy. Try again later.")
            }
            ToClient::CallDeclinedByOperator => {
                self.on_remote_teardown("The operator declined your call request.")
            }
        }
    }

    fn on_offer(&mut self, sdp: String) -> Vec<ClientAction> {
        if sdp.is_empty() {
            tracing::warn!("offer with empty session description ignored");
            return vec![ClientAction::Notice(
                "Received a malformed call offer.".to_string(),
            )];
        }

        match self.state {
            ClientCallState::Idle => self.on_unsolicited_offer(sdp),
            ClientCallState::Requesting => self.on_offer_while_requesting(sdp),
            _ => {
                // Already in a call or answering one; refuse without
                // disturbing the current session.
                tracing::debug!(state = ?self.state, "busy, refusing offer");
                vec![ClientAction::Send(FromClient::ClientBusy)]
            }
        }
    }

    /// An operator-initiated call: present it to the user, do not auto-answer.
    fn on_unsolicited_offer(&mut self, sdp: String) -> Vec<ClientAction> {
        let result = (|| -> Result<(), MediaError> {
            let media = self.engine.create_session()?;
            let mut session = CallSession::new(Role::Operator, media);
            session.apply_remote_description(SdpKind::Offer, &sdp)?;
            session.remember_remote_offer(sdp);
            self.session = Some(session);
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.state = ClientCallState::Incoming;
                vec![ClientAction::Notice(
                    "Incoming call from the operator.".to_string(),
                )]
            }
            Err(e) => self.fail_session(format!("Could not process the call offer: {e}")),
        }
    }

    /// The operator answered our `request_call` with an offer of its own.
    /// The local offer is rolled back and the operator's offer is answered
    /// on the same session.
    fn on_offer_while_requesting(&mut self, sdp: String) -> Vec<ClientAction> {
        let has_local_offer = self
            .session
            .as_mut()
            .map(|s| s.media().has_local_offer())
            .unwrap_or(false);
        if !has_local_offer {
            return self.fail_session(
                "Received the operator's response in an inconsistent call state.".to_string(),
            );
        }

        let result = (|| -> Result<String, MediaError> {
            let session = self.session.as_mut().ok_or(MediaError::Closed)?;
            session.apply_remote_description(SdpKind::Offer, &sdp)?;
            session.media().create_answer()
        })();

        match result {
            Ok(answer) => {
                self.state = ClientCallState::Connecting;
                vec![ClientAction::Send(FromClient::WebrtcAnswer { sdp: answer })]
            }
            Err(e) => self.fail_session(format!("Could not answer the operator: {e}")),
        }
    }

    fn on_remote_candidate(&mut self, candidate: Value) -> Vec<ClientAction> {
        if candidate.is_null() {
            tracing::warn!("null connectivity candidate ignored");
            return vec![ClientAction::Notice(
                "Received a malformed connectivity candidate.".to_string(),
            )];
        }
        match self.session.as_mut() {
            Some(session) => {
                if let Err(e) = session.accept_candidate(candidate) {
                    tracing::warn!("failed to apply remote candidate: {e}");
                }
            }
            None => tracing::debug!("candidate arrived with no session, ignored"),
        }
        Vec::new()
    }

    fn on_local_candidate(&mut self, candidate: Value) -> Vec<ClientAction> {
        if self.session.is_none() || !self.relay_open {
            tracing::debug!("local candidate dropped, no session or relay closed");
            return Vec::new();
        }
        vec![ClientAction::Send(FromClient::WebrtcCandidate { candidate })]
    }

    fn on_link(&mut self, link: LinkState) -> Vec<ClientAction> {
        let negotiating = matches!(
            self.state,
            ClientCallState::Connecting | ClientCallState::Connected
        );
        if !negotiating {
            // Stale report after the machine already moved on.
            tracing::debug!(state = ?self.state, ?link, "link transition ignored");
            return Vec::new();
        }

        if link.is_terminal() {
            self.release_session();
            vec![ClientAction::Notice("Voice link ended.".to_string())]
        } else {
            self.state = ClientCallState::Connected;
            vec![ClientAction::Notice("Voice link established.".to_string())]
        }
    }

    /// A hangup-class event from the remote side: no `webrtc_hangup` reply,
    /// just teardown. A no-op when already idle.
    fn on_remote_teardown(&mut self, notice: &str) -> Vec<ClientAction> {
        if self.state == ClientCallState::Idle && self.session.is_none() {
            return vec![ClientAction::Notice(notice.to_string())];
        }
        self.release_session();
        vec![ClientAction::Notice(notice.to_string())]
    }

    /// Local hangup: user click or relay closure. Emits `webrtc_hangup` only
    /// when the call had progressed past `requesting` and the relay can
    /// still carry it. Idempotent from idle.
    fn on_hangup(&mut self, may_send: bool) -> Vec<ClientAction> {
        if self.state == ClientCallState::Idle && self.session.is_none() {
            return Vec::new();
        }

        let past_requesting = matches!(
            self.state,
            ClientCallState::Connecting | ClientCallState::Connected | ClientCallState::HangingUp
        );

        let mut actions = Vec::new();
        if may_send && self.relay_open && self.session.is_some() && past_requesting {
            actions.push(ClientAction::Send(FromClient::WebrtcHangup));
        }
        self.release_session();
        actions.push(ClientAction::Notice("Call ended.".to_string()));
        actions
    }

    /// Tears down a partially built or failed session and surfaces the error.
    fn fail_session(&mut self, notice: String) -> Vec<ClientAction> {
        self.release_session();
        vec![ClientAction::Notice(notice)]
    }

    fn release_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.state = ClientCallState::Idle;
    }
}
