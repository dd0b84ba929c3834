//! The operator-side call state machine.
//!
//! The mirror of [`crate::client::ClientMachine`], with one extra stage the
//! visitor flow lacks: a pending-request slot for a visitor callback that
//! the operator has not yet accepted or declined.

use crate::error::MediaError;
use crate::media::{LinkState, MediaEngine, SdpKind};
use crate::session::CallSession;
use serde_json::Value;
use switchboard_types::{FromOperator, Role, ToOperator};

/// Operator-side view of the call lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCallState {
    /// No call in progress.
    Idle,
    /// A visitor asked to be called back, awaiting operator accept/decline.
    PendingRequest,
    /// Offer sent, awaiting the visitor's answer.
    Calling,
    /// Voice link established.
    Connected,
}

/// Inputs to the operator machine, processed one at a time in arrival order.
#[derive(Debug)]
pub enum OperatorEvent {
    /// The operator clicked call on the connected visitor.
    CallClicked,
    /// The operator accepted the pending callback request.
    AcceptRequestClicked,
    /// The operator declined the pending callback request.
    DeclineRequestClicked,
    /// The operator clicked hang up.
    HangupClicked,
    /// An envelope arrived from the relay.
    Signal(ToOperator),
    /// The media layer gathered a local connectivity candidate.
    LocalCandidate(Value),
    /// The media layer reported a connectivity transition.
    Link(LinkState),
    /// The relay connection closed.
    ConnectionClosed,
}

/// Side effects for the embedding surface to carry out.
#[derive(Debug, PartialEq)]
pub enum OperatorAction {
    /// Send an envelope to the relay.
    Send(FromOperator),
    /// Show a system notice to the operator.
    Notice(String),
    /// Append visitor chat text.
    Chat { client_id: String, text: String },
    /// Project one structured analysis result.
    Analysis { data: Value },
    /// Project a reply suggestion.
    Suggestion { text: String },
}

pub struct OperatorMachine<E: MediaEngine> {
    engine: E,
    state: OperatorCallState,
    session: Option<CallSession>,
    pending_request: Option<String>,
    active_client: Option<String>,
    relay_open: bool,
}

impl<E: MediaEngine> OperatorMachine<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            state: OperatorCallState::Idle,
            session: None,
            pending_request: None,
            active_client: None,
            relay_open: true,
        }
    }

    pub fn state(&self) -> OperatorCallState {
        self.state
    }

    pub fn pending_request(&self) -> Option<&str> {
        self.pending_request.as_deref()
    }

    pub fn active_client(&self) -> Option<&str> {
        self.active_client.as_deref()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Reduces one event into the actions it implies.
    pub fn handle(&mut self, event: OperatorEvent) -> Vec<OperatorAction> {
        match event {
            OperatorEvent::CallClicked => self.on_call_clicked(),
            OperatorEvent::AcceptRequestClicked => self.on_accept_request(),
            OperatorEvent::DeclineRequestClicked => self.on_decline_request(),
            OperatorEvent::HangupClicked => self.on_hangup_clicked(),
            OperatorEvent::Signal(envelope) => self.on_signal(envelope),
            OperatorEvent::LocalCandidate(candidate) => self.on_local_candidate(candidate),
            OperatorEvent::Link(link) => self.on_link(link),
            OperatorEvent::ConnectionClosed => self.on_connection_closed(),
        }
    }

    fn on_call_clicked(&mut self) -> Vec<OperatorAction> {
        if self.state != OperatorCallState::Idle {
            return vec![OperatorAction::Notice(
                "A call is already active or being set up.".to_string(),
            )];
        }
        let Some(client_id) = self.active_client.clone() else {
            return vec![OperatorAction::Notice(
                "No connected client to call.".to_string(),
            )];
        };
        self.start_call(client_id)
    }

    fn on_accept_request(&mut self) -> Vec<OperatorAction> {
        if self.state != OperatorCallState::PendingRequest {
            return vec![OperatorAction::Notice(
                "No pending call request to accept.".to_string(),
            )];
        }
        let Some(client_id) = self.pending_request.take() else {
            self.state = OperatorCallState::Idle;
            return vec![OperatorAction::Notice(
                "No pending call request to accept.".to_string(),
            )];
        };
        // Accepting behaves exactly like clicking call on that visitor.
        self.state = OperatorCallState::Idle;
        self.start_call(client_id)
    }

    fn on_decline_request(&mut self) -> Vec<OperatorAction> {
        let Some(client_id) = self.pending_request.take() else {
            tracing::debug!("decline ignored, no pending request");
            return Vec::new();
        };
        self.state = OperatorCallState::Idle;
        vec![
            OperatorAction::Send(FromOperator::CallDeclinedByOperator {
                target_client_id: client_id,
            }),
            OperatorAction::Notice("Call request declined.".to_string()),
        ]
    }

    /// Acquires audio, builds the session, and sends the offer. On failure
    /// the partially built session is dropped, which closes the media handle.
    fn start_call(&mut self, client_id: String) -> Vec<OperatorAction> {
        let result = (|| -> Result<String, MediaError> {
            let media = self.engine.create_session()?;
            let mut session = CallSession::new(Role::Operator, media);
            session.media().attach_local_audio()?;
            let sdp = session.media().create_offer()?;
            self.session = Some(session);
            Ok(sdp)
        })();

        match result {
            Ok(sdp) => {
                self.state = OperatorCallState::Calling;
                vec![
                    OperatorAction::Send(FromOperator::WebrtcOffer {
                        target_client_id: Some(client_id.clone()),
                        sdp,
                    }),
                    OperatorAction::Notice(format!("Calling client {client_id}.")),
                ]
            }
            Err(e) => self.fail_session(format!("Could not start the call: {e}")),
        }
    }

    fn on_hangup_clicked(&mut self) -> Vec<OperatorAction> {
        if !matches!(
            self.state,
            OperatorCallState::Calling | OperatorCallState::Connected
        ) {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if self.relay_open {
            actions.push(OperatorAction::Send(FromOperator::WebrtcHangup {
                target_client_id: self.active_client.clone(),
            }));
        }
        self.release_session();
        actions.push(OperatorAction::Notice("Call ended.".to_string()));
        actions
    }

    fn on_signal(&mut self, envelope: ToOperator) -> Vec<OperatorAction> {
        match envelope {
            ToOperator::ActiveClients { client_ids } => {
                self.active_client = client_ids.into_iter().next();
                Vec::new()
            }
            ToOperator::ClientConnected { client_id } => {
                self.active_client = Some(client_id.clone());
                vec![OperatorAction::Notice(format!(
                    "Client {client_id} connected."
                ))]
            }
            ToOperator::ClientDisconnected { client_id, reason } => self.on_client_gone(
                &client_id,
                format!("Client {client_id} disconnected ({reason})."),
            ),
            ToOperator::ClientError { client_id, error } => self.on_client_gone(
                &client_id,
                format!("Client {client_id} connection failed: {error}."),
            ),
            ToOperator::ClientMessage { client_id, text } => {
                vec![OperatorAction::Chat { client_id, text }]
            }
            ToOperator::ClientRequestCall { client_id } => self.on_request_call(client_id),
            ToOperator::WebrtcAnswer { sdp, .. } => self.on_answer(sdp),
            ToOperator::WebrtcCandidate { candidate, .. } => self.on_remote_candidate(candidate),
            ToOperator::ClientHangup { client_id } => {
                self.on_remote_teardown(format!("Client {client_id} ended the call."))
            }
            ToOperator::ClientDeclinedCall { client_id } => {
                self.on_remote_teardown(format!("Client {client_id} declined the call."))
            }
            ToOperator::ClientBusy { client_id } => {
                self.on_remote_teardown(format!("Client {client_id} is busy."))
            }
            ToOperator::ClientAcceptedCall { client_id } => {
                // Informational only: the visitor began answering. The actual
                // transition to connected comes from the link report.
                vec![OperatorAction::Notice(format!(
                    "Client {client_id} accepted the call. Connecting."
                ))]
            }
            ToOperator::SystemError { text } => {
                vec![OperatorAction::Notice(format!("Server error: {text}"))]
            }
            ToOperator::ProcessingResults { data } => vec![OperatorAction::Analysis { data }],
            ToOperator::AiSuggestion { text } => vec![OperatorAction::Suggestion { text }],
        }
    }

    fn on_request_call(&mut self, client_id: String) -> Vec<OperatorAction> {
        if self.state != OperatorCallState::Idle {
            return vec![
                OperatorAction::Send(FromOperator::OperatorBusy {
                    target_client_id: client_id.clone(),
                }),
                OperatorAction::Notice(format!(
                    "Call request from client {client_id} refused: a call is already active."
                )),
            ];
        }
        self.pending_request = Some(client_id.clone());
        self.state = OperatorCallState::PendingRequest;
        vec![OperatorAction::Notice(format!(
            "Incoming call request from client {client_id}."
        ))]
    }

    fn on_answer(&mut self, sdp: String) -> Vec<OperatorAction> {
        if sdp.is_empty() {
            tracing::warn!("answer with empty session description ignored");
            return vec![OperatorAction::Notice(
                "Received a malformed call answer.".to_string(),
            )];
        }
        if self.state != OperatorCallState::Calling {
            // The visitor answered after we already tore down.
            tracing::debug!(state = ?self.state, "answer ignored, no live call attempt");
            return Vec::new();
        }
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("answer ignored, no session");
            return Vec::new();
        };

        match session.apply_remote_description(SdpKind::Answer, &sdp) {
            Ok(()) => Vec::new(),
            Err(e) => self.fail_session(format!("Could not apply the call answer: {e}")),
        }
    }

    fn on_remote_candidate(&mut self, candidate: Value) -> Vec<OperatorAction> {
        if candidate.is_null() {
            tracing::warn!("null connectivity candidate ignored");
            return vec![OperatorAction::Notice(
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

    fn on_local_candidate(&mut self, candidate: Value) -> Vec<OperatorAction> {
        if self.session.is_none() || !self.relay_open {
            tracing::debug!("local candidate dropped, no session or relay closed");
            return Vec::new();
        }
        vec![OperatorAction::Send(FromOperator::WebrtcCandidate {
            target_client_id: self.active_client.clone(),
            candidate,
        })]
    }

    fn on_link(&mut self, link: LinkState) -> Vec<OperatorAction> {
        let negotiating = matches!(
            self.state,
            OperatorCallState::Calling | OperatorCallState::Connected
        );
        if !negotiating {
            tracing::debug!(state = ?self.state, ?link, "link transition ignored");
            return Vec::new();
        }

        if link.is_terminal() {
            self.release_session();
            vec![OperatorAction::Notice("Voice link ended.".to_string())]
        } else {
            self.state = OperatorCallState::Connected;
            vec![OperatorAction::Notice(
                "Voice link established.".to_string(),
            )]
        }
    }

    /// The visitor's connection is gone: presence update plus an implicit
    /// end of any in-progress call or pending request.
    fn on_client_gone(&mut self, client_id: &str, notice: String) -> Vec<OperatorAction> {
        if self.active_client.as_deref() == Some(client_id) {
            self.active_client = None;
        }
        if self.pending_request.as_deref() == Some(client_id) {
            self.pending_request = None;
            if self.state == OperatorCallState::PendingRequest {
                self.state = OperatorCallState::Idle;
            }
        }
        if self.session.is_some() {
            self.release_session();
        }
        vec![OperatorAction::Notice(notice)]
    }

    /// A hangup-class signal from the visitor: teardown without replying.
    fn on_remote_teardown(&mut self, notice: String) -> Vec<OperatorAction> {
        if self.state == OperatorCallState::Idle && self.session.is_none() {
            return vec![OperatorAction::Notice(notice)];
        }
        self.release_session();
        vec![OperatorAction::Notice(notice)]
    }

    fn on_connection_closed(&mut self) -> Vec<OperatorAction> {
        self.relay_open = false;
        self.active_client = None;
        self.pending_request = None;
        if self.state == OperatorCallState::Idle && self.session.is_none() {
            return Vec::new();
        }
        self.release_session();
        vec![OperatorAction::Notice(
            "Connection to the server lost. Call ended.".to_string(),
        )]
    }

    fn fail_session(&mut self, notice: String) -> Vec<OperatorAction> {
        self.release_session();
        vec![OperatorAction::Notice(notice)]
    }

    fn release_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.pending_request = None;
        self.state = OperatorCallState::Idle;
    }
}
