//! The signaling relay: slot registry, envelope routing, and identity
//! translation.
//!
//! The relay holds no negotiation logic. It owns the two single-occupancy
//! connection slots, validates inbound envelopes, and forwards them to the
//! opposite slot, injecting the client identity toward the operator and
//! stripping it toward the client. With exactly one possible destination per
//! direction, routing is an O(1) slot lookup; the registry is keyed by role
//! only, and the `clientId` fields in the taxonomy are what a future
//! multi-client registry would key on.

use std::sync::Arc;
use switchboard_analysis::{AnalysisInput, AnalysisService};
use switchboard_types::{generate_client_id, FromClient, FromOperator, ToClient, ToOperator};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// One attached client connection.
struct ClientSlot {
    session: Uuid,
    client_id: String,
    sender: mpsc::Sender<String>,
}

/// One attached operator connection.
struct OperatorSlot {
    session: Uuid,
    sender: mpsc::Sender<String>,
}

/// Single-occupancy binding of each role to a live connection.
///
/// Each slot sits behind its own lock so the occupancy check and the write
/// happen atomically: two connections racing for the same empty slot cannot
/// both win.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    client: Arc<Mutex<Option<ClientSlot>>>,
    operator: Arc<Mutex<Option<OperatorSlot>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the client slot if empty, generating a fresh identity.
    /// Returns `None` when the slot is occupied.
    pub async fn try_attach_client(
        &self,
        sender: mpsc::Sender<String>,
    ) -> Option<(String, Uuid)> {
        let mut slot = self.client.lock().await;
        if slot.is_some() {
            return None;
        }
        let client_id = generate_client_id();
        let session = Uuid::new_v4();
        *slot = Some(ClientSlot {
            session,
            client_id: client_id.clone(),
            sender,
        });
        Some((client_id, session))
    }

    /// Claims the operator slot if empty. Returns `None` when occupied.
    pub async fn try_attach_operator(&self, sender: mpsc::Sender<String>) -> Option<Uuid> {
        let mut slot = self.operator.lock().await;
        if slot.is_some() {
            return None;
        }
        let session = Uuid::new_v4();
        *slot = Some(OperatorSlot { session, sender });
        Some(session)
    }

    /// Clears the client slot if `session` still owns it, returning the
    /// detached identity. A stale detach (the slot was already replaced) is
    /// a no-op.
    pub async fn detach_client(&self, session: Uuid) -> Option<String> {
        let mut slot = self.client.lock().await;
        let owned = matches!(slot.as_ref(), Some(current) if current.session == session);
        if !owned {
            return None;
        }
        slot.take().map(|current| current.client_id)
    }

    /// Clears the operator slot if `session` still owns it.
    pub async fn detach_operator(&self, session: Uuid) -> bool {
        let mut slot = self.operator.lock().await;
        let owned = matches!(slot.as_ref(), Some(current) if current.session == session);
        if owned {
            *slot = None;
        }
        owned
    }

    /// The identity of the currently attached client, if any.
    pub async fn client_id(&self) -> Option<String> {
        self.client.lock().await.as_ref().map(|s| s.client_id.clone())
    }

    /// Serializes and queues an envelope for the client. Returns `false`
    /// when no client is attached.
    pub async fn send_to_client(&self, envelope: &ToClient) -> bool {
        let slot = self.client.lock().await;
        let Some(current) = slot.as_ref() else {
            return false;
        };
        queue(&current.sender, envelope, "client");
        true
    }

    /// Serializes and queues an envelope for the operator. Returns `false`
    /// when no operator is attached.
    pub async fn send_to_operator(&self, envelope: &ToOperator) -> bool {
        let slot = self.operator.lock().await;
        let Some(current) = slot.as_ref() else {
            return false;
        };
        queue(&current.sender, envelope, "operator");
        true
    }
}

/// Queues a serialized envelope on a connection's outbound channel. A full
/// channel means the consumer is too slow; the message is dropped with a
/// warning rather than growing the buffer without bound.
fn queue<T: serde::Serialize>(sender: &mpsc::Sender<String>, envelope: &T, role: &str) {
    match serde_json::to_string(envelope) {
        Ok(json) => {
            if let Err(e) = sender.try_send(json) {
                tracing::warn!(role, "dropping message for slow consumer: {e}");
            }
        }
        Err(e) => {
            tracing::error!(role, "failed to serialize outbound envelope: {e}");
        }
    }
}

/// Escapes chat text before it is relayed or analysed.
fn sanitize_text(text: &str) -> String {
    text.replace('<', "&lt;").replace('>', "&gt;")
}

/// The relay proper: routes envelopes between the two slots and feeds the
/// analysis subprocess.
pub struct Relay {
    registry: ConnectionRegistry,
    analysis: Option<AnalysisService>,
}

impl Relay {
    pub fn new(analysis: Option<AnalysisService>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            analysis,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Attaches a client connection: claims the slot, hands the client its
    /// identity, and notifies a present operator.
    pub async fn attach_client(&self, sender: mpsc::Sender<String>) -> Option<(String, Uuid)> {
        let (client_id, session) = self.registry.try_attach_client(sender).await?;

        self.registry
            .send_to_client(&ToClient::YourId {
                client_id: client_id.clone(),
            })
            .await;
        self.registry
            .send_to_operator(&ToOperator::ClientConnected {
                client_id: client_id.clone(),
            })
            .await;
        self.registry
            .send_to_operator(&ToOperator::ActiveClients {
                client_ids: vec![client_id.clone()],
            })
            .await;

        Some((client_id, session))
    }

    /// Attaches an operator connection: claims the slot and reports current
    /// client presence.
    pub async fn attach_operator(&self, sender: mpsc::Sender<String>) -> Option<Uuid> {
        let session = self.registry.try_attach_operator(sender).await?;

        let client_ids: Vec<String> = self.registry.client_id().await.into_iter().collect();
        self.registry
            .send_to_operator(&ToOperator::ActiveClients {
                client_ids: client_ids.clone(),
            })
            .await;
        if let Some(client_id) = client_ids.into_iter().next() {
            self.registry
                .send_to_operator(&ToOperator::ClientConnected { client_id })
                .await;
        }

        Some(session)
    }

    /// Routes one envelope from the client direction.
    ///
    /// Malformed traffic from this direction is logged and dropped without
    /// acknowledgment; peer absence is answered with a `system_error`.
    pub async fn handle_client_envelope(&self, client_id: &str, envelope: FromClient) {
        if !envelope.has_required_payload() {
            tracing::warn!(client_id, ?envelope, "client envelope missing payload, dropped");
            return;
        }

        let forwarded = match envelope {
            FromClient::Message { text } => {
                let text = sanitize_text(&text);
                self.spawn_analysis(client_id, &text);
                ToOperator::ClientMessage {
                    client_id: client_id.to_string(),
                    text,
                }
            }
            // The client's own offer stops here: only the bare request
            // travels on, and the operator starts a fresh negotiation.
            FromClient::RequestCall { sdp: _ } => ToOperator::ClientRequestCall {
                client_id: client_id.to_string(),
            },
            FromClient::WebrtcAnswer { sdp } => ToOperator::WebrtcAnswer {
                client_id: client_id.to_string(),
                sdp,
            },
            FromClient::WebrtcCandidate { candidate } => ToOperator::WebrtcCandidate {
                client_id: client_id.to_string(),
                candidate,
            },
            FromClient::WebrtcHangup => ToOperator::ClientHangup {
                client_id: client_id.to_string(),
            },
            FromClient::ClientAcceptedCall => ToOperator::ClientAcceptedCall {
                client_id: client_id.to_string(),
            },
            FromClient::ClientDeclinedCall => ToOperator::ClientDeclinedCall {
                client_id: client_id.to_string(),
            },
            FromClient::ClientBusy => ToOperator::ClientBusy {
                client_id: client_id.to_string(),
            },
        };

        if !self.registry.send_to_operator(&forwarded).await {
            tracing::warn!(client_id, "no operator connected, informing client");
            self.registry
                .send_to_client(&ToClient::system_error(
                    "The operator is not connected. Try again later.",
                ))
                .await;
        }
    }

    /// Routes one envelope from the operator direction.
    ///
    /// Malformed traffic from this direction is answered with a
    /// `system_error`; so is peer absence or a stale client target.
    pub async fn handle_operator_envelope(&self, envelope: FromOperator) {
        if !envelope.has_required_payload() {
            tracing::warn!(?envelope, "operator envelope missing payload");
            self.registry
                .send_to_operator(&ToOperator::system_error(
                    "Message rejected: required payload missing.",
                ))
                .await;
            return;
        }

        let (target, forwarded) = match envelope {
            FromOperator::MessageToClient { client_id, text } => {
                let text = sanitize_text(&text);
                (client_id, ToClient::OperatorMessage { text })
            }
            FromOperator::WebrtcOffer {
                target_client_id,
                sdp,
            } => (target_client_id, ToClient::WebrtcOffer { sdp }),
            FromOperator::WebrtcCandidate {
                target_client_id,
                candidate,
            } => (target_client_id, ToClient::WebrtcCandidate { candidate }),
            FromOperator::WebrtcHangup { target_client_id } => {
                (target_client_id, ToClient::OperatorHangup)
            }
            FromOperator::OperatorBusy { target_client_id } => {
                (Some(target_client_id), ToClient::WebrtcBusy)
            }
            FromOperator::CallDeclinedByOperator { target_client_id } => {
                (Some(target_client_id), ToClient::CallDeclinedByOperator)
            }
        };

        let Some(current_id) = self.registry.client_id().await else {
            tracing::warn!("no client connected, informing operator");
            self.registry
                .send_to_operator(&ToOperator::system_error(
                    "No client is connected. The message was not delivered.",
                ))
                .await;
            return;
        };
        if let Some(target) = target {
            if target != current_id {
                tracing::warn!(%target, current = %current_id, "stale client target");
                self.registry
                    .send_to_operator(&ToOperator::system_error(format!(
                        "Unknown client target: {target}."
                    )))
                    .await;
                return;
            }
        }

        // Operator chat is analysed too, keyed by the recipient client.
        if let ToClient::OperatorMessage { text } = &forwarded {
            self.spawn_analysis(&current_id, text);
        }

        self.registry.send_to_client(&forwarded).await;
    }

    /// Answers an unparseable operator frame in-band.
    pub async fn reject_operator_envelope(&self) {
        self.registry
            .send_to_operator(&ToOperator::system_error(
                "Message rejected: unrecognized or malformed envelope.",
            ))
            .await;
    }

    /// Tears down state after the client connection closed normally.
    ///
    /// A dropped transport always implies an implicit hangup: the operator
    /// gets the presence change followed by a synthesized `client_hangup`,
    /// whether or not a call was in progress — the operator machine treats
    /// hangup in idle as a no-op.
    pub async fn client_closed(&self, session: Uuid, reason: String) {
        let Some(client_id) = self.registry.detach_client(session).await else {
            return;
        };
        tracing::info!(%client_id, %reason, "client disconnected");
        self.registry
            .send_to_operator(&ToOperator::ClientDisconnected {
                client_id: client_id.clone(),
                reason,
            })
            .await;
        self.registry
            .send_to_operator(&ToOperator::ClientHangup { client_id })
            .await;
    }

    /// Tears down state after the client connection failed.
    pub async fn client_errored(&self, session: Uuid, error: String) {
        let Some(client_id) = self.registry.detach_client(session).await else {
            return;
        };
        tracing::warn!(%client_id, %error, "client connection failed");
        self.registry
            .send_to_operator(&ToOperator::ClientError {
                client_id: client_id.clone(),
                error,
            })
            .await;
        self.registry
            .send_to_operator(&ToOperator::ClientHangup { client_id })
            .await;
    }

    /// Tears down state after the operator connection closed normally.
    pub async fn operator_closed(&self, session: Uuid) {
        if !self.registry.detach_operator(session).await {
            return;
        }
        tracing::info!("operator disconnected");
        self.registry
            .send_to_client(&ToClient::OperatorDisconnected)
            .await;
        self.registry.send_to_client(&ToClient::OperatorHangup).await;
    }

    /// Tears down state after the operator connection failed.
    pub async fn operator_errored(&self, session: Uuid) {
        if !self.registry.detach_operator(session).await {
            return;
        }
        tracing::warn!("operator connection failed");
        self.registry.send_to_client(&ToClient::OperatorError).await;
        self.registry.send_to_client(&ToClient::OperatorHangup).await;
    }

    /// Hands one chat message to the analysis subprocess and forwards its
    /// results to the operator as they stream in.
    fn spawn_analysis(&self, client_id: &str, text: &str) {
        let Some(service) = &self.analysis else {
            return;
        };
        let mut results = service.dispatch(AnalysisInput {
            client_id: client_id.to_string(),
            text: text.to_string(),
        });
        let registry = self.registry.clone();
        tokio::spawn(async move {
            while let Some(report) = results.recv().await {
                let suggestion = report.suggestion().map(str::to_string);
                let delivered = registry
                    .send_to_operator(&ToOperator::ProcessingResults { data: report.data })
                    .await;
                if !delivered {
                    tracing::warn!("analysis results ready but no operator connected");
                    continue;
                }
                if let Some(text) = suggestion {
                    registry
                        .send_to_operator(&ToOperator::AiSuggestion { text })
                        .await;
                }
            }
        });
    }
}
