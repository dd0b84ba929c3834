//! Signaling envelope taxonomy, one enum per wire direction.
//!
//! The relay is the only component that sees all four directions; each
//! endpoint parses exactly one inbound and produces exactly one outbound
//! enum. Identity translation (adding `clientId` toward the operator,
//! stripping `clientId`/`targetClientId` toward the client) happens at the
//! relay when it maps an inbound variant to its outbound counterpart.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages the visitor endpoint sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FromClient {
    /// Free-form chat text for the operator.
    Message { text: String },
    /// Ask the operator to start a call. Carries the client's local offer,
    /// which the relay consumes without forwarding; the operator learns only
    /// that a callback was requested.
    RequestCall { sdp: String },
    /// Answer to an operator offer.
    WebrtcAnswer { sdp: String },
    /// A locally gathered connectivity candidate.
    WebrtcCandidate { candidate: Value },
    /// End the current call.
    WebrtcHangup,
    /// The visitor pressed accept on an incoming call. Informational.
    ClientAcceptedCall,
    /// The visitor pressed decline on an incoming call.
    ClientDeclinedCall,
    /// An offer arrived while the visitor was already busy with a call.
    ClientBusy,
}

impl FromClient {
    /// Whether a payload-bearing variant actually carries its payload.
    ///
    /// An envelope with an SDP- or candidate-bearing type whose payload is
    /// empty or null is malformed and must not be acted on.
    pub fn has_required_payload(&self) -> bool {
        match self {
            Self::Message { text } => !text.is_empty(),
            Self::RequestCall { sdp } | Self::WebrtcAnswer { sdp } => !sdp.is_empty(),
            Self::WebrtcCandidate { candidate } => !candidate.is_null(),
            Self::WebrtcHangup
            | Self::ClientAcceptedCall
            | Self::ClientDeclinedCall
            | Self::ClientBusy => true,
        }
    }
}

/// Messages the relay sends to the visitor endpoint.
///
/// No variant carries a client identity: the visitor has exactly one
/// possible peer, so the relay strips `clientId`/`targetClientId` before
/// forwarding in this direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToClient {
    /// Sent immediately after the visitor connects.
    YourId {
        #[serde(rename = "clientId")]
        client_id: String,
    },
    /// Chat text from the operator.
    OperatorMessage { text: String },
    /// The operator's offer, either unsolicited (operator-initiated call) or
    /// in response to a `request_call`.
    WebrtcOffer { sdp: String },
    /// A connectivity candidate gathered on the operator side.
    WebrtcCandidate { candidate: Value },
    /// The operator ended the call (explicitly or via disconnect).
    OperatorHangup,
    /// The operator connection closed.
    OperatorDisconnected,
    /// The operator connection failed.
    OperatorError,
    /// The operator is busy and cannot take the requested call.
    WebrtcBusy,
    /// The operator declined the visitor's callback request.
    CallDeclinedByOperator,
    /// Relay-side error surfaced in-band.
    SystemError { text: String },
}

impl ToClient {
    pub fn system_error(text: impl Into<String>) -> Self {
        Self::SystemError { text: text.into() }
    }
}

/// Messages the operator endpoint sends to the relay.
///
/// Target fields are optional where the original endpoint sends them but the
/// single-client relay does not need them; the relay ignores the value and
/// routes to its only client slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FromOperator {
    /// Chat text for the visitor.
    MessageToClient {
        #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        text: String,
    },
    /// Initiate a call by sending an offer to the visitor.
    WebrtcOffer {
        #[serde(
            rename = "targetClientId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        target_client_id: Option<String>,
        sdp: String,
    },
    /// A locally gathered connectivity candidate.
    WebrtcCandidate {
        #[serde(
            rename = "targetClientId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        target_client_id: Option<String>,
        candidate: Value,
    },
    /// End the current call.
    WebrtcHangup {
        #[serde(
            rename = "targetClientId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        target_client_id: Option<String>,
    },
    /// The operator is already in a call; refuse a callback request.
    /// Forwarded to the visitor as `webrtc_busy`.
    OperatorBusy {
        #[serde(rename = "targetClientId")]
        target_client_id: String,
    },
    /// The operator declined a callback request.
    CallDeclinedByOperator {
        #[serde(rename = "targetClientId")]
        target_client_id: String,
    },
}

impl FromOperator {
    /// Whether a payload-bearing variant actually carries its payload.
    pub fn has_required_payload(&self) -> bool {
        match self {
            Self::MessageToClient { text, .. } => !text.is_empty(),
            Self::WebrtcOffer { sdp, .. } => !sdp.is_empty(),
            Self::WebrtcCandidate { candidate, .. } => !candidate.is_null(),
            Self::WebrtcHangup { .. }
            | Self::OperatorBusy { .. }
            | Self::CallDeclinedByOperator { .. } => true,
        }
    }
}

/// Messages the relay sends to the operator endpoint.
///
/// Every client-originated variant carries the `clientId` the relay injects,
/// so the taxonomy already supports keying a future multi-client registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToOperator {
    /// Sent immediately after the operator connects: the 0- or 1-element
    /// list of currently connected visitors.
    ActiveClients {
        #[serde(rename = "clientIds")]
        client_ids: Vec<String>,
    },
    /// A visitor connected.
    ClientConnected {
        #[serde(rename = "clientId")]
        client_id: String,
    },
    /// A visitor connection closed.
    ClientDisconnected {
        #[serde(rename = "clientId")]
        client_id: String,
        reason: String,
    },
    /// A visitor connection failed.
    ClientError {
        #[serde(rename = "clientId")]
        client_id: String,
        error: String,
    },
    /// Chat text from the visitor.
    ClientMessage {
        #[serde(rename = "clientId")]
        client_id: String,
        text: String,
    },
    /// The visitor asked to be called back.
    ClientRequestCall {
        #[serde(rename = "clientId")]
        client_id: String,
    },
    /// The visitor's answer to the operator's offer.
    WebrtcAnswer {
        #[serde(rename = "clientId")]
        client_id: String,
        sdp: String,
    },
    /// A connectivity candidate gathered on the visitor side.
    WebrtcCandidate {
        #[serde(rename = "clientId")]
        client_id: String,
        candidate: Value,
    },
    /// The visitor ended the call (explicitly or via disconnect).
    ClientHangup {
        #[serde(rename = "clientId")]
        client_id: String,
    },
    /// The visitor started answering an incoming call. Informational.
    ClientAcceptedCall {
        #[serde(rename = "clientId")]
        client_id: String,
    },
    /// The visitor declined an incoming call.
    ClientDeclinedCall {
        #[serde(rename = "clientId")]
        client_id: String,
    },
    /// The visitor was busy when the offer arrived.
    ClientBusy {
        #[serde(rename = "clientId")]
        client_id: String,
    },
    /// Relay-side error surfaced in-band.
    SystemError { text: String },
    /// One structured result object from the analysis subprocess, verbatim.
    ProcessingResults { data: Value },
    /// Reply suggestion derived from an analysis result.
    AiSuggestion { text: String },
}

impl ToOperator {
    pub fn system_error(text: impl Into<String>) -> Self {
        Self::SystemError { text: text.into() }
    }
}
