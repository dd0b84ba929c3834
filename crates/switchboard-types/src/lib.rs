//! Shared wire types for the switchboard platform.
//!
//! This crate defines the signaling envelope taxonomy exchanged over the two
//! WebSocket connections (visitor and operator), plus the role and identity
//! types the relay uses for slot bookkeeping. It is pure data: the only
//! behavior here is payload validation, so every other crate can depend on
//! it without pulling in I/O.
//!
//! Envelopes are internally tagged (`{"type": ...}`) and use camelCase field
//! names on the wire (`clientId`, `targetClientId`) to match the browser
//! endpoints.

pub mod envelope;

pub use envelope::{FromClient, FromOperator, ToClient, ToOperator};

use serde::{Deserialize, Serialize};

/// Close reason sent when a connection attempt targets an occupied slot.
///
/// The relay admits at most one live connection per role; a second attempt is
/// closed immediately with this reason and the existing connection is left
/// untouched.
pub const SLOT_OCCUPIED_REASON: &str = "ERR_SLOT_OCCUPIED";

/// The two participant roles the relay bridges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The visitor side (`/client` endpoint). Carries a server-generated id.
    Client,
    /// The support agent side (`/operator` endpoint). Singleton, no id.
    Operator,
}

impl Role {
    /// Returns the string label used in logs and close reasons.
    pub fn label(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Operator => "operator",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Generates a fresh opaque client identity.
pub fn generate_client_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
