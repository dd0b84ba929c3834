//! The media-session capability boundary.
//!
//! The actual audio transport (microphone acquisition, connectivity
//! establishment, media flow) lives outside this workspace. The state
//! machines drive it through [`MediaSession`], and a [`MediaEngine`] hands
//! out fresh sessions. Everything the transport reports back asynchronously
//! (link transitions, locally gathered candidates) arrives as ordinary
//! events in the owning machine's input stream, so the trait itself stays
//! synchronous.

use crate::error::MediaError;
use serde_json::Value;

/// Which side of the negotiation a session description belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Connectivity transitions reported by the media layer.
///
/// Delivered to the state machines as events; a transition arriving after
/// the machine has already returned to idle is ignored, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl LinkState {
    /// Whether this transition ends the call.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Connected)
    }
}

/// One negotiable audio session.
///
/// Applying a remote offer while a local offer is already set is permitted:
/// implementations roll the local offer back, which is how the
/// client-initiated flow resolves the offer collision (see DESIGN.md).
pub trait MediaSession: Send {
    /// Acquires the local microphone and attaches it to the session.
    fn attach_local_audio(&mut self) -> Result<(), MediaError>;

    /// Produces a local offer and sets it as the local description.
    fn create_offer(&mut self) -> Result<String, MediaError>;

    /// Produces a local answer to the applied remote offer.
    fn create_answer(&mut self) -> Result<String, MediaError>;

    /// Applies a remote session description.
    fn apply_remote_description(&mut self, kind: SdpKind, sdp: &str) -> Result<(), MediaError>;

    /// Applies a remote connectivity candidate. Callers must only invoke
    /// this after a remote description has been applied; earlier candidates
    /// are queued by [`crate::CallSession`].
    fn apply_remote_candidate(&mut self, candidate: &Value) -> Result<(), MediaError>;

    /// Whether a local offer is currently set.
    fn has_local_offer(&self) -> bool;

    /// Tears the session down and releases the microphone. Idempotent.
    fn close(&mut self);
}

/// Factory for [`MediaSession`] instances.
pub trait MediaEngine: Send {
    fn create_session(&mut self) -> Result<Box<dyn MediaSession>, MediaError>;
}
