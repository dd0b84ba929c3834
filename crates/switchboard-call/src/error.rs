use thiserror::Error;

/// Failures reported by the media-session capability.
#[derive(Error, Debug)]
pub enum MediaError {
    /// Local audio could not be acquired (no device, permission denied).
    #[error("failed to acquire local audio: {0}")]
    Acquisition(String),

    /// Producing or applying a session description or candidate failed.
    #[error("negotiation failure: {0}")]
    Negotiation(String),

    /// The session was already torn down.
    #[error("media session is closed")]
    Closed,
}
