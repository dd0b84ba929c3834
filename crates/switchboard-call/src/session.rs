//! The per-role record of an in-progress or negotiated call.

use crate::error::MediaError;
use crate::media::{MediaSession, SdpKind};
use serde_json::Value;
use switchboard_types::Role;

/// Holds the media handle and negotiation progress for one call attempt.
///
/// A session exists exactly while its owning state machine is not idle.
/// Remote candidates that arrive before any remote description are queued
/// here and flushed to the media layer as soon as the first description is
/// applied; teardown drops the queue along with the media handle.
pub struct CallSession {
    initiator: Role,
    media: Box<dyn MediaSession>,
    remote_offer: Option<String>,
    queued_candidates: Vec<Value>,
    remote_described: bool,
}

impl CallSession {
    pub fn new(initiator: Role, media: Box<dyn MediaSession>) -> Self {
        Self {
            initiator,
            media,
            remote_offer: None,
            queued_candidates: Vec::new(),
            remote_described: false,
        }
    }

    /// Which role started this call attempt.
    pub fn initiator(&self) -> Role {
        self.initiator
    }

    pub fn media(&mut self) -> &mut dyn MediaSession {
        self.media.as_mut()
    }

    /// Applies a remote description, then flushes any candidates that were
    /// queued while no description existed.
    pub fn apply_remote_description(
        &mut self,
        kind: SdpKind,
        sdp: &str,
    ) -> Result<(), MediaError> {
        self.media.apply_remote_description(kind, sdp)?;
        self.remote_described = true;
        for candidate in self.queued_candidates.drain(..) {
            self.media.apply_remote_candidate(&candidate)?;
        }
        Ok(())
    }

    /// Accepts a remote candidate, queueing it if no remote description has
    /// been applied yet.
    pub fn accept_candidate(&mut self, candidate: Value) -> Result<(), MediaError> {
        if self.remote_described {
            self.media.apply_remote_candidate(&candidate)
        } else {
            self.queued_candidates.push(candidate);
            Ok(())
        }
    }

    /// Remembers a received remote offer that has not been consumed yet
    /// (the incoming-call flow keeps it until the user accepts or declines).
    pub fn remember_remote_offer(&mut self, sdp: String) {
        self.remote_offer = Some(sdp);
    }

    /// Consumes the remembered remote offer, if any.
    pub fn take_remote_offer(&mut self) -> Option<String> {
        self.remote_offer.take()
    }

    /// Tears the session down: releases the media handle and clears all
    /// pending negotiation state, even mid-negotiation.
    pub fn close(&mut self) {
        self.queued_candidates.clear();
        self.remote_offer = None;
        self.media.close();
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        self.close();
    }
}
