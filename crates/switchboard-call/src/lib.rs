//! Call negotiation state machines for the switchboard platform.
//!
//! Two coupled state machines, one per participant role, decide for every
//! incoming or outgoing event what is legal in the current call state and
//! which side effects follow. Each machine is a synchronous reducer over a
//! single event stream: user intents, relay envelopes, and media-layer
//! reports all enter through one `handle` call and are processed one at a
//! time in arrival order, so overlapping asynchronous callbacks cannot
//! corrupt the state.
//!
//! # Core types
//!
//! - [`ClientMachine`] / [`OperatorMachine`] — the two reducers
//! - [`CallSession`] — per-role record of an in-progress call
//! - [`MediaSession`] / [`MediaEngine`] — the opaque audio-transport boundary
//!
//! The machines never perform I/O. Sending envelopes, rendering notices, and
//! pumping the media layer are the embedding surface's job, driven by the
//! action lists the reducers return.

pub mod client;
pub mod error;
pub mod media;
pub mod operator;
pub mod session;

pub use client::{ClientAction, ClientCallState, ClientEvent, ClientMachine};
pub use error::MediaError;
pub use media::{LinkState, MediaEngine, MediaSession, SdpKind};
pub use operator::{OperatorAction, OperatorCallState, OperatorEvent, OperatorMachine};
pub use session::CallSession;
