//! Text-analysis subprocess boundary for the switchboard platform.
//!
//! Chat messages are handed to an external analysis script (an agent
//! pipeline outside this workspace) that consumes one `{clientId, text}`
//! JSON object on stdin and eventually prints line-delimited JSON objects
//! with free-form fields (`summary`, `reference_answer`, `action`, `qa`,
//! `intent`, `emotion`, ...) on stdout. The relay forwards each object
//! verbatim to the operator and, opportunistically, derives a reply
//! suggestion from it.
//!
//! One subprocess is spawned per analysed message; runs are bounded by a
//! timeout and killed on drop, so a wedged script can never pin the server.

pub mod error;
pub mod service;

pub use error::AnalysisError;
pub use service::{AnalysisConfig, AnalysisInput, AnalysisReport, AnalysisService};
