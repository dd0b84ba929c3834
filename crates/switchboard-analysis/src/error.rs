use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("failed to spawn analysis script: {0}")]
    Spawn(String),

    #[error("analysis I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode analysis input: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("analysis script timed out after {0} seconds")]
    Timeout(u64),
}
