//! Error types for difficulty validation

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// The chain view contradicts its own linkage guarantees. Fatal for the
    /// validation path that hit it.
    #[error("Chain invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Invalid chain parameters: {0}")]
    InvalidParameters(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ConsensusError {
    fn from(err: serde_json::Error) -> Self {
        ConsensusError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
