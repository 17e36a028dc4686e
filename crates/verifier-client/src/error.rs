//! Error types for verifier-client

use thiserror::Error;

/// Errors that can occur while talking to a verification service
#[derive(Error, Debug)]
pub enum VerifierError {
    /// Command-line mode configured with an empty binary
    #[error("verifier binary is not configured")]
    BinaryNotConfigured,

    /// The verifier command could not be spawned
    #[error("failed to spawn verifier command `{binary}`: {reason}")]
    Spawn { binary: String, reason: String },

    /// The submission did not finish in time
    #[error("verification of {address} timed out after {secs} seconds")]
    Timeout { address: String, secs: u64 },

    /// Invalid configuration value
    #[error("invalid verifier configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error (verifier API)
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for VerifierError {
    fn from(err: reqwest::Error) -> Self {
        VerifierError::Http(err.to_string())
    }
}
