//! Verifier-Client: remote source verification for regkit
//!
//! Submits one deployed contract at a time to a source-verification
//! service, either by driving the build toolchain's `verify-contract`
//! command or by calling the verifier's HTTP API directly.
//!
//! The client never interprets the response. It returns the raw text and
//! whether the submission exited successfully; classification happens in
//! `regkit-core`.

pub mod client;
pub mod error;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::{VerifierClient, VerifierConfig, VerifierMode};
pub use error::VerifierError;

/// Result type for verifier operations
pub type Result<T> = std::result::Result<T, VerifierError>;

/// A single verification submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationRequest {
    /// Chain identifier the contract lives on.
    pub chain_id: u64,
    /// Deployed address, `0x`-prefixed hex.
    pub address: String,
    /// Fully-qualified artifact name (`path/File.sol:Name`).
    pub contract: String,
    /// ABI-encoded constructor arguments, `0x`-prefixed hex.
    pub constructor_args: Option<String>,
}

/// Raw outcome of a submission: exit status plus captured text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResponse {
    /// Whether the command exited zero / the API answered 2xx.
    pub success: bool,
    /// Process exit code or HTTP status code.
    pub exit_code: i32,
    /// Combined stdout+stderr, or the response body.
    pub output: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Backend able to submit a verification request.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Submit `request` and return the raw response.
    async fn submit(&self, request: &VerificationRequest) -> Result<SubmissionResponse>;
}
