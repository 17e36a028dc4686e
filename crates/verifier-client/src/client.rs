//! Verification service client
//!
//! Two transports are supported: the toolchain CLI (`forge verify-contract`
//! by default), which handles compilation settings on its own, and a plain
//! HTTP API that receives the request as JSON.

use crate::error::VerifierError;
use crate::{Result, SubmissionResponse, VerificationRequest, Verifier};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// How submissions reach the verifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerifierMode {
    /// Spawn the toolchain's verify command.
    Cli,
    /// POST the request to the verifier API.
    Http,
}

impl std::str::FromStr for VerifierMode {
    type Err = VerifierError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cli" => Ok(VerifierMode::Cli),
            "http" => Ok(VerifierMode::Http),
            other => Err(VerifierError::InvalidConfig(format!(
                "unknown verifier mode '{}'",
                other
            ))),
        }
    }
}

/// Verifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Verifier server URL
    pub verifier_url: String,
    /// Verifier flavour passed to the CLI (`sourcify`, `etherscan`, ...)
    pub verifier: String,
    /// Chain the contracts live on
    pub chain_id: u64,
    /// API key (optional for public verifiers)
    pub api_key: Option<String>,
    /// Transport
    pub mode: VerifierMode,
    /// Toolchain binary used in CLI mode
    pub binary: String,
    /// Working directory for the CLI (the compiled project)
    pub project_root: PathBuf,
    /// Per-request timeout in seconds (0 disables)
    pub timeout_secs: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        VerifierConfig {
            verifier_url: std::env::var("VERIFIER_URL")
                .unwrap_or_else(|_| "https://sourcify.dev/server".to_string()),
            verifier: std::env::var("VERIFIER").unwrap_or_else(|_| "sourcify".to_string()),
            chain_id: std::env::var("CHAIN_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(11_155_111),
            api_key: std::env::var("VERIFIER_API_KEY").ok(),
            mode: VerifierMode::Cli,
            binary: "forge".to_string(),
            project_root: PathBuf::from("."),
            timeout_secs: 120,
        }
    }
}

impl VerifierConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific verifier
    pub fn new(verifier_url: &str, chain_id: u64) -> Self {
        VerifierConfig {
            verifier_url: verifier_url.to_string(),
            chain_id,
            ..Self::default()
        }
    }

    /// Set API key
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    /// Set transport
    pub fn with_mode(mut self, mode: VerifierMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the CLI binary
    pub fn with_binary(mut self, binary: &str) -> Self {
        self.binary = binary.to_string();
        self
    }
}

/// Verifier client for source-verification submissions
pub struct VerifierClient {
    config: VerifierConfig,
    http_client: reqwest::Client,
}

impl VerifierClient {
    /// Create a new verifier client
    pub fn new(config: VerifierConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent("regkit-verifier-client/0.3");
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let http_client = builder.build()?;

        Ok(VerifierClient {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(VerifierConfig::from_env())
    }

    /// Active configuration
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Argument vector for CLI mode (without the binary itself).
    pub fn cli_args(&self, request: &VerificationRequest) -> Vec<String> {
        let mut args = vec![
            "verify-contract".to_string(),
            request.address.clone(),
            request.contract.clone(),
            "--chain".to_string(),
            request.chain_id.to_string(),
            "--verifier".to_string(),
            self.config.verifier.clone(),
            "--verifier-url".to_string(),
            self.config.verifier_url.clone(),
            "--watch".to_string(),
        ];
        if let Some(ctor) = &request.constructor_args {
            args.push("--constructor-args".to_string());
            args.push(ctor.clone());
        }
        if let Some(key) = &self.config.api_key {
            args.push("--etherscan-api-key".to_string());
            args.push(key.clone());
        }
        args
    }

    /// Submit using the toolchain CLI
    async fn submit_cli(&self, request: &VerificationRequest) -> Result<SubmissionResponse> {
        if self.config.binary.is_empty() {
            return Err(VerifierError::BinaryNotConfigured);
        }

        let start = Instant::now();
        let args = self.cli_args(request);
        debug!("Running {} {}", self.config.binary, args.join(" "));

        let child = Command::new(&self.config.binary)
            .args(&args)
            .current_dir(&self.config.project_root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VerifierError::Spawn {
                binary: self.config.binary.clone(),
                reason: e.to_string(),
            })?;

        let output = if self.config.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.config.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| VerifierError::Timeout {
                address: request.address.clone(),
                secs: self.config.timeout_secs,
            })??
        } else {
            child.wait_with_output().await?
        };

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        Ok(SubmissionResponse {
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
            output: text,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Submit using the HTTP API
    async fn submit_http(&self, request: &VerificationRequest) -> Result<SubmissionResponse> {
        let start = Instant::now();
        let url = format!("{}/verify", self.config.verifier_url.trim_end_matches('/'));

        let mut call = self.http_client.post(&url).json(request);
        if let Some(key) = &self.config.api_key {
            call = call.bearer_auth(key);
        }

        let response = call.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!("Verifier answered {} for {}", status, request.address);
        }

        Ok(SubmissionResponse {
            success: status.is_success(),
            exit_code: i32::from(status.as_u16()),
            output: body,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl Verifier for VerifierClient {
    async fn submit(&self, request: &VerificationRequest) -> Result<SubmissionResponse> {
        match self.config.mode {
            VerifierMode::Cli => self.submit_cli(request).await,
            VerifierMode::Http => self.submit_http(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> VerificationRequest {
        VerificationRequest {
            chain_id: 84532,
            address: "0x00000000000000000000000000000000000000aa".to_string(),
            contract: "src/IdentityRegistry.sol:IdentityRegistry".to_string(),
            constructor_args: None,
        }
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("cli".parse::<VerifierMode>().unwrap(), VerifierMode::Cli);
        assert_eq!("HTTP".parse::<VerifierMode>().unwrap(), VerifierMode::Http);
        assert!("carrier-pigeon".parse::<VerifierMode>().is_err());
    }

    #[test]
    fn test_new_config_overrides_url_and_chain() {
        let config = VerifierConfig::new("http://localhost:5555", 31337).with_api_key("k");
        assert_eq!(config.verifier_url, "http://localhost:5555");
        assert_eq!(config.chain_id, 31337);
        assert_eq!(config.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_cli_args_without_constructor() {
        let mut config = VerifierConfig::new("http://localhost:5555", 84532);
        config.api_key = None;
        let client = VerifierClient::new(config).unwrap();
        let args = client.cli_args(&request());
        assert_eq!(args[0], "verify-contract");
        assert_eq!(args[1], "0x00000000000000000000000000000000000000aa");
        assert_eq!(args[2], "src/IdentityRegistry.sol:IdentityRegistry");
        assert!(args.windows(2).any(|w| w[0] == "--chain" && w[1] == "84532"));
        assert!(!args.iter().any(|a| a == "--constructor-args"));
    }

    #[test]
    fn test_cli_args_with_constructor() {
        let client = VerifierClient::new(VerifierConfig::new("http://localhost", 1)).unwrap();
        let mut req = request();
        req.constructor_args = Some("0xdeadbeef".to_string());
        let args = client.cli_args(&req);
        assert!(args
            .windows(2)
            .any(|w| w[0] == "--constructor-args" && w[1] == "0xdeadbeef"));
    }

    #[test]
    fn test_request_serde_roundtrip() {
        let req = request();
        let json = serde_json::to_string(&req).unwrap();
        let back: VerificationRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req, back);
    }
}
