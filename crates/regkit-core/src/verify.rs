//! Verification submission and response classification.
//!
//! Every deployed address becomes a [`VerificationTarget`]. Targets are
//! submitted through a [`Verifier`] on a bounded pool; each submission yields
//! exactly one [`VerificationOutcome`] and a failure never stops the others.
//! The [`VerificationReport`] folds the outcomes into one exit status.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use verifier_client::{VerificationRequest, Verifier};

use crate::bundle::BundlePlan;
use crate::deploy::abi::to_hex;
use crate::deploy::registry::{RegistryDeployment, COMPONENTS};
use crate::domain::address::Address;
use crate::domain::error::{RegkitError, Result};
use crate::metrics::METRICS;
use crate::obs::{self, PassSpan};

/// Status of one submission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    AlreadyVerified,
    ExactMatch,
    PartialMatch,
    /// Success without a recognized match phrase.
    Verified,
    Failed,
}

impl VerificationStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self, VerificationStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::AlreadyVerified => "already_verified",
            VerificationStatus::ExactMatch => "exact_match",
            VerificationStatus::PartialMatch => "partial_match",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Phrases {
    already: Option<Regex>,
    exact: Option<Regex>,
    partial: Option<Regex>,
    noise: Vec<Regex>,
}

impl Phrases {
    fn hit(re: &Option<Regex>, text: &str) -> bool {
        re.as_ref().is_some_and(|re| re.is_match(text))
    }
}

const ALREADY_PATTERN: &str = r"(?i)already\s+verified";
const EXACT_PATTERN: &str = r#"(?i)(perfect|exact|full)\s+match|"status"\s*:\s*"perfect""#;
const PARTIAL_PATTERN: &str = r#"(?i)partial\s+match|"status"\s*:\s*"partial""#;

/// Boilerplate the verifier CLI prints around the actual result. `Details:`
/// lines are kept: they often carry the only failure reason.
const NOISE_PATTERNS: [&str; 9] = [
    r"^\s*$",
    r"(?i)^\s*start verifying contract",
    r"(?i)^\s*submitting verification",
    r"(?i)^\s*waiting for verification result",
    r"(?i)^\s*compiler run successful",
    r"(?i)^\s*(warning: )?.*api key.*not (set|provided)",
    r"(?i)^\s*(guid|url):",
    r"(?i)^\s*hint:",
    r"(?i)^\s*(compiling|no files changed|solc \d)",
];

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Verifier response pattern {:?} disabled: {}", pattern, e);
            None
        }
    }
}

fn phrases() -> &'static Phrases {
    static PHRASES: OnceLock<Phrases> = OnceLock::new();
    PHRASES.get_or_init(|| Phrases {
        already: compile(ALREADY_PATTERN),
        exact: compile(EXACT_PATTERN),
        partial: compile(PARTIAL_PATTERN),
        noise: NOISE_PATTERNS.iter().filter_map(|p| compile(p)).collect(),
    })
}

/// Classify a verifier response.
pub fn classify(success: bool, output: &str) -> VerificationStatus {
    let p = phrases();
    if Phrases::hit(&p.already, output) {
        VerificationStatus::AlreadyVerified
    } else if !success {
        VerificationStatus::Failed
    } else if Phrases::hit(&p.exact, output) {
        VerificationStatus::ExactMatch
    } else if Phrases::hit(&p.partial, output) {
        VerificationStatus::PartialMatch
    } else {
        VerificationStatus::Verified
    }
}

/// Drop boilerplate lines the operator already understands.
pub fn strip_noise(output: &str) -> String {
    let noise = &phrases().noise;
    output
        .lines()
        .filter(|line| !noise.iter().any(|re| re.is_match(line)))
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// One address to verify.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationTarget {
    pub label: String,
    pub address: Address,
    /// Fully-qualified artifact name.
    pub contract: String,
    /// `0x`-prefixed ABI-encoded constructor arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor_args: Option<String>,
}

impl VerificationTarget {
    pub fn to_request(&self, chain_id: u64) -> VerificationRequest {
        VerificationRequest {
            chain_id,
            address: self.address.to_string(),
            contract: self.contract.clone(),
            constructor_args: self.constructor_args.clone(),
        }
    }
}

/// The six targets of a deployment, in creation order.
pub fn targets_for(deployment: &RegistryDeployment, plan: &BundlePlan) -> Result<Vec<VerificationTarget>> {
    let wrapper = plan.wrapper.fqn();
    let mut targets = Vec::with_capacity(6);

    for component in COMPONENTS {
        let spec = plan.implementation_for(component).ok_or_else(|| {
            RegkitError::Config(format!("no artifact configured for {}", component))
        })?;
        let parts = deployment.component(component);

        targets.push(VerificationTarget {
            label: format!("{} implementation", component),
            address: parts.implementation,
            contract: spec.fqn(),
            constructor_args: None,
        });
        targets.push(VerificationTarget {
            label: format!("{} proxy", component),
            address: parts.proxy,
            contract: wrapper.clone(),
            constructor_args: Some(to_hex(&parts.constructor_args()?)),
        });
    }

    Ok(targets)
}

/// Outcome of one submission. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub target: Address,
    pub label: String,
    pub status: VerificationStatus,
    pub raw_detail: String,
    pub duration_ms: u64,
}

impl VerificationOutcome {
    pub fn to_error(&self) -> Option<RegkitError> {
        (self.status == VerificationStatus::Failed).then(|| RegkitError::VerificationFailed {
            target: format!("{} ({})", self.label, self.target),
            detail: self.raw_detail.clone(),
        })
    }
}

/// Pool size bounds.
pub const MIN_POOL: usize = 1;
pub const MAX_POOL: usize = 6;

/// Submission settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitConfig {
    /// Concurrent submissions.
    pub pool: usize,
    /// Budget for one submission.
    pub timeout: Duration,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            pool: 4,
            timeout: Duration::from_secs(180),
        }
    }
}

impl SubmitConfig {
    /// Set the pool size, clamped to `MIN_POOL..=MAX_POOL`.
    pub fn with_pool(mut self, pool: usize) -> Self {
        self.pool = pool.clamp(MIN_POOL, MAX_POOL);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Aggregate of all outcomes, in target order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationReport {
    pub outcomes: Vec<VerificationOutcome>,
}

impl VerificationReport {
    pub fn failed(&self) -> Vec<&VerificationOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == VerificationStatus::Failed)
            .collect()
    }

    pub fn count(&self, status: VerificationStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed().is_empty()
    }

    /// 0 iff no submission failed.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn errors(&self) -> Vec<RegkitError> {
        self.outcomes.iter().filter_map(VerificationOutcome::to_error).collect()
    }
}

/// Submits targets to one verifier on one chain.
pub struct VerificationSubmitter {
    verifier: Arc<dyn Verifier>,
    chain_id: u64,
    config: SubmitConfig,
}

impl VerificationSubmitter {
    pub fn new(verifier: Arc<dyn Verifier>, chain_id: u64) -> Self {
        Self {
            verifier,
            chain_id,
            config: SubmitConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SubmitConfig) -> Self {
        self.config = config.with_pool(config.pool);
        self
    }

    pub fn config(&self) -> &SubmitConfig {
        &self.config
    }

    /// Submit every target; the report lists outcomes in target order.
    pub async fn submit_all(&self, targets: &[VerificationTarget]) -> VerificationReport {
        let _span = PassSpan::enter("verify", &self.chain_id.to_string());

        let mut indexed: Vec<(usize, VerificationOutcome)> = stream::iter(targets.iter().enumerate())
            .map(|(i, target)| async move { (i, self.submit_one(target).await) })
            .buffer_unordered(self.config.pool)
            .collect()
            .await;
        indexed.sort_by_key(|(i, _)| *i);

        VerificationReport {
            outcomes: indexed.into_iter().map(|(_, o)| o).collect(),
        }
    }

    /// Submit one target. Errors and timeouts become a `Failed` outcome.
    pub async fn submit_one(&self, target: &VerificationTarget) -> VerificationOutcome {
        let request = target.to_request(self.chain_id);
        let started = Instant::now();
        debug!("Submitting {} ({}) as {}", target.label, target.address, target.contract);

        let (status, raw_detail) =
            match tokio::time::timeout(self.config.timeout, self.verifier.submit(&request)).await {
                Ok(Ok(response)) => {
                    let status = classify(response.success, &response.output);
                    let detail = if status == VerificationStatus::Failed {
                        strip_noise(&response.output)
                    } else {
                        response.output.trim().to_string()
                    };
                    (status, detail)
                }
                Ok(Err(e)) => (VerificationStatus::Failed, e.to_string()),
                Err(_) => (
                    VerificationStatus::Failed,
                    format!("timed out after {}s", self.config.timeout.as_secs()),
                ),
            };

        let duration_ms = started.elapsed().as_millis() as u64;
        let failed = status == VerificationStatus::Failed;
        METRICS.inc_submissions(failed);
        if failed {
            warn!("Verification of {} ({}) failed", target.label, target.address);
        }
        obs::emit_submission_finished(&target.label, &target.address, status.as_str(), duration_ms);

        VerificationOutcome {
            target: target.address,
            label: target.label.clone(),
            status,
            raw_detail,
            duration_ms,
        }
    }
}
