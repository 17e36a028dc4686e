use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regkit_core::bundle::BundlePlan;
use regkit_core::{
    targets_for, Address, RegistryDeployment, SubmitConfig, VerificationStatus,
    VerificationSubmitter, VerificationTarget,
};
use verifier_client::{SubmissionResponse, VerificationRequest, Verifier, VerifierError};

/// What the fake verifier does for one address.
#[derive(Clone)]
enum Script {
    Respond { success: bool, output: &'static str },
    Error,
    Hang,
}

/// Verifier that answers from a per-address script and records every call.
#[derive(Default)]
struct ScriptedVerifier {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<VerificationRequest>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedVerifier {
    fn with(mut self, address: Address, script: Script) -> Self {
        self.scripts.insert(address.to_string(), script);
        self
    }

    fn calls(&self) -> Vec<VerificationRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Verifier for ScriptedVerifier {
    async fn submit(&self, request: &VerificationRequest) -> verifier_client::Result<SubmissionResponse> {
        self.calls.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let script = self.scripts.get(&request.address).cloned().unwrap_or(Script::Respond {
            success: true,
            output: "Contract successfully verified\nPass - Verified (perfect match)",
        });
        match script {
            Script::Respond { success, output } => Ok(SubmissionResponse {
                success,
                exit_code: if success { 0 } else { 1 },
                output: output.to_string(),
                duration_ms: 10,
            }),
            Script::Error => Err(VerifierError::Http("connection refused".to_string())),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(VerifierError::Http("unreachable".to_string()))
            }
        }
    }
}

fn target(label: &str, byte: u8) -> VerificationTarget {
    VerificationTarget {
        label: label.to_string(),
        address: Address::new([byte; 20]),
        contract: format!("src/{label}.sol:{label}"),
        constructor_args: None,
    }
}

#[tokio::test]
async fn already_verified_then_failure_still_attempts_third() {
    let targets = vec![target("First", 1), target("Second", 2), target("Third", 3)];
    let verifier = Arc::new(
        ScriptedVerifier::default()
            .with(
                targets[0].address,
                Script::Respond {
                    success: false,
                    output: "Error: Contract source code already verified",
                },
            )
            .with(
                targets[1].address,
                Script::Respond {
                    success: false,
                    output: "Start verifying contract `0x02`\nError: bytecode mismatch\nhint: check settings",
                },
            ),
    );

    let submitter = VerificationSubmitter::new(verifier.clone(), 84532)
        .with_config(SubmitConfig::default().with_pool(1));
    let report = submitter.submit_all(&targets).await;

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.outcomes[0].status, VerificationStatus::AlreadyVerified);
    assert_eq!(report.outcomes[1].status, VerificationStatus::Failed);
    assert_eq!(report.outcomes[1].raw_detail, "Error: bytecode mismatch");
    assert_eq!(report.outcomes[2].status, VerificationStatus::ExactMatch);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.failed()[0].label, "Second");
    assert_eq!(verifier.calls().len(), 3);
}

#[tokio::test]
async fn outcomes_keep_target_order_under_concurrency() {
    let targets: Vec<_> = (1..=6).map(|i| target(&format!("T{i}"), i)).collect();
    let verifier = Arc::new(ScriptedVerifier::default().with(
        targets[4].address,
        Script::Respond {
            success: true,
            output: "Partial Match",
        },
    ));

    let submitter = VerificationSubmitter::new(verifier.clone(), 1)
        .with_config(SubmitConfig::default().with_pool(3));
    let report = submitter.submit_all(&targets).await;

    let labels: Vec<_> = report.outcomes.iter().map(|o| o.label.as_str()).collect();
    assert_eq!(labels, vec!["T1", "T2", "T3", "T4", "T5", "T6"]);
    assert_eq!(report.outcomes[4].status, VerificationStatus::PartialMatch);
    assert_eq!(report.exit_code(), 0);
    assert!(verifier.peak.load(Ordering::SeqCst) <= 3);
    assert!(verifier.calls().iter().all(|r| r.chain_id == 1));
}

#[tokio::test]
async fn transport_errors_and_timeouts_fail_only_their_target() {
    let targets = vec![target("Down", 1), target("Slow", 2), target("Fine", 3)];
    let verifier = Arc::new(
        ScriptedVerifier::default()
            .with(targets[0].address, Script::Error)
            .with(targets[1].address, Script::Hang)
            .with(
                targets[2].address,
                Script::Respond {
                    success: true,
                    output: "Submitted contract for verification",
                },
            ),
    );

    let submitter = VerificationSubmitter::new(verifier, 1).with_config(
        SubmitConfig::default()
            .with_pool(3)
            .with_timeout(Duration::from_millis(200)),
    );
    let report = submitter.submit_all(&targets).await;

    assert_eq!(report.outcomes[0].status, VerificationStatus::Failed);
    assert!(report.outcomes[0].raw_detail.contains("connection refused"));
    assert_eq!(report.outcomes[1].status, VerificationStatus::Failed);
    assert!(report.outcomes[1].raw_detail.contains("timed out"));
    assert_eq!(report.outcomes[2].status, VerificationStatus::Verified);
    assert_eq!(report.failed().len(), 2);
    assert_eq!(report.errors().len(), 2);
}

#[tokio::test]
async fn deployment_targets_carry_constructor_arguments() {
    let addrs = [1u8, 2, 3, 4, 5, 6].map(|b| Address::new([b; 20]));
    let deployment = RegistryDeployment::from_addresses(addrs);
    let targets = targets_for(&deployment, &BundlePlan::default()).unwrap();

    let verifier = Arc::new(ScriptedVerifier::default());
    let report = VerificationSubmitter::new(verifier.clone(), 84532)
        .submit_all(&targets)
        .await;
    assert_eq!(report.exit_code(), 0);

    let calls = verifier.calls();
    assert_eq!(calls.len(), 6);
    let proxy_calls: Vec<_> = calls.iter().filter(|c| c.constructor_args.is_some()).collect();
    assert_eq!(proxy_calls.len(), 3);
    for call in proxy_calls {
        assert!(call.contract.ends_with(":ERC1967Proxy"));
    }
    let identity_impl = calls
        .iter()
        .find(|c| c.address == addrs[0].to_string())
        .unwrap();
    assert_eq!(identity_impl.contract, "src/IdentityRegistry.sol:IdentityRegistry");
    assert!(identity_impl.constructor_args.is_none());
}
