use verifier_client::{
    VerificationRequest, Verifier, VerifierClient, VerifierConfig, VerifierError, VerifierMode,
};

fn request() -> VerificationRequest {
    VerificationRequest {
        chain_id: 11155111,
        address: "0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string(),
        contract: "src/ValidationRegistry.sol:ValidationRegistry".to_string(),
        constructor_args: Some("0x01".to_string()),
    }
}

fn client_with(binary: &str) -> VerifierClient {
    let config = VerifierConfig::new("http://127.0.0.1:1", 11155111)
        .with_mode(VerifierMode::Cli)
        .with_binary(binary);
    VerifierClient::new(config).expect("client")
}

#[tokio::test]
async fn cli_mode_captures_stdout_on_success() {
    let client = client_with("echo");
    let response = client.submit(&request()).await.expect("submit");

    assert!(response.success);
    assert_eq!(response.exit_code, 0);
    assert!(response.output.contains("verify-contract"));
    assert!(response
        .output
        .contains("0x5fbdb2315678afecb367f032d93f642f64180aa3"));
    assert!(response.output.contains("--constructor-args 0x01"));
}

#[tokio::test]
async fn cli_mode_reports_non_zero_exit() {
    let client = client_with("false");
    let response = client.submit(&request()).await.expect("submit");

    assert!(!response.success);
    assert_ne!(response.exit_code, 0);
}

#[tokio::test]
async fn cli_mode_missing_binary_is_spawn_error() {
    let client = client_with("regkit-definitely-not-installed");
    let err = client.submit(&request()).await.unwrap_err();
    assert!(matches!(err, VerifierError::Spawn { .. }));
}

#[tokio::test]
async fn cli_mode_empty_binary_is_rejected() {
    let client = client_with("");
    let err = client.submit(&request()).await.unwrap_err();
    assert!(matches!(err, VerifierError::BinaryNotConfigured));
}
