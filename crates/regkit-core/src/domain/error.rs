//! Domain-level error taxonomy for regkit.

use std::path::PathBuf;

/// regkit domain errors.
#[derive(Debug, thiserror::Error)]
pub enum RegkitError {
    #[error("source path not found: {0}")]
    PathNotFound(String),

    #[error("hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("artifact {name} for {source_path} not found in build output")]
    ArtifactNotFound { name: String, source_path: String },

    #[error("artifact {name} for {source_path} is ambiguous: {} candidates", candidates.len())]
    ArtifactAmbiguous {
        name: String,
        source_path: String,
        candidates: Vec<PathBuf>,
    },

    #[error("atomic creation failed at step {step} ({label}): {reason}")]
    AtomicCreationFailed {
        step: usize,
        label: String,
        reason: String,
    },

    #[error("verification failed for {target}: {detail}")]
    VerificationFailed { target: String, detail: String },

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid remapping: {0}")]
    InvalidRemapping(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for regkit domain operations.
pub type Result<T> = std::result::Result<T, RegkitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_mismatch_display() {
        let err = RegkitError::HashMismatch {
            path: "src/A.sol".to_string(),
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("src/A.sol"));
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }

    #[test]
    fn test_ambiguous_lists_candidate_count() {
        let err = RegkitError::ArtifactAmbiguous {
            name: "ERC1967Proxy".to_string(),
            source_path: "lib/oz/ERC1967Proxy.sol".to_string(),
            candidates: vec![PathBuf::from("a"), PathBuf::from("b")],
        };
        assert!(err.to_string().contains("2 candidates"));
    }
}
