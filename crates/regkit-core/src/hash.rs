//! Content hashes: Keccak-256 for compiler-recorded source digests,
//! SHA-256 for checksums of written bundle files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use sha3::Keccak256;

use crate::domain::error::RegkitError;

/// Keccak-256 digest, the hash compilers record per source file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Keccak([u8; 32]);

impl Keccak {
    /// Compute the Keccak-256 digest of `data`.
    pub fn compute(data: &[u8]) -> Self {
        let hash = Keccak256::digest(data);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hash);
        Self(bytes)
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string, lowercase, no prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Compare against a recorded hash string.
    ///
    /// Case-insensitive, optional `0x` prefix. Unparseable input never matches.
    pub fn matches_recorded(&self, recorded: &str) -> bool {
        let recorded = strip_hex_prefix(recorded.trim());
        recorded.eq_ignore_ascii_case(&self.to_hex())
    }
}

impl fmt::Display for Keccak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for Keccak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keccak({})", self.to_hex().chars().take(12).collect::<String>())
    }
}

impl FromStr for Keccak {
    type Err = RegkitError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(strip_hex_prefix(s))
            .map_err(|_| RegkitError::InvalidManifest(format!("invalid keccak hex: {}", s)))?;
        if bytes.len() != 32 {
            return Err(RegkitError::InvalidManifest(format!(
                "keccak must be 32 bytes: {}",
                s
            )));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

/// Keccak-256 of `data`.
pub fn keccak256(data: &[u8]) -> Keccak {
    Keccak::compute(data)
}

/// SHA-256 hex of `data`, used for bundle file checksums.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub(crate) fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}
