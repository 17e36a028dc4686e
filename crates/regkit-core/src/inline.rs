//! Source inlining and integrity verification.
//!
//! Turns a compiler manifest that references sources by path into a
//! self-contained one: every source gets its `content` embedded and its
//! Keccak-256 checked against the hash the compiler recorded. Faults are
//! collected per file; a manifest is never abandoned half-way.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::error::RegkitError;
use crate::domain::manifest::{Manifest, SourceEntry};
use crate::hash::{keccak256, Keccak};
use crate::metrics::METRICS;
use crate::obs;
use crate::resolver::PathResolver;

/// What happened to one source entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Read from disk and embedded; hash matches (or none recorded).
    Embedded,
    /// Content was already present; hash matches (or none recorded).
    AlreadyEmbedded,
    /// Could not be resolved or read; left unembedded.
    Missing,
    /// Embedded, but the content hash differs from the recorded one.
    Mismatch,
}

impl SourceStatus {
    pub fn is_fault(&self) -> bool {
        matches!(self, SourceStatus::Missing | SourceStatus::Mismatch)
    }
}

/// Per-file outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceOutcome {
    pub path: String,
    pub status: SourceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SourceOutcome {
    /// The fault as a domain error, if this outcome is one.
    pub fn to_error(&self) -> Option<RegkitError> {
        match self.status {
            SourceStatus::Missing => Some(RegkitError::PathNotFound(self.path.clone())),
            SourceStatus::Mismatch => Some(RegkitError::HashMismatch {
                path: self.path.clone(),
                expected: self.expected.clone().unwrap_or_default(),
                actual: self.actual.clone().unwrap_or_default(),
            }),
            _ => None,
        }
    }
}

/// Result of inlining one manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InlineReport {
    pub outcomes: Vec<SourceOutcome>,
}

impl InlineReport {
    fn count(&self, status: SourceStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn missing(&self) -> usize {
        self.count(SourceStatus::Missing)
    }

    pub fn mismatched(&self) -> usize {
        self.count(SourceStatus::Mismatch)
    }

    pub fn fault_count(&self) -> usize {
        self.missing() + self.mismatched()
    }

    pub fn is_clean(&self) -> bool {
        self.fault_count() == 0
    }

    /// Any fault, missing or mismatched, makes the manifest suspect: a
    /// verifier will not reproduce the deployed bytecode from it. This is
    /// what the bundle summary reports as `SUSPECT`.
    pub fn is_suspect(&self) -> bool {
        !self.is_clean()
    }

    pub fn faults(&self) -> Vec<RegkitError> {
        self.outcomes.iter().filter_map(SourceOutcome::to_error).collect()
    }
}

/// Embeds source content into manifests.
pub struct MetadataInliner<'a> {
    resolver: &'a PathResolver,
}

impl<'a> MetadataInliner<'a> {
    pub fn new(resolver: &'a PathResolver) -> Self {
        Self { resolver }
    }

    /// Inline every source of `manifest`.
    pub fn inline(&self, mut manifest: Manifest) -> (Manifest, InlineReport) {
        let mut report = InlineReport::default();

        for (path, entry) in manifest.sources.iter_mut() {
            let outcome = match entry.content.clone() {
                Some(content) => self.verify_embedded(path, entry, content),
                None => self.resolve_and_embed(path, entry),
            };

            if outcome.status.is_fault() {
                METRICS.inc_faults();
                obs::emit_source_fault(path, outcome.status, outcome.detail.as_deref());
            } else {
                METRICS.inc_sources_inlined();
            }
            report.outcomes.push(outcome);
        }

        debug!(
            "Inlined {} sources ({} missing, {} mismatched)",
            report.outcomes.len(),
            report.missing(),
            report.mismatched()
        );
        (manifest, report)
    }

    fn verify_embedded(&self, path: &str, entry: &mut SourceEntry, content: String) -> SourceOutcome {
        let actual = keccak256(content.as_bytes());
        // Re-run the embedding step even though nothing changes; it also
        // strips transport fields that may still be present.
        embed(entry, content);
        outcome_for(path, entry, actual, None, SourceStatus::AlreadyEmbedded)
    }

    fn resolve_and_embed(&self, path: &str, entry: &mut SourceEntry) -> SourceOutcome {
        let resolved = match self.resolver.resolve(path) {
            Ok(p) => p,
            Err(_) => {
                warn!("Source {} could not be resolved", path);
                return missing(path, None, "no resolution strategy found the file".to_string());
            }
        };

        let bytes = match std::fs::read(&resolved) {
            Ok(b) => b,
            Err(e) => return missing(path, Some(resolved), format!("read failed: {}", e)),
        };
        let actual = keccak256(&bytes);
        let content = match String::from_utf8(bytes) {
            Ok(c) => c,
            Err(_) => return missing(path, Some(resolved), "not valid UTF-8".to_string()),
        };

        embed(entry, content);
        outcome_for(path, entry, actual, Some(resolved), SourceStatus::Embedded)
    }
}

fn embed(entry: &mut SourceEntry, content: String) {
    entry.content = Some(content);
    entry.urls = None;
}

fn outcome_for(
    path: &str,
    entry: &SourceEntry,
    actual: Keccak,
    resolved: Option<PathBuf>,
    ok_status: SourceStatus,
) -> SourceOutcome {
    let expected = entry.keccak256.clone();
    let matches = expected
        .as_deref()
        .map(|e| actual.matches_recorded(e))
        .unwrap_or(true);

    SourceOutcome {
        path: path.to_string(),
        status: if matches { ok_status } else { SourceStatus::Mismatch },
        resolved,
        expected,
        actual: Some(actual.to_string()),
        detail: None,
    }
}

fn missing(path: &str, resolved: Option<PathBuf>, detail: String) -> SourceOutcome {
    SourceOutcome {
        path: path.to_string(),
        status: SourceStatus::Missing,
        resolved,
        expected: None,
        actual: None,
        detail: Some(detail),
    }
}
