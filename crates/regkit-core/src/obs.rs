//! Structured observability hooks for deployment, bundling and verification.
//!
//! This module provides:
//! - Span guards scoping every log line to one bundle build or verify pass
//! - Emission functions for key lifecycle events
//!
//! Events are emitted at `info!` level unless they report a fault.

use tracing::{info, warn};

use crate::inline::SourceStatus;

/// RAII guard that enters a span for the duration of one pass.
///
/// # Example
///
/// ```ignore
/// let _span = PassSpan::enter("bundle", "verification-bundle");
/// // every tracing call is now tagged with pass = "bundle"
/// ```
pub struct PassSpan {
    _span: tracing::span::EnteredSpan,
}

impl PassSpan {
    pub fn enter(pass: &str, target: &str) -> Self {
        let span = tracing::info_span!("regkit.pass", pass = %pass, target = %target);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: bundling of one artifact started.
pub fn emit_bundle_started(label: &str, artifact: &str) {
    info!(event = "bundle.started", label = %label, artifact = %artifact);
}

/// Emit event: a source entry could not be embedded or verified.
pub fn emit_source_fault(path: &str, status: SourceStatus, detail: Option<&str>) {
    warn!(
        event = "bundle.source_fault",
        path = %path,
        status = ?status,
        detail = detail.unwrap_or(""),
    );
}

/// Emit event: one self-contained manifest was written.
pub fn emit_artifact_written(label: &str, path: &std::path::Path, faults: usize) {
    info!(
        event = "bundle.artifact_written",
        label = %label,
        path = %path.display(),
        faults = faults,
    );
}

/// Emit event: one creation step inside the atomic unit completed.
pub fn emit_creation_step(step: usize, label: &str, address: &dyn std::fmt::Display) {
    info!(event = "deploy.step", step = step, label = %label, address = %address);
}

/// Emit event: the atomic unit was rolled back.
pub fn emit_creation_reverted(step: usize, reason: &dyn std::fmt::Display) {
    warn!(event = "deploy.reverted", step = step, reason = %reason);
}

/// Emit event: one verification submission finished.
pub fn emit_submission_finished(label: &str, address: &dyn std::fmt::Display, status: &str, duration_ms: u64) {
    info!(
        event = "verify.finished",
        label = %label,
        address = %address,
        status = %status,
        duration_ms = duration_ms,
    );
}
