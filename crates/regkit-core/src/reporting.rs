use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};

use crate::bundle::{BundleReport, PROXY_LABEL};
use crate::deploy::abi::to_hex;
use crate::verify::VerificationReport;

/// Render SUMMARY.txt: what to upload for each artifact and each address.
pub fn render_bundle_summary(report: &BundleReport) -> String {
    let mut out = String::new();
    out.push_str("Verification bundle\n");
    out.push_str("===================\n\n");

    for artifact in &report.artifacts {
        let _ = writeln!(out, "[{}] {}", artifact.label, artifact.fqn());
        let _ = writeln!(out, "  upload:   {}", artifact.manifest);
        let _ = writeln!(out, "  sha256:   {}", artifact.sha256);
        let _ = writeln!(
            out,
            "  sources:  {} ({} missing, {} mismatched)",
            artifact.inline.outcomes.len(),
            artifact.inline.missing(),
            artifact.inline.mismatched()
        );
        let _ = writeln!(out, "  status:   {}", artifact.status());
        for outcome in artifact.inline.outcomes.iter().filter(|o| o.status.is_fault()) {
            let _ = writeln!(out, "    {:?}: {}", outcome.status, outcome.path);
        }
        out.push('\n');
    }

    let Some(deployment) = &report.deployment else {
        return out;
    };

    let _ = writeln!(out, "Addresses (registry version {})", deployment.version());
    out.push_str("-----------------------------------\n");
    let upload = |label: &str| {
        report
            .artifact(label)
            .map(|a| a.manifest.clone())
            .unwrap_or_else(|| "(not bundled)".to_string())
    };

    for (component, parts) in deployment.components() {
        let _ = writeln!(
            out,
            "{} implementation  {}  upload {}",
            component,
            parts.implementation,
            upload(component.name())
        );
        let _ = writeln!(
            out,
            "{} proxy           {}  upload {}",
            component,
            parts.proxy,
            upload(PROXY_LABEL)
        );
        let _ = writeln!(out, "    delegate:   {}", parts.implementation);
        let _ = writeln!(out, "    init call:  {}", parts.init_call);
        match parts.constructor_args() {
            Ok(args) => {
                let _ = writeln!(out, "    ctor args:  {}", to_hex(&args));
            }
            Err(e) => {
                let _ = writeln!(out, "    ctor args:  unavailable ({})", e);
            }
        }
        if let Some(identity) = deployment.identity_registry_of(component) {
            let _ = writeln!(out, "    identity:   {}", identity);
        }
    }
    out
}

/// Render the aggregate of a verification run.
pub fn render_verification_summary(report: &VerificationReport) -> String {
    let mut out = String::new();
    for outcome in &report.outcomes {
        let _ = writeln!(
            out,
            "{:<26} {}  {}",
            outcome.label, outcome.target, outcome.status
        );
        if !outcome.status.is_success() && !outcome.raw_detail.is_empty() {
            for line in outcome.raw_detail.lines() {
                let _ = writeln!(out, "    {}", line);
            }
        }
    }

    let failed = report.failed();
    if failed.is_empty() {
        let _ = writeln!(out, "\nAll {} targets verified.", report.outcomes.len());
    } else {
        let _ = writeln!(
            out,
            "\n{} of {} targets failed:",
            failed.len(),
            report.outcomes.len()
        );
        for outcome in failed {
            let _ = writeln!(out, "  - {} ({})", outcome.label, outcome.target);
        }
    }
    out
}

/// Write the verification report as pretty JSON.
pub fn write_verification_report_json(path: &Path, report: &VerificationReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize verification report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}
