//! Verification bundle assembly.
//!
//! For every implementation artifact and the shared wrapper artifact the
//! builder locates the compiler output, inlines its sources and writes one
//! self-contained `metadata.json`. A plain-text summary and a JSON report
//! sit next to them.
//!
//! Output layout:
//!
//! ```text
//! <out>/identity/metadata.json
//! <out>/reputation/metadata.json
//! <out>/validation/metadata.json
//! <out>/proxy/metadata.json
//! <out>/SUMMARY.txt
//! <out>/bundle.json
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ProjectConfig;
use crate::deploy::registry::{Component, RegistryDeployment, COMPONENTS};
use crate::deploy::DEFAULT_WRAPPER;
use crate::domain::error::{RegkitError, Result};
use crate::domain::manifest::Manifest;
use crate::fs::write_atomic;
use crate::hash::sha256_hex;
use crate::inline::{InlineReport, MetadataInliner};
use crate::locator::{ArtifactLocator, LocateMode};
use crate::obs::{self, PassSpan};
use crate::remap::RemappingTable;
use crate::reporting::render_bundle_summary;
use crate::resolver::PathResolver;

pub const MANIFEST_FILE: &str = "metadata.json";
pub const SUMMARY_FILE: &str = "SUMMARY.txt";
pub const REPORT_FILE: &str = "bundle.json";

/// Output subdirectory of the shared wrapper.
pub const PROXY_LABEL: &str = "proxy";

/// Where the wrapper is expected when no implementation manifest names it.
pub const DEFAULT_WRAPPER_SOURCE: &str =
    "lib/openzeppelin-contracts/contracts/proxy/ERC1967/ERC1967Proxy.sol";

/// One artifact to bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactSpec {
    /// Output subdirectory.
    pub label: String,
    /// Contract name.
    pub name: String,
    /// Declared source path.
    pub source_path: String,
}

impl ArtifactSpec {
    pub fn new(label: impl Into<String>, name: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            name: name.into(),
            source_path: source_path.into(),
        }
    }

    /// Fully-qualified name, `path/File.sol:Name`.
    pub fn fqn(&self) -> String {
        format!("{}:{}", self.source_path, self.name)
    }

    /// Parse `path/File.sol:Name` into a spec with `label`.
    pub fn from_fqn(label: impl Into<String>, fqn: &str) -> Option<Self> {
        let (path, name) = fqn.rsplit_once(':')?;
        if path.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(label, name, path))
    }

    fn file_name(&self) -> &str {
        self.source_path.rsplit('/').next().unwrap_or(&self.source_path)
    }
}

/// Artifacts that make up the registry set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundlePlan {
    pub implementations: Vec<ArtifactSpec>,
    pub wrapper: ArtifactSpec,
    /// Addresses to print in the summary, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<RegistryDeployment>,
}

impl Default for BundlePlan {
    fn default() -> Self {
        let implementations = COMPONENTS
            .iter()
            .map(|c| {
                ArtifactSpec::new(
                    c.name(),
                    c.contract_name(),
                    format!("src/{}.sol", c.contract_name()),
                )
            })
            .collect();
        Self {
            implementations,
            wrapper: ArtifactSpec::new(PROXY_LABEL, DEFAULT_WRAPPER, DEFAULT_WRAPPER_SOURCE),
            deployment: None,
        }
    }
}

impl BundlePlan {
    pub fn with_deployment(mut self, deployment: RegistryDeployment) -> Self {
        self.deployment = Some(deployment);
        self
    }

    /// Replace the artifact bundled under `label`.
    pub fn with_artifact(mut self, spec: ArtifactSpec) -> Self {
        if spec.label == PROXY_LABEL {
            self.wrapper = spec;
        } else if let Some(slot) = self.implementations.iter_mut().find(|s| s.label == spec.label) {
            *slot = spec;
        } else {
            self.implementations.push(spec);
        }
        self
    }

    pub fn implementation_for(&self, component: Component) -> Option<&ArtifactSpec> {
        self.implementations.iter().find(|s| s.label == component.name())
    }
}

/// Result of bundling one artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactReport {
    pub label: String,
    pub name: String,
    /// Source path the artifact was located by.
    pub source_path: String,
    /// Compiler output file the manifest was taken from.
    pub artifact_path: PathBuf,
    /// Written manifest, relative to the bundle root.
    pub manifest: String,
    pub sha256: String,
    pub inline: InlineReport,
}

impl ArtifactReport {
    pub fn fault_count(&self) -> usize {
        self.inline.fault_count()
    }

    pub fn status(&self) -> &'static str {
        if self.inline.is_suspect() {
            "SUSPECT"
        } else {
            "OK"
        }
    }

    pub fn fqn(&self) -> String {
        format!("{}:{}", self.source_path, self.name)
    }
}

/// Result of one bundle build.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BundleReport {
    pub artifacts: Vec<ArtifactReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<RegistryDeployment>,
}

impl BundleReport {
    pub fn artifact(&self, label: &str) -> Option<&ArtifactReport> {
        self.artifacts.iter().find(|a| a.label == label)
    }

    pub fn fault_count(&self) -> usize {
        self.artifacts.iter().map(ArtifactReport::fault_count).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.fault_count() == 0
    }
}

/// Builds verification bundles for one project.
#[derive(Debug, Clone)]
pub struct BundleBuilder {
    locator: ArtifactLocator,
    resolver: PathResolver,
}

impl BundleBuilder {
    pub fn new(locator: ArtifactLocator, resolver: PathResolver) -> Self {
        Self { locator, resolver }
    }

    /// Builder for the project described by `config`, remappings included.
    pub fn for_project(config: &ProjectConfig) -> Result<Self> {
        let table = RemappingTable::load(config)?;
        Ok(Self::new(
            ArtifactLocator::from_config(config),
            PathResolver::for_project(config, table),
        ))
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Build the bundle under `out_root`. Missing or mismatched sources are
    /// recorded; an ambiguous or missing artifact aborts the build.
    pub fn build(&self, plan: &BundlePlan, out_root: &Path) -> Result<BundleReport> {
        let _span = PassSpan::enter("bundle", &out_root.display().to_string());
        let inliner = MetadataInliner::new(&self.resolver);
        let mut report = BundleReport {
            artifacts: Vec::with_capacity(plan.implementations.len() + 1),
            deployment: plan.deployment.clone(),
        };

        let mut manifests = Vec::with_capacity(plan.implementations.len());
        for spec in &plan.implementations {
            let (artifact, manifest) =
                self.bundle_one(&inliner, spec, LocateMode::Direct, out_root)?;
            report.artifacts.push(artifact);
            manifests.push(manifest);
        }

        let wrapper = discover_wrapper_source(&plan.wrapper, &manifests)?;
        let (artifact, _) = self.bundle_one(&inliner, &wrapper, LocateMode::Shared, out_root)?;
        report.artifacts.push(artifact);

        write_atomic(
            &out_root.join(SUMMARY_FILE),
            render_bundle_summary(&report).as_bytes(),
        )?;
        let mut json = serde_json::to_string_pretty(&report)?;
        json.push('\n');
        write_atomic(&out_root.join(REPORT_FILE), json.as_bytes())?;

        info!(
            "Bundle written to {} ({} artifacts, {} faults)",
            out_root.display(),
            report.artifacts.len(),
            report.fault_count()
        );
        Ok(report)
    }

    fn bundle_one(
        &self,
        inliner: &MetadataInliner<'_>,
        spec: &ArtifactSpec,
        mode: LocateMode,
        out_root: &Path,
    ) -> Result<(ArtifactReport, Manifest)> {
        obs::emit_bundle_started(&spec.label, &spec.name);

        let artifact = self
            .locator
            .locate_and_load(&spec.name, &spec.source_path, mode)?;
        let (manifest, inline) = inliner.inline(artifact.manifest);
        let body = manifest.to_canonical_json()?;

        let relative = format!("{}/{}", spec.label, MANIFEST_FILE);
        let path = out_root.join(&relative);
        write_atomic(&path, body.as_bytes())?;
        obs::emit_artifact_written(&spec.label, &path, inline.fault_count());

        let report = ArtifactReport {
            label: spec.label.clone(),
            name: spec.name.clone(),
            source_path: spec.source_path.clone(),
            artifact_path: artifact.output_path,
            manifest: relative,
            sha256: sha256_hex(body.as_bytes()),
            inline,
        };
        Ok((report, manifest))
    }
}

/// The wrapper source path the implementations were actually compiled
/// against, or the configured one if none of them names the file.
/// Implementations naming different paths for the file are ambiguous.
fn discover_wrapper_source(wrapper: &ArtifactSpec, manifests: &[Manifest]) -> Result<ArtifactSpec> {
    let file_name = wrapper.file_name();
    let found: BTreeSet<&str> = manifests
        .iter()
        .flat_map(|m| m.sources_named(file_name))
        .collect();

    let mut found = found.into_iter();
    match (found.next(), found.next()) {
        (None, _) => Ok(wrapper.clone()),
        (Some(path), None) if path == wrapper.source_path => Ok(wrapper.clone()),
        (Some(path), None) => {
            debug!("Wrapper source discovered at {} (configured {})", path, wrapper.source_path);
            Ok(ArtifactSpec::new(wrapper.label.clone(), wrapper.name.clone(), path))
        }
        (Some(first), Some(second)) => {
            let candidates: Vec<PathBuf> = [first, second]
                .into_iter()
                .chain(found)
                .map(PathBuf::from)
                .collect();
            warn!(
                "{} source paths for {}: {:?}",
                candidates.len(),
                wrapper.name,
                candidates
            );
            Err(RegkitError::ArtifactAmbiguous {
                name: wrapper.name.clone(),
                source_path: wrapper.source_path.clone(),
                candidates,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::manifest::SourceEntry;

    #[test]
    fn default_plan_covers_registry_set() {
        let plan = BundlePlan::default();
        let labels: Vec<_> = plan.implementations.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["identity", "reputation", "validation"]);
        assert_eq!(
            plan.implementation_for(Component::Reputation).unwrap().fqn(),
            "src/ReputationRegistry.sol:ReputationRegistry"
        );
        assert_eq!(plan.wrapper.label, PROXY_LABEL);
    }

    #[test]
    fn fqn_parsing() {
        let spec = ArtifactSpec::from_fqn("identity", "contracts/Id.sol:Id").unwrap();
        assert_eq!(spec.source_path, "contracts/Id.sol");
        assert_eq!(spec.name, "Id");
        assert!(ArtifactSpec::from_fqn("x", "NoColon").is_none());
        assert!(ArtifactSpec::from_fqn("x", "a.sol:").is_none());
    }

    #[test]
    fn with_artifact_replaces_by_label() {
        let plan = BundlePlan::default()
            .with_artifact(ArtifactSpec::new("identity", "Id", "contracts/Id.sol"))
            .with_artifact(ArtifactSpec::new(PROXY_LABEL, "Proxy", "lib/Proxy.sol"));
        assert_eq!(plan.implementations.len(), 3);
        assert_eq!(plan.implementations[0].name, "Id");
        assert_eq!(plan.wrapper.name, "Proxy");
    }

    #[test]
    fn wrapper_source_is_discovered_from_manifests() {
        let mut manifest = Manifest::default();
        manifest.sources.insert(
            "node_modules/@openzeppelin/contracts/proxy/ERC1967/ERC1967Proxy.sol".to_string(),
            SourceEntry::reference("0x00"),
        );
        let wrapper = BundlePlan::default().wrapper;
        let found = discover_wrapper_source(&wrapper, &[Manifest::default(), manifest.clone()]).unwrap();
        assert_eq!(
            found.source_path,
            "node_modules/@openzeppelin/contracts/proxy/ERC1967/ERC1967Proxy.sol"
        );
        assert_eq!(discover_wrapper_source(&wrapper, &[]).unwrap(), wrapper);
        // the same path named by several implementations is not ambiguous
        let again = discover_wrapper_source(&wrapper, &[manifest.clone(), manifest]).unwrap();
        assert_eq!(again, found);
    }

    #[test]
    fn differing_wrapper_sources_are_ambiguous() {
        let mut first = Manifest::default();
        first.sources.insert(
            "lib/openzeppelin-contracts/contracts/proxy/ERC1967/ERC1967Proxy.sol".to_string(),
            SourceEntry::reference("0x00"),
        );
        let mut second = Manifest::default();
        second.sources.insert(
            "lib/oz-v4/contracts/proxy/ERC1967/ERC1967Proxy.sol".to_string(),
            SourceEntry::reference("0x00"),
        );

        let wrapper = BundlePlan::default().wrapper;
        match discover_wrapper_source(&wrapper, &[first, second]) {
            Err(RegkitError::ArtifactAmbiguous { name, candidates, .. }) => {
                assert_eq!(name, "ERC1967Proxy");
                assert_eq!(
                    candidates,
                    vec![
                        PathBuf::from("lib/openzeppelin-contracts/contracts/proxy/ERC1967/ERC1967Proxy.sol"),
                        PathBuf::from("lib/oz-v4/contracts/proxy/ERC1967/ERC1967Proxy.sol"),
                    ]
                );
            }
            other => panic!("expected ArtifactAmbiguous, got {other:?}"),
        }
    }

    #[test]
    fn artifact_status() {
        let report = ArtifactReport {
            label: "identity".into(),
            name: "IdentityRegistry".into(),
            source_path: "src/IdentityRegistry.sol".into(),
            artifact_path: PathBuf::from("out/IdentityRegistry.sol/IdentityRegistry.json"),
            manifest: "identity/metadata.json".into(),
            sha256: String::new(),
            inline: InlineReport::default(),
        };
        assert_eq!(report.status(), "OK");
        assert_eq!(report.fqn(), "src/IdentityRegistry.sol:IdentityRegistry");
    }
}
