//! Project layout configuration.
//!
//! Read once per run from the project's `foundry.toml` (`[profile.default]`)
//! and passed explicitly to the resolver, locator and bundle builder.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::error::{RegkitError, Result};
use crate::resolver::CONVENTIONAL_ROOTS;

/// Name of the toolchain configuration file at the project root.
pub const PROJECT_FILE: &str = "foundry.toml";

/// Layout of a compiled project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    /// Project root; every relative path below is joined onto it.
    pub root: PathBuf,
    /// Contract sources directory.
    pub src: String,
    /// Build output directory.
    pub out: String,
    /// Dependency directories.
    pub libs: Vec<String>,
    /// Remappings declared in the configuration file (`from=to`).
    pub remappings: Vec<String>,
}

impl ProjectConfig {
    /// Defaults for a project rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            src: "src".to_string(),
            out: "out".to_string(),
            libs: vec!["lib".to_string()],
            remappings: Vec::new(),
        }
    }

    /// Load `foundry.toml` under `root`, falling back to defaults when absent.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let mut config = Self::new(root);

        let path = root.join(PROJECT_FILE);
        if !path.is_file() {
            debug!("No {} at {:?}, using default layout", PROJECT_FILE, root);
            return Ok(config);
        }

        let text = std::fs::read_to_string(&path)?;
        let doc: toml::Value = text
            .parse()
            .map_err(|e| RegkitError::Config(format!("{}: {}", path.display(), e)))?;

        let Some(profile) = doc.get("profile").and_then(|p| p.get("default")) else {
            return Ok(config);
        };

        if let Some(src) = profile.get("src").and_then(|v| v.as_str()) {
            config.src = src.to_string();
        }
        if let Some(out) = profile.get("out").and_then(|v| v.as_str()) {
            config.out = out.to_string();
        }
        if let Some(libs) = profile.get("libs").and_then(|v| v.as_array()) {
            config.libs = string_array(libs);
        }
        if let Some(remappings) = profile.get("remappings").and_then(|v| v.as_array()) {
            config.remappings = string_array(remappings);
        }

        Ok(config)
    }

    /// Absolute build output directory.
    pub fn out_dir(&self) -> PathBuf {
        self.root.join(&self.out)
    }

    /// Directories sources are looked up under: the configured source
    /// directory, the conventional roots, then the dependency directories.
    /// First occurrence of each wins.
    pub fn search_roots(&self) -> Vec<String> {
        let mut roots: Vec<String> = Vec::new();
        let configured = std::iter::once(self.src.as_str())
            .chain(CONVENTIONAL_ROOTS)
            .chain(self.libs.iter().map(String::as_str));
        for root in configured {
            let root = root.trim_end_matches('/');
            if !root.is_empty() && !roots.iter().any(|r| r == root) {
                roots.push(root.to_string());
            }
        }
        roots
    }
}

fn string_array(values: &[toml::Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_when_file_missing() {
        let dir = tempdir().unwrap();
        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config.src, "src");
        assert_eq!(config.out, "out");
        assert_eq!(config.libs, vec!["lib".to_string()]);
        assert!(config.remappings.is_empty());
        assert_eq!(config.out_dir(), dir.path().join("out"));
    }

    #[test]
    fn reads_default_profile() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(PROJECT_FILE),
            r#"
[profile.default]
src = "contracts"
out = "build"
libs = ["lib", "node_modules"]
remappings = ["@openzeppelin/=lib/openzeppelin-contracts/"]
"#,
        )
        .unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config.src, "contracts");
        assert_eq!(config.out, "build");
        assert_eq!(config.libs.len(), 2);
        assert_eq!(
            config.remappings,
            vec!["@openzeppelin/=lib/openzeppelin-contracts/".to_string()]
        );
    }

    #[test]
    fn search_roots_follow_layout() {
        let dir = tempdir().unwrap();
        assert_eq!(
            ProjectConfig::new(dir.path()).search_roots(),
            vec!["src", "contracts", "lib", "node_modules"]
        );

        let mut config = ProjectConfig::new(dir.path());
        config.src = "solidity/".to_string();
        config.libs = vec!["dependencies".to_string(), "lib".to_string()];
        assert_eq!(
            config.search_roots(),
            vec!["solidity", "src", "contracts", "lib", "node_modules", "dependencies"]
        );
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(PROJECT_FILE), "[profile.default\nsrc=").unwrap();
        let err = ProjectConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, RegkitError::Config(_)));
    }
}
