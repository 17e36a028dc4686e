//! Locates compiler output files for a named artifact.
//!
//! Output layout is `<out>/<File.sol>/<Name>.json`; when several sources
//! share a file name the compiler nests outputs deeper, so a direct lookup
//! is followed by scans that compare the source path each output records.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ProjectConfig;
use crate::domain::error::{RegkitError, Result};
use crate::domain::manifest::Artifact;
use crate::hash::sha256_hex;

/// How far the locator may widen its search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LocateMode {
    /// Canonical path, then an exact-source-path scan.
    Direct,
    /// Additionally a narrowed scan under the source's own directory, for
    /// shared dependencies compiled from several call sites.
    Shared,
}

/// Finds build outputs under one output directory.
#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    out_dir: PathBuf,
}

impl ArtifactLocator {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn from_config(config: &ProjectConfig) -> Self {
        Self::new(config.out_dir())
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Find the output file for `name` compiled from `declared_source`.
    pub fn locate(&self, name: &str, declared_source: &str, mode: LocateMode) -> Result<PathBuf> {
        let file_name = format!("{}.json", name);
        let source_file = declared_source.rsplit('/').next().unwrap_or(declared_source);

        // 1. canonical
        let canonical = self.out_dir.join(source_file).join(&file_name);
        if canonical.is_file() {
            match recorded_source(&canonical) {
                Some(recorded) if recorded != declared_source => {
                    debug!(
                        "Canonical output {:?} records {}, expected {}",
                        canonical, recorded, declared_source
                    );
                }
                _ => return Ok(canonical),
            }
        }

        // 2. exhaustive scan, exact source path
        let exact: Vec<PathBuf> = scan(&self.out_dir, &file_name)?
            .into_iter()
            .filter(|p| recorded_source(p).as_deref() == Some(declared_source))
            .collect();
        if let Some(found) = pick_unique(name, declared_source, exact)? {
            return Ok(found);
        }

        // 3. narrowed scan under the source's own directory
        if mode == LocateMode::Shared {
            let mut roots = vec![self.out_dir.join(declared_source)];
            if let Some(parent) = Path::new(declared_source).parent() {
                if !parent.as_os_str().is_empty() {
                    roots.push(self.out_dir.join(parent));
                }
            }
            roots.push(self.out_dir.join(source_file));

            let mut narrowed = Vec::new();
            for root in roots {
                for candidate in scan(&root, &file_name)? {
                    let same_file = recorded_source(&candidate)
                        .map(|r| r.rsplit('/').next() == Some(source_file))
                        .unwrap_or(false);
                    if same_file && !narrowed.contains(&candidate) {
                        narrowed.push(candidate);
                    }
                }
            }
            narrowed.sort();
            if let Some(found) = pick_unique(name, declared_source, narrowed)? {
                return Ok(found);
            }
        }

        Err(RegkitError::ArtifactNotFound {
            name: name.to_string(),
            source_path: declared_source.to_string(),
        })
    }

    /// Read and parse an output file.
    pub fn load(&self, path: &Path) -> Result<Artifact> {
        let body = std::fs::read_to_string(path)?;
        Artifact::from_output_json(path.to_path_buf(), &body)
    }

    /// [`locate`](Self::locate) followed by [`load`](Self::load).
    pub fn locate_and_load(
        &self,
        name: &str,
        declared_source: &str,
        mode: LocateMode,
    ) -> Result<Artifact> {
        let path = self.locate(name, declared_source, mode)?;
        self.load(&path)
    }
}

/// Source path an output file records, if it parses.
fn recorded_source(path: &Path) -> Option<String> {
    let body = std::fs::read_to_string(path).ok()?;
    match Artifact::from_output_json(path.to_path_buf(), &body) {
        Ok(artifact) if !artifact.declared_source_path.is_empty() => {
            Some(artifact.declared_source_path)
        }
        Ok(_) => None,
        Err(e) => {
            debug!("Skipping unreadable output {:?}: {}", path, e);
            None
        }
    }
}

/// Collapse byte-identical duplicates; more than one distinct candidate is ambiguous.
fn pick_unique(name: &str, declared: &str, candidates: Vec<PathBuf>) -> Result<Option<PathBuf>> {
    let mut distinct: Vec<(String, PathBuf)> = Vec::new();
    for path in candidates {
        let digest = sha256_hex(&std::fs::read(&path)?);
        if !distinct.iter().any(|(d, _)| *d == digest) {
            distinct.push((digest, path));
        }
    }

    match distinct.len() {
        0 => Ok(None),
        1 => Ok(distinct.pop().map(|(_, p)| p)),
        _ => {
            let candidates: Vec<PathBuf> = distinct.into_iter().map(|(_, p)| p).collect();
            warn!(
                "{} candidates for {} ({}): {:?}",
                candidates.len(),
                name,
                declared,
                candidates
            );
            Err(RegkitError::ArtifactAmbiguous {
                name: name.to_string(),
                source_path: declared.to_string(),
                candidates,
            })
        }
    }
}

/// All files named `file_name` under `dir`, sorted.
fn scan(dir: &Path, file_name: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    scan_recursive(dir, file_name, &mut files)?;
    files.sort();
    Ok(files)
}

fn scan_recursive(dir: &Path, file_name: &str, files: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            scan_recursive(&path, file_name, files)?;
        } else if path.file_name().map(|n| n == file_name).unwrap_or(false) {
            files.push(path);
        }
    }

    Ok(())
}
