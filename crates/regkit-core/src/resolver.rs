//! Logical source path → physical file resolution.
//!
//! Resolution is an ordered list of strategies. Each strategy is a pure
//! function of the logical path and the [`ResolveContext`]; the first one to
//! produce an existing file wins. Given the same path and the same
//! filesystem state the outcome is always the same.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::ProjectConfig;
use crate::domain::error::{RegkitError, Result};
use crate::remap::RemappingTable;

/// Conventional source roots, tried in this order.
pub const CONVENTIONAL_ROOTS: [&str; 4] = ["src", "contracts", "lib", "node_modules"];

/// Directory package-alias imports (`@scope/...`) are installed under.
pub const PACKAGE_DIR: &str = "node_modules";

/// Segments after which a path is considered project-relative.
const ANCHOR_SEGMENTS: [&str; 2] = ["contracts", "src"];

/// Everything a strategy may look at.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub root: &'a Path,
    pub remappings: &'a RemappingTable,
    pub search_roots: &'a [String],
}

/// One resolution strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    PackageAlias,
    Remapping,
    Literal,
    SearchRoots,
    StripAnchor,
}

/// Strategies in the order they are tried.
pub const STRATEGIES: [Strategy; 5] = [
    Strategy::PackageAlias,
    Strategy::Remapping,
    Strategy::Literal,
    Strategy::SearchRoots,
    Strategy::StripAnchor,
];

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::PackageAlias => "package_alias",
            Strategy::Remapping => "remapping",
            Strategy::Literal => "literal",
            Strategy::SearchRoots => "search_roots",
            Strategy::StripAnchor => "strip_anchor",
        }
    }

    /// Run this strategy alone.
    pub fn run(&self, logical: &str, ctx: &ResolveContext<'_>) -> Option<PathBuf> {
        match self {
            Strategy::PackageAlias => package_alias(logical, ctx),
            Strategy::Remapping => remapping(logical, ctx),
            Strategy::Literal => literal(logical, ctx),
            Strategy::SearchRoots => search_roots(logical, ctx),
            Strategy::StripAnchor => strip_anchor(logical, ctx),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    trace!("probe {:?}", path);
    path.is_file().then_some(path)
}

fn package_alias(logical: &str, ctx: &ResolveContext<'_>) -> Option<PathBuf> {
    if !logical.starts_with('@') {
        return None;
    }
    existing(ctx.root.join(PACKAGE_DIR).join(logical))
}

fn remapping(logical: &str, ctx: &ResolveContext<'_>) -> Option<PathBuf> {
    ctx.remappings
        .candidates(logical)
        .find_map(|candidate| existing(ctx.root.join(candidate)))
}

fn literal(logical: &str, ctx: &ResolveContext<'_>) -> Option<PathBuf> {
    existing(ctx.root.join(logical))
}

fn search_roots(logical: &str, ctx: &ResolveContext<'_>) -> Option<PathBuf> {
    ctx.search_roots
        .iter()
        .find_map(|root| existing(ctx.root.join(root).join(logical)))
}

fn strip_anchor(logical: &str, ctx: &ResolveContext<'_>) -> Option<PathBuf> {
    let stripped = strip_to_anchor(logical)?;
    ctx.search_roots
        .iter()
        .find_map(|root| existing(ctx.root.join(root).join(stripped)))
}

/// Remainder of `logical` after the first `contracts/` or `src/` segment.
fn strip_to_anchor(logical: &str) -> Option<&str> {
    let mut offset = 0;
    for segment in logical.split('/') {
        let next = offset + segment.len() + 1;
        if ANCHOR_SEGMENTS.contains(&segment) && next < logical.len() {
            return Some(&logical[next..]);
        }
        offset = next;
    }
    None
}

/// A successful resolution and the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub path: PathBuf,
    pub strategy: Strategy,
}

/// Resolves logical source paths against one project.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    remappings: RemappingTable,
    search_roots: Vec<String>,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>, remappings: RemappingTable) -> Self {
        Self {
            root: root.into(),
            remappings,
            search_roots: CONVENTIONAL_ROOTS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Resolver for a configured project: its root and its layout's
    /// search roots.
    pub fn for_project(config: &ProjectConfig, remappings: RemappingTable) -> Self {
        Self::new(config.root.clone(), remappings).with_search_roots(config.search_roots())
    }

    /// Replace the conventional search roots.
    pub fn with_search_roots(mut self, roots: Vec<String>) -> Self {
        self.search_roots = roots;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn remappings(&self) -> &RemappingTable {
        &self.remappings
    }

    pub fn context(&self) -> ResolveContext<'_> {
        ResolveContext {
            root: &self.root,
            remappings: &self.remappings,
            search_roots: &self.search_roots,
        }
    }

    /// Resolve and report which strategy hit.
    pub fn resolve_traced(&self, logical: &str) -> Option<Resolution> {
        let ctx = self.context();
        STRATEGIES.iter().find_map(|strategy| {
            strategy.run(logical, &ctx).map(|path| {
                debug!("Resolved {} via {} -> {:?}", logical, strategy, path);
                Resolution {
                    path,
                    strategy: *strategy,
                }
            })
        })
    }

    /// Resolve `logical` to an existing file.
    pub fn resolve(&self, logical: &str) -> Result<PathBuf> {
        self.resolve_traced(logical)
            .map(|r| r.path)
            .ok_or_else(|| RegkitError::PathNotFound(logical.to_string()))
    }
}
