//! Import remapping table.
//!
//! Rules translate logical import prefixes into physical directories and
//! are always consulted most-specific first.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProjectConfig;
use crate::domain::error::{RegkitError, Result};

/// File holding one remapping per line at the project root.
pub const REMAPPINGS_FILE: &str = "remappings.txt";

/// A single `from=to` rule. Both sides are stored without a trailing `/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemappingRule {
    /// Optional compilation context (`context:from=to`); not used for matching.
    pub context: Option<String>,
    pub from_prefix: String,
    pub to_prefix: String,
}

impl RemappingRule {
    pub fn new(from_prefix: &str, to_prefix: &str) -> Self {
        Self {
            context: None,
            from_prefix: normalize(from_prefix).to_string(),
            to_prefix: normalize(to_prefix).to_string(),
        }
    }

    /// Parse `from=to` or `context:from=to`.
    pub fn parse(line: &str) -> Result<Self> {
        let (left, right) = line
            .split_once('=')
            .ok_or_else(|| RegkitError::InvalidRemapping(line.to_string()))?;

        let (context, from) = match left.split_once(':') {
            Some((ctx, from)) => (Some(ctx.trim().to_string()), from),
            None => (None, left),
        };

        let from = normalize(from.trim());
        if from.is_empty() {
            return Err(RegkitError::InvalidRemapping(line.to_string()));
        }

        Ok(Self {
            context: context.filter(|c| !c.is_empty()),
            from_prefix: from.to_string(),
            to_prefix: normalize(right.trim()).to_string(),
        })
    }

    /// Substitute the prefix if `logical` equals it or continues it past a `/`.
    pub fn apply(&self, logical: &str) -> Option<String> {
        if logical == self.from_prefix {
            return Some(self.to_prefix.clone());
        }
        let rest = logical
            .strip_prefix(self.from_prefix.as_str())?
            .strip_prefix('/')?;
        if self.to_prefix.is_empty() {
            Some(rest.to_string())
        } else {
            Some(format!("{}/{}", self.to_prefix, rest))
        }
    }
}

fn normalize(prefix: &str) -> &str {
    prefix.trim_end_matches('/')
}

/// Ordered remapping rules, longest `from_prefix` first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemappingTable {
    rules: Vec<RemappingRule>,
}

impl RemappingTable {
    /// Build a table from rules in declaration order.
    ///
    /// Duplicate `from_prefix` entries keep the first declaration; the rest
    /// are sorted by descending prefix length, ties keeping declaration order.
    pub fn from_rules(rules: impl IntoIterator<Item = RemappingRule>) -> Self {
        let mut kept: Vec<RemappingRule> = Vec::new();
        for rule in rules {
            if kept.iter().any(|r| r.from_prefix == rule.from_prefix) {
                debug!("Ignoring shadowed remapping for {}", rule.from_prefix);
                continue;
            }
            kept.push(rule);
        }
        kept.sort_by(|a, b| b.from_prefix.len().cmp(&a.from_prefix.len()));
        Self { rules: kept }
    }

    /// Parse newline-separated rules; blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let rules = parse_lines(text)?;
        Ok(Self::from_rules(rules))
    }

    /// Load rules from `remappings.txt` and then the project configuration.
    pub fn load(config: &ProjectConfig) -> Result<Self> {
        let mut rules = Vec::new();

        let file = config.root.join(REMAPPINGS_FILE);
        if file.is_file() {
            rules.extend(parse_lines(&std::fs::read_to_string(&file)?)?);
        }
        for line in &config.remappings {
            rules.push(RemappingRule::parse(line)?);
        }

        let table = Self::from_rules(rules);
        debug!("Loaded {} remapping rules", table.len());
        Ok(table)
    }

    pub fn rules(&self) -> &[RemappingRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every substitution for `logical`, most specific rule first.
    pub fn candidates<'a>(&'a self, logical: &'a str) -> impl Iterator<Item = String> + 'a {
        self.rules.iter().filter_map(move |rule| rule.apply(logical))
    }

    /// Substitution by the most specific matching rule.
    pub fn remap(&self, logical: &str) -> Option<String> {
        self.candidates(logical).next()
    }

    /// Whether any rule would rewrite `path`.
    pub fn matches(&self, path: &Path) -> bool {
        let logical = path.to_string_lossy();
        self.remap(&logical).is_some()
    }
}

fn parse_lines(text: &str) -> Result<Vec<RemappingRule>> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(RemappingRule::parse)
        .collect()
}
