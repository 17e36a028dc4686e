//! Compiler metadata manifest and compiled-artifact model.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::address::Address;
use crate::domain::error::{RegkitError, Result};

/// One entry of `manifest.sources`.
///
/// Either carries `content` already, or only the `keccak256` the compiler
/// recorded and needs to be resolved from disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keccak256: Option<String>,

    /// Remote fetch locations; transport-only, dropped once content is embedded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SourceEntry {
    /// Reference-only entry.
    pub fn reference(keccak256: impl Into<String>) -> Self {
        Self {
            keccak256: Some(keccak256.into()),
            ..Self::default()
        }
    }

    /// Entry with embedded content.
    pub fn embedded(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }
}

/// Compiler-produced metadata manifest.
///
/// Only `language`, `settings` and `sources` are interpreted; every other
/// field (`compiler`, `output`, `version`, ...) is carried through verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub language: String,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub settings: Value,

    #[serde(default)]
    pub sources: BTreeMap<String, SourceEntry>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Manifest {
    /// Parse a manifest from JSON text.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// `settings.compilationTarget` as `(source path, contract name)`.
    pub fn compilation_target(&self) -> Option<(String, String)> {
        let target = self.settings.get("compilationTarget")?.as_object()?;
        let (path, name) = target.iter().next()?;
        Some((path.clone(), name.as_str()?.to_string()))
    }

    /// Source keys whose file name equals `file_name`, sorted.
    pub fn sources_named(&self, file_name: &str) -> Vec<&str> {
        self.sources
            .keys()
            .filter(|k| k.rsplit('/').next() == Some(file_name))
            .map(String::as_str)
            .collect()
    }

    /// Canonical pretty JSON: object keys sorted at every level, trailing newline.
    pub fn to_canonical_json(&self) -> Result<String> {
        let value = serde_json::to_value(self)?;
        let mut out = serde_json::to_string_pretty(&sort_keys(&value))?;
        out.push('\n');
        Ok(out)
    }
}

/// Recursively sort JSON object keys so output never depends on map order.
fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.clone(), sort_keys(v));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// A compiled artifact read from the build output directory.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Contract name, e.g. `IdentityRegistry`.
    pub logical_name: String,
    /// Source path recorded by the compiler (`compilationTarget` key).
    pub declared_source_path: String,
    /// Embedded metadata manifest.
    pub manifest: Manifest,
    /// Output file the artifact was read from.
    pub output_path: PathBuf,
    /// Deployed address, when known.
    pub address: Option<Address>,
}

impl Artifact {
    /// Parse a compiler output file body.
    ///
    /// The manifest is taken from `metadata` (object or JSON string), falling
    /// back to `rawMetadata`.
    pub fn from_output_json(output_path: PathBuf, body: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(body)?;
        let manifest = match (doc.get("metadata"), doc.get("rawMetadata")) {
            (Some(Value::Object(_)), _) => {
                serde_json::from_value::<Manifest>(doc["metadata"].clone())?
            }
            (Some(Value::String(raw)), _) | (_, Some(Value::String(raw))) => {
                Manifest::from_json_str(raw)?
            }
            _ => {
                return Err(RegkitError::InvalidManifest(format!(
                    "{} has no metadata",
                    output_path.display()
                )))
            }
        };

        let file_stem = output_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let (declared_source_path, logical_name) = manifest
            .compilation_target()
            .unwrap_or_else(|| (String::new(), file_stem));

        Ok(Self {
            logical_name,
            declared_source_path,
            manifest,
            output_path,
            address: None,
        })
    }
}
