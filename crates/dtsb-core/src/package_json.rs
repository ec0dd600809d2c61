//! The subset of `package.json` that module resolution reads.

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

pub const MANIFEST_NAME: &str = "package.json";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub types: Option<String>,
    #[serde(default)]
    pub typings: Option<String>,
    #[serde(default, rename = "type")]
    pub package_type: Option<String>,
    #[serde(default)]
    pub exports: Option<PackageExports>,
    /// Kept as raw JSON; only the first matching version range is used.
    #[serde(default)]
    pub types_versions: Option<serde_json::Value>,
}

impl PackageJson {
    /// `types`, or its older spelling `typings`.
    pub fn types_entry(&self) -> Option<&str> {
        self.types
            .as_deref()
            .or(self.typings.as_deref())
            .filter(|entry| !entry.trim().is_empty())
    }
}

/// The `exports` field: a target path, a fallback list, or a map keyed by
/// subpaths (`"./sub"`) or by conditions (`"types"`, `"import"`, ...).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PackageExports {
    Null(()),
    Path(String),
    Array(Vec<PackageExports>),
    /// Keys keep manifest order; condition matching depends on it.
    Object(IndexMap<String, PackageExports>),
}

impl PackageExports {
    /// An object whose keys are subpaths rather than conditions.
    pub fn is_subpath_map(&self) -> bool {
        match self {
            PackageExports::Object(map) => map.keys().any(|key| key.starts_with('.')),
            _ => false,
        }
    }
}

pub fn read_package_json(path: &Path) -> Result<PackageJson> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_basic_fields() {
        let manifest: PackageJson = serde_json::from_str(
            r#"{"name": "aws-cdk-lib", "version": "2.0.0", "types": "index.d.ts", "type": "module"}"#,
        )
        .unwrap();
        assert_eq!(manifest.name.as_deref(), Some("aws-cdk-lib"));
        assert_eq!(manifest.types_entry(), Some("index.d.ts"));
        assert_eq!(manifest.package_type.as_deref(), Some("module"));
    }

    #[test]
    fn typings_is_used_when_types_is_missing() {
        let manifest: PackageJson = serde_json::from_str(r#"{"typings": "lib/main.d.ts"}"#).unwrap();
        assert_eq!(manifest.types_entry(), Some("lib/main.d.ts"));

        let manifest: PackageJson = serde_json::from_str(r#"{"types": ""}"#).unwrap();
        assert_eq!(manifest.types_entry(), None);
    }

    #[test]
    fn deserializes_exports_shapes() {
        let manifest: PackageJson = serde_json::from_str(
            r#"{
              "exports": {
                ".": {"types": "./index.d.ts", "default": "./index.js"},
                "./package.json": "./package.json",
                "./internal/*": null,
                "./legacy": ["./legacy.d.ts", "./legacy.js"]
              }
            }"#,
        )
        .unwrap();

        let exports = manifest.exports.unwrap();
        assert!(exports.is_subpath_map());
        let PackageExports::Object(map) = exports else {
            panic!("expected an exports map");
        };
        assert!(matches!(map.get("./internal/*"), Some(PackageExports::Null(()))));
        assert!(matches!(map.get("./legacy"), Some(PackageExports::Array(items)) if items.len() == 2));
        assert!(!map["."].is_subpath_map());
    }

    #[test]
    fn keeps_types_versions_as_json() {
        let manifest: PackageJson =
            serde_json::from_str(r#"{"typesVersions": {"*": {"*": ["ts4/*"]}}}"#).unwrap();
        assert!(manifest.types_versions.unwrap().is_object());
    }
}
