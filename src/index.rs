//! Registry index snapshots: which packages declare which importable modules,
//! and how popular each package is.
//!
//! A snapshot is a JSON array stored at `<index_dir>/<ecosystem>.json`:
//!
//! ```json
//! [
//!   { "name": "beautifulsoup4", "downloads": 1200000, "modules": ["bs4"] },
//!   { "name": "requests", "downloads": 9000000, "modules": ["requests"] }
//! ]
//! ```
//!
//! A snapshot that does not exist yields an empty index.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::PkgName;

/// One published package as seen by the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageCandidate {
    pub name: String,
    #[serde(rename = "downloads", default)]
    pub popularity: u64,
    #[serde(default)]
    pub modules: Vec<String>,
}

impl PackageCandidate {
    pub fn new(name: impl Into<String>, popularity: u64, modules: &[&str]) -> Self {
        Self {
            name: name.into(),
            popularity,
            modules: modules.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Read-only module → candidates mapping built from one snapshot.
#[derive(Debug, Default)]
pub struct RegistryIndex {
    by_module: HashMap<String, Vec<PackageCandidate>>,
    by_package: HashMap<PkgName, PackageCandidate>,
}

impl RegistryIndex {
    /// Build an index. Package lookups are keyed by `normalize(name)`.
    pub fn from_candidates(
        candidates: Vec<PackageCandidate>,
        normalize: fn(&str) -> PkgName,
    ) -> Self {
        let mut by_module: HashMap<String, Vec<PackageCandidate>> = HashMap::new();
        let mut by_package = HashMap::new();

        for candidate in candidates {
            for module in &candidate.modules {
                by_module
                    .entry(module.clone())
                    .or_default()
                    .push(candidate.clone());
            }
            by_package.insert(normalize(&candidate.name), candidate);
        }

        Self {
            by_module,
            by_package,
        }
    }

    /// Load `<dir>/<ecosystem>.json`. Fails on a malformed snapshot.
    pub fn load(dir: &Path, ecosystem: &str, normalize: fn(&str) -> PkgName) -> Result<Self> {
        let path = dir.join(format!("{}.json", ecosystem));
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(snapshot = %path.display(), "no registry index snapshot");
                return Ok(Self::default());
            }
            Err(e) => return Err(e).with_context(|| format!("{}", path.display())),
        };

        let candidates: Vec<PackageCandidate> =
            serde_json::from_str(&content).with_context(|| format!("{}", path.display()))?;
        tracing::debug!(
            snapshot = %path.display(),
            packages = candidates.len(),
            "loaded registry index"
        );

        Ok(Self::from_candidates(candidates, normalize))
    }

    /// Packages declaring `module`, in snapshot order.
    pub fn candidates_for(&self, module: &str) -> &[PackageCandidate] {
        self.by_module
            .get(module)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// A package by already-normalized name.
    pub fn package(&self, name: &PkgName) -> Option<&PackageCandidate> {
        self.by_package.get(name)
    }

    /// Every package whose name contains `query`.
    pub fn search(&self, query: &str) -> Vec<&PackageCandidate> {
        self.by_package
            .values()
            .filter(|c| c.name.contains(query))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_package.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lower(name: &str) -> PkgName {
        PkgName::new(name.to_lowercase())
    }

    #[test]
    fn test_index_lookups() {
        let index = RegistryIndex::from_candidates(
            vec![
                PackageCandidate::new("PyYAML", 5000, &["yaml"]),
                PackageCandidate::new("ruamel.yaml", 800, &["ruamel", "yaml"]),
            ],
            lower,
        );

        let yaml: Vec<_> = index.candidates_for("yaml").iter().map(|c| &c.name).collect();
        assert_eq!(yaml, ["PyYAML", "ruamel.yaml"]);
        assert!(index.candidates_for("nothing").is_empty());
        assert_eq!(index.package(&lower("pyyaml")).map(|c| c.popularity), Some(5000));
        assert!(index.package(&lower("missing")).is_none());
        assert_eq!(index.search("ruamel").len(), 1);
    }

    #[test]
    fn test_load_snapshot() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("pypi.json"),
            r#"[{"name": "requests", "downloads": 900, "modules": ["requests"]},
                {"name": "bare"}]"#,
        )
        .unwrap();

        let index = RegistryIndex::load(dir.path(), "pypi", lower).unwrap();
        assert_eq!(index.candidates_for("requests")[0].popularity, 900);
        assert_eq!(index.package(&lower("bare")).unwrap().popularity, 0);
    }

    #[test]
    fn test_missing_snapshot_is_empty() {
        let dir = TempDir::new().unwrap();
        let index = RegistryIndex::load(dir.path(), "npm", lower).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_malformed_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("pypi.json"), "{").unwrap();
        let err = RegistryIndex::load(dir.path(), "pypi", lower).unwrap_err();
        assert!(format!("{:#}", err).contains("pypi.json"));
    }
}
