use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A package name as it appears in a specfile, lockfile or registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PkgName(String);

impl PkgName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PkgName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A loose version constraint from a specfile (`^1.2`, `>=2.0`, ...).
/// Empty means "any version".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PkgSpec(String);

impl PkgSpec {
    pub fn new(spec: impl Into<String>) -> Self {
        Self(spec.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for PkgSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An exact version pinned by a lockfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PkgVersion(String);

impl PkgVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }
}

impl std::fmt::Display for PkgVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry metadata for a single package, as returned by `info` and `search`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub homepage_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub documentation_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_code_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bug_tracker_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub license: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// Render an author as `Name <email>`, dropping whichever half is missing.
pub fn format_author(name: &str, email: &str) -> String {
    match (name.trim(), email.trim()) {
        ("", "") => String::new(),
        (name, "") => name.to_string(),
        ("", email) => format!("<{}>", email),
        (name, email) => format!("{} <{}>", name, email),
    }
}

/// Outcome of inferring packages from a project's imports.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GuessResult {
    /// Every package the guesser selected, by normalized name.
    pub packages: BTreeSet<PkgName>,
    /// `false` when import extraction hit an internal failure (e.g. an
    /// unreadable source file). The packages found so far are still returned.
    pub success: bool,
}

/// Named behavioral flags distinguishing how a backend's tool interacts
/// with the lockfile and the installed environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Quirk {
    /// `add` and `remove` rewrite the lockfile themselves.
    AddRemoveAlsoLocks,
    /// `add` and `remove` also install into the environment.
    AddRemoveAlsoInstalls,
    /// `lock` also installs into the environment.
    LockAlsoInstalls,
    /// `install` does not uninstall packages dropped from the lockfile.
    InstallMayNotPrune,
}

impl std::fmt::Display for Quirk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quirk::AddRemoveAlsoLocks => write!(f, "add/remove also locks"),
            Quirk::AddRemoveAlsoInstalls => write!(f, "add/remove also installs"),
            Quirk::LockAlsoInstalls => write!(f, "lock also installs"),
            Quirk::InstallMayNotPrune => write!(f, "install may not prune"),
        }
    }
}

/// Static per-ecosystem metadata.
#[derive(Debug, Clone, Serialize)]
pub struct BackendDescriptor {
    pub name: &'static str,
    /// Registry ecosystem used to pick an index snapshot (`pypi`, `npm`).
    pub ecosystem: &'static str,
    pub specfile: &'static str,
    pub lockfile: &'static str,
    pub filename_patterns: &'static [&'static str],
    pub quirks: &'static [Quirk],
}

impl BackendDescriptor {
    pub fn has_quirk(&self, quirk: Quirk) -> bool {
        self.quirks.contains(&quirk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_author() {
        assert_eq!(format_author("Ada", "ada@example.com"), "Ada <ada@example.com>");
        assert_eq!(format_author("Ada", ""), "Ada");
        assert_eq!(format_author("", "ada@example.com"), "<ada@example.com>");
        assert_eq!(format_author(" ", ""), "");
    }

    #[test]
    fn test_has_quirk() {
        let descriptor = BackendDescriptor {
            name: "test",
            ecosystem: "test",
            specfile: "spec",
            lockfile: "lock",
            filename_patterns: &["*.t"],
            quirks: &[Quirk::AddRemoveAlsoLocks],
        };
        assert!(descriptor.has_quirk(Quirk::AddRemoveAlsoLocks));
        assert!(!descriptor.has_quirk(Quirk::LockAlsoInstalls));
        assert_eq!(Quirk::InstallMayNotPrune.to_string(), "install may not prune");
    }
}
