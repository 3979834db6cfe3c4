use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

use crate::config::Config;
use crate::exec;
use crate::guess::stdlib;
use crate::index::RegistryIndex;
use crate::models::{
    BackendDescriptor, GuessResult, PackageMetadata, PkgName, PkgSpec, PkgVersion, Quirk,
};
use crate::registry::pypi::PypiClient;

use super::{compile_regexps, guess_imports, lookup_all, Backend, GuessPlan};

pub const DESCRIPTOR: BackendDescriptor = BackendDescriptor {
    name: "python3-poetry",
    ecosystem: "pypi",
    specfile: "pyproject.toml",
    lockfile: "poetry.lock",
    filename_patterns: &["*.py"],
    quirks: &[
        Quirk::AddRemoveAlsoLocks,
        Quirk::AddRemoveAlsoInstalls,
        // `poetry install` leaves behind packages dropped from the lockfile,
        // e.g. after an interrupted `poetry remove`
        Quirk::InstallMayNotPrune,
    ],
};

const GUESS_REGEXPS: &[&str] = &[
    r"^\s*from\s+([\w.]+)\s+import\b",
    r"^\s*import\s+([\w.]+(?:\s+as\s+\w+)?(?:\s*,\s*[\w.]+(?:\s+as\s+\w+)?)*)",
];

/// Relevant parts of `pyproject.toml`.
#[derive(Debug, Default, Deserialize)]
struct Pyproject {
    #[serde(default)]
    tool: Tool,
    #[serde(default)]
    project: Option<Project>,
}

#[derive(Debug, Default, Deserialize)]
struct Tool {
    poetry: Option<Poetry>,
}

#[derive(Debug, Default, Deserialize)]
struct Project {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Poetry {
    name: Option<String>,
    /// Values are either version strings or tables with a `version` key.
    #[serde(default)]
    dependencies: BTreeMap<String, toml::Value>,
    #[serde(default, rename = "dev-dependencies")]
    dev_dependencies: BTreeMap<String, toml::Value>,
    #[serde(default)]
    group: BTreeMap<String, PoetryGroup>,
}

#[derive(Debug, Default, Deserialize)]
struct PoetryGroup {
    #[serde(default)]
    dependencies: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Deserialize)]
struct PoetryLock {
    #[serde(default)]
    package: Vec<PoetryLockPackage>,
}

#[derive(Debug, Deserialize)]
struct PoetryLockPackage {
    name: String,
    version: String,
}

/// Python 3 projects managed by Poetry, resolved against PyPI.
pub struct PythonBackend {
    root: PathBuf,
    config: Config,
    pypi: PypiClient,
    regexps: Vec<Regex>,
}

impl PythonBackend {
    pub fn new(config: &Config, root: &Path, client: &Client) -> Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            config: config.clone(),
            pypi: PypiClient::new(client.clone(), config.pypi_url.clone()),
            regexps: compile_regexps(GUESS_REGEXPS)?,
        })
    }

    fn poetry(&self, args: &[&str]) -> Result<()> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        exec::run(&self.config.poetry, &args, &self.root)
    }

    fn read_pyproject(&self) -> Result<Pyproject> {
        let path = self.specfile_path();
        let content =
            std::fs::read_to_string(&path).with_context(|| format!("{}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("{}", path.display()))
    }

    /// Directory name Poetry derives for this project's virtualenv.
    fn project_name(&self) -> Result<String> {
        if self.specfile_path().exists() {
            let pyproject = self.read_pyproject()?;
            let name = pyproject
                .tool
                .poetry
                .and_then(|p| p.name)
                .or_else(|| pyproject.project.and_then(|p| p.name));
            if let Some(name) = name.filter(|n| !n.is_empty()) {
                return Ok(name);
            }
        }

        let root = std::path::absolute(&self.root)?;
        Ok(root
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default())
    }
}

/// PEP 503 normalization: lowercase, runs of `-`, `_` and `.` become `-`.
pub fn normalize_package_name(name: &str) -> PkgName {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    PkgName::new(out)
}

/// `"os.path, numpy as np"` → `["os", "numpy"]`. Relative imports are dropped.
fn modules_of(capture: &str) -> Vec<String> {
    capture
        .split(',')
        .filter_map(|part| {
            let dotted = part.split_whitespace().next()?;
            if dotted.starts_with('.') {
                return None;
            }
            let top = dotted.split('.').next()?;
            (!top.is_empty()).then(|| top.to_string())
        })
        .collect()
}

/// Version string of a Poetry dependency entry. Git and path dependencies
/// have none and are not listed.
fn spec_of(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Table(t) => t.get("version").and_then(|v| v.as_str()).map(str::to_string),
        _ => None,
    }
    .filter(|s| !s.is_empty())
}

fn parse_pyproject(pyproject: Pyproject) -> BTreeMap<PkgName, PkgSpec> {
    let Some(poetry) = pyproject.tool.poetry else {
        return BTreeMap::new();
    };

    let groups = poetry.group.into_values().map(|g| g.dependencies);
    std::iter::once(poetry.dependencies)
        .chain(std::iter::once(poetry.dev_dependencies))
        .chain(groups)
        .flatten()
        // The interpreter constraint is not a package
        .filter(|(name, _)| name != "python")
        .filter_map(|(name, value)| Some((PkgName::new(name), PkgSpec::new(spec_of(&value)?))))
        .collect()
}

#[async_trait]
impl Backend for PythonBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &DESCRIPTOR
    }

    fn root(&self) -> &Path {
        &self.root
    }

    async fn info(&self, name: &str) -> Result<Option<PackageMetadata>> {
        self.pypi.info(name).await
    }

    async fn search(&self, query: &str) -> Result<Vec<PackageMetadata>> {
        let index = RegistryIndex::load(
            &self.config.index_dir,
            DESCRIPTOR.ecosystem,
            normalize_package_name,
        )?;
        let candidates = index
            .search(query)
            .into_iter()
            .map(|c| (c.name.clone(), c.popularity))
            .collect();

        lookup_all(self, candidates, self.config.search_batch_size).await
    }

    fn add(&self, pkgs: &BTreeMap<PkgName, PkgSpec>, project_name: Option<&str>) -> Result<()> {
        if !self.specfile_path().exists() {
            let mut init = vec!["init", "--no-interaction"];
            if let Some(name) = project_name.filter(|n| !n.is_empty()) {
                init.extend(["--name", name]);
            }
            self.poetry(&init)?;
        }

        let mut args = vec!["add".to_string()];
        for (name, spec) in pkgs {
            if spec.is_empty() {
                args.push(name.to_string());
            } else {
                args.push(format!("{}@{}", name, spec));
            }
        }
        exec::run(&self.config.poetry, &args, &self.root)
    }

    fn remove(&self, pkgs: &BTreeSet<PkgName>) -> Result<()> {
        let mut args = vec!["remove".to_string()];
        args.extend(pkgs.iter().map(ToString::to_string));
        exec::run(&self.config.poetry, &args, &self.root)
    }

    fn lock(&self) -> Result<()> {
        self.poetry(&["lock", "--no-update"])
    }

    fn install(&self) -> Result<()> {
        self.poetry(&["install"])
    }

    fn list_specfile(&self) -> Result<BTreeMap<PkgName, PkgSpec>> {
        Ok(parse_pyproject(self.read_pyproject()?))
    }

    fn list_lockfile(&self) -> Result<BTreeMap<PkgName, PkgVersion>> {
        let path = self.lockfile_path();
        let content =
            std::fs::read_to_string(&path).with_context(|| format!("{}", path.display()))?;
        let lock: PoetryLock =
            toml::from_str(&content).with_context(|| format!("{}", path.display()))?;

        Ok(lock
            .package
            .into_iter()
            .map(|p| (PkgName::new(p.name), PkgVersion::new(p.version)))
            .collect())
    }

    fn normalize_package_name(&self, name: &str) -> PkgName {
        normalize_package_name(name)
    }

    fn package_dir(&self) -> Result<PathBuf> {
        // An activated virtualenv wins
        if let Some(venv) = &self.config.virtual_env {
            return Ok(venv.clone());
        }

        let in_project = self.root.join(".venv");
        if in_project.is_dir() {
            return Ok(in_project);
        }

        // Otherwise reconstruct Poetry's naming convention. Asking Poetry
        // directly (`poetry env info`) would create the environment.
        let venvs = exec::output(
            &self.config.poetry,
            &["config".to_string(), "virtualenvs.path".to_string()],
            &self.root,
        )?;
        let venvs = venvs.trim().trim_matches('"');

        let version = exec::output(
            &self.config.python,
            &[
                "-c".to_string(),
                "import sys; print('.'.join(map(str, sys.version_info[:2])))".to_string(),
            ],
            &self.root,
        )?;

        Ok(PathBuf::from(venvs).join(format!("{}-py{}", self.project_name()?, version.trim())))
    }

    fn guess_regexps(&self) -> &[Regex] {
        &self.regexps
    }

    fn guess(&self, include_declared: bool) -> Result<GuessResult> {
        guess_imports(
            self,
            &self.config,
            GuessPlan {
                stdlib: stdlib::PYTHON,
                normalize: normalize_package_name,
                modules_of,
                self_named_fallback: false,
                include_declared,
            },
        )
    }
}
