use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;

use crate::config::Config;
use crate::exec;
use crate::guess::stdlib;
use crate::models::{
    BackendDescriptor, GuessResult, PackageMetadata, PkgName, PkgSpec, PkgVersion, Quirk,
};
use crate::registry::npm::NpmClient;

use super::{compile_regexps, guess_imports, lookup_all, Backend, GuessPlan};

pub const DESCRIPTOR: BackendDescriptor = BackendDescriptor {
    name: "nodejs-npm",
    ecosystem: "npm",
    specfile: "package.json",
    lockfile: "package-lock.json",
    filename_patterns: &["*.js", "*.jsx", "*.mjs", "*.cjs", "*.ts", "*.tsx"],
    quirks: &[Quirk::AddRemoveAlsoLocks, Quirk::AddRemoveAlsoInstalls],
};

const GUESS_REGEXPS: &[&str] = &[
    r#"\brequire\(\s*['"]([^'"]+)['"]\s*\)"#,
    r#"^\s*import\s+(?:[\w*{}\s,$]+\s+from\s+)?['"]([^'"]+)['"]"#,
    r#"^\s*export\s+[\w*{}\s,$]+\s+from\s+['"]([^'"]+)['"]"#,
    r#"\bimport\(\s*['"]([^'"]+)['"]\s*\)"#,
];

/// Node.js projects managed by npm.
pub struct NodeBackend {
    root: PathBuf,
    config: Config,
    npm: NpmClient,
    regexps: Vec<Regex>,
}

impl NodeBackend {
    pub fn new(config: &Config, root: &Path, client: &Client) -> Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            config: config.clone(),
            npm: NpmClient::new(client.clone(), config.npm_url.clone()),
            regexps: compile_regexps(GUESS_REGEXPS)?,
        })
    }

    fn npm(&self, args: Vec<String>) -> Result<()> {
        exec::run(&self.config.npm, &args, &self.root)
    }

    fn read_json(&self, path: &Path) -> Result<Value> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("{}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("{}", path.display()))
    }
}

/// npm names are lowercase; normalization only folds case.
pub fn normalize_package_name(name: &str) -> PkgName {
    PkgName::new(name.trim().to_lowercase())
}

/// Reduce an import specifier to the package providing it:
/// `lodash/fp` → `lodash`, `@babel/core/lib` → `@babel/core`.
/// Relative paths and `node:` built-ins yield nothing.
fn modules_of(specifier: &str) -> Vec<String> {
    let specifier = specifier.trim();
    if specifier.is_empty()
        || specifier.starts_with('.')
        || specifier.starts_with('/')
        || specifier.starts_with("node:")
    {
        return Vec::new();
    }

    let mut parts = specifier.split('/');
    let root = match (parts.next(), parts.next()) {
        (Some(scope), Some(name)) if scope.starts_with('@') => format!("{}/{}", scope, name),
        (Some(scope), None) if scope.starts_with('@') => return Vec::new(),
        (Some(name), _) => name.to_string(),
        (None, _) => return Vec::new(),
    };
    vec![root]
}

/// `dependencies` and `devDependencies` of a `package.json` document.
fn parse_package_json(json: &Value) -> BTreeMap<PkgName, PkgSpec> {
    let mut deps = BTreeMap::new();

    for section in ["dependencies", "devDependencies"] {
        if let Some(pkgs) = json.get(section).and_then(Value::as_object) {
            for (name, range) in pkgs {
                let spec = range.as_str().unwrap_or_default();
                deps.insert(PkgName::new(name.clone()), PkgSpec::new(spec));
            }
        }
    }

    deps
}

/// Top-level packages of a `package-lock.json` document. Lockfile v2/v3 list
/// them under `packages["node_modules/<name>"]`; v1 under `dependencies`.
fn parse_package_lock(json: &Value) -> BTreeMap<PkgName, PkgVersion> {
    let mut locked = BTreeMap::new();

    if let Some(packages) = json.get("packages").and_then(Value::as_object) {
        for (pkg_path, info) in packages {
            // Skip the root entry and nested copies
            let Some(name) = pkg_path.strip_prefix("node_modules/") else {
                continue;
            };
            if name.contains("/node_modules/") {
                continue;
            }
            if let Some(version) = info.get("version").and_then(Value::as_str) {
                locked.insert(PkgName::new(name), PkgVersion::new(version));
            }
        }
    } else if let Some(deps) = json.get("dependencies").and_then(Value::as_object) {
        for (name, info) in deps {
            if let Some(version) = info.get("version").and_then(Value::as_str) {
                locked.insert(PkgName::new(name.clone()), PkgVersion::new(version));
            }
        }
    }

    locked
}

#[async_trait]
impl Backend for NodeBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &DESCRIPTOR
    }

    fn root(&self) -> &Path {
        &self.root
    }

    async fn info(&self, name: &str) -> Result<Option<PackageMetadata>> {
        self.npm.info(name).await
    }

    async fn search(&self, query: &str) -> Result<Vec<PackageMetadata>> {
        let candidates = self
            .npm
            .search(query)
            .await?
            .into_iter()
            .filter(|hit| hit.name.contains(query))
            .map(|hit| (hit.name, hit.popularity))
            .collect();

        lookup_all(self, candidates, self.config.search_batch_size).await
    }

    fn add(&self, pkgs: &BTreeMap<PkgName, PkgSpec>, project_name: Option<&str>) -> Result<()> {
        if !self.specfile_path().exists() {
            self.npm(vec!["init".to_string(), "-y".to_string()])?;
            if let Some(name) = project_name.filter(|n| !n.is_empty()) {
                self.npm(vec![
                    "pkg".to_string(),
                    "set".to_string(),
                    format!("name={}", name),
                ])?;
            }
        }

        let mut args = vec!["install".to_string()];
        for (name, spec) in pkgs {
            if spec.is_empty() {
                args.push(name.to_string());
            } else {
                args.push(format!("{}@{}", name, spec));
            }
        }
        self.npm(args)
    }

    fn remove(&self, pkgs: &BTreeSet<PkgName>) -> Result<()> {
        let mut args = vec!["uninstall".to_string()];
        args.extend(pkgs.iter().map(ToString::to_string));
        self.npm(args)
    }

    fn lock(&self) -> Result<()> {
        self.npm(vec!["install".to_string(), "--package-lock-only".to_string()])
    }

    fn install(&self) -> Result<()> {
        // `npm ci` wipes node_modules first, so removed packages do not linger
        self.npm(vec!["ci".to_string()])
    }

    fn list_specfile(&self) -> Result<BTreeMap<PkgName, PkgSpec>> {
        Ok(parse_package_json(&self.read_json(&self.specfile_path())?))
    }

    fn list_lockfile(&self) -> Result<BTreeMap<PkgName, PkgVersion>> {
        Ok(parse_package_lock(&self.read_json(&self.lockfile_path())?))
    }

    fn normalize_package_name(&self, name: &str) -> PkgName {
        normalize_package_name(name)
    }

    fn package_dir(&self) -> Result<PathBuf> {
        Ok(self.root.join("node_modules"))
    }

    fn guess_regexps(&self) -> &[Regex] {
        &self.regexps
    }

    fn guess(&self, include_declared: bool) -> Result<GuessResult> {
        guess_imports(
            self,
            &self.config,
            GuessPlan {
                stdlib: stdlib::NODE,
                normalize: normalize_package_name,
                modules_of,
                self_named_fallback: true,
                include_declared,
            },
        )
    }
}
