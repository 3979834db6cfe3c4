//! The capability contract every ecosystem implements, plus the registry
//! that maps backend names to implementations.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use reqwest::Client;

use crate::config::Config;
use crate::guess::stdlib::StdlibModules;
use crate::guess::Guesser;
use crate::imports::{self, ImportSyntax};
use crate::index::RegistryIndex;
use crate::models::{BackendDescriptor, GuessResult, PackageMetadata, PkgName, PkgSpec, PkgVersion};

pub mod node;
pub mod python;

/// One package ecosystem driven through its native tool.
///
/// Operations that shell out block until the tool exits. Registry lookups are
/// async so that `search` can fan them out.
#[async_trait]
pub trait Backend: Send + Sync {
    fn descriptor(&self) -> &BackendDescriptor;

    /// Project directory the backend operates in.
    fn root(&self) -> &Path;

    fn specfile_path(&self) -> PathBuf {
        self.root().join(self.descriptor().specfile)
    }

    fn lockfile_path(&self) -> PathBuf {
        self.root().join(self.descriptor().lockfile)
    }

    /// Metadata for one package; `Ok(None)` if the registry does not know it.
    async fn info(&self, name: &str) -> Result<Option<PackageMetadata>>;

    /// Packages whose name contains `query`, most popular first.
    async fn search(&self, query: &str) -> Result<Vec<PackageMetadata>>;

    /// Add packages, creating the specfile (named `project_name`) if needed.
    fn add(&self, pkgs: &BTreeMap<PkgName, PkgSpec>, project_name: Option<&str>) -> Result<()>;

    fn remove(&self, pkgs: &BTreeSet<PkgName>) -> Result<()>;

    /// Resolve the specfile into the lockfile without upgrading pinned versions.
    fn lock(&self) -> Result<()>;

    /// Materialize the lockfile into the environment. See
    /// [`Quirk::InstallMayNotPrune`](crate::models::Quirk::InstallMayNotPrune)
    /// for backends where this can leave stale packages behind.
    fn install(&self) -> Result<()>;

    fn list_specfile(&self) -> Result<BTreeMap<PkgName, PkgSpec>>;

    fn list_lockfile(&self) -> Result<BTreeMap<PkgName, PkgVersion>>;

    fn normalize_package_name(&self, name: &str) -> PkgName;

    /// Where dependencies get installed.
    fn package_dir(&self) -> Result<PathBuf>;

    /// Line patterns recognizing import statements; group 1 is the import.
    fn guess_regexps(&self) -> &[Regex];

    /// Infer the packages this project's imports need. Packages already in
    /// the specfile are left out unless `include_declared` is set.
    fn guess(&self, include_declared: bool) -> Result<GuessResult>;
}

/// Names of every supported backend, in detection priority order.
pub fn names() -> Vec<&'static str> {
    vec![python::DESCRIPTOR.name, node::DESCRIPTOR.name]
}

/// Instantiate every backend for the project at `root`.
pub fn all(config: &Config, root: &Path, client: &Client) -> Result<Vec<Box<dyn Backend>>> {
    Ok(vec![
        Box::new(python::PythonBackend::new(config, root, client)?),
        Box::new(node::NodeBackend::new(config, root, client)?),
    ])
}

/// The backend called `name` among `backends`.
pub fn find<'a>(backends: &'a [Box<dyn Backend>], name: &str) -> Result<&'a dyn Backend> {
    match backends.iter().find(|b| b.descriptor().name == name) {
        Some(backend) => Ok(backend.as_ref()),
        None => bail!(
            "unknown language backend: {} (available: {})",
            name,
            names().join(", ")
        ),
    }
}

pub(crate) fn compile_patterns(patterns: &[&str]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| glob::Pattern::new(p).with_context(|| format!("invalid pattern {}", p)))
        .collect()
}

pub(crate) fn compile_regexps(patterns: &[&str]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).with_context(|| format!("invalid regex {}", p)))
        .collect()
}

/// Per-ecosystem knobs for [`guess_imports`].
pub(crate) struct GuessPlan {
    pub stdlib: StdlibModules,
    pub normalize: fn(&str) -> PkgName,
    pub modules_of: fn(&str) -> Vec<String>,
    pub self_named_fallback: bool,
    pub include_declared: bool,
}

/// Shared guess pipeline: scan imports, load the index snapshot, filter out
/// modules of declared packages and resolve the rest.
pub(crate) fn guess_imports<B>(backend: &B, config: &Config, plan: GuessPlan) -> Result<GuessResult>
where
    B: Backend + ?Sized,
{
    let descriptor = backend.descriptor();
    let patterns = compile_patterns(descriptor.filename_patterns)?;
    let syntax = ImportSyntax {
        patterns: &patterns,
        regexps: backend.guess_regexps(),
        modules_of: plan.modules_of,
    };
    let scan = imports::scan_project(backend.root(), &syntax, &config.ignored_paths)?;

    let index = RegistryIndex::load(&config.index_dir, descriptor.ecosystem, plan.normalize)?;
    if index.is_empty() {
        tracing::debug!(
            dir = %config.index_dir.display(),
            ecosystem = descriptor.ecosystem,
            "no registry index snapshot"
        );
    }

    let declared = if !plan.include_declared && backend.specfile_path().exists() {
        backend.list_specfile()?
    } else {
        BTreeMap::new()
    };

    let guesser = Guesser {
        index: &index,
        stdlib: plan.stdlib,
        normalize: plan.normalize,
        multiplier: config.guess_multiplier,
        self_named_fallback: plan.self_named_fallback,
    };
    Ok(guesser.infer(&scan, declared.keys()))
}

/// Look up metadata for every `(name, popularity)` candidate concurrently,
/// `batch_size` lookups at a time, then order the found packages by
/// popularity (descending) and name.
///
/// Any failed lookup fails the whole search.
pub(crate) async fn lookup_all<B>(
    backend: &B,
    candidates: Vec<(String, u64)>,
    batch_size: usize,
) -> Result<Vec<PackageMetadata>>
where
    B: Backend + ?Sized,
{
    let mut found: Vec<(u64, PackageMetadata)> = Vec::with_capacity(candidates.len());

    for batch in candidates.chunks(batch_size.max(1)) {
        let futures: Vec<_> = batch
            .iter()
            .map(|(name, popularity)| async move {
                backend.info(name).await.map(|info| (*popularity, info))
            })
            .collect();

        for result in join_all(futures).await {
            if let (popularity, Some(info)) = result? {
                found.push((popularity, info));
            }
        }
    }

    found.sort_by(|(pa, a), (pb, b)| pb.cmp(pa).then_with(|| a.name.cmp(&b.name)));
    Ok(found.into_iter().map(|(_, info)| info).collect())
}
