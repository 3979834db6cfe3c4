//! Orchestration of the mutating commands on top of a [`Backend`]: applies
//! quirks and consults the hash store to skip redundant work.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use colored::Colorize;

use crate::backend::Backend;
use crate::models::{PkgName, PkgSpec, Quirk};
use crate::store::HashStore;

/// Parse `add` arguments of the form `name` or `name spec`.
pub fn parse_package_args(args: &[String]) -> BTreeMap<PkgName, PkgSpec> {
    args.iter()
        .filter_map(|arg| {
            let arg = arg.trim();
            match arg.split_once(char::is_whitespace) {
                Some((name, spec)) => Some((PkgName::new(name), PkgSpec::new(spec.trim()))),
                None if !arg.is_empty() => Some((PkgName::new(arg), PkgSpec::default())),
                None => None,
            }
        })
        .collect()
}

/// Add packages (plus guessed ones when `guess` is set). Packages already in
/// the specfile are skipped. Returns the names that were actually added.
pub fn add(
    backend: &dyn Backend,
    store: &HashStore,
    pkgs: BTreeMap<PkgName, PkgSpec>,
    project_name: Option<&str>,
    guess: bool,
) -> Result<BTreeSet<PkgName>> {
    let mut wanted: BTreeMap<PkgName, (PkgName, PkgSpec)> = pkgs
        .into_iter()
        .map(|(name, spec)| (backend.normalize_package_name(name.as_str()), (name, spec)))
        .collect();

    if guess {
        let guessed = backend.guess(false)?;
        if !guessed.success {
            tracing::warn!("import extraction did not complete; guesses may be incomplete");
        }
        for name in guessed.packages {
            wanted
                .entry(name.clone())
                .or_insert_with(|| (name, PkgSpec::default()));
        }
    }

    if backend.specfile_path().exists() {
        for declared in backend.list_specfile()?.keys() {
            wanted.remove(&backend.normalize_package_name(declared.as_str()));
        }
    }

    if wanted.is_empty() {
        tracing::info!("nothing to add");
        return Ok(BTreeSet::new());
    }

    let to_add: BTreeMap<PkgName, PkgSpec> = wanted.into_values().collect();
    backend.add(&to_add, project_name)?;
    follow_up_add_remove(backend)?;
    refresh_store(backend, store)?;

    Ok(to_add.into_keys().collect())
}

/// Remove packages. Names not declared in the specfile are ignored.
/// Returns the names that were actually removed.
pub fn remove(
    backend: &dyn Backend,
    store: &HashStore,
    pkgs: &BTreeSet<PkgName>,
) -> Result<BTreeSet<PkgName>> {
    if !backend.specfile_path().exists() {
        tracing::info!("no {}; nothing to remove", backend.descriptor().specfile);
        return Ok(BTreeSet::new());
    }

    let declared: BTreeMap<PkgName, PkgName> = backend
        .list_specfile()?
        .into_keys()
        .map(|name| (backend.normalize_package_name(name.as_str()), name))
        .collect();

    let to_remove: BTreeSet<PkgName> = pkgs
        .iter()
        .filter_map(|pkg| declared.get(&backend.normalize_package_name(pkg.as_str())))
        .cloned()
        .collect();

    if to_remove.is_empty() {
        tracing::info!("nothing to remove");
        return Ok(to_remove);
    }

    backend.remove(&to_remove)?;
    follow_up_add_remove(backend)?;
    refresh_store(backend, store)?;

    Ok(to_remove)
}

/// Re-resolve the lockfile and install it, unless specfile and lockfile are
/// unchanged since the last sync. Returns whether the backend actually locked.
pub fn lock(backend: &dyn Backend, store: &HashStore, force: bool) -> Result<bool> {
    let specfile = backend.specfile_path();
    let lockfile = backend.lockfile_path();

    if !specfile.exists() {
        tracing::info!("no {}; nothing to lock", backend.descriptor().specfile);
        return Ok(false);
    }

    if !force && !store.specfile_changed(&specfile)? && !store.lockfile_changed(&lockfile)? {
        tracing::debug!(store = %store.path().display(), "specfile and lockfile unchanged; skipping lock");
        return Ok(false);
    }

    backend.lock()?;
    if backend.descriptor().has_quirk(Quirk::LockAlsoInstalls) {
        tracing::debug!("lock also installed");
    } else {
        warn_install_may_not_prune(backend);
        backend.install()?;
    }
    refresh_store(backend, store)?;
    Ok(true)
}

/// Install the locked dependency set unless the lockfile is unchanged since
/// the last run. Returns whether the backend actually installed.
pub fn install(backend: &dyn Backend, store: &HashStore, force: bool) -> Result<bool> {
    if !backend.lockfile_path().exists() {
        tracing::info!("no {}; nothing to install", backend.descriptor().lockfile);
        return Ok(false);
    }

    if !force && !store.lockfile_changed(&backend.lockfile_path())? {
        tracing::debug!(store = %store.path().display(), "lockfile unchanged; skipping install");
        return Ok(false);
    }

    warn_install_may_not_prune(backend);
    backend.install()?;
    refresh_store(backend, store)?;
    Ok(true)
}

fn follow_up_add_remove(backend: &dyn Backend) -> Result<()> {
    let descriptor = backend.descriptor();

    if !descriptor.has_quirk(Quirk::AddRemoveAlsoLocks) {
        backend.lock()?;
    }
    if !descriptor.has_quirk(Quirk::AddRemoveAlsoInstalls) {
        warn_install_may_not_prune(backend);
        backend.install()?;
    }
    Ok(())
}

fn warn_install_may_not_prune(backend: &dyn Backend) {
    if backend.descriptor().has_quirk(Quirk::InstallMayNotPrune) {
        eprintln!(
            "{} {}: {}; packages removed from {} may stay installed",
            "note:".yellow().bold(),
            backend.descriptor().name,
            Quirk::InstallMayNotPrune,
            backend.descriptor().lockfile
        );
    }
}

/// Record the current file hashes, provided both files exist.
fn refresh_store(backend: &dyn Backend, store: &HashStore) -> Result<()> {
    let specfile = backend.specfile_path();
    let lockfile = backend.lockfile_path();

    if specfile.exists() && lockfile.exists() {
        store.update_hashes(&specfile, &lockfile)?;
    } else {
        tracing::debug!("specfile or lockfile missing; hash store not updated");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use regex::Regex;
    use tempfile::TempDir;

    use crate::models::{BackendDescriptor, GuessResult, PackageMetadata, PkgVersion};

    /// Backend that writes files itself instead of invoking a tool, and
    /// records which operations ran.
    struct FakeBackend {
        root: PathBuf,
        descriptor: BackendDescriptor,
        guessed: BTreeSet<PkgName>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn new(root: &Path, quirks: &'static [Quirk]) -> Self {
            Self {
                root: root.to_path_buf(),
                descriptor: BackendDescriptor {
                    name: "fake",
                    ecosystem: "fake",
                    specfile: "deps.txt",
                    lockfile: "deps.lock",
                    filename_patterns: &["*.fake"],
                    quirks,
                },
                guessed: BTreeSet::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn write_spec(&self, names: &[String]) {
            std::fs::write(self.specfile_path(), names.join("\n")).unwrap();
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        fn descriptor(&self) -> &BackendDescriptor {
            &self.descriptor
        }

        fn root(&self) -> &Path {
            &self.root
        }

        async fn info(&self, _name: &str) -> Result<Option<PackageMetadata>> {
            Ok(None)
        }

        async fn search(&self, _query: &str) -> Result<Vec<PackageMetadata>> {
            Ok(Vec::new())
        }

        fn add(&self, pkgs: &BTreeMap<PkgName, PkgSpec>, _project: Option<&str>) -> Result<()> {
            let mut names: Vec<String> = self.list_specfile()?.into_keys().map(|n| n.to_string()).collect();
            names.extend(pkgs.keys().map(|n| n.to_string()));
            self.write_spec(&names);
            let added: Vec<String> = pkgs.keys().map(|n| n.to_string()).collect();
            self.record(format!("add {}", added.join(" ")));
            Ok(())
        }

        fn remove(&self, pkgs: &BTreeSet<PkgName>) -> Result<()> {
            let names: Vec<String> = self
                .list_specfile()?
                .into_keys()
                .filter(|n| !pkgs.contains(n))
                .map(|n| n.to_string())
                .collect();
            self.write_spec(&names);
            let removed: Vec<String> = pkgs.iter().map(|n| n.to_string()).collect();
            self.record(format!("remove {}", removed.join(" ")));
            Ok(())
        }

        fn lock(&self) -> Result<()> {
            let spec = std::fs::read_to_string(self.specfile_path()).unwrap_or_default();
            std::fs::write(self.lockfile_path(), spec)?;
            self.record("lock".to_string());
            Ok(())
        }

        fn install(&self) -> Result<()> {
            self.record("install".to_string());
            Ok(())
        }

        fn list_specfile(&self) -> Result<BTreeMap<PkgName, PkgSpec>> {
            let content = std::fs::read_to_string(self.specfile_path()).unwrap_or_default();
            Ok(content
                .lines()
                .filter(|l| !l.is_empty())
                .map(|l| (PkgName::new(l), PkgSpec::default()))
                .collect())
        }

        fn list_lockfile(&self) -> Result<BTreeMap<PkgName, PkgVersion>> {
            Ok(BTreeMap::new())
        }

        fn normalize_package_name(&self, name: &str) -> PkgName {
            PkgName::new(name.to_lowercase())
        }

        fn package_dir(&self) -> Result<PathBuf> {
            Ok(self.root.clone())
        }

        fn guess_regexps(&self) -> &[Regex] {
            &[]
        }

        fn guess(&self, _include_declared: bool) -> Result<GuessResult> {
            Ok(GuessResult {
                packages: self.guessed.clone(),
                success: true,
            })
        }
    }

    fn store(dir: &Path) -> HashStore {
        HashStore::new(dir.join(".unipm/store.json"))
    }

    fn pkgs(names: &[&str]) -> BTreeMap<PkgName, PkgSpec> {
        names
            .iter()
            .map(|n| (PkgName::new(*n), PkgSpec::default()))
            .collect()
    }

    #[test]
    fn test_parse_package_args() {
        let args = vec!["flask".to_string(), "requests  >=2.0,<3".to_string(), " ".to_string()];
        let parsed = parse_package_args(&args);
        assert_eq!(parsed.len(), 2);
        assert!(parsed[&PkgName::new("flask")].is_empty());
        assert_eq!(parsed[&PkgName::new("requests")], PkgSpec::new(">=2.0,<3"));
    }

    #[test]
    fn test_add_without_quirks_locks_and_installs() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::new(dir.path(), &[]);
        let store = store(dir.path());

        let added = add(&backend, &store, pkgs(&["flask"]), None, false).unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(backend.calls(), ["add flask", "lock", "install"]);
        // Hashes were recorded, so a lock right after is a no-op
        assert!(!lock(&backend, &store, false).unwrap());
    }

    #[test]
    fn test_add_with_quirks_skips_follow_ups() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::new(
            dir.path(),
            &[Quirk::AddRemoveAlsoLocks, Quirk::AddRemoveAlsoInstalls],
        );
        add(&backend, &store(dir.path()), pkgs(&["flask"]), None, false).unwrap();
        assert_eq!(backend.calls(), ["add flask"]);
    }

    #[test]
    fn test_add_skips_declared_and_merges_guesses() {
        let dir = TempDir::new().unwrap();
        let mut backend = FakeBackend::new(dir.path(), &[]);
        backend.guessed = [PkgName::new("numpy"), PkgName::new("flask")].into();
        backend.write_spec(&["Flask".to_string()]);

        let added = add(&backend, &store(dir.path()), pkgs(&["FLASK", "requests"]), None, true).unwrap();
        let added: Vec<_> = added.iter().map(PkgName::as_str).collect();
        assert_eq!(added, ["numpy", "requests"]);

        let added = add(&backend, &store(dir.path()), pkgs(&["flask"]), None, false).unwrap();
        assert!(added.is_empty());
    }

    #[test]
    fn test_remove_only_declared_packages() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::new(dir.path(), &[]);
        backend.write_spec(&["flask".to_string(), "requests".to_string()]);

        let wanted: BTreeSet<PkgName> = [PkgName::new("Flask"), PkgName::new("absent")].into();
        let removed = remove(&backend, &store(dir.path()), &wanted).unwrap();
        assert_eq!(removed, [PkgName::new("flask")].into());
        assert_eq!(backend.calls(), ["remove flask", "lock", "install"]);

        let removed = remove(&backend, &store(dir.path()), &wanted).unwrap();
        assert!(removed.is_empty());
    }

    #[test]
    fn test_lock_installs_the_fresh_lockfile() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::new(dir.path(), &[]);
        let store = store(dir.path());
        backend.write_spec(&["flask".to_string()]);

        assert!(lock(&backend, &store, false).unwrap());
        assert_eq!(backend.calls(), ["lock", "install"]);

        // Already synced, nothing left for either command
        assert!(!lock(&backend, &store, false).unwrap());
        assert!(!install(&backend, &store, false).unwrap());
        assert_eq!(backend.calls(), ["lock", "install"]);
    }

    #[test]
    fn test_lock_with_lock_also_installs_quirk() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::new(dir.path(), &[Quirk::LockAlsoInstalls]);
        backend.write_spec(&["flask".to_string()]);

        assert!(lock(&backend, &store(dir.path()), false).unwrap());
        assert_eq!(backend.calls(), ["lock"]);
    }

    #[test]
    fn test_lock_and_install_skip_when_unchanged() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::new(dir.path(), &[]);
        let store = store(dir.path());
        backend.write_spec(&["flask".to_string()]);

        assert!(lock(&backend, &store, false).unwrap());
        assert!(!lock(&backend, &store, false).unwrap());
        assert!(lock(&backend, &store, true).unwrap());
        assert!(install(&backend, &store, true).unwrap());

        backend.write_spec(&["flask".to_string(), "click".to_string()]);
        assert!(lock(&backend, &store, false).unwrap());

        std::fs::write(backend.lockfile_path(), "tampered").unwrap();
        assert!(install(&backend, &store, false).unwrap());
        assert_eq!(
            backend.calls(),
            ["lock", "install", "lock", "install", "install", "lock", "install", "install"]
        );
    }

    #[test]
    fn test_lock_and_install_need_their_input_file() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::new(dir.path(), &[]);
        let store = store(dir.path());

        assert!(!lock(&backend, &store, true).unwrap());
        assert!(!install(&backend, &store, true).unwrap());
        assert!(backend.calls().is_empty());
    }
}
