//! Content-hash store: remembers the specfile and lockfile digests observed
//! after the last successful operation so unchanged projects skip re-locking
//! and re-installing.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Persisted fingerprints. Both fields empty means "never observed".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRecord {
    #[serde(default)]
    pub specfile_hash: String,
    #[serde(default)]
    pub lockfile_hash: String,
}

#[derive(Debug, Clone)]
pub struct HashStore {
    path: PathBuf,
}

impl HashStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record; a store file that does not exist yet yields the default.
    pub fn read(&self) -> Result<StoreRecord> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoreRecord::default())
            }
            Err(e) => return Err(e).with_context(|| format!("{}", self.path.display())),
        };

        serde_json::from_slice(&bytes).with_context(|| format!("{}", self.path.display()))
    }

    /// Replace the record on disk. The new content is written to a temporary
    /// file beside the target and renamed over it, so readers never see a
    /// half-written store.
    pub fn write(&self, record: &StoreRecord) -> Result<()> {
        let path = std::path::absolute(&self.path)
            .with_context(|| format!("{}", self.path.display()))?;
        let directory = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(directory)
            .with_context(|| format!("{}", directory.display()))?;

        let mut json = serde_json::to_string_pretty(record)?;
        json.push('\n');

        // NamedTempFile is created owner-only (0600) on unix
        let mut tmp = tempfile::NamedTempFile::new_in(directory)
            .with_context(|| format!("{}", directory.display()))?;
        tmp.write_all(json.as_bytes())
            .with_context(|| format!("{}", path.display()))?;
        tmp.persist(&path)
            .with_context(|| format!("{}", path.display()))?;

        tracing::debug!(store = %path.display(), "wrote hash store");
        Ok(())
    }

    /// Recompute both hashes from the files on disk and persist them.
    /// Both files must exist; nothing is written otherwise.
    pub fn update_hashes(&self, specfile: &Path, lockfile: &Path) -> Result<()> {
        let mut record = self.read()?;

        let Some(specfile_hash) = hash_file(specfile)? else {
            bail!("file does not exist: {}", specfile.display());
        };
        let Some(lockfile_hash) = hash_file(lockfile)? else {
            bail!("file does not exist: {}", lockfile.display());
        };

        record.specfile_hash = specfile_hash;
        record.lockfile_hash = lockfile_hash;
        self.write(&record)
    }

    /// Whether the specfile differs from what was last recorded.
    /// A missing specfile always counts as changed.
    pub fn specfile_changed(&self, specfile: &Path) -> Result<bool> {
        let record = self.read()?;
        Ok(changed(hash_file(specfile)?, &record.specfile_hash))
    }

    /// Whether the lockfile differs from what was last recorded.
    /// A missing lockfile always counts as changed.
    pub fn lockfile_changed(&self, lockfile: &Path) -> Result<bool> {
        let record = self.read()?;
        Ok(changed(hash_file(lockfile)?, &record.lockfile_hash))
    }
}

fn changed(current: Option<String>, recorded: &str) -> bool {
    match current {
        Some(hash) => recorded.is_empty() || hash != recorded,
        None => true,
    }
}

/// Hex-encoded SHA-256 of a file's bytes, or `None` if the file does not exist.
pub fn hash_file(path: &Path) -> Result<Option<String>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(hex::encode(Sha256::digest(&bytes)))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("{}", path.display())),
    }
}
