use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Default location of the content-hash store, relative to the project root.
pub const DEFAULT_STORE_PATH: &str = ".unipm/store.json";

/// Settings read from `.unipm/config.toml`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub guess: GuessSection,
    pub registry: RegistrySection,
    pub search: SearchSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GuessSection {
    /// How many times more popular (per declared module) the top candidate
    /// must be than the runner-up before it is picked.
    pub multiplier: f64,
    /// Path components never scanned for imports.
    pub ignored_paths: Vec<String>,
}

impl Default for GuessSection {
    fn default() -> Self {
        Self {
            multiplier: 5.0,
            ignored_paths: [
                ".git",
                ".unipm",
                ".venv",
                "venv",
                "__pycache__",
                "node_modules",
                "site-packages",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    pub pypi_url: String,
    pub npm_url: String,
    /// Directory holding `<ecosystem>.json` index snapshots.
    pub index_dir: Option<PathBuf>,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            pypi_url: "https://pypi.org".to_string(),
            npm_url: "https://registry.npmjs.org".to_string(),
            index_dir: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    /// Number of concurrent `info` lookups per fan-out batch.
    pub batch_size: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self { batch_size: 75 }
    }
}

/// Process-wide configuration, built once in `main` and passed down.
#[derive(Debug, Clone)]
pub struct Config {
    pub store_path: PathBuf,
    pub poetry: String,
    pub python: String,
    pub npm: String,
    /// An already-activated virtualenv, if any.
    pub virtual_env: Option<PathBuf>,
    pub pypi_url: String,
    pub npm_url: String,
    pub index_dir: PathBuf,
    pub guess_multiplier: f64,
    pub ignored_paths: Vec<String>,
    pub search_batch_size: usize,
}

impl Config {
    /// Build the configuration from the config file (see [`load_file_config`])
    /// overridden by environment variables fetched through `env`.
    ///
    /// | Variable          | Overrides                       |
    /// |-------------------|---------------------------------|
    /// | `UNIPM_STORE`     | hash store location             |
    /// | `UNIPM_POETRY`    | `poetry` executable             |
    /// | `UNIPM_PYTHON`    | `python3` executable            |
    /// | `UNIPM_NPM`       | `npm` executable                |
    /// | `UNIPM_INDEX_DIR` | registry index snapshot folder  |
    /// | `VIRTUAL_ENV`     | active Python environment       |
    pub fn load<F>(project_root: &Path, config_override: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = load_file_config(project_root, config_override)?;
        Ok(Self::from_parts(project_root, file, env))
    }

    fn from_parts<F>(project_root: &Path, file: FileConfig, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.is_empty());

        let store_path = env("UNIPM_STORE")
            .map(PathBuf::from)
            .unwrap_or_else(|| project_root.join(DEFAULT_STORE_PATH));

        let index_dir = env("UNIPM_INDEX_DIR")
            .map(PathBuf::from)
            .or(file.registry.index_dir)
            .unwrap_or_else(default_index_dir);

        Config {
            store_path,
            poetry: env("UNIPM_POETRY").unwrap_or_else(|| "poetry".to_string()),
            python: env("UNIPM_PYTHON").unwrap_or_else(|| "python3".to_string()),
            npm: env("UNIPM_NPM").unwrap_or_else(|| "npm".to_string()),
            virtual_env: env("VIRTUAL_ENV").map(PathBuf::from),
            pypi_url: file.registry.pypi_url.trim_end_matches('/').to_string(),
            npm_url: file.registry.npm_url.trim_end_matches('/').to_string(),
            index_dir,
            guess_multiplier: file.guess.multiplier,
            ignored_paths: file.guess.ignored_paths,
            search_batch_size: file.search.batch_size.max(1),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_parts(Path::new("."), FileConfig::default(), |_| None)
    }
}

fn default_index_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".unipm"))
        .join("unipm")
        .join("index")
}

/// Load the file layer of the configuration, searching in order:
///
/// 1. `config_override`: path passed via `--config`
/// 2. `<project_path>/.unipm/config.toml`
/// 3. `~/.config/unipm/config.toml`
/// 4. Built-in [`FileConfig::default`]
pub fn load_file_config(project_path: &Path, config_override: Option<&Path>) -> Result<FileConfig> {
    if let Some(path) = config_override {
        return read_config(path);
    }

    let project_config = project_path.join(".unipm").join("config.toml");
    if project_config.exists() {
        return read_config(&project_config);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".config").join("unipm").join("config.toml");
        if home_config.exists() {
            return read_config(&home_config);
        }
    }

    Ok(FileConfig::default())
}

fn read_config(path: &Path) -> Result<FileConfig> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("{}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("{}", path.display()))
}
