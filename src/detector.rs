use std::path::Path;

use walkdir::WalkDir;

use crate::backend::{compile_patterns, Backend};

/// Pick the backend that applies to the project at `root`.
///
/// Checked in order, first match wins:
/// 1. both specfile and lockfile exist
/// 2. the specfile exists
/// 3. the lockfile exists
/// 4. some source file matches the backend's filename patterns
pub fn detect_backend<'a>(
    root: &Path,
    backends: &'a [Box<dyn Backend>],
    ignored: &[String],
) -> Option<&'a dyn Backend> {
    let has = |file: &str| root.join(file).exists();

    let by_files = backends
        .iter()
        .find(|b| has(b.descriptor().specfile) && has(b.descriptor().lockfile))
        .or_else(|| backends.iter().find(|b| has(b.descriptor().specfile)))
        .or_else(|| backends.iter().find(|b| has(b.descriptor().lockfile)));

    if let Some(backend) = by_files {
        return Some(backend.as_ref());
    }

    backends
        .iter()
        .find(|b| has_matching_source(root, b.descriptor().filename_patterns, ignored))
        .map(|b| b.as_ref())
}

fn has_matching_source(root: &Path, patterns: &[&str], ignored: &[String]) -> bool {
    let Ok(patterns) = compile_patterns(patterns) else {
        return false;
    };

    WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !ignored
                    .iter()
                    .any(|name| entry.file_name().to_string_lossy() == name.as_str())
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .any(|entry| {
            let name = entry.file_name().to_string_lossy();
            patterns.iter().any(|p| p.matches(&name))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend;
    use crate::config::Config;
    use reqwest::Client;
    use tempfile::TempDir;

    fn detect(dir: &Path) -> Option<&'static str> {
        let config = Config::default();
        let backends = backend::all(&config, dir, &Client::new()).unwrap();
        detect_backend(dir, &backends, &config.ignored_paths).map(|b| b.descriptor().name)
    }

    #[test]
    fn test_nothing_to_detect() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("README.md"), "hi").unwrap();
        assert_eq!(detect(dir.path()), None);
    }

    #[test]
    fn test_specfile_and_lockfile_win() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("pyproject.toml"), "").unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        std::fs::write(dir.path().join("package-lock.json"), "{}").unwrap();
        assert_eq!(detect(dir.path()), Some("nodejs-npm"));
    }

    #[test]
    fn test_specfile_beats_lockfile() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("poetry.lock"), "").unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        assert_eq!(detect(dir.path()), Some("nodejs-npm"));
    }

    #[test]
    fn test_source_patterns() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/app.py"), "print('hi')").unwrap();
        assert_eq!(detect(dir.path()), Some("python3-poetry"));
    }

    #[test]
    fn test_ignored_directories_do_not_count() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/index.js"), "").unwrap();
        assert_eq!(detect(dir.path()), None);
    }
}
