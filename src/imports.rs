//! Import extraction: walks a project's source files and collects the
//! top-level modules they import, along with any package pragma.
//!
//! A pragma pins the package that provides an import and is written as a
//! comment on the import line:
//!
//! ```text
//! import yaml  # unipm package(ruamel.yaml)
//! const _ = require("lodash"); // unipm package(lodash-es)
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use regex::Regex;
use walkdir::WalkDir;

/// Extracted imports: module name → optional pragma package.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportScan {
    pub modules: BTreeMap<String, Option<String>>,
    /// `false` if any file or directory could not be read.
    pub success: bool,
}

/// How one ecosystem spells its imports.
pub struct ImportSyntax<'a> {
    /// Glob patterns selecting source files by file name.
    pub patterns: &'a [glob::Pattern],
    /// Line regexes; capture group 1 holds the imported module(s).
    pub regexps: &'a [Regex],
    /// Reduce a captured import to the top-level module name(s) it refers to.
    pub modules_of: fn(&str) -> Vec<String>,
}

/// Scan every matching file under `root`, skipping directories named in `ignored`.
pub fn scan_project(root: &Path, syntax: &ImportSyntax<'_>, ignored: &[String]) -> Result<ImportScan> {
    let pragma = pragma_regex()?;
    let mut scan = ImportScan {
        success: true,
        ..ImportScan::default()
    };

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.depth() == 0
            || !ignored
                .iter()
                .any(|name| entry.file_name().to_string_lossy() == name.as_str())
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("import scan: {}", e);
                scan.success = false;
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy();
        if !syntax.patterns.iter().any(|p| p.matches(&file_name)) {
            continue;
        }

        match std::fs::read_to_string(entry.path()) {
            Ok(src) => scan_text(&src, syntax, &pragma, &mut scan.modules),
            Err(e) => {
                tracing::warn!("import scan: {}: {}", entry.path().display(), e);
                scan.success = false;
            }
        }
    }

    Ok(scan)
}

fn pragma_regex() -> Result<Regex> {
    Ok(Regex::new(r"unipm\s+package\(\s*([^)\s]+)\s*\)")?)
}

/// Collect the imports of a single source text into `out`. A pragma seen on
/// any import of a module sticks to it.
pub fn scan_text(
    src: &str,
    syntax: &ImportSyntax<'_>,
    pragma: &Regex,
    out: &mut BTreeMap<String, Option<String>>,
) {
    for line in src.lines() {
        let line_pragma = pragma.captures(line).map(|c| c[1].to_string());

        for re in syntax.regexps {
            for caps in re.captures_iter(line) {
                let Some(capture) = caps.get(1) else {
                    continue;
                };
                for module in (syntax.modules_of)(capture.as_str()) {
                    let slot = out.entry(module).or_insert(None);
                    if line_pragma.is_some() {
                        slot.clone_from(&line_pragma);
                    }
                }
            }
        }
    }
}
