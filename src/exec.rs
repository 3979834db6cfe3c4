//! Blocking, single-shot invocations of external package-manager tools.

use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};

fn display(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a command in `dir` with inherited stdio; a non-zero exit is an error.
pub fn run(program: &str, args: &[String], dir: &Path) -> Result<()> {
    let line = display(program, args);
    tracing::info!(cwd = %dir.display(), "$ {}", line);

    let status = Command::new(program)
        .args(args)
        .current_dir(dir)
        .status()
        .with_context(|| format!("failed to run `{}`", line))?;

    if !status.success() {
        bail!("`{}` failed: {}", line, status);
    }
    Ok(())
}

/// Run a command in `dir` and capture its stdout.
pub fn output(program: &str, args: &[String], dir: &Path) -> Result<String> {
    let line = display(program, args);
    tracing::info!(cwd = %dir.display(), "$ {}", line);

    let out = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stderr(Stdio::inherit())
        .output()
        .with_context(|| format!("failed to run `{}`", line))?;

    if !out.status.success() {
        bail!("`{}` failed: {}", line, out.status);
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}
