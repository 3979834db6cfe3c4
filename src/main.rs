//! `unipm`: one command-line interface over several languages' package
//! managers.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]) and set up logging ([`logging`]).
//! 2. Load configuration from file and environment ([`config::Config::load`]).
//! 3. Pick the language backend, from `--lang` or by detection ([`detector`]).
//! 4. Run the command, through [`ops`] for the ones that change the project.
//! 5. Render the result ([`report`]).

mod backend;
mod cli;
mod config;
mod detector;
mod exec;
mod guess;
mod imports;
mod index;
mod logging;
mod models;
mod ops;
mod registry;
mod report;
mod store;

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use backend::Backend;
use cli::{Cli, Command, ReportFormat};
use config::Config;
use models::PkgName;
use report::terminal;
use store::HashStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_json);

    let root = std::env::current_dir().context("cannot determine the current directory")?;
    let config = Config::load(&root, cli.config.as_deref(), |key| std::env::var(key).ok())?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .user_agent(concat!("unipm/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let backends = backend::all(&config, &root, &client)?;
    let json = cli.format == ReportFormat::Json;

    if let Command::ListLanguages = cli.command {
        let active = select_backend(&cli, &root, &backends, &config)
            .ok()
            .map(|b| b.descriptor().name);
        if json {
            return report::print_json(&backend::names());
        }
        terminal::render_languages(&backend::names(), active);
        return Ok(());
    }

    let backend = select_backend(&cli, &root, &backends, &config)?;
    let store = HashStore::new(&config.store_path);
    tracing::debug!(backend = backend.descriptor().name, root = %root.display(), "selected backend");

    match &cli.command {
        Command::WhichLanguage => {
            if json {
                report::print_json(backend.descriptor())?;
            } else {
                terminal::render_line(backend.descriptor().name);
            }
        }
        Command::Search { query } => {
            let results = with_spinner(cli.quiet, format!("Searching for {}", query), backend.search(query)).await?;
            if json {
                report::print_json(&results)?;
            } else {
                terminal::render_search(query, &results);
            }
        }
        Command::Info { name } => {
            let info = with_spinner(cli.quiet, format!("Fetching {}", name), backend.info(name)).await?;
            if json {
                report::print_json(&info)?;
            } else {
                terminal::render_info(name, info.as_ref());
            }
            if info.is_none() {
                std::process::exit(1);
            }
        }
        Command::Add { packages, guess, name } => {
            let pkgs = ops::parse_package_args(packages);
            if pkgs.is_empty() && !guess {
                bail!("nothing to add: give package names or --guess");
            }
            let added = ops::add(backend, &store, pkgs, name.as_deref(), *guess)?;
            print_changed(json, "add", &added, cli.quiet)?;
        }
        Command::Remove { packages } => {
            let pkgs: BTreeSet<PkgName> = packages.iter().map(|p| PkgName::new(p.trim())).collect();
            let removed = ops::remove(backend, &store, &pkgs)?;
            print_changed(json, "remove", &removed, cli.quiet)?;
        }
        Command::Lock { force } => {
            let locked = ops::lock(backend, &store, *force)?;
            terminal::render_skipped("lock", locked, cli.quiet);
        }
        Command::Install { force } => {
            let installed = ops::install(backend, &store, *force)?;
            terminal::render_skipped("install", installed, cli.quiet);
        }
        Command::List { all } => {
            if *all {
                let locked = backend.list_lockfile()?;
                if json {
                    report::print_json(&locked)?;
                } else {
                    terminal::render_packages("Version", &locked);
                }
            } else {
                let specs = backend.list_specfile()?;
                if json {
                    report::print_json(&specs)?;
                } else {
                    terminal::render_packages("Spec", &specs);
                }
            }
        }
        Command::Guess { all } => {
            let result = backend.guess(*all)?;
            if json {
                report::print_json(&result)?;
            } else {
                terminal::render_guess(&result, cli.quiet);
            }
        }
        Command::ShowSpecfile => print_path(json, &backend.specfile_path())?,
        Command::ShowLockfile => print_path(json, &backend.lockfile_path())?,
        Command::ShowPackageDir => print_path(json, &backend.package_dir()?)?,
        // Rendered before backend selection
        Command::ListLanguages => {}
    }

    Ok(())
}

fn select_backend<'a>(
    cli: &Cli,
    root: &Path,
    backends: &'a [Box<dyn Backend>],
    config: &Config,
) -> Result<&'a dyn Backend> {
    if let Some(name) = &cli.lang {
        return backend::find(backends, name);
    }

    match detector::detect_backend(root, backends, &config.ignored_paths) {
        Some(backend) => Ok(backend),
        None => bail!(
            "could not detect the language of {}; pass --lang (one of: {})",
            root.display(),
            backend::names().join(", ")
        ),
    }
}

async fn with_spinner<F, T>(quiet: bool, message: String, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    if quiet {
        return fut.await;
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = fut.await;
    pb.finish_and_clear();
    result
}

fn print_changed(
    json: bool,
    verb: &str,
    names: &BTreeSet<PkgName>,
    quiet: bool,
) -> Result<()> {
    if json {
        return report::print_json(names);
    }
    terminal::render_changed(verb, names, quiet);
    Ok(())
}

fn print_path(json: bool, path: &Path) -> Result<()> {
    if json {
        return report::print_json(path);
    }
    terminal::render_path(path);
    Ok(())
}
