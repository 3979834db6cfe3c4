use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;

use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::models::{GuessResult, PackageMetadata, PkgName};

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

fn search_table(results: &[PackageMetadata]) -> Table {
    let mut table = new_table(&["Name", "Version", "Description"]);
    for pkg in results {
        table.add_row(vec![
            Cell::new(&pkg.name).fg(Color::Cyan),
            Cell::new(&pkg.version),
            Cell::new(&pkg.description),
        ]);
    }
    table
}

/// Search hits, most popular first.
pub fn render_search(query: &str, results: &[PackageMetadata]) {
    if results.is_empty() {
        println!(" No packages matching {}", query.bold());
        return;
    }
    println!("{}", search_table(results));
}

fn info_table(pkg: &PackageMetadata) -> Table {
    let mut table = new_table(&["Field", "Value"]);
    let fields = [
        ("Name", pkg.name.clone()),
        ("Version", pkg.version.clone()),
        ("Description", pkg.description.clone()),
        ("Author", pkg.author.clone()),
        ("License", pkg.license.clone()),
        ("Homepage", pkg.homepage_url.clone()),
        ("Documentation", pkg.documentation_url.clone()),
        ("Source code", pkg.source_code_url.clone()),
        ("Bug tracker", pkg.bug_tracker_url.clone()),
        ("Dependencies", pkg.dependencies.join(", ")),
    ];

    for (field, value) in fields.into_iter().filter(|(_, v)| !v.is_empty()) {
        table.add_row(vec![Cell::new(field).add_attribute(Attribute::Bold), Cell::new(value)]);
    }
    table
}

pub fn render_info(name: &str, info: Option<&PackageMetadata>) {
    match info {
        Some(pkg) => println!("{}", info_table(pkg)),
        None => println!(" {} package {} not found", "✗".red(), name.bold()),
    }
}

fn packages_table<V: Display>(value_header: &str, packages: &BTreeMap<PkgName, V>) -> Table {
    let mut table = new_table(&["Name", value_header]);
    for (name, value) in packages {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }
    table
}

/// Declared specs or locked versions, by package name.
pub fn render_packages<V: Display>(value_header: &str, packages: &BTreeMap<PkgName, V>) {
    if packages.is_empty() {
        println!(" No packages");
        return;
    }
    println!("{}", packages_table(value_header, packages));
}

fn languages_table(names: &[&str], active: Option<&str>) -> Table {
    let mut table = new_table(&["Language", "Active"]);
    for name in names {
        let mark = if Some(*name) == active {
            Cell::new("✓").fg(Color::Green)
        } else {
            Cell::new("")
        };
        table.add_row(vec![Cell::new(name), mark.set_alignment(CellAlignment::Center)]);
    }
    table
}

pub fn render_languages(names: &[&str], active: Option<&str>) {
    println!("{}", languages_table(names, active));
}

pub fn render_guess(result: &GuessResult, quiet: bool) {
    for name in &result.packages {
        println!("{}", name);
    }
    if !result.success && !quiet {
        eprintln!(
            " {} some source files could not be scanned; the list may be incomplete",
            "⚠".yellow()
        );
    }
}

/// Paths and single names print bare so they can be used in scripts.
pub fn render_line(value: impl Display) {
    println!("{}", value);
}

pub fn render_path(path: &Path) {
    render_line(path.display());
}

/// Summary after a mutating command.
pub fn render_changed<'a>(verb: &str, names: impl IntoIterator<Item = &'a PkgName>, quiet: bool) {
    if quiet {
        return;
    }
    let names: Vec<&str> = names.into_iter().map(PkgName::as_str).collect();
    if names.is_empty() {
        eprintln!(" {} nothing to {}", "→".cyan(), verb);
    } else {
        eprintln!(" {} {} {}", "✓".green(), verb, names.join(", ").bold());
    }
}

pub fn render_skipped(action: &str, done: bool, quiet: bool) {
    if quiet {
        return;
    }
    if done {
        eprintln!(" {} {} done", "✓".green(), action);
    } else {
        eprintln!(" {} {} up to date, skipped (use --force)", "→".cyan(), action);
    }
}
