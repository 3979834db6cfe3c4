//! Output renderers for command results.
//!
//! - [`terminal`]: colored tables for people.
//! - [`print_json`]: pretty JSON on stdout for scripts (`--format json`).

use anyhow::Result;
use serde::Serialize;

pub mod terminal;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
