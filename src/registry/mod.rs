//! Async HTTP clients for package registries.
//!
//! Each client exposes `info(name)` returning `Ok(Some(metadata))` on success,
//! `Ok(None)` when the registry reports the package as not found, and `Err` on
//! network failures or any other unexpected status.

pub mod npm;
pub mod pypi;
