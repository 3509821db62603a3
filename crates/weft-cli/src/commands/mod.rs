//! CLI command implementations

pub mod fmt;
pub mod init;
pub mod parse;
pub mod run;
pub mod schemas;
pub mod tokens;
pub mod validate;

use anyhow::{Context, Result};

/// Read a flow source file
pub fn read_source(file: &str) -> Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {file}"))
}
