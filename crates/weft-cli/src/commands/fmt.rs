//! Re-render a flow file in canonical form

use anyhow::{Context, Result};
use weft_core::{Error, parser};

use super::read_source;

/// Run the fmt command. Refuses to format a file with syntax errors.
pub async fn run(file: &str, write: bool) -> Result<()> {
    let source = read_source(file)?;
    let (program, errors) = parser::parse(&source);
    if !errors.is_empty() {
        return Err(Error::Syntax {
            source_name: file.to_string(),
            errors,
        }
        .into());
    }

    let mut formatted = program.to_string();
    if !formatted.ends_with('\n') {
        formatted.push('\n');
    }

    if write {
        if formatted == source {
            tracing::info!("{file} is already formatted");
        } else {
            std::fs::write(file, &formatted).with_context(|| format!("Failed to write {file}"))?;
            tracing::info!("✓ Formatted {file}");
        }
    } else {
        print!("{formatted}");
    }
    Ok(())
}
