//! Parse a flow file and print its syntax tree

use anyhow::Result;
use weft_core::parser;

use super::read_source;

/// Run the parse command.
///
/// Prints the rendered program, or every diagnostic followed by a failure.
pub async fn run(file: &str) -> Result<()> {
    let source = read_source(file)?;
    let (program, errors) = parser::parse(&source);
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("{file}: {error}");
        }
        anyhow::bail!("{} syntax error(s) in {file}", errors.len());
    }
    println!("{program}");
    Ok(())
}
