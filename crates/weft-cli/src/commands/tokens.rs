//! Print the token stream of a flow file

use anyhow::Result;
use weft_core::lexer::Lexer;

use super::read_source;

/// Run the tokens command
pub async fn run(file: &str) -> Result<()> {
    let source = read_source(file)?;
    for token in Lexer::tokenize(&source) {
        println!(
            "{:>4}:{:<4} {}",
            token.position.line, token.position.column, token
        );
    }
    Ok(())
}
