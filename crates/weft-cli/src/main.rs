//! Weft CLI
//!
//! Developer tool for writing, checking and running flows.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Weft - declarative dataflow pipelines
#[derive(Parser)]
#[command(name = "weft")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "weft.yaml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new Weft project
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Project name (defaults to directory name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Print the token stream of a flow file
    Tokens {
        /// Flow source file
        file: String,
    },

    /// Parse a flow file and print its syntax tree
    Parse {
        /// Flow source file
        file: String,
    },

    /// Re-render a flow file in canonical form
    Fmt {
        /// Flow source file
        file: String,

        /// Rewrite the file instead of printing
        #[arg(short, long)]
        write: bool,
    },

    /// Parse and compile every flow of the project
    Validate,

    /// List registered schema types and versions
    Schemas,

    /// Feed JSONL payloads through a flow and print the results as JSONL
    Run {
        /// Flow name
        flow: String,

        /// JSONL input file, one payload per line (`-` for stdin)
        #[arg(short, long)]
        input: String,

        /// Node receiving the input (defaults to the flow's only entry node)
        #[arg(short, long)]
        node: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // stdout carries command output, logs go to stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Init { path, name } => {
            commands::init::run(&path, name.as_deref()).await?;
        }
        Commands::Tokens { file } => {
            commands::tokens::run(&file).await?;
        }
        Commands::Parse { file } => {
            commands::parse::run(&file).await?;
        }
        Commands::Fmt { file, write } => {
            commands::fmt::run(&file, write).await?;
        }
        Commands::Validate => {
            commands::validate::run(&cli.config).await?;
        }
        Commands::Schemas => {
            commands::schemas::run().await?;
        }
        Commands::Run { flow, input, node } => {
            commands::run::run(&cli.config, &flow, &input, node.as_deref()).await?;
        }
    }

    Ok(())
}
